#![forbid(unsafe_code)]

//! The seam between reconciliation and a rendering backend.

use std::ops::Range;

/// A container whose children a [`ListReconciler`](crate::reconciler::ListReconciler)
/// may edit.
///
/// Handles are shared (`&self` receivers): implementations use interior
/// mutability, the way DOM handles do.
pub trait NodeHost {
    /// Child node handle. Equality must be identity.
    type Node: Clone + PartialEq;

    fn child_count(&self) -> usize;

    /// Insert `nodes`, in order, before the child currently at `index`
    /// (`index == child_count()` appends). Hosts may implement this as a
    /// single fragment insertion.
    fn insert_children(&self, index: usize, nodes: Vec<Self::Node>);

    /// Detach and return the children in `range`.
    fn remove_children(&self, range: Range<usize>) -> Vec<Self::Node>;
}
