#![forbid(unsafe_code)]

//! Element whose children render an observable list.

use std::fmt;
use std::hash::Hash;

use spui_reactive::{ObservableVec, Runtime};

use crate::h::h;
use crate::node::MemoryNode;
use crate::reconciler::ListReconciler;

/// A root element plus the reconciler that keeps its children in step with
/// a model list. Dropping it stops the updates.
pub struct ElementList<M> {
    root: MemoryNode,
    reconciler: ListReconciler<MemoryNode, M>,
}

impl<M> fmt::Debug for ElementList<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementList")
            .field("root", &self.root)
            .field("reconciler", &self.reconciler)
            .finish()
    }
}

impl<M: Clone + Eq + Hash + 'static> ElementList<M> {
    /// Render `models` into `root`, after any children it already has.
    pub fn new(
        root: MemoryNode,
        models: &ObservableVec<M>,
        factory: impl Fn(&MemoryNode, &M, usize) -> MemoryNode + 'static,
    ) -> Self {
        let reconciler = ListReconciler::new(root.clone(), models, factory);
        Self { root, reconciler }
    }

    #[must_use]
    pub fn root(&self) -> &MemoryNode {
        &self.root
    }

    #[must_use]
    pub fn reconciler(&self) -> &ListReconciler<MemoryNode, M> {
        &self.reconciler
    }

    /// See [`ListReconciler::node_for`].
    #[must_use]
    pub fn node_for(&self, model: &M) -> Option<MemoryNode> {
        self.reconciler.node_for(model)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.reconciler.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reconciler.is_empty()
    }
}

/// A `tag` element listing `models`; `factory(root, model, index)` builds
/// each model's node.
pub fn element_list<M: Clone + Eq + Hash + 'static>(
    rt: &Runtime,
    tag: &str,
    models: &ObservableVec<M>,
    factory: impl Fn(&MemoryNode, &M, usize) -> MemoryNode + 'static,
) -> ElementList<M> {
    h(rt, tag).into_list(models, factory)
}
