#![forbid(unsafe_code)]

//! Mutation-log driven list reconciliation.
//!
//! A [`ListReconciler`] keeps a run of child nodes inside a container in 1:1
//! correspondence with an [`ObservableVec`] of models. It never diffs: each
//! [`Change`] says exactly which models moved, appeared or disappeared, and
//! the reconciler applies the same edit to the node run.
//!
//! # Invariants
//!
//! 1. `nodes()[i]` renders `models[i]`, and the run sits contiguously in the
//!    container starting at the child index the container had when the
//!    reconciler was created.
//! 2. A model's node is created once and reused until the model is removed;
//!    `reverse` and `sort` move nodes, they never recreate them.
//! 3. New nodes for one event are inserted as one group.
//!
//! # Failure Modes
//!
//! - Mutating the models from inside the node factory panics: the run would
//!   be edited while one of its own edits is half applied.
//! - Editing the run's children behind the reconciler's back breaks
//!   invariant 1.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use tracing::{trace, warn};

use spui_reactive::{Change, ObservableVec, SpliceRange, Subscription};

use crate::host::NodeHost;

/// Builds the node for a model: `(container, model, index in models)`.
pub type NodeFactory<H, M> = Box<dyn Fn(&H, &M, usize) -> <H as NodeHost>::Node>;

struct RunState<H: NodeHost, M> {
    nodes: Vec<H::Node>,
    model_to_node: AHashMap<M, H::Node>,
}

struct ReconcilerInner<H: NodeHost, M> {
    container: H,
    models: ObservableVec<M>,
    factory: NodeFactory<H, M>,
    offset: usize,
    state: RefCell<RunState<H, M>>,
    busy: Cell<bool>,
    _subscription: Subscription,
}

/// Keeps a container's child run in step with an [`ObservableVec`].
///
/// Models are identities: two equal models denote the same model and map to
/// the same node.
pub struct ListReconciler<H: NodeHost, M> {
    inner: Rc<ReconcilerInner<H, M>>,
}

impl<H: NodeHost, M> Clone for ListReconciler<H, M> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<H: NodeHost, M> fmt::Debug for ListReconciler<H, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListReconciler")
            .field("offset", &self.inner.offset)
            .field("nodes", &self.inner.state.borrow().nodes.len())
            .finish_non_exhaustive()
    }
}

impl<H, M> ListReconciler<H, M>
where
    H: NodeHost + 'static,
    M: Clone + Eq + Hash + 'static,
{
    /// Render every current model into `container` (appended after its
    /// existing children) and follow `models` from now on.
    ///
    /// # Panics
    ///
    /// Later, if `factory` mutates `models`.
    pub fn new(
        container: H,
        models: &ObservableVec<M>,
        factory: impl Fn(&H, &M, usize) -> H::Node + 'static,
    ) -> Self {
        let offset = container.child_count();
        let initial = models.to_vec();
        let nodes: Vec<H::Node> = initial
            .iter()
            .enumerate()
            .map(|(index, model)| factory(&container, model, index))
            .collect();
        if !nodes.is_empty() {
            container.insert_children(offset, nodes.clone());
        }
        let model_to_node = initial.into_iter().zip(nodes.iter().cloned()).collect();

        let inner = Rc::new_cyclic(|weak: &Weak<ReconcilerInner<H, M>>| {
            let weak = weak.clone();
            let subscription = models.subscribe_after_snapshot(move |change| {
                if let Some(inner) = weak.upgrade() {
                    inner.models_changed(change);
                }
            });
            ReconcilerInner {
                container,
                models: models.clone(),
                factory: Box::new(factory),
                offset,
                state: RefCell::new(RunState {
                    nodes,
                    model_to_node,
                }),
                busy: Cell::new(false),
                _subscription: subscription,
            }
        });
        Self { inner }
    }

    #[must_use]
    pub fn container(&self) -> &H {
        &self.inner.container
    }

    #[must_use]
    pub fn models(&self) -> &ObservableVec<M> {
        &self.inner.models
    }

    /// Child index of the first node of the run.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.inner.offset
    }

    /// Node currently rendering `model`.
    ///
    /// Equal models are one identity. With duplicates in `models` this is the
    /// node of the copy inserted last; removing that copy clears the entry
    /// even though the other copies stay rendered.
    #[must_use]
    pub fn node_for(&self, model: &M) -> Option<H::Node> {
        self.inner.state.borrow().model_to_node.get(model).cloned()
    }

    /// The run, in model order.
    #[must_use]
    pub fn nodes(&self) -> Vec<H::Node> {
        self.inner.state.borrow().nodes.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.borrow().nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.state.borrow().nodes.is_empty()
    }
}

impl<H, M> ReconcilerInner<H, M>
where
    H: NodeHost + 'static,
    M: Clone + Eq + Hash + 'static,
{
    fn models_changed(&self, change: &Change<M>) {
        assert!(
            !self.busy.get(),
            "list models mutated from inside the node factory"
        );
        self.busy.set(true);
        let _reset = BusyReset(&self.busy);
        self.apply(change);
    }

    fn apply(&self, change: &Change<M>) {
        let len = self.state.borrow().nodes.len();
        trace!(op = %change.op(), run = len, "reconciling list");
        match change {
            Change::Push { items, .. } => self.insert_models(len, items),
            Change::Unshift { items, .. } => self.insert_models(0, items),
            Change::Pop { removed: Some(model) } if len > 0 => {
                self.remove_models(len - 1..len, std::slice::from_ref(model));
            }
            Change::Shift { removed: Some(model) } if len > 0 => {
                self.remove_models(0..1, std::slice::from_ref(model));
            }
            Change::Pop { .. } | Change::Shift { .. } => {}
            Change::Reverse => {
                let mut nodes = self.detach(0..len);
                nodes.reverse();
                self.place(0, nodes);
            }
            Change::Sort { order } => {
                let nodes = self.detach(0..len);
                if order.len() != nodes.len() {
                    warn!(
                        order = order.len(),
                        run = nodes.len(),
                        "sort order does not match the node run"
                    );
                }
                let sorted = order.iter().filter_map(|&i| nodes.get(i).cloned()).collect();
                self.place(0, sorted);
            }
            Change::Splice {
                start,
                delete_count,
                items,
                removed,
            } => {
                let range = SpliceRange::resolve(len, *start, *delete_count);
                if !range.is_empty() {
                    self.remove_models(range.as_range(), removed);
                }
                self.insert_models(range.start, items);
            }
            Change::Changes(changes) => {
                for change in changes {
                    self.apply(change);
                }
            }
        }
    }

    /// Create nodes for `models` and insert them as one group at `at`.
    fn insert_models(&self, at: usize, models: &[M]) {
        if models.is_empty() {
            return;
        }
        let nodes: Vec<H::Node> = models
            .iter()
            .enumerate()
            .map(|(i, model)| (self.factory)(&self.container, model, at + i))
            .collect();
        self.place(at, nodes.clone());
        let mut state = self.state.borrow_mut();
        for (model, node) in models.iter().zip(nodes) {
            state.model_to_node.insert(model.clone(), node);
        }
    }

    /// Remove the nodes in `range` and drop the map entries of `models`
    /// that still point at them.
    fn remove_models(&self, range: std::ops::Range<usize>, models: &[M]) {
        let nodes = self.detach(range);
        let mut state = self.state.borrow_mut();
        for (model, node) in models.iter().zip(&nodes) {
            if state.model_to_node.get(model) == Some(node) {
                state.model_to_node.remove(model);
            }
        }
    }

    fn detach(&self, range: std::ops::Range<usize>) -> Vec<H::Node> {
        if range.is_empty() {
            return Vec::new();
        }
        let host_range = self.offset + range.start..self.offset + range.end;
        self.container.remove_children(host_range);
        self.state.borrow_mut().nodes.drain(range).collect()
    }

    fn place(&self, at: usize, nodes: Vec<H::Node>) {
        if nodes.is_empty() {
            return;
        }
        self.container.insert_children(self.offset + at, nodes.clone());
        self.state.borrow_mut().nodes.splice(at..at, nodes);
    }
}

struct BusyReset<'a>(&'a Cell<bool>);

impl Drop for BusyReset<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}
