#![forbid(unsafe_code)]

//! Listener registries and the [`Subscription`] guard.
//!
//! Both [`Stream`](crate::stream::Stream) and
//! [`ObservableVec`](crate::sequence::ObservableVec) keep their callbacks in a
//! [`Listeners`] registry: an ordered list with set semantics by pointer
//! identity. Registering hands back a [`Subscription`] that removes the
//! callback when dropped.
//!
//! # Invariants
//!
//! 1. Listeners are notified in registration order.
//! 2. Registering the same `Rc` twice keeps a single entry. The entry stays
//!    until every guard handed out for it is dropped, or until it is removed
//!    by identity.
//! 3. Notification passes iterate a snapshot, so callbacks added or removed
//!    during a pass only affect later passes.
//! 4. Dropping a [`Subscription`] after its owner is gone is a no-op.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Identifier of one registration inside a [`Listeners`] registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Raw id value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

struct Entry<L: ?Sized> {
    id: ListenerId,
    listener: Rc<L>,
    /// Live guards handed out for this entry.
    guards: usize,
}

/// Ordered callback registry with set semantics by pointer identity.
pub(crate) struct Listeners<L: ?Sized> {
    entries: RefCell<Vec<Entry<L>>>,
    next_id: Cell<u64>,
}

impl<L: ?Sized> Listeners<L> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    /// Register `listener` and count one more guard for it. Returns the id of
    /// the (possibly pre-existing) entry.
    pub(crate) fn insert(&self, listener: &Rc<L>) -> ListenerId {
        let mut entries = self.entries.borrow_mut();
        if let Some(entry) = entries.iter_mut().find(|e| same(&e.listener, listener)) {
            entry.guards += 1;
            return entry.id;
        }
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        entries.push(Entry {
            id,
            listener: Rc::clone(listener),
            guards: 1,
        });
        id
    }

    /// Drop one guard of entry `id`; the entry goes with its last guard.
    /// Returns whether the entry was removed.
    pub(crate) fn release(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.borrow_mut();
        let Some(pos) = entries.iter().position(|e| e.id == id) else {
            return false;
        };
        let entry = &mut entries[pos];
        entry.guards = entry.guards.saturating_sub(1);
        if entry.guards > 0 {
            return false;
        }
        entries.remove(pos);
        true
    }

    /// Remove `listener` outright, whatever guards are still out.
    pub(crate) fn remove(&self, listener: &Rc<L>) -> bool {
        let mut entries = self.entries.borrow_mut();
        match entries.iter().position(|e| same(&e.listener, listener)) {
            Some(pos) => {
                entries.remove(pos);
                true
            }
            None => false,
        }
    }

    pub(crate) fn contains(&self, listener: &Rc<L>) -> bool {
        self.entries
            .borrow()
            .iter()
            .any(|e| same(&e.listener, listener))
    }

    pub(crate) fn snapshot(&self) -> Vec<Rc<L>> {
        self.entries
            .borrow()
            .iter()
            .map(|e| Rc::clone(&e.listener))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

fn same<L: ?Sized>(a: &Rc<L>, b: &Rc<L>) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

/// RAII guard for a listener registration.
///
/// Dropping the guard (or calling [`unsubscribe`](Self::unsubscribe)) removes
/// the listener. [`detach`](Self::detach) keeps the listener registered for as
/// long as its owner lives.
#[must_use = "dropping a Subscription removes the listener immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Remove the listener now.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Give up the guard without removing the listener.
    pub fn detach(mut self) {
        self.release = None;
    }

    /// Whether dropping this guard will remove a listener.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
