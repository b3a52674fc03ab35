#![forbid(unsafe_code)]

//! Observable sequences with a structured mutation log.
//!
//! [`ObservableVec<T>`] wraps a `Vec<T>`. Every structural operation performs
//! the mutation and then logs one [`Change`] describing it: the operation, its
//! arguments and its conventional return value. Listeners receive the log
//! entry, which is enough to update a derived view without rescanning the
//! sequence.
//!
//! # Batching
//!
//! [`apply_changes`](ObservableVec::apply_changes) buffers the entries logged
//! while its body runs and emits them as a single [`Change::Changes`] when the
//! outermost batch closes. Batches nest; an inner batch joins the enclosing
//! one.
//!
//! # Invariants
//!
//! 1. Each operation call logs exactly one entry, even when it changes
//!    nothing (`push` of zero items, `pop` on an empty sequence).
//! 2. Entries are logged after the mutation, so a listener reading the
//!    sequence sees the post-operation state.
//! 3. Batched entries keep invocation order, and no listener is notified
//!    before the outermost batch closes.
//! 4. A failing or panicking batch body emits nothing. Mutations it already
//!    made are **not** rolled back.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::error::{BoxError, ReactiveError, Result};
use crate::splice::{SpliceRange, raw_start};
use crate::subscription::{Listeners, Subscription};

/// Operation kind of a [`Change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Push,
    Pop,
    Shift,
    Unshift,
    Reverse,
    Sort,
    Splice,
    Changes,
}

impl Op {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pop => "pop",
            Self::Shift => "shift",
            Self::Unshift => "unshift",
            Self::Reverse => "reverse",
            Self::Sort => "sort",
            Self::Splice => "splice",
            Self::Changes => "changes",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry of the mutation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change<T> {
    /// `items` were appended; the sequence now has `len` elements.
    Push { items: Vec<T>, len: usize },
    /// The last element was removed (`None` if the sequence was empty).
    Pop { removed: Option<T> },
    /// The first element was removed (`None` if the sequence was empty).
    Shift { removed: Option<T> },
    /// `items` were prepended; the sequence now has `len` elements.
    Unshift { items: Vec<T>, len: usize },
    Reverse,
    /// Stable reordering: new position `i` holds the element previously at
    /// `order[i]`.
    Sort { order: Vec<usize> },
    /// Raw splice arguments and the removed elements. Resolve `start` and
    /// `delete_count` with [`SpliceRange::resolve`] against the length the
    /// sequence had before the splice.
    Splice {
        start: isize,
        delete_count: Option<usize>,
        items: Vec<T>,
        removed: Vec<T>,
    },
    /// Entries logged inside a batch, in invocation order.
    Changes(Vec<Change<T>>),
}

impl<T> Change<T> {
    #[must_use]
    pub fn op(&self) -> Op {
        match self {
            Self::Push { .. } => Op::Push,
            Self::Pop { .. } => Op::Pop,
            Self::Shift { .. } => Op::Shift,
            Self::Unshift { .. } => Op::Unshift,
            Self::Reverse => Op::Reverse,
            Self::Sort { .. } => Op::Sort,
            Self::Splice { .. } => Op::Splice,
            Self::Changes(_) => Op::Changes,
        }
    }
}

/// Callback receiving each emitted log entry.
pub type ChangeListener<T> = Rc<dyn Fn(&Change<T>)>;

struct VecInner<T> {
    items: RefCell<Vec<T>>,
    listeners: Listeners<dyn Fn(&Change<T>)>,
    pending: RefCell<Option<Vec<Change<T>>>>,
    batch_depth: Cell<usize>,
    after_batch: RefCell<Vec<Box<dyn FnOnce()>>>,
    /// Entries already reflected by snapshot subscribers that joined mid-batch.
    snapshot_marks: RefCell<Vec<Weak<Cell<usize>>>>,
}

/// Shared handle to an observable sequence. Cloning shares the sequence.
pub struct ObservableVec<T> {
    inner: Rc<VecInner<T>>,
}

impl<T> Clone for ObservableVec<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static> Default for ObservableVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> From<Vec<T>> for ObservableVec<T> {
    fn from(items: Vec<T>) -> Self {
        Self::from_vec(items)
    }
}

impl<T: Clone + 'static> FromIterator<T> for ObservableVec<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl<T: fmt::Debug> fmt::Debug for ObservableVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("ObservableVec");
        match self.inner.items.try_borrow() {
            Ok(items) => dbg.field("items", &*items),
            Err(_) => dbg.field("items", &"<borrowed>"),
        };
        dbg.field("listeners", &self.inner.listeners.len())
            .field("batch_depth", &self.inner.batch_depth.get())
            .finish()
    }
}

impl<T: Clone + 'static> ObservableVec<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Wrap `items` without logging anything.
    #[must_use]
    pub fn from_vec(items: Vec<T>) -> Self {
        Self {
            inner: Rc::new(VecInner {
                items: RefCell::new(items),
                listeners: Listeners::new(),
                pending: RefCell::new(None),
                batch_depth: Cell::new(0),
                after_batch: RefCell::default(),
                snapshot_marks: RefCell::default(),
            }),
        }
    }

    // --- reads -----------------------------------------------------------

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.items.borrow().is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.items.borrow().get(index).cloned()
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.inner.items.borrow().clone()
    }

    /// Borrow the elements. Mutating the sequence from `f` panics.
    pub fn with<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.inner.items.borrow())
    }

    #[must_use]
    pub fn contains(&self, item: &T) -> bool
    where
        T: PartialEq,
    {
        self.inner.items.borrow().contains(item)
    }

    #[must_use]
    pub fn position(&self, item: &T) -> Option<usize>
    where
        T: PartialEq,
    {
        self.inner.items.borrow().iter().position(|x| x == item)
    }

    // --- structural operations -------------------------------------------

    /// Append `items`. Returns the new length.
    pub fn push(&self, items: impl IntoIterator<Item = T>) -> usize {
        let items: Vec<T> = items.into_iter().collect();
        let len = {
            let mut v = self.inner.items.borrow_mut();
            v.extend(items.iter().cloned());
            v.len()
        };
        self.log(Change::Push { items, len });
        len
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<T> {
        let removed = self.inner.items.borrow_mut().pop();
        self.log(Change::Pop {
            removed: removed.clone(),
        });
        removed
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Option<T> {
        let removed = {
            let mut v = self.inner.items.borrow_mut();
            if v.is_empty() { None } else { Some(v.remove(0)) }
        };
        self.log(Change::Shift {
            removed: removed.clone(),
        });
        removed
    }

    /// Prepend `items`, keeping their order. Returns the new length.
    pub fn unshift(&self, items: impl IntoIterator<Item = T>) -> usize {
        let items: Vec<T> = items.into_iter().collect();
        let len = {
            let mut v = self.inner.items.borrow_mut();
            v.splice(0..0, items.iter().cloned());
            v.len()
        };
        self.log(Change::Unshift { items, len });
        len
    }

    pub fn reverse(&self) {
        self.inner.items.borrow_mut().reverse();
        self.log(Change::Reverse);
    }

    /// Stable ascending sort.
    pub fn sort(&self)
    where
        T: Ord,
    {
        self.sort_by(T::cmp);
    }

    /// Stable sort with a comparator. The comparator may read this sequence
    /// but must not mutate it. If it panics, the sequence is left unchanged.
    pub fn sort_by(&self, mut compare: impl FnMut(&T, &T) -> Ordering) {
        let order = {
            let v = self.inner.items.borrow();
            let mut order: Vec<usize> = (0..v.len()).collect();
            order.sort_by(|&a, &b| compare(&v[a], &v[b]));
            order
        };
        reorder(&mut self.inner.items.borrow_mut(), &order);
        self.log(Change::Sort { order });
    }

    /// Stable sort by a key.
    pub fn sort_by_key<K: Ord>(&self, mut key: impl FnMut(&T) -> K) {
        self.sort_by(|a, b| key(a).cmp(&key(b)));
    }

    /// Reorder so that new position `i` holds the element at `order[i]`.
    /// Logs a [`Change::Sort`].
    ///
    /// # Errors
    ///
    /// [`ReactiveError::InvalidPermutation`] when `order` is not a
    /// permutation of `0..len`. Nothing is changed or logged.
    pub fn permute(&self, order: Vec<usize>) -> Result<()> {
        {
            let mut v = self.inner.items.borrow_mut();
            if !is_permutation(&order, v.len()) {
                return Err(ReactiveError::InvalidPermutation { len: v.len() });
            }
            reorder(&mut v, &order);
        }
        self.log(Change::Sort { order });
        Ok(())
    }

    /// Remove `delete_count` elements at `start` (all remaining when `None`)
    /// and insert `items` there. Returns the removed elements.
    ///
    /// A negative `start` counts from the end. Out-of-range arguments are
    /// clamped, see [`SpliceRange::resolve`].
    pub fn splice(
        &self,
        start: isize,
        delete_count: Option<usize>,
        items: impl IntoIterator<Item = T>,
    ) -> Vec<T> {
        let items: Vec<T> = items.into_iter().collect();
        let removed: Vec<T> = {
            let mut v = self.inner.items.borrow_mut();
            let range = SpliceRange::resolve(v.len(), start, delete_count);
            v.splice(range.as_range(), items.iter().cloned()).collect()
        };
        self.log(Change::Splice {
            start,
            delete_count,
            items,
            removed: removed.clone(),
        });
        removed
    }

    // --- strict index helpers (logged as splices) ------------------------

    /// Insert `item` at `index` (`index == len` appends).
    ///
    /// # Errors
    ///
    /// [`ReactiveError::IndexOutOfRange`] when `index > len`.
    pub fn insert(&self, index: usize, item: T) -> Result<()> {
        let len = self.len();
        if index > len {
            return Err(ReactiveError::IndexOutOfRange { index, len });
        }
        self.splice(raw_start(index), Some(0), [item]);
        Ok(())
    }

    /// Remove and return the element at `index`.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::IndexOutOfRange`] when `index >= len`.
    pub fn remove_at(&self, index: usize) -> Result<T> {
        let len = self.len();
        if index >= len {
            return Err(ReactiveError::IndexOutOfRange { index, len });
        }
        self.splice(raw_start(index), Some(1), [])
            .into_iter()
            .next()
            .ok_or(ReactiveError::IndexOutOfRange { index, len })
    }

    /// Replace the element at `index`, returning the old one.
    ///
    /// # Errors
    ///
    /// [`ReactiveError::IndexOutOfRange`] when `index >= len`.
    pub fn replace(&self, index: usize, item: T) -> Result<T> {
        let len = self.len();
        if index >= len {
            return Err(ReactiveError::IndexOutOfRange { index, len });
        }
        self.splice(raw_start(index), Some(1), [item])
            .into_iter()
            .next()
            .ok_or(ReactiveError::IndexOutOfRange { index, len })
    }

    /// Remove the first element equal to `item`. Absent items log nothing.
    pub fn remove_item(&self, item: &T) -> Option<T>
    where
        T: PartialEq,
    {
        let index = self.position(item)?;
        self.remove_at(index).ok()
    }

    /// Remove every element.
    pub fn clear(&self) -> Vec<T> {
        self.splice(0, None, [])
    }

    // --- batching --------------------------------------------------------

    /// Run `f` as a batch: entries logged inside it are emitted as one
    /// [`Change::Changes`] when the outermost batch closes (nothing is
    /// emitted for an empty batch).
    ///
    /// # Errors
    ///
    /// When `f` fails, the entries it logged are discarded without
    /// notification and [`ReactiveError::BatchAborted`] is returned.
    /// Mutations already applied stay applied: listeners and the sequence
    /// disagree from then on, so the caller should rebuild derived views.
    pub fn apply_changes<R, E>(&self, f: impl FnOnce() -> std::result::Result<R, E>) -> Result<R>
    where
        E: Into<BoxError>,
    {
        let guard = BatchGuard::open(self);
        match f() {
            Ok(value) => {
                guard.commit();
                Ok(value)
            }
            Err(err) => Err(ReactiveError::BatchAborted {
                applied: guard.abort(),
                source: err.into(),
            }),
        }
    }

    /// Infallible [`apply_changes`](Self::apply_changes).
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let guard = BatchGuard::open(self);
        let value = f();
        guard.commit();
        value
    }

    /// Like [`batch`](Self::batch), also returning the entries the batch
    /// logged. For a nested batch these are not emitted yet.
    pub fn record_changes<R>(&self, f: impl FnOnce() -> R) -> (R, Vec<Change<T>>) {
        let guard = BatchGuard::open(self);
        let value = f();
        let changes = guard.commit();
        (value, changes)
    }

    #[must_use]
    pub fn is_batching(&self) -> bool {
        self.inner.pending.borrow().is_some()
    }

    // --- listeners -------------------------------------------------------

    pub fn subscribe(&self, callback: impl Fn(&Change<T>) + 'static) -> Subscription {
        let listener: ChangeListener<T> = Rc::new(callback);
        self.add_listener(&listener)
    }

    /// Subscribe a listener that has just read the current contents.
    ///
    /// Inside a batch those contents already include the entries logged so
    /// far, so they are left out of the [`Change::Changes`] this listener
    /// receives when the batch is emitted. Outside a batch this is
    /// [`subscribe`](Self::subscribe).
    pub fn subscribe_after_snapshot(
        &self,
        callback: impl Fn(&Change<T>) + 'static,
    ) -> Subscription {
        let seen = self.inner.pending.borrow().as_ref().map_or(0, Vec::len);
        if seen == 0 {
            return self.subscribe(callback);
        }
        let skip = Rc::new(Cell::new(seen));
        self.inner.snapshot_marks.borrow_mut().push(Rc::downgrade(&skip));
        self.subscribe(move |change| match (skip.replace(0), change) {
            (0, _) => callback(change),
            (seen, Change::Changes(entries)) => {
                if let Some(rest) = entries.get(seen..)
                    && !rest.is_empty()
                {
                    callback(&Change::Changes(rest.to_vec()));
                }
            }
            (_, change) => callback(change),
        })
    }

    /// Register `listener`. An already-registered listener keeps its single
    /// entry, which then stays until every guard returned for it is dropped
    /// (or [`remove_listener`](Self::remove_listener) removes it).
    pub fn add_listener(&self, listener: &ChangeListener<T>) -> Subscription {
        let id = self.inner.listeners.insert(listener);
        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.release(id);
            }
        })
    }

    pub fn remove_listener(&self, listener: &ChangeListener<T>) -> bool {
        self.inner.listeners.remove(listener)
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakObservableVec<T> {
        WeakObservableVec {
            inner: Rc::downgrade(&self.inner),
        }
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // --- internals -------------------------------------------------------

    /// Run `f` once the outermost batch has committed and emitted, or right
    /// away when no batch is open. Dropped if the batch aborts.
    pub(crate) fn after_batch(&self, f: impl FnOnce() + 'static) {
        if self.is_batching() {
            self.inner.after_batch.borrow_mut().push(Box::new(f));
        } else {
            f();
        }
    }

    fn log(&self, change: Change<T>) {
        if let Some(pending) = self.inner.pending.borrow_mut().as_mut() {
            pending.push(change);
            return;
        }
        self.notify(&change);
    }

    fn notify(&self, change: &Change<T>) {
        let listeners = self.inner.listeners.snapshot();
        trace!(op = %change.op(), listeners = listeners.len(), "sequence change");
        for listener in listeners {
            listener(change);
        }
    }
}

/// Apply a permutation already known to be valid.
fn reorder<T>(items: &mut Vec<T>, order: &[usize]) {
    let mut slots: Vec<Option<T>> = mem::take(items).into_iter().map(Some).collect();
    *items = order
        .iter()
        .filter_map(|&i| slots.get_mut(i).and_then(Option::take))
        .collect();
}

fn is_permutation(order: &[usize], len: usize) -> bool {
    if order.len() != len {
        return false;
    }
    let mut seen = vec![false; len];
    for &i in order {
        match seen.get_mut(i) {
            Some(slot) if !*slot => *slot = true,
            _ => return false,
        }
    }
    true
}

/// Scoped batch. Dropping it without [`commit`](Self::commit) discards the
/// entries logged since it opened.
struct BatchGuard<'a, T: Clone + 'static> {
    vec: &'a ObservableVec<T>,
    mark: usize,
    outermost: bool,
    closed: bool,
}

impl<'a, T: Clone + 'static> BatchGuard<'a, T> {
    fn open(vec: &'a ObservableVec<T>) -> Self {
        let inner = &vec.inner;
        inner.batch_depth.set(inner.batch_depth.get() + 1);
        let mut pending = inner.pending.borrow_mut();
        let outermost = pending.is_none();
        let mark = pending.get_or_insert_with(Vec::new).len();
        Self {
            vec,
            mark,
            outermost,
            closed: false,
        }
    }

    /// Close the batch, emitting the buffer if this is the outermost one.
    /// Returns the entries logged by this batch.
    fn commit(mut self) -> Vec<Change<T>> {
        self.closed = true;
        let inner = &self.vec.inner;
        inner.batch_depth.set(inner.batch_depth.get().saturating_sub(1));
        if !self.outermost {
            return inner
                .pending
                .borrow()
                .as_ref()
                .map(|pending| pending[self.mark..].to_vec())
                .unwrap_or_default();
        }
        let buffer = inner.pending.borrow_mut().take().unwrap_or_default();
        let emitted = if buffer.is_empty() {
            buffer
        } else {
            debug!(entries = buffer.len(), "emitting batched changes");
            let change = Change::Changes(buffer);
            self.vec.notify(&change);
            match change {
                Change::Changes(buffer) => buffer,
                _ => Vec::new(),
            }
        };
        inner.snapshot_marks.borrow_mut().clear();
        let hooks = mem::take(&mut *inner.after_batch.borrow_mut());
        for hook in hooks {
            hook();
        }
        emitted
    }

    /// Close the batch, discarding its entries. Returns how many there were.
    fn abort(mut self) -> usize {
        self.closed = true;
        self.discard()
    }

    fn discard(&self) -> usize {
        let inner = &self.vec.inner;
        inner.batch_depth.set(inner.batch_depth.get().saturating_sub(1));
        let mut pending = inner.pending.borrow_mut();
        let applied = pending
            .as_ref()
            .map_or(0, |buffer| buffer.len().saturating_sub(self.mark));
        let kept = if self.outermost {
            *pending = None;
            self.vec.inner.after_batch.borrow_mut().clear();
            0
        } else {
            if let Some(buffer) = pending.as_mut() {
                buffer.truncate(self.mark);
            }
            self.mark
        };
        let mut marks = self.vec.inner.snapshot_marks.borrow_mut();
        marks.retain(|mark| match mark.upgrade() {
            Some(seen) => {
                seen.set(seen.get().min(kept));
                kept > 0
            }
            None => false,
        });
        if applied > 0 {
            debug!(discarded = applied, "batch aborted");
        }
        applied
    }
}

impl<T: Clone + 'static> Drop for BatchGuard<'_, T> {
    fn drop(&mut self) {
        if !self.closed {
            self.discard();
        }
    }
}

/// Non-owning handle to an [`ObservableVec`].
pub struct WeakObservableVec<T> {
    inner: Weak<VecInner<T>>,
}

impl<T> Clone for WeakObservableVec<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T> WeakObservableVec<T> {
    #[must_use]
    pub fn upgrade(&self) -> Option<ObservableVec<T>> {
        self.inner.upgrade().map(|inner| ObservableVec { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    fn recorder<T: Clone + 'static>(
        vec: &ObservableVec<T>,
    ) -> (Rc<RefCell<Vec<Change<T>>>>, Subscription) {
        let log: Rc<RefCell<Vec<Change<T>>>> = Rc::default();
        let l = Rc::clone(&log);
        let sub = vec.subscribe(move |change| l.borrow_mut().push(change.clone()));
        (log, sub)
    }

    #[test]
    fn op_names() {
        let names: Vec<&str> = [
            Op::Push,
            Op::Pop,
            Op::Shift,
            Op::Unshift,
            Op::Reverse,
            Op::Sort,
            Op::Splice,
            Op::Changes,
        ]
        .iter()
        .map(|op| op.name())
        .collect();
        assert_eq!(
            names,
            ["push", "pop", "shift", "unshift", "reverse", "sort", "splice", "changes"]
        );
        assert_eq!(Change::<i32>::Reverse.op().to_string(), "reverse");
    }

    #[test]
    fn push_and_unshift_log_new_length() {
        let vec = ObservableVec::from_vec(vec![1, 2]);
        let (log, _sub) = recorder(&vec);

        assert_eq!(vec.push([3, 4]), 4);
        assert_eq!(vec.unshift([-1, 0]), 6);
        assert_eq!(vec.to_vec(), vec![-1, 0, 1, 2, 3, 4]);
        assert_eq!(
            *log.borrow(),
            vec![
                Change::Push { items: vec![3, 4], len: 4 },
                Change::Unshift { items: vec![-1, 0], len: 6 },
            ]
        );
    }

    #[test]
    fn pop_and_shift_log_removed() {
        let vec = ObservableVec::from_vec(vec!['a', 'b', 'c']);
        let (log, _sub) = recorder(&vec);

        assert_eq!(vec.pop(), Some('c'));
        assert_eq!(vec.shift(), Some('a'));
        assert_eq!(vec.to_vec(), vec!['b']);
        assert_eq!(
            *log.borrow(),
            vec![
                Change::Pop { removed: Some('c') },
                Change::Shift { removed: Some('a') },
            ]
        );
    }

    #[test]
    fn noop_operations_still_log() {
        let vec: ObservableVec<i32> = ObservableVec::new();
        let (log, _sub) = recorder(&vec);

        vec.push([]);
        assert_eq!(vec.pop(), None);
        assert_eq!(vec.shift(), None);
        vec.unshift([]);
        assert_eq!(
            log.borrow().iter().map(Change::op).collect::<Vec<_>>(),
            vec![Op::Push, Op::Pop, Op::Shift, Op::Unshift]
        );
    }

    #[test]
    fn sort_logs_stable_permutation() {
        let vec = ObservableVec::from_vec(vec![(2, 'a'), (1, 'b'), (2, 'c'), (0, 'd')]);
        let (log, _sub) = recorder(&vec);

        vec.sort_by_key(|pair| pair.0);
        assert_eq!(vec.to_vec(), vec![(0, 'd'), (1, 'b'), (2, 'a'), (2, 'c')]);
        assert_eq!(*log.borrow(), vec![Change::Sort { order: vec![3, 1, 0, 2] }]);
    }

    #[test]
    fn permute_validates_order() {
        let vec = ObservableVec::from_vec(vec![10, 20, 30]);
        let (log, _sub) = recorder(&vec);

        assert!(matches!(
            vec.permute(vec![0, 0, 1]),
            Err(ReactiveError::InvalidPermutation { len: 3 })
        ));
        assert!(vec.permute(vec![0, 1]).is_err());
        assert!(vec.permute(vec![0, 1, 3]).is_err());
        assert!(log.borrow().is_empty());

        vec.permute(vec![2, 0, 1]).expect("valid permutation");
        assert_eq!(vec.to_vec(), vec![30, 10, 20]);
        assert_eq!(*log.borrow(), vec![Change::Sort { order: vec![2, 0, 1] }]);
    }

    #[test]
    fn splice_clamps_and_logs_raw_arguments() {
        let vec = ObservableVec::from_vec(vec![1, 2, 3, 4, 5, 6]);
        let (log, _sub) = recorder(&vec);

        assert_eq!(vec.splice(-3, Some(2), []), vec![4, 5]);
        assert_eq!(vec.to_vec(), vec![1, 2, 3, 6]);
        assert_eq!(vec.splice(10, Some(3), [7]), Vec::<i32>::new());
        assert_eq!(vec.to_vec(), vec![1, 2, 3, 6, 7]);
        assert_eq!(
            log.borrow()[0],
            Change::Splice {
                start: -3,
                delete_count: Some(2),
                items: vec![],
                removed: vec![4, 5],
            }
        );
    }

    #[test]
    fn strict_helpers_reject_bad_indices() {
        let vec = ObservableVec::from_vec(vec!['x', 'y']);
        let (log, _sub) = recorder(&vec);

        assert!(matches!(
            vec.insert(3, 'z'),
            Err(ReactiveError::IndexOutOfRange { index: 3, len: 2 })
        ));
        assert!(vec.remove_at(2).is_err());
        assert!(vec.replace(5, 'q').is_err());
        assert!(log.borrow().is_empty());

        vec.insert(2, 'z').expect("append position");
        assert_eq!(vec.replace(0, 'w').expect("in range"), 'x');
        assert_eq!(vec.remove_at(1).expect("in range"), 'y');
        assert_eq!(vec.to_vec(), vec!['w', 'z']);
        assert!(log.borrow().iter().all(|c| c.op() == Op::Splice));
    }

    #[test]
    fn remove_item_ignores_absent_values() {
        let vec = ObservableVec::from_vec(vec![1, 2, 3]);
        let (log, _sub) = recorder(&vec);
        assert_eq!(vec.remove_item(&9), None);
        assert!(log.borrow().is_empty());
        assert_eq!(vec.remove_item(&2), Some(2));
        assert_eq!(vec.to_vec(), vec![1, 3]);
        assert_eq!(vec.clear(), vec![1, 3]);
        assert!(vec.is_empty());
    }

    #[test]
    fn batch_emits_single_changes_entry() {
        let vec = ObservableVec::from_vec(vec![3, 1, 2]);
        let (log, _sub) = recorder(&vec);

        let len = vec.batch(|| {
            vec.push([0]);
            vec.sort();
            assert!(vec.is_batching());
            vec.len()
        });
        assert_eq!(len, 4);
        assert!(!vec.is_batching());
        assert_eq!(
            *log.borrow(),
            vec![Change::Changes(vec![
                Change::Push { items: vec![0], len: 4 },
                Change::Sort { order: vec![3, 1, 2, 0] },
            ])]
        );
    }

    #[test]
    fn empty_batch_emits_nothing() {
        let vec: ObservableVec<u8> = ObservableVec::new();
        let (log, _sub) = recorder(&vec);
        let ((), changes) = vec.record_changes(|| {});
        assert!(changes.is_empty());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn nested_batches_join_outer() {
        let vec = ObservableVec::new();
        let (log, _sub) = recorder(&vec);

        let ((), outer) = vec.record_changes(|| {
            vec.push([1]);
            let ((), inner) = vec.record_changes(|| {
                vec.push([2]);
            });
            assert_eq!(inner.len(), 1);
            assert!(log.borrow().is_empty());
            vec.push([3]);
        });
        assert_eq!(outer.len(), 3);
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(log.borrow()[0], Change::Changes(outer));
    }

    #[test]
    fn aborted_batch_emits_nothing_and_keeps_mutations() {
        let vec = ObservableVec::from_vec(vec![1]);
        let (log, _sub) = recorder(&vec);

        let result: Result<()> = vec.apply_changes(|| {
            vec.push([2, 3]);
            vec.reverse();
            Err("validation failed")
        });
        let err = result.expect_err("body failed");
        assert!(matches!(err, ReactiveError::BatchAborted { applied: 2, .. }));
        assert!(log.borrow().is_empty());
        assert!(!vec.is_batching());
        assert_eq!(vec.to_vec(), vec![3, 2, 1]);

        vec.push([4]);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn aborted_inner_batch_discards_only_its_entries() {
        let vec = ObservableVec::new();
        let (log, _sub) = recorder(&vec);

        vec.batch(|| {
            vec.push(['a']);
            let inner: Result<()> = vec.apply_changes(|| {
                vec.push(['b']);
                Err("nope")
            });
            assert!(inner.is_err());
        });
        assert_eq!(
            *log.borrow(),
            vec![Change::Changes(vec![Change::Push { items: vec!['a'], len: 1 }])]
        );
    }

    #[test]
    fn panicking_batch_discards_buffer() {
        let vec = ObservableVec::from_vec(vec![1]);
        let (log, _sub) = recorder(&vec);

        let result = catch_unwind(AssertUnwindSafe(|| {
            vec.batch(|| {
                vec.push([2]);
                panic!("batch body");
            });
        }));
        assert!(result.is_err());
        assert!(!vec.is_batching());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn listener_sees_post_operation_state() {
        let vec = ObservableVec::from_vec(vec![1, 2]);
        let seen = Rc::new(Cell::new(0));
        let (v, s) = (vec.clone(), Rc::clone(&seen));
        let _sub = vec.subscribe(move |_| s.set(v.len()));
        vec.push([3]);
        assert_eq!(seen.get(), 3);
    }

    #[test]
    fn listener_may_mutate_after_batch_closes() {
        let vec = ObservableVec::new();
        let v = vec.clone();
        let _echo = vec.subscribe(move |change| {
            if change.op() == Op::Changes {
                v.push([0]);
            }
        });
        let (log, _sub) = recorder(&vec);
        vec.batch(|| vec.push([1]));
        assert_eq!(vec.to_vec(), vec![1, 0]);
        // The echo's push is delivered before the batch's entry reaches the
        // recorder, which was registered later.
        assert_eq!(log.borrow()[0].op(), Op::Push);
        assert_eq!(log.borrow()[1].op(), Op::Changes);
    }

    #[test]
    fn subscription_and_remove_listener() {
        let vec: ObservableVec<i32> = ObservableVec::new();
        let listener: ChangeListener<i32> = Rc::new(|_| {});
        let sub = vec.add_listener(&listener);
        let again = vec.add_listener(&listener);
        assert_eq!(vec.listener_count(), 1);
        drop(sub);
        assert_eq!(vec.listener_count(), 1);
        drop(again);
        assert_eq!(vec.listener_count(), 0);
        vec.add_listener(&listener).detach();
        assert!(vec.remove_listener(&listener));
        assert!(!vec.remove_listener(&listener));
    }

    #[test]
    fn panicking_comparator_leaves_sequence_intact() {
        let vec: ObservableVec<i32> = (1..=6).collect();
        let (log, _sub) = recorder(&vec);

        let result = catch_unwind(AssertUnwindSafe(|| {
            vec.sort_by(|a, b| {
                assert!(*a != 4 && *b != 4, "cannot compare 4");
                b.cmp(a)
            });
        }));

        assert!(result.is_err());
        assert_eq!(vec.to_vec(), vec![1, 2, 3, 4, 5, 6]);
        assert!(log.borrow().is_empty());
        vec.sort_by(|a, b| b.cmp(a));
        assert_eq!(vec.to_vec(), vec![6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn comparator_may_read_the_sequence() {
        let vec = ObservableVec::from_vec(vec![3, 1, 2]);
        let v = vec.clone();
        vec.sort_by(|a, b| {
            assert_eq!(v.len(), 3);
            a.cmp(b)
        });
        assert_eq!(vec.to_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn snapshot_subscriber_skips_entries_already_applied() {
        let vec = ObservableVec::from_vec(vec![1, 2]);
        let log: Rc<RefCell<Vec<Change<i32>>>> = Rc::default();
        let mut sub = None;

        vec.batch(|| {
            vec.push([3]);
            let l = Rc::clone(&log);
            sub = Some(vec.subscribe_after_snapshot(move |c| l.borrow_mut().push(c.clone())));
            vec.pop();
        });

        assert_eq!(
            *log.borrow(),
            vec![Change::Changes(vec![Change::Pop { removed: Some(3) }])]
        );

        vec.push([9]);
        assert_eq!(log.borrow().len(), 2);
        assert_eq!(log.borrow()[1].op(), Op::Push);
        drop(sub);
    }

    #[test]
    fn snapshot_subscriber_sees_nothing_for_an_already_applied_batch() {
        let vec = ObservableVec::from_vec(vec![1]);
        let log: Rc<RefCell<Vec<Change<i32>>>> = Rc::default();
        let l = Rc::clone(&log);
        let (sub, _) = vec.record_changes(|| {
            vec.push([2]);
            vec.subscribe_after_snapshot(move |c| l.borrow_mut().push(c.clone()))
        });

        assert!(log.borrow().is_empty());
        vec.reverse();
        assert_eq!(*log.borrow(), vec![Change::Reverse]);
        drop(sub);
    }

    #[test]
    fn snapshot_mark_follows_an_aborted_inner_batch() {
        let vec = ObservableVec::from_vec(vec![1]);
        let log: Rc<RefCell<Vec<Change<i32>>>> = Rc::default();
        let mut sub = None;

        vec.batch(|| {
            vec.push([2]);
            let inner: Result<()> = vec.apply_changes(|| {
                vec.push([3]);
                let l = Rc::clone(&log);
                sub = Some(vec.subscribe_after_snapshot(move |c| l.borrow_mut().push(c.clone())));
                Err::<(), BoxError>("rejected".into())
            });
            assert!(inner.is_err());
            vec.push([4]);
        });

        // The listener saw [1, 2, 3]; only the entry logged after the inner
        // batch closed reaches it.
        assert_eq!(
            *log.borrow(),
            vec![Change::Changes(vec![Change::Push { items: vec![4], len: 4 }])]
        );
        drop(sub);
    }

    #[test]
    fn weak_handle() {
        let vec = ObservableVec::from_vec(vec![1]);
        let weak = vec.downgrade();
        assert!(weak.upgrade().is_some_and(|v| v.ptr_eq(&vec)));
        drop(vec);
        assert!(weak.upgrade().is_none());
    }
}
