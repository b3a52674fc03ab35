#![forbid(unsafe_code)]

//! Incrementally maintained filtered views.
//!
//! A [`Filter`] subscribes to a source [`ObservableVec`] and keeps a derived
//! sequence equal to `source.filter(predicate)`, translating each source
//! [`Change`] into the minimal matching edit on the derived sequence instead
//! of recomputing it.
//!
//! The filter keeps a membership mask parallel to the source: bit `i` records
//! whether the predicate accepted source element `i` when the filter last saw
//! it. Translations work on the mask alone, so they never compare elements and
//! stay exact while a batch of entries is replayed against a source that has
//! already moved on.
//!
//! # Invariants
//!
//! 1. After every processed entry, `mask.len()` equals the source length at
//!    that point of the log, and `derived` holds exactly the source elements
//!    whose bit is set, in source order.
//! 2. The derived start of a translated splice is the number of set bits
//!    before the resolved source start.
//! 3. The derived sequence is only edited when its contents change, except
//!    for a non-empty derived sequence on source `reverse`/`sort`.
//!
//! # Failure Modes
//!
//! - Mutating the derived sequence directly desynchronises the view.
//! - A refilter requested while the source is inside a batch is deferred
//!   until the batch has been delivered (logged at `warn`). If that batch
//!   aborts, it waits for the next source entry instead.

use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

use tracing::{debug, trace, warn};

use crate::sequence::{Change, ObservableVec};
use crate::splice::{SpliceRange, raw_start};
use crate::subscription::Subscription;

/// Membership test of a [`Filter`].
pub type Predicate<T> = Rc<dyn Fn(&T) -> bool>;

/// How [`Filter::apply_filter`] updates the derived sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    /// One splice per position whose membership changed.
    #[default]
    Incremental,
    /// Clear the derived sequence, then push every member.
    Reset,
}

struct FilterState<T> {
    predicate: Predicate<T>,
    matches: Vec<bool>,
    deferred: Option<FilterMode>,
}

struct FilterInner<T> {
    this: Weak<FilterInner<T>>,
    source: ObservableVec<T>,
    derived: ObservableVec<T>,
    state: RefCell<FilterState<T>>,
    _subscription: Subscription,
}

/// Filtered view of an [`ObservableVec`]. Cloning shares the view.
pub struct Filter<T> {
    inner: Rc<FilterInner<T>>,
}

impl<T> Clone for Filter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("source", &self.inner.source)
            .field("derived", &self.inner.derived)
            .finish_non_exhaustive()
    }
}

impl<T: Clone + 'static> Filter<T> {
    /// Filter the current contents of `source` and follow its changes.
    pub fn new(source: &ObservableVec<T>, predicate: impl Fn(&T) -> bool + 'static) -> Self {
        Self::with_predicate(source, Rc::new(predicate))
    }

    pub fn with_predicate(source: &ObservableVec<T>, predicate: Predicate<T>) -> Self {
        let (matches, members) = source.with(|items| evaluate(&predicate, items));
        let inner = Rc::new_cyclic(|weak: &Weak<FilterInner<T>>| {
            let this = weak.clone();
            let weak = weak.clone();
            let subscription = source.subscribe_after_snapshot(move |change| {
                if let Some(inner) = weak.upgrade() {
                    inner.source_changed(change);
                }
            });
            FilterInner {
                this,
                source: source.clone(),
                derived: ObservableVec::from_vec(members),
                state: RefCell::new(FilterState {
                    predicate,
                    matches,
                    deferred: None,
                }),
                _subscription: subscription,
            }
        });
        Self { inner }
    }

    #[must_use]
    pub fn source(&self) -> &ObservableVec<T> {
        &self.inner.source
    }

    /// The filtered sequence. Subscribe to it; do not mutate it.
    #[must_use]
    pub fn derived(&self) -> &ObservableVec<T> {
        &self.inner.derived
    }

    #[must_use]
    pub fn predicate(&self) -> Predicate<T> {
        Rc::clone(&self.inner.state.borrow().predicate)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.derived.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.derived.is_empty()
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.inner.derived.to_vec()
    }

    /// Re-filter the source, optionally with a new predicate, and return the
    /// entries logged on the derived sequence (one batch).
    ///
    /// [`FilterMode::Incremental`] logs one splice per position whose
    /// membership changed; [`FilterMode::Reset`] logs a full clear followed by
    /// a push of every member.
    pub fn apply_filter(&self, predicate: Option<Predicate<T>>, mode: FilterMode) -> Vec<Change<T>> {
        self.inner.apply_filter(predicate, mode)
    }

    /// Switch to `predicate`, updating the view incrementally.
    pub fn set_predicate(&self, predicate: impl Fn(&T) -> bool + 'static) -> Vec<Change<T>> {
        self.apply_filter(Some(Rc::new(predicate)), FilterMode::Incremental)
    }

    /// Re-evaluate the current predicate, for predicates that read external
    /// state.
    pub fn refresh(&self) -> Vec<Change<T>> {
        self.apply_filter(None, FilterMode::Incremental)
    }
}

impl<T: Clone + 'static> FilterInner<T> {
    fn predicate(&self) -> Predicate<T> {
        Rc::clone(&self.state.borrow().predicate)
    }

    fn source_changed(&self, change: &Change<T>) {
        self.translate(change);
        self.flush_deferred();
    }

    fn flush_deferred(&self) {
        let deferred = self.state.borrow_mut().deferred.take();
        if let Some(mode) = deferred {
            self.apply_filter(None, mode);
        }
    }

    fn translate(&self, change: &Change<T>) {
        trace!(op = %change.op(), "filter translating source change");
        let derived = &self.derived;
        match change {
            Change::Push { items, .. } => {
                let (flags, members) = evaluate(&self.predicate(), items);
                self.state.borrow_mut().matches.extend(flags);
                if !members.is_empty() {
                    derived.push(members);
                }
            }
            Change::Unshift { items, .. } => {
                let (flags, members) = evaluate(&self.predicate(), items);
                self.state.borrow_mut().matches.splice(0..0, flags);
                if !members.is_empty() {
                    derived.unshift(members);
                }
            }
            Change::Pop { removed } => {
                if removed.is_some() && self.state.borrow_mut().matches.pop() == Some(true) {
                    derived.pop();
                }
            }
            Change::Shift { removed } => {
                let was_member = removed.is_some() && {
                    let mut state = self.state.borrow_mut();
                    !state.matches.is_empty() && state.matches.remove(0)
                };
                if was_member {
                    derived.shift();
                }
            }
            Change::Reverse => {
                self.state.borrow_mut().matches.reverse();
                if !derived.is_empty() {
                    derived.reverse();
                }
            }
            Change::Sort { order } => {
                let derived_order = self.permute_mask(order);
                if !derived.is_empty() && derived.permute(derived_order).is_err() {
                    warn!(
                        derived_len = derived.len(),
                        "filtered view out of step with its source"
                    );
                }
            }
            Change::Splice {
                start,
                delete_count,
                items,
                ..
            } => {
                let (flags, members) = evaluate(&self.predicate(), items);
                let (derived_start, derived_deletes) = {
                    let mut state = self.state.borrow_mut();
                    let range = SpliceRange::resolve(state.matches.len(), *start, *delete_count);
                    let before = count_set(&state.matches[..range.start]);
                    let deleted = count_set(&state.matches[range.as_range()]);
                    state.matches.splice(range.as_range(), flags);
                    (before, deleted)
                };
                if derived_deletes > 0 || !members.is_empty() {
                    derived.splice(raw_start(derived_start), Some(derived_deletes), members);
                }
            }
            Change::Changes(changes) => {
                for change in changes {
                    self.translate(change);
                }
            }
        }
    }

    /// Reorder the mask by `order` and return the matching permutation of
    /// the derived sequence.
    fn permute_mask(&self, order: &[usize]) -> Vec<usize> {
        let mut state = self.state.borrow_mut();
        let old = mem::take(&mut state.matches);
        let mut rank = Vec::with_capacity(old.len());
        let mut members = 0;
        for &member in &old {
            rank.push(member.then_some(members));
            members += usize::from(member);
        }
        state.matches = order
            .iter()
            .map(|&i| old.get(i).copied().unwrap_or(false))
            .collect();
        order
            .iter()
            .filter_map(|&i| rank.get(i).copied().flatten())
            .collect()
    }

    fn apply_filter(&self, predicate: Option<Predicate<T>>, mode: FilterMode) -> Vec<Change<T>> {
        if let Some(predicate) = predicate {
            self.state.borrow_mut().predicate = predicate;
        }
        if self.source.is_batching() {
            warn!(
                ?mode,
                "source is inside a batch, deferring refilter until it is delivered"
            );
            self.state.borrow_mut().deferred = Some(mode);
            let this = self.this.clone();
            self.source.after_batch(move || {
                if let Some(inner) = this.upgrade() {
                    inner.flush_deferred();
                }
            });
            return Vec::new();
        }

        let items = self.source.to_vec();
        let (flags, members) = evaluate(&self.predicate(), &items);
        let old = mem::replace(&mut self.state.borrow_mut().matches, flags.clone());
        let derived = &self.derived;

        let ((), changes) = derived.record_changes(|| match mode {
            FilterMode::Reset => {
                derived.clear();
                if !members.is_empty() {
                    derived.push(members);
                }
            }
            FilterMode::Incremental => {
                let mut at = 0;
                for (i, item) in items.iter().enumerate() {
                    let was = old.get(i).copied().unwrap_or(false);
                    match (was, flags[i]) {
                        (true, true) => at += 1,
                        (true, false) => {
                            derived.splice(raw_start(at), Some(1), []);
                        }
                        (false, true) => {
                            derived.splice(raw_start(at), Some(0), [item.clone()]);
                            at += 1;
                        }
                        (false, false) => {}
                    }
                }
            }
        });
        debug!(?mode, changes = changes.len(), members = derived.len(), "refiltered");
        changes
    }
}

/// Membership flags for `items` and the accepted elements, in order.
fn evaluate<T: Clone>(predicate: &Predicate<T>, items: &[T]) -> (Vec<bool>, Vec<T>) {
    let flags: Vec<bool> = items.iter().map(|item| predicate(item)).collect();
    let members = items
        .iter()
        .zip(&flags)
        .filter(|(_, keep)| **keep)
        .map(|(item, _)| item.clone())
        .collect();
    (flags, members)
}

fn count_set(mask: &[bool]) -> usize {
    mask.iter().filter(|bit| **bit).count()
}
