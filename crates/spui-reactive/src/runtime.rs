#![forbid(unsafe_code)]

//! Reactive runtime: the explicit dependency-tracking context.
//!
//! A [`Runtime`] owns the stack of *tracking frames*, one per computation
//! currently evaluating. A [`Stream`](crate::stream::Stream) read consults the
//! stack of the runtime it was created against: if a frame is active, the read
//! is recorded as a dependency of that frame's computation.
//!
//! There is no process-wide state. Two runtimes never see each other's frames,
//! so independent reactive graphs can live side by side on one thread.
//!
//! # Invariants
//!
//! 1. Frames are pushed and popped only through [`TrackingScope`], which pops
//!    on every exit path, including unwinding out of a panicking derivation.
//! 2. Within one frame a source is recorded at most once.
//! 3. A source read again in a re-run keeps its existing subscription (and so
//!    its position in the source's listener order); a source not read again is
//!    unsubscribed when the frame closes.
//! 4. Evaluations may nest without limit; only a computation feeding back
//!    into itself is bounded, by
//!    [`RuntimeConfig::max_cycle_reruns`](crate::config::RuntimeConfig::max_cycle_reruns).

use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::RuntimeConfig;
use crate::subscription::Subscription;

static NEXT_RUNTIME_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_COMPUTATION_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identity of a trackable source (a stream).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

pub(crate) fn next_computation_id() -> u64 {
    NEXT_COMPUTATION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Counters for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Completed or failed evaluations of computation bodies.
    pub evaluations: u64,
    /// Evaluations whose body returned an error.
    pub derivation_failures: u64,
    /// Re-runs skipped because the computation was already evaluating.
    pub skipped_reentrant_runs: u64,
    /// Feedback cycles cut by the cycle bound.
    pub cycle_limit_hits: u64,
}

/// Re-run callback a frame subscribes to the sources it reads.
pub(crate) type Trigger = Rc<dyn Fn()>;

/// A subscription of a computation's trigger to one source.
pub(crate) struct Dependency {
    pub(crate) source: SourceId,
    _subscription: Subscription,
}

/// Dependency list shared between a computation and its active frame.
pub(crate) type DependencySlot = Rc<RefCell<Vec<Dependency>>>;

struct Frame {
    owner: u64,
    trigger: Trigger,
    previous: Vec<Dependency>,
    current: Vec<Dependency>,
}

struct RuntimeInner {
    id: u64,
    config: RuntimeConfig,
    frames: RefCell<Vec<Frame>>,
    stats: Cell<RuntimeStats>,
}

/// Handle to a reactive runtime. Cloning shares the same runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("id", &self.inner.id)
            .field("label", &self.inner.config.label)
            .field("depth", &self.depth())
            .finish()
    }
}

impl Runtime {
    /// Runtime with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    #[must_use]
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                id: NEXT_RUNTIME_ID.fetch_add(1, Ordering::Relaxed),
                config,
                frames: RefCell::new(Vec::new()),
                stats: Cell::new(RuntimeStats::default()),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Whether a computation is evaluating right now.
    #[must_use]
    pub fn is_tracking(&self) -> bool {
        !self.inner.frames.borrow().is_empty()
    }

    /// Number of tracking frames currently on the stack.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.inner.frames.borrow().len()
    }

    #[must_use]
    pub fn stats(&self) -> RuntimeStats {
        self.inner.stats.get()
    }

    /// Whether both handles point at the same runtime.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn record(&self, update: impl FnOnce(&mut RuntimeStats)) {
        let mut stats = self.inner.stats.get();
        update(&mut stats);
        self.inner.stats.set(stats);
    }

    /// Push a tracking frame for `owner`, moving the dependencies of its
    /// previous run out of `slot`.
    pub(crate) fn enter(&self, owner: u64, trigger: Trigger, slot: &DependencySlot) -> TrackingScope {
        let previous = mem::take(&mut *slot.borrow_mut());
        self.inner.frames.borrow_mut().push(Frame {
            owner,
            trigger,
            previous,
            current: Vec::new(),
        });
        TrackingScope {
            runtime: self.clone(),
            owner,
            slot: Rc::clone(slot),
            finished: false,
        }
    }

    /// Record a read of `source` in the innermost frame, if any.
    ///
    /// `subscribe` is only called when the frame has no subscription to the
    /// source yet; it must register the given trigger as a listener.
    pub(crate) fn track(&self, source: SourceId, subscribe: impl FnOnce(Trigger) -> Subscription) {
        let trigger = {
            let mut frames = self.inner.frames.borrow_mut();
            let Some(frame) = frames.last_mut() else {
                return;
            };
            if frame.current.iter().any(|dep| dep.source == source) {
                return;
            }
            if let Some(pos) = frame.previous.iter().position(|dep| dep.source == source) {
                let dep = frame.previous.remove(pos);
                frame.current.push(dep);
                return;
            }
            Rc::clone(&frame.trigger)
        };

        let subscription = subscribe(trigger);
        if let Some(frame) = self.inner.frames.borrow_mut().last_mut() {
            frame.current.push(Dependency {
                source,
                _subscription: subscription,
            });
        }
    }

    fn pop(&self, owner: u64) -> Option<Frame> {
        let frame = self.inner.frames.borrow_mut().pop();
        debug_assert!(
            frame.as_ref().is_none_or(|f| f.owner == owner),
            "tracking frames popped out of order"
        );
        frame
    }
}

/// Scoped guard for one tracking frame.
///
/// [`finish`](Self::finish) closes the frame normally: dependencies read during
/// the run go back into the computation's slot, stale ones are unsubscribed.
/// Dropping the guard without finishing (a panic unwinding through the
/// derivation) still pops the frame and keeps every dependency, old and new,
/// so the computation can recover on the next write.
pub(crate) struct TrackingScope {
    runtime: Runtime,
    owner: u64,
    slot: DependencySlot,
    finished: bool,
}

impl TrackingScope {
    pub(crate) fn finish(mut self) {
        self.finished = true;
        if let Some(frame) = self.runtime.pop(self.owner) {
            *self.slot.borrow_mut() = frame.current;
            // Stale subscriptions are released here, outside every borrow.
            drop(frame.previous);
        }
    }
}

impl Drop for TrackingScope {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Some(mut frame) = self.runtime.pop(self.owner) {
            frame.current.append(&mut frame.previous);
            *self.slot.borrow_mut() = frame.current;
        }
    }
}
