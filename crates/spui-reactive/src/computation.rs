#![forbid(unsafe_code)]

//! Derived values with automatic dependency tracking.
//!
//! A [`Computation`] wraps a function. Every stream the function reads (with
//! [`Stream::get`] or [`Stream::with`]) becomes a dependency; a write to any
//! dependency re-runs the function synchronously and stores the result in the
//! computation's output stream. The dependency set is dynamic: it is rebuilt
//! on every run from what that run actually read.
//!
//! # Example
//!
//! ```
//! use spui_reactive::{Computation, Runtime, Stream};
//!
//! let rt = Runtime::new();
//! let a = Stream::new(&rt, 12);
//! let b = Stream::new(&rt, 99);
//! let (a2, b2) = (a.clone(), b.clone());
//! let sum = Computation::new(&rt, move || a2.get() + b2.get());
//! assert_eq!(sum.get(), 111);
//! a.set(0);
//! assert_eq!(sum.get(), 99);
//! ```
//!
//! # Failure Modes
//!
//! - A failing re-run keeps the previous output, stores the error (see
//!   [`Computation::take_error`]) and logs it; the write that triggered it
//!   carries on notifying its other listeners.
//! - A re-run requested while the same computation is evaluating (its body
//!   writes one of its own dependencies) is skipped.
//! - A re-run requested while the computation's own output is being delivered
//!   (the new value feeds back into a dependency) is queued and runs once that
//!   delivery is over. After
//!   [`RuntimeConfig::max_cycle_reruns`](crate::config::RuntimeConfig::max_cycle_reruns)
//!   such feedback runs in a row the cycle is cut with
//!   [`ReactiveError::CycleLimitExceeded`].
//! - Chains of distinct computations nest without any limit.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

use crate::error::{BoxError, ReactiveError, Result};
use crate::runtime::{DependencySlot, Runtime, SourceId, Trigger, next_computation_id};
use crate::stream::{ReadStream, Stream, WeakStream};

type Derive<T> = Box<dyn Fn() -> std::result::Result<T, BoxError>>;

struct ComputationInner<T> {
    id: u64,
    runtime: Runtime,
    func: Derive<T>,
    trigger: Trigger,
    dependencies: DependencySlot,
    output: RefCell<Option<WeakStream<T>>>,
    phase: Cell<Phase>,
    requeued: Cell<bool>,
    runs: Cell<u64>,
    last_error: RefCell<Option<ReactiveError>>,
}

impl<T: Clone + 'static> ComputationInner<T> {
    fn new(runtime: &Runtime, func: Derive<T>) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let trigger: Trigger = Rc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.rerun();
                }
            });
            Self {
                id: next_computation_id(),
                runtime: runtime.clone(),
                func,
                trigger,
                dependencies: Rc::default(),
                output: RefCell::new(None),
                phase: Cell::new(Phase::Idle),
                requeued: Cell::new(false),
                runs: Cell::new(0),
                last_error: RefCell::new(None),
            }
        })
    }

    /// Run `body` inside a tracking frame owned by this computation.
    fn tracked<R>(&self, body: impl FnOnce() -> R) -> R {
        let _phase = PhaseGuard::enter(&self.phase, Phase::Evaluating);
        let scope = self
            .runtime
            .enter(self.id, Rc::clone(&self.trigger), &self.dependencies);
        let result = body();
        scope.finish();
        self.runs.set(self.runs.get() + 1);
        self.runtime.record(|s| s.evaluations += 1);
        result
    }

    fn rerun(&self) {
        match self.phase.get() {
            Phase::Evaluating => {
                self.runtime.record(|s| s.skipped_reentrant_runs += 1);
                trace!(computation = self.id, "re-entrant re-run skipped");
                return;
            }
            Phase::Publishing => {
                trace!(computation = self.id, "re-run requested by own output, queued");
                self.requeued.set(true);
                return;
            }
            Phase::Idle => {}
        }
        let Some(output) = self.output.borrow().as_ref().and_then(WeakStream::upgrade) else {
            return;
        };

        let limit = self.runtime.config().max_cycle_reruns;
        let mut feedback_runs = 0;
        loop {
            self.requeued.set(false);
            match self.tracked(|| (self.func)()) {
                Ok(value) => {
                    let _phase = PhaseGuard::enter(&self.phase, Phase::Publishing);
                    output.set(value);
                }
                Err(source) => {
                    self.runtime.record(|s| s.derivation_failures += 1);
                    self.fail(ReactiveError::Derivation(source));
                    return;
                }
            }
            if !self.requeued.replace(false) {
                return;
            }
            if feedback_runs == limit {
                self.runtime.record(|s| s.cycle_limit_hits += 1);
                self.fail(ReactiveError::CycleLimitExceeded { limit });
                return;
            }
            feedback_runs += 1;
        }
    }

    fn fail(&self, err: ReactiveError) {
        warn!(
            computation = self.id,
            runtime = self.runtime.id(),
            label = self.runtime.config().label.as_deref(),
            error = %err,
            "computation re-run failed, keeping previous value"
        );
        *self.last_error.borrow_mut() = Some(err);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// The wrapped function is running.
    Evaluating,
    /// The new value is being written to the output stream.
    Publishing,
}

/// Sets a phase and returns to [`Phase::Idle`] on drop, unwinding included.
struct PhaseGuard<'a>(&'a Cell<Phase>);

impl<'a> PhaseGuard<'a> {
    fn enter(cell: &'a Cell<Phase>, phase: Phase) -> Self {
        cell.set(phase);
        Self(cell)
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.0.set(Phase::Idle);
    }
}

/// A derived value kept up to date with the streams its function reads.
///
/// Dropping the computation unsubscribes it from every dependency. Use
/// [`into_stream`](Self::into_stream) to keep it alive through its output
/// stream instead.
pub struct Computation<T> {
    inner: Rc<ComputationInner<T>>,
    output: Stream<T>,
}

impl<T: fmt::Debug> fmt::Debug for Computation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computation")
            .field("id", &self.inner.id)
            .field("output", &self.output)
            .field("dependencies", &self.inner.dependencies.borrow().len())
            .field("runs", &self.inner.runs.get())
            .finish()
    }
}

impl<T: Clone + 'static> Computation<T> {
    /// Run `f` once, tracking what it reads, and keep the result current.
    pub fn new(runtime: &Runtime, f: impl Fn() -> T + 'static) -> Self {
        let f = Rc::new(f);
        let first = Rc::clone(&f);
        let inner = ComputationInner::new(runtime, Box::new(move || Ok::<T, BoxError>(f())));
        let value = inner.tracked(|| first());
        Self::attach(inner, value)
    }

    /// Fallible form of [`new`](Self::new).
    ///
    /// # Errors
    ///
    /// [`ReactiveError::Derivation`] when the first run fails. Nothing stays
    /// subscribed in that case.
    pub fn try_new<E>(
        runtime: &Runtime,
        f: impl Fn() -> std::result::Result<T, E> + 'static,
    ) -> Result<Self>
    where
        E: Into<BoxError>,
    {
        let inner =
            ComputationInner::new(runtime, Box::new(move || f().map_err(Into::<BoxError>::into)));
        let first = inner.tracked(|| (inner.func)());
        match first {
            Ok(value) => Ok(Self::attach(inner, value)),
            Err(source) => {
                runtime.record(|s| s.derivation_failures += 1);
                Err(ReactiveError::Derivation(source))
            }
        }
    }

    fn attach(inner: Rc<ComputationInner<T>>, value: T) -> Self {
        let output = Stream::new(&inner.runtime, value);
        *inner.output.borrow_mut() = Some(output.downgrade());
        Self { inner, output }
    }

    /// Output value, recorded as a dependency of the evaluating computation.
    #[must_use]
    pub fn get(&self) -> T {
        self.output.get()
    }

    #[must_use]
    pub fn get_untracked(&self) -> T {
        self.output.get_untracked()
    }

    /// Read-only handle to the output stream.
    #[must_use]
    pub fn stream(&self) -> ReadStream<T> {
        self.output.read_only()
    }

    /// Sources read during the most recent run, in first-read order.
    #[must_use]
    pub fn dependencies(&self) -> Vec<SourceId> {
        self.inner
            .dependencies
            .borrow()
            .iter()
            .map(|dep| dep.source)
            .collect()
    }

    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.borrow().len()
    }

    /// Number of times the function has run, including the first run.
    #[must_use]
    pub fn runs(&self) -> u64 {
        self.inner.runs.get()
    }

    /// Error of the most recent failed re-run, if not taken yet.
    pub fn take_error(&self) -> Option<ReactiveError> {
        self.inner.last_error.borrow_mut().take()
    }

    /// Hand the computation over to its output stream. It keeps re-running
    /// for as long as the returned stream (or a clone) lives.
    #[must_use]
    pub fn into_stream(self) -> ReadStream<T> {
        let Self { inner, output } = self;
        output.retain(Box::new(inner));
        output.read_only()
    }
}
