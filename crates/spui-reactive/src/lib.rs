#![forbid(unsafe_code)]

//! Headless reactive core for SPUI.
//!
//! - [`Stream`]: a value cell with listeners and an optional write transform.
//! - [`Computation`]: a derived value that tracks the streams its function
//!   reads and re-runs when any of them is written.
//! - [`ObservableVec`]: a sequence that logs every structural operation as a
//!   [`Change`], with batching.
//! - [`Filter`]: a filtered view of an `ObservableVec` maintained from its
//!   change log.
//!
//! # Architecture
//!
//! Everything is single-threaded and synchronous: handles are `Rc`-based and
//! a write completes, including every write it triggers, before returning.
//! Dependency tracking goes through an explicit [`Runtime`] instead of global
//! state; streams and computations created against different runtimes never
//! observe each other.

pub mod computation;
pub mod config;
pub mod error;
pub mod filter;
pub mod runtime;
pub mod sequence;
pub mod splice;
pub mod stream;
pub mod subscription;

pub use computation::Computation;
pub use config::RuntimeConfig;
pub use error::{BoxError, ReactiveError, Result};
pub use filter::{Filter, FilterMode, Predicate};
pub use runtime::{Runtime, RuntimeStats, SourceId};
pub use sequence::{Change, ChangeListener, ObservableVec, Op, WeakObservableVec};
pub use splice::SpliceRange;
pub use stream::{Listener, ReadStream, Stream, Transform, WeakStream};
pub use subscription::{ListenerId, Subscription};
