#![forbid(unsafe_code)]

//! SPUI public facade crate.
//!
//! Re-exports the reactive core and, with the `dom` feature (on by default),
//! the node layer. The `logging` feature adds [`logging::init`].

pub use spui_reactive as reactive;

#[cfg(feature = "dom")]
pub use spui_dom as dom;

pub mod prelude {
    pub use spui_reactive::{
        Change, Computation, Filter, FilterMode, ObservableVec, ReactiveError, ReadStream,
        Runtime, RuntimeConfig, Stream, Subscription,
    };

    #[cfg(feature = "dom")]
    pub use spui_dom::{
        AttrValue, ElementBuilder, ElementList, ListReconciler, MemoryNode, NodeHost,
        class_list, element_list, h, select, style_map,
    };
}

#[cfg(feature = "logging")]
pub mod logging {
    //! `tracing` subscriber setup for applications and tests.

    use tracing_subscriber::EnvFilter;

    /// Directive variable read first; `RUST_LOG` is the fallback.
    pub const LOG_ENV: &str = "SPUI_LOG";

    const DEFAULT_DIRECTIVE: &str = "warn";

    /// Filter from `SPUI_LOG`, then `RUST_LOG`, then `warn`.
    #[must_use]
    pub fn env_filter() -> EnvFilter {
        EnvFilter::try_from_env(LOG_ENV)
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
    }

    /// Install a global formatting subscriber. Returns `false` when one was
    /// already installed.
    pub fn init() -> bool {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_target(true)
            .try_init()
            .is_ok()
    }
}
