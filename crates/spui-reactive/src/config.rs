#![forbid(unsafe_code)]

//! Runtime configuration.
//!
//! [`RuntimeConfig`] carries the few knobs a reactive [`Runtime`] needs. It
//! follows the usual pattern: `Default` for sane values, `with_*` builders for
//! programmatic overrides, and [`RuntimeConfig::from_env`] for deployment-time
//! overrides.
//!
//! # Environment
//!
//! | variable | field | format |
//! |---|---|---|
//! | `SPUI_MAX_CYCLE_RERUNS` | [`max_cycle_reruns`](RuntimeConfig::max_cycle_reruns) | positive integer |
//! | `SPUI_RUNTIME_LABEL` | [`label`](RuntimeConfig::label) | any string |
//!
//! Unparseable values are ignored (with a `warn!`) and the default is kept.
//!
//! [`Runtime`]: crate::runtime::Runtime

use std::env;

use tracing::warn;

/// Default bound on re-runs a computation may trigger through its own output.
pub const DEFAULT_MAX_CYCLE_RERUNS: usize = 64;

/// Environment variable overriding [`RuntimeConfig::max_cycle_reruns`].
pub const ENV_MAX_CYCLE_RERUNS: &str = "SPUI_MAX_CYCLE_RERUNS";

/// Environment variable overriding [`RuntimeConfig::label`].
pub const ENV_RUNTIME_LABEL: &str = "SPUI_RUNTIME_LABEL";

/// Configuration for a reactive [`Runtime`](crate::runtime::Runtime).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// How many extra re-runs a computation may queue for itself while its
    /// output is being delivered (its result feeds back into one of its own
    /// dependencies). Past that the cycle is cut with
    /// [`ReactiveError::CycleLimitExceeded`]. Acyclic chains are never
    /// limited, however deep. Default: 64.
    ///
    /// [`ReactiveError::CycleLimitExceeded`]: crate::error::ReactiveError::CycleLimitExceeded
    pub max_cycle_reruns: usize,
    /// Optional name attached to the runtime's log events.
    pub label: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_cycle_reruns: DEFAULT_MAX_CYCLE_RERUNS,
            label: None,
        }
    }
}

impl RuntimeConfig {
    /// Configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the feedback re-run bound. Zero is bumped to one.
    #[must_use]
    pub fn with_max_cycle_reruns(mut self, reruns: usize) -> Self {
        self.max_cycle_reruns = reruns.max(1);
        self
    }

    /// Set the label attached to log events.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Defaults overridden by the `SPUI_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the `SPUI_*`
    /// keys. [`from_env`](Self::from_env) is this with `std::env::var`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = lookup(ENV_MAX_CYCLE_RERUNS) {
            match val.trim().parse::<usize>() {
                Ok(reruns) if reruns > 0 => config.max_cycle_reruns = reruns,
                _ => warn!(
                    variable = ENV_MAX_CYCLE_RERUNS,
                    value = %val,
                    "ignoring invalid cycle re-run bound"
                ),
            }
        }
        if let Some(val) = lookup(ENV_RUNTIME_LABEL)
            && !val.trim().is_empty()
        {
            config.label = Some(val.trim().to_owned());
        }

        config
    }
}
