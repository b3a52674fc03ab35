use thiserror::Error;

/// Boxed error produced by user code (derivation bodies, batch bodies).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, ReactiveError>;

#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A computation's wrapped function failed. The output stream keeps its
    /// previous value.
    #[error("derivation failed: {0}")]
    Derivation(#[source] BoxError),

    /// An `apply_changes` body failed. No event was emitted, but the
    /// `applied` mutations made before the failure stay in the sequence.
    #[error("batch aborted after {applied} unnotified change(s): {source}")]
    BatchAborted {
        applied: usize,
        #[source]
        source: BoxError,
    },

    #[error("index {index} out of range for sequence of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("order is not a permutation of 0..{len}")]
    InvalidPermutation { len: usize },

    /// A computation kept re-triggering itself through its own output.
    #[error("dependency cycle cut after {limit} feedback re-run(s)")]
    CycleLimitExceeded { limit: usize },
}

impl ReactiveError {
    #[must_use]
    pub fn derivation(err: impl Into<BoxError>) -> Self {
        Self::Derivation(err.into())
    }

    /// Whether this error came from user code rather than from the runtime.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::Derivation(_) | Self::BatchAborted { .. })
    }
}
