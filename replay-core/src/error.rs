//! Errors in the library.
use thiserror::Error;

/// Errors raised by the replay buffer and its proxy.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReplayBufferError {
    /// A dimension or the capacity given at construction is zero.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A vector passed to the buffer does not match the configured width.
    #[error("Dimension mismatch in {field}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Name of the offending field.
        field: &'static str,

        /// Configured width.
        expected: usize,

        /// Width of the given vector.
        actual: usize,
    },

    /// Sampling was requested before any transition was stored.
    #[error("Cannot sample from an empty replay buffer")]
    EmptyBuffer,

    /// The receiving end of the proxy channel has been dropped.
    #[error("Failed to send pushed items to the replay buffer thread")]
    SendMsgForPush,

    /// The mutex guarding a shared replay buffer was poisoned.
    #[error("Replay buffer lock is poisoned")]
    LockPoisoned,
}
