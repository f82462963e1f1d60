//! Error types for diff sessions.

use ahx_history::HistoryError;
use thiserror::Error;

/// Errors returned by [`DiffSessionController`](crate::DiffSessionController).
#[derive(Debug, Error)]
pub enum SessionError {
    /// The pair was rejected before anything was loaded. The session is
    /// unchanged.
    #[error("invalid revision pair {pair}: {reason}")]
    InvalidRevisionPair { pair: String, reason: String },

    /// One side of the pair could not be loaded.
    #[error("unable to load {revision}: {source}")]
    SnapshotLoadFailed {
        revision: String,
        #[source]
        source: HistoryError,
    },

    /// History query error.
    #[error(transparent)]
    History(#[from] HistoryError),

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for session results.
pub type SessionResult<T> = Result<T, SessionError>;
