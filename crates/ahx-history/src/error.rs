//! Error types for history and snapshot retrieval.

use ahx_types::{ContentHandle, ObjectPath, TypeError};
use thiserror::Error;

use crate::resolver::QueryState;

/// Errors that can occur while querying revision history or loading
/// historical snapshots.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The provider could not produce a revision history.
    #[error("history fetch failed for {object}: {reason}")]
    FetchFailed { object: ObjectPath, reason: String },

    /// A historical snapshot could not be loaded.
    #[error("failed to load snapshot {handle:?}: {reason}")]
    SnapshotLoadFailed {
        handle: ContentHandle,
        reason: String,
    },

    /// The operation was cancelled before it completed. Not a failure.
    #[error("operation cancelled")]
    Cancelled,

    /// The resolver was asked to do something its current state forbids.
    #[error("cannot {operation} while {state:?}")]
    InvalidTransition {
        state: QueryState,
        operation: &'static str,
    },

    /// No Tokio runtime is available to run the query on.
    #[error("no async runtime available: {0}")]
    NoRuntime(String),

    /// Snapshot content did not form a valid property set.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(#[from] TypeError),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error in a file-backed provider.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for history results.
pub type HistoryResult<T> = Result<T, HistoryError>;
