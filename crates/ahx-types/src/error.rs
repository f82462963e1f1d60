use thiserror::Error;

use crate::path::PropertyPath;

/// Errors produced by type operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid property path {input:?}: {reason}")]
    InvalidPath { input: String, reason: String },

    /// A property path could not be walked against a snapshot because the
    /// snapshot's shape diverges from the path (e.g. a field lookup on an
    /// array). Recoverable: callers skip the property.
    #[error("property {path} is unresolvable: {reason}")]
    PropertyUnresolvable { path: PropertyPath, reason: String },

    #[error("snapshot root must be an object, got {0}")]
    NotAnObject(String),

    #[error("invalid snapshot JSON: {0}")]
    InvalidJson(String),
}
