//! Foundation types for asset history comparison.
//!
//! Every other `ahx` crate depends on `ahx-types`.
//!
//! # Key Types
//!
//! - [`PropertyPath`] -- Structural identifier of one (possibly nested) property
//! - [`PropertySource`] -- Capability to enumerate and resolve properties of a snapshot
//! - [`JsonSnapshot`] -- `PropertySource` over a JSON object tree
//! - [`RevisionRecord`] / [`RevisionRef`] / [`RevisionPair`] -- Revision history model
//! - [`ObjectPath`] / [`ContentHandle`] -- Persisted identity and opaque content handle

pub mod error;
pub mod path;
pub mod revision;
pub mod snapshot;

pub use error::TypeError;
pub use path::{PathSegment, PropertyPath};
pub use revision::{
    ContentHandle, ObjectPath, RevisionPair, RevisionRecord, RevisionRef, LOCAL_REVISION_LABEL,
};
pub use snapshot::{
    EnumerationOptions, JsonSnapshot, PropertySource, PropertyValue, Resolution, SharedSnapshot,
};
