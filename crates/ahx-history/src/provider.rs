//! The [`SourceControl`] trait: what the history core needs from a
//! version-control backend.
//!
//! The core never speaks a version-control protocol itself. A backend lists
//! an object's historical revisions and loads the content behind a revision
//! handle; everything else is derived here.

use std::fmt;

use ahx_types::{ContentHandle, ObjectPath, RevisionRecord, SharedSnapshot};
use async_trait::async_trait;

use crate::error::HistoryResult;

/// Identifies one outstanding provider operation, so it can be cancelled.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(pub u64);

impl fmt::Debug for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Version-control backend consumed by the resolver and the diff session.
///
/// Implementations are injected (never looked up globally) and must be
/// thread-safe; queries run on spawned tasks.
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Fetch the revision history of `object`, newest first.
    ///
    /// With `force_refresh == false` a provider may answer from its cache.
    async fn fetch_history(
        &self,
        operation: OperationId,
        object: &ObjectPath,
        force_refresh: bool,
    ) -> HistoryResult<Vec<RevisionRecord>>;

    /// Load the snapshot behind a revision's content handle.
    async fn load_snapshot(
        &self,
        object: &ObjectPath,
        handle: &ContentHandle,
    ) -> HistoryResult<SharedSnapshot>;

    /// Number of revisions the provider already holds for `object` without
    /// querying the backend.
    fn cached_history_len(&self, object: &ObjectPath) -> usize;

    /// Returns `true` if `object` has uncommitted local modifications.
    fn is_locally_modified(&self, object: &ObjectPath) -> bool;

    /// Whether the in-flight `operation` can be cancelled.
    fn can_cancel(&self, _operation: OperationId) -> bool {
        false
    }

    /// Request cancellation of `operation`. Returns `true` if the request was
    /// accepted.
    fn cancel(&self, _operation: OperationId) -> bool {
        false
    }

    /// Whether revisions carry changelist numbers worth showing.
    fn uses_changelists(&self) -> bool {
        false
    }
}
