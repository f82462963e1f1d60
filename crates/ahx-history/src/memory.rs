//! In-memory source control for tests and demos.
//!
//! [`InMemorySourceControl`] serves histories and snapshots registered up
//! front and records every call it receives. Fetches can be held open,
//! failed, or made cancellable to exercise the resolver's state machine.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use ahx_types::{ContentHandle, ObjectPath, RevisionRecord, SharedSnapshot};
use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::{HistoryError, HistoryResult};
use crate::provider::{OperationId, SourceControl};

/// One recorded `fetch_history` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchCall {
    pub operation: OperationId,
    pub object: ObjectPath,
    pub force_refresh: bool,
}

/// A [`SourceControl`] backed by `HashMap`s behind locks.
#[derive(Debug)]
pub struct InMemorySourceControl {
    histories: RwLock<HashMap<ObjectPath, Vec<RevisionRecord>>>,
    cached: RwLock<HashMap<ObjectPath, usize>>,
    snapshots: RwLock<HashMap<ContentHandle, SharedSnapshot>>,
    modified: RwLock<HashSet<ObjectPath>>,
    fetch_failure: RwLock<Option<String>>,
    failing_loads: RwLock<HashSet<ContentHandle>>,
    cancellable: AtomicBool,
    changelists: AtomicBool,
    /// `true` while fetches and loads are held open.
    gate: watch::Sender<bool>,
    fetches: Mutex<Vec<FetchCall>>,
    loads: Mutex<Vec<ContentHandle>>,
    cancelled: Mutex<Vec<OperationId>>,
}

impl InMemorySourceControl {
    pub fn new() -> Self {
        Self {
            histories: RwLock::new(HashMap::new()),
            cached: RwLock::new(HashMap::new()),
            snapshots: RwLock::new(HashMap::new()),
            modified: RwLock::new(HashSet::new()),
            fetch_failure: RwLock::new(None),
            failing_loads: RwLock::new(HashSet::new()),
            cancellable: AtomicBool::new(false),
            changelists: AtomicBool::new(false),
            gate: watch::Sender::new(false),
            fetches: Mutex::new(Vec::new()),
            loads: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        }
    }

    /// Register the history of `object`, newest first.
    pub fn set_history(&self, object: ObjectPath, revisions: Vec<RevisionRecord>) {
        write(&self.histories).insert(object, revisions);
    }

    /// Pretend the provider already holds `len` revisions of `object`.
    pub fn set_cached_len(&self, object: ObjectPath, len: usize) {
        write(&self.cached).insert(object, len);
    }

    pub fn insert_snapshot(&self, handle: ContentHandle, snapshot: SharedSnapshot) {
        write(&self.snapshots).insert(handle, snapshot);
    }

    pub fn set_locally_modified(&self, object: ObjectPath, modified: bool) {
        let mut set = write(&self.modified);
        if modified {
            set.insert(object);
        } else {
            set.remove(&object);
        }
    }

    /// Make every following fetch fail with `reason`.
    pub fn fail_fetches(&self, reason: impl Into<String>) {
        *write(&self.fetch_failure) = Some(reason.into());
    }

    pub fn fail_load(&self, handle: ContentHandle) {
        write(&self.failing_loads).insert(handle);
    }

    pub fn set_cancellable(&self, cancellable: bool) {
        self.cancellable.store(cancellable, Ordering::SeqCst);
    }

    pub fn set_uses_changelists(&self, changelists: bool) {
        self.changelists.store(changelists, Ordering::SeqCst);
    }

    /// Hold fetches and loads open until [`release_fetches`](Self::release_fetches).
    pub fn hold_fetches(&self) {
        self.gate.send_replace(true);
    }

    pub fn release_fetches(&self) {
        self.gate.send_replace(false);
    }

    pub fn fetch_calls(&self) -> Vec<FetchCall> {
        lock(&self.fetches).clone()
    }

    pub fn load_calls(&self) -> Vec<ContentHandle> {
        lock(&self.loads).clone()
    }

    pub fn cancelled(&self) -> Vec<OperationId> {
        lock(&self.cancelled).clone()
    }

    async fn pass_gate(&self) {
        let mut held = self.gate.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = held.wait_for(|held| !*held).await;
    }
}

impl Default for InMemorySourceControl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceControl for InMemorySourceControl {
    async fn fetch_history(
        &self,
        operation: OperationId,
        object: &ObjectPath,
        force_refresh: bool,
    ) -> HistoryResult<Vec<RevisionRecord>> {
        lock(&self.fetches).push(FetchCall {
            operation,
            object: object.clone(),
            force_refresh,
        });
        self.pass_gate().await;

        let failure = read(&self.fetch_failure).clone();
        if let Some(reason) = failure {
            return Err(HistoryError::FetchFailed {
                object: object.clone(),
                reason,
            });
        }
        let revisions = read(&self.histories)
            .get(object)
            .cloned()
            .unwrap_or_default();
        write(&self.cached).insert(object.clone(), revisions.len());
        Ok(revisions)
    }

    async fn load_snapshot(
        &self,
        _object: &ObjectPath,
        handle: &ContentHandle,
    ) -> HistoryResult<SharedSnapshot> {
        lock(&self.loads).push(handle.clone());
        self.pass_gate().await;

        if read(&self.failing_loads).contains(handle) {
            return Err(HistoryError::SnapshotLoadFailed {
                handle: handle.clone(),
                reason: "content unavailable".into(),
            });
        }
        read(&self.snapshots)
            .get(handle)
            .cloned()
            .ok_or_else(|| HistoryError::SnapshotLoadFailed {
                handle: handle.clone(),
                reason: "no such revision content".into(),
            })
    }

    fn cached_history_len(&self, object: &ObjectPath) -> usize {
        read(&self.cached).get(object).copied().unwrap_or(0)
    }

    fn is_locally_modified(&self, object: &ObjectPath) -> bool {
        read(&self.modified).contains(object)
    }

    fn can_cancel(&self, _operation: OperationId) -> bool {
        self.cancellable.load(Ordering::SeqCst)
    }

    fn cancel(&self, operation: OperationId) -> bool {
        if !self.cancellable.load(Ordering::SeqCst) {
            return false;
        }
        lock(&self.cancelled).push(operation);
        true
    }

    fn uses_changelists(&self) -> bool {
        self.changelists.load(Ordering::SeqCst)
    }
}

// Poisoning only follows a panic elsewhere; the data is still usable.
fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahx_types::JsonSnapshot;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn serves_registered_snapshots() {
        let provider = InMemorySourceControl::new();
        let object = ObjectPath::new("/Game/Hero");
        let handle = ContentHandle::new("r1");
        let snapshot = JsonSnapshot::new("Hero", json!({"hp": 10})).unwrap().into_shared();
        provider.insert_snapshot(handle.clone(), snapshot);

        let loaded = provider.load_snapshot(&object, &handle).await.unwrap();
        assert_eq!(loaded.object_name(), "Hero");
        assert_eq!(provider.load_calls(), vec![handle]);
    }

    #[tokio::test]
    async fn unknown_or_failing_content_errors() {
        let provider = InMemorySourceControl::new();
        let object = ObjectPath::new("/Game/Hero");
        let missing = provider
            .load_snapshot(&object, &ContentHandle::new("nope"))
            .await;
        assert!(matches!(missing, Err(HistoryError::SnapshotLoadFailed { .. })));

        let handle = ContentHandle::new("r1");
        provider.insert_snapshot(
            handle.clone(),
            JsonSnapshot::new("Hero", json!({})).unwrap().into_shared(),
        );
        provider.fail_load(handle.clone());
        assert!(provider.load_snapshot(&object, &handle).await.is_err());
    }

    #[tokio::test]
    async fn fetch_fills_cache() {
        let provider = InMemorySourceControl::new();
        let object = ObjectPath::new("/Game/Hero");
        provider.set_history(object.clone(), Vec::new());
        assert_eq!(provider.cached_history_len(&object), 0);

        provider.fetch_history(OperationId(1), &object, true).await.unwrap();
        assert_eq!(provider.fetch_calls().len(), 1);
    }

    #[tokio::test]
    async fn held_fetch_waits_for_release() {
        let provider = Arc::new(InMemorySourceControl::new());
        let object = ObjectPath::new("/Game/Hero");
        provider.hold_fetches();

        let task = {
            let provider = Arc::clone(&provider);
            let object = object.clone();
            tokio::spawn(async move { provider.fetch_history(OperationId(7), &object, false).await })
        };
        tokio::task::yield_now().await;
        assert!(!task.is_finished());

        provider.release_fetches();
        assert!(task.await.unwrap().unwrap().is_empty());
    }

    #[test]
    fn cancel_only_when_cancellable() {
        let provider = InMemorySourceControl::new();
        assert!(!provider.cancel(OperationId(1)));
        provider.set_cancellable(true);
        assert!(provider.can_cancel(OperationId(2)));
        assert!(provider.cancel(OperationId(2)));
        assert_eq!(provider.cancelled(), vec![OperationId(2)]);
    }
}
