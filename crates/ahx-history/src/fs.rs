//! Directory-backed source control.
//!
//! Layout under the root, one directory per object:
//!
//! ```text
//! <root>/<object>/history.json   revision records, newest first
//! <root>/<object>/<handle>       snapshot content named by each record
//! <root>/<object>/working.json   the live working copy
//! ```
//!
//! The working copy counts as locally modified when its content digest
//! differs from the newest revision's. That check runs with every history
//! fetch and its answer is cached alongside the records.

use std::collections::HashMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use ahx_types::{
    ContentHandle, EnumerationOptions, JsonSnapshot, ObjectPath, RevisionRecord, SharedSnapshot,
};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{HistoryError, HistoryResult};
use crate::provider::{OperationId, SourceControl};

pub const HISTORY_FILE: &str = "history.json";
pub const WORKING_FILE: &str = "working.json";

const DIGEST_DOMAIN: &[u8] = b"ahx:snapshot";

/// BLAKE3 digest of a snapshot's canonical JSON.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    /// Digest of `value` with object keys sorted, so key order in the file
    /// does not matter.
    pub fn of(value: &Value) -> HistoryResult<Self> {
        let canonical = serde_json::to_vec(&canonicalize(value))
            .map_err(|e| HistoryError::Serialization(e.to_string()))?;
        let mut hasher = blake3::Hasher::new();
        hasher.update(DIGEST_DOMAIN);
        hasher.update(b":");
        hasher.update(&canonical);
        Ok(Self(*hasher.finalize().as_bytes()))
    }

    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.short())
    }
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            Value::Object(
                keys.into_iter()
                    .map(|k| (k.clone(), canonicalize(&map[k])))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// A [`SourceControl`] reading histories and snapshots from a directory tree.
pub struct DirectorySourceControl {
    root: PathBuf,
    options: EnumerationOptions,
    uses_changelists: bool,
    cache: RwLock<HashMap<ObjectPath, CachedHistory>>,
}

/// What the last fetch learned about one object.
#[derive(Clone, Debug)]
struct CachedHistory {
    records: Vec<RevisionRecord>,
    locally_modified: bool,
}

impl DirectorySourceControl {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            options: EnumerationOptions::default(),
            uses_changelists: true,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Enumeration options applied to every snapshot this provider loads.
    pub fn with_enumeration(mut self, options: EnumerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_changelists(mut self, uses_changelists: bool) -> Self {
        self.uses_changelists = uses_changelists;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding `object`'s files. Object paths with `..` or other
    /// non-plain components are rejected.
    pub fn object_dir(&self, object: &ObjectPath) -> HistoryResult<PathBuf> {
        let relative = contained(object.as_str().trim_start_matches('/')).ok_or_else(|| {
            HistoryError::FetchFailed {
                object: object.clone(),
                reason: "object path leaves the repository root".into(),
            }
        })?;
        Ok(self.root.join(relative))
    }

    /// File holding the snapshot named by `handle`. The handle must stay
    /// inside the object's directory.
    fn snapshot_path(&self, object: &ObjectPath, handle: &ContentHandle) -> HistoryResult<PathBuf> {
        let relative =
            contained(handle.as_str()).ok_or_else(|| HistoryError::SnapshotLoadFailed {
                handle: handle.clone(),
                reason: "handle leaves the object directory".into(),
            })?;
        Ok(self.object_dir(object)?.join(relative))
    }

    /// Load the live working copy of `object`.
    pub async fn load_working(&self, object: &ObjectPath) -> HistoryResult<SharedSnapshot> {
        let path = self.object_dir(object)?.join(WORKING_FILE);
        let text = tokio::fs::read_to_string(&path).await?;
        let snapshot = JsonSnapshot::from_json_str(object.base_name(), &text)?;
        Ok(snapshot.with_options(self.options).into_shared())
    }

    /// Digest of the working copy, if there is one.
    pub async fn working_digest(&self, object: &ObjectPath) -> HistoryResult<Option<ContentDigest>> {
        let path = self.object_dir(object)?.join(WORKING_FILE);
        match digest_file(&path).await {
            Ok(digest) => Ok(Some(digest)),
            Err(HistoryError::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Compare the working copy against `newest`. With no working copy there
    /// is nothing to modify; with no committed revision any working copy is
    /// a local change.
    async fn detect_local_modification(
        &self,
        object: &ObjectPath,
        newest: Option<&RevisionRecord>,
    ) -> bool {
        let working = match self.working_digest(object).await {
            Ok(Some(digest)) => digest,
            Ok(None) => return false,
            Err(e) => {
                debug!(object = %object, error = %e, "cannot digest working copy");
                return false;
            }
        };
        let Some(newest) = newest else {
            return true;
        };
        let committed = match self.snapshot_path(object, &newest.handle) {
            Ok(path) => digest_file(&path).await,
            Err(e) => Err(e),
        };
        match committed {
            Ok(digest) => digest != working,
            Err(e) => {
                debug!(object = %object, error = %e, "cannot digest newest revision");
                false
            }
        }
    }

    fn cache_read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<ObjectPath, CachedHistory>> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for DirectorySourceControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectorySourceControl")
            .field("root", &self.root)
            .field("options", &self.options)
            .finish()
    }
}

/// `relative` as a path made only of plain components, or `None` if it is
/// empty, absolute, or climbs with `..`.
fn contained(relative: &str) -> Option<&Path> {
    let path = Path::new(relative);
    let mut components = path.components().peekable();
    components.peek()?;
    components
        .all(|c| matches!(c, Component::Normal(_)))
        .then_some(path)
}

async fn digest_file(path: &Path) -> HistoryResult<ContentDigest> {
    let text = tokio::fs::read_to_string(path).await?;
    let value: Value =
        serde_json::from_str(&text).map_err(|e| HistoryError::Serialization(e.to_string()))?;
    ContentDigest::of(&value)
}

#[async_trait]
impl SourceControl for DirectorySourceControl {
    async fn fetch_history(
        &self,
        operation: OperationId,
        object: &ObjectPath,
        force_refresh: bool,
    ) -> HistoryResult<Vec<RevisionRecord>> {
        let cached = if force_refresh {
            None
        } else {
            self.cache_read().get(object).map(|c| c.records.clone())
        };

        let records = match cached {
            Some(records) => {
                debug!(operation = operation.0, object = %object, "history served from cache");
                records
            }
            None => {
                let path = self.object_dir(object)?.join(HISTORY_FILE);
                let text = tokio::fs::read_to_string(&path)
                    .await
                    .map_err(|e| HistoryError::FetchFailed {
                        object: object.clone(),
                        reason: format!("{}: {e}", path.display()),
                    })?;
                let records: Vec<RevisionRecord> =
                    serde_json::from_str(&text).map_err(|e| HistoryError::FetchFailed {
                        object: object.clone(),
                        reason: format!("{}: {e}", path.display()),
                    })?;
                debug!(operation = operation.0, object = %object, count = records.len(), "history read");
                records
            }
        };

        let locally_modified = self.detect_local_modification(object, records.first()).await;
        self.cache.write().unwrap_or_else(PoisonError::into_inner).insert(
            object.clone(),
            CachedHistory {
                records: records.clone(),
                locally_modified,
            },
        );
        Ok(records)
    }

    async fn load_snapshot(
        &self,
        object: &ObjectPath,
        handle: &ContentHandle,
    ) -> HistoryResult<SharedSnapshot> {
        let path = self.snapshot_path(object, handle)?;
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| HistoryError::SnapshotLoadFailed {
                handle: handle.clone(),
                reason: format!("{}: {e}", path.display()),
            })?;
        let snapshot = JsonSnapshot::from_json_str(object.base_name(), &text).map_err(|e| {
            HistoryError::SnapshotLoadFailed {
                handle: handle.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(snapshot.with_options(self.options).into_shared())
    }

    fn cached_history_len(&self, object: &ObjectPath) -> usize {
        self.cache_read().get(object).map_or(0, |c| c.records.len())
    }

    /// As observed by the most recent `fetch_history` for `object`.
    fn is_locally_modified(&self, object: &ObjectPath) -> bool {
        self.cache_read()
            .get(object)
            .is_some_and(|c| c.locally_modified)
    }

    fn uses_changelists(&self) -> bool {
        self.uses_changelists
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn write_object(root: &Path, working: Option<Value>) -> ObjectPath {
        let dir = root.join("Game/Hero");
        fs::create_dir_all(&dir).unwrap();
        let history = json!([
            {
                "revision_id": "#2",
                "changelist": 12,
                "timestamp": "2024-05-02T10:00:00Z",
                "author": "kim",
                "description": "Buff hp",
                "handle": "r2.json"
            },
            {
                "revision_id": "#1",
                "changelist": 11,
                "timestamp": "2024-05-01T10:00:00Z",
                "author": "kim",
                "description": "Initial",
                "handle": "r1.json"
            }
        ]);
        fs::write(dir.join(HISTORY_FILE), history.to_string()).unwrap();
        fs::write(dir.join("r1.json"), json!({"hp": 10, "name": "Hero"}).to_string()).unwrap();
        fs::write(dir.join("r2.json"), json!({"hp": 12, "name": "Hero"}).to_string()).unwrap();
        if let Some(working) = working {
            fs::write(dir.join(WORKING_FILE), working.to_string()).unwrap();
        }
        ObjectPath::new("/Game/Hero")
    }

    #[tokio::test]
    async fn reads_history_and_fills_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let object = write_object(tmp.path(), None);
        let provider = DirectorySourceControl::new(tmp.path());

        assert_eq!(provider.cached_history_len(&object), 0);
        let records = provider.fetch_history(OperationId(1), &object, true).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].revision_id, "#2");
        assert_eq!(records[0].changelist, 12);
        assert_eq!(provider.cached_history_len(&object), 2);
    }

    #[tokio::test]
    async fn unforced_fetch_uses_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let object = write_object(tmp.path(), None);
        let provider = DirectorySourceControl::new(tmp.path());
        provider.fetch_history(OperationId(1), &object, true).await.unwrap();

        fs::remove_file(tmp.path().join("Game/Hero").join(HISTORY_FILE)).unwrap();
        let cached = provider.fetch_history(OperationId(2), &object, false).await.unwrap();
        assert_eq!(cached.len(), 2);
        assert!(provider.fetch_history(OperationId(3), &object, true).await.is_err());
    }

    #[tokio::test]
    async fn missing_history_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = DirectorySourceControl::new(tmp.path());
        let err = provider
            .fetch_history(OperationId(1), &ObjectPath::new("Nope"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, HistoryError::FetchFailed { .. }));
    }

    #[tokio::test]
    async fn loads_snapshot_named_after_object() {
        let tmp = tempfile::tempdir().unwrap();
        let object = write_object(tmp.path(), None);
        let provider = DirectorySourceControl::new(tmp.path());

        let snapshot = provider
            .load_snapshot(&object, &ContentHandle::new("r2.json"))
            .await
            .unwrap();
        assert_eq!(snapshot.object_name(), "Hero");
        assert_eq!(
            snapshot.resolve(&ahx_types::PropertyPath::field("hp")).unwrap(),
            Some(json!(12))
        );

        let missing = provider
            .load_snapshot(&object, &ContentHandle::new("r9.json"))
            .await;
        assert!(matches!(missing, Err(HistoryError::SnapshotLoadFailed { .. })));
    }

    async fn fetched(provider: &DirectorySourceControl, object: &ObjectPath) {
        provider.fetch_history(OperationId(1), object, true).await.unwrap();
    }

    #[tokio::test]
    async fn unchanged_working_copy_is_not_modified() {
        let tmp = tempfile::tempdir().unwrap();
        // Same content as r2.json with keys reordered.
        let object = write_object(tmp.path(), Some(json!({"name": "Hero", "hp": 12})));
        let provider = DirectorySourceControl::new(tmp.path());
        fetched(&provider, &object).await;
        assert!(!provider.is_locally_modified(&object));
    }

    #[tokio::test]
    async fn edited_working_copy_is_modified() {
        let tmp = tempfile::tempdir().unwrap();
        let object = write_object(tmp.path(), Some(json!({"name": "Hero", "hp": 15})));
        let provider = DirectorySourceControl::new(tmp.path());
        assert!(!provider.is_locally_modified(&object), "unknown before any fetch");
        fetched(&provider, &object).await;
        assert!(provider.is_locally_modified(&object));
    }

    #[tokio::test]
    async fn cached_fetch_rechecks_the_working_copy() {
        let tmp = tempfile::tempdir().unwrap();
        let object = write_object(tmp.path(), Some(json!({"name": "Hero", "hp": 12})));
        let provider = DirectorySourceControl::new(tmp.path());
        fetched(&provider, &object).await;
        assert!(!provider.is_locally_modified(&object));

        fs::write(
            tmp.path().join("Game/Hero").join(WORKING_FILE),
            json!({"name": "Hero", "hp": 99}).to_string(),
        )
        .unwrap();
        provider.fetch_history(OperationId(2), &object, false).await.unwrap();
        assert!(provider.is_locally_modified(&object));
    }

    #[tokio::test]
    async fn no_working_copy_is_not_modified() {
        let tmp = tempfile::tempdir().unwrap();
        let object = write_object(tmp.path(), None);
        let provider = DirectorySourceControl::new(tmp.path());
        fetched(&provider, &object).await;
        assert!(!provider.is_locally_modified(&object));
        assert!(provider.working_digest(&object).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn handles_cannot_leave_the_object_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let object = write_object(tmp.path(), None);
        fs::write(tmp.path().join("secret.json"), json!({"k": 1}).to_string()).unwrap();
        let provider = DirectorySourceControl::new(tmp.path());

        for handle in ["../../secret.json", "/etc/passwd", "", "./r1.json"] {
            let result = provider.load_snapshot(&object, &ContentHandle::new(handle)).await;
            assert!(
                matches!(result, Err(HistoryError::SnapshotLoadFailed { .. })),
                "{handle:?} should be rejected"
            );
        }
        assert!(provider
            .load_snapshot(&object, &ContentHandle::new("r1.json"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn object_paths_cannot_climb_out_of_the_root() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = DirectorySourceControl::new(tmp.path().join("repo"));
        let err = provider
            .fetch_history(OperationId(1), &ObjectPath::new("/../outside"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, HistoryError::FetchFailed { .. }));
    }

    #[tokio::test]
    async fn working_copy_loads_as_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let object = write_object(tmp.path(), Some(json!({"hp": 15})));
        let provider = DirectorySourceControl::new(tmp.path());
        let working = provider.load_working(&object).await.unwrap();
        assert_eq!(working.enumerate_properties().len(), 1);
    }

    #[test]
    fn digest_ignores_key_order_only() {
        let a = ContentDigest::of(&json!({"a": 1, "b": {"c": 2, "d": 3}})).unwrap();
        let b = ContentDigest::of(&json!({"b": {"d": 3, "c": 2}, "a": 1})).unwrap();
        let c = ContentDigest::of(&json!({"a": 1, "b": {"c": 2, "d": 4}})).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string().len(), 64);
        assert_eq!(a.short().len(), 8);
    }
}
