//! Revision model: persisted object identity, historical revisions, and the
//! (previous, candidate) pairs offered for comparison.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted identity of a versioned object (its package or file path).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectPath(String);

impl ObjectPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The last path component without extension, e.g. `Sword` for
    /// `Content/Items/Sword.uasset`.
    pub fn base_name(&self) -> &str {
        let file = self.0.rsplit(['/', '\\']).next().unwrap_or(&self.0);
        match file.rfind('.') {
            Some(0) | None => file,
            Some(dot) => &file[..dot],
        }
    }
}

impl fmt::Debug for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectPath({})", self.0)
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectPath {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque handle a history provider uses to fetch one revision's content.
///
/// The core never interprets it.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHandle(String);

impl ContentHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ContentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHandle({})", self.0)
    }
}

/// One committed revision of an object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionRecord {
    /// Provider-specific revision identifier (`#12`, a commit hash, ...).
    pub revision_id: String,
    /// Changelist / check-in number. Zero when the provider has none.
    #[serde(default)]
    pub changelist: u64,
    pub timestamp: DateTime<Utc>,
    pub author: String,
    #[serde(default)]
    pub description: String,
    pub handle: ContentHandle,
}

impl RevisionRecord {
    /// Returns `true` if `self` was committed strictly before `other`.
    ///
    /// Changelist numbers are authoritative when both sides carry one;
    /// otherwise timestamps decide.
    pub fn is_older_than(&self, other: &RevisionRecord) -> bool {
        if self.changelist != 0 && other.changelist != 0 {
            self.changelist < other.changelist
        } else {
            self.timestamp < other.timestamp
        }
    }

    /// Multi-line tooltip text for a history listing.
    pub fn tooltip(&self, uses_changelists: bool) -> String {
        let date = self.timestamp.format("%Y-%m-%d");
        if uses_changelists {
            format!(
                "CL #{} {} \n{} \n{}",
                self.changelist, self.author, date, self.description
            )
        } else {
            format!(
                "{} {} \n{} \n{}",
                self.revision_id, self.author, date, self.description
            )
        }
    }
}

/// Revision identifier rendered for the local pseudo-revision.
pub const LOCAL_REVISION_LABEL: &str = "HEAD";

/// A revision as it appears on one side of a comparison.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum RevisionRef {
    /// No revision. Used as the base of the oldest revision, which can only
    /// be opened for viewing.
    NoRevision,
    /// Uncommitted local state. Has no content handle; its content is the
    /// live in-memory object.
    Local,
    /// A committed revision fetched through its content handle.
    Committed(Arc<RevisionRecord>),
}

impl RevisionRef {
    pub fn committed(record: RevisionRecord) -> Self {
        Self::Committed(Arc::new(record))
    }

    pub fn is_no_revision(&self) -> bool {
        matches!(self, Self::NoRevision)
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local)
    }

    pub fn record(&self) -> Option<&RevisionRecord> {
        match self {
            Self::Committed(record) => Some(record),
            _ => None,
        }
    }

    pub fn handle(&self) -> Option<&ContentHandle> {
        self.record().map(|r| &r.handle)
    }

    /// The label shown for this revision (`HEAD` for local state).
    pub fn label(&self) -> &str {
        match self {
            Self::NoRevision => "",
            Self::Local => LOCAL_REVISION_LABEL,
            Self::Committed(record) => &record.revision_id,
        }
    }
}

impl fmt::Display for RevisionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRevision => f.write_str("<none>"),
            other => f.write_str(other.label()),
        }
    }
}

/// A (previous, candidate) pair offered for comparison.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionPair {
    pub previous: RevisionRef,
    pub candidate: RevisionRef,
}

impl RevisionPair {
    pub fn new(previous: RevisionRef, candidate: RevisionRef) -> Self {
        Self {
            previous,
            candidate,
        }
    }

    /// Returns `true` if this pair can only open the candidate for viewing.
    pub fn is_view_only(&self) -> bool {
        self.previous.is_no_revision()
    }

    /// Check that `previous` really precedes `candidate`.
    ///
    /// Returns the reason when it does not.
    pub fn ordering_violation(&self) -> Option<String> {
        match (&self.previous, &self.candidate) {
            (_, RevisionRef::NoRevision) => Some("candidate revision is missing".into()),
            (RevisionRef::Local, _) => {
                Some("local state cannot be the previous revision".into())
            }
            (RevisionRef::NoRevision, _) | (RevisionRef::Committed(_), RevisionRef::Local) => None,
            (RevisionRef::Committed(prev), RevisionRef::Committed(cand)) => {
                if prev.revision_id == cand.revision_id {
                    Some(format!("revision {} compared with itself", prev.revision_id))
                } else if cand.is_older_than(prev) {
                    Some(format!(
                        "candidate {} precedes previous {}",
                        cand.revision_id, prev.revision_id
                    ))
                } else {
                    None
                }
            }
        }
    }
}

impl fmt::Display for RevisionPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.previous, self.candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(id: &str, changelist: u64, day: u32) -> RevisionRecord {
        RevisionRecord {
            revision_id: id.into(),
            changelist,
            timestamp: Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap(),
            author: "mira".into(),
            description: format!("change {id}"),
            handle: ContentHandle::new(format!("content/{id}")),
        }
    }

    #[test]
    fn base_name_strips_directories_and_extension() {
        assert_eq!(ObjectPath::new("Content/Items/Sword.uasset").base_name(), "Sword");
        assert_eq!(ObjectPath::new("Sword").base_name(), "Sword");
        assert_eq!(ObjectPath::new("dir\\.hidden").base_name(), ".hidden");
    }

    #[test]
    fn changelists_decide_ordering_when_present() {
        let older = record("#1", 10, 20);
        let newer = record("#2", 11, 1);
        assert!(older.is_older_than(&newer));
        assert!(!newer.is_older_than(&older));
    }

    #[test]
    fn timestamps_decide_without_changelists() {
        let older = record("a1b2", 0, 1);
        let newer = record("c3d4", 0, 2);
        assert!(older.is_older_than(&newer));
    }

    #[test]
    fn tooltip_formats() {
        let r = record("#7", 1207, 5);
        assert_eq!(r.tooltip(true), "CL #1207 mira \n2024-03-05 \nchange #7");
        assert!(r.tooltip(false).starts_with("#7 mira"));
    }

    #[test]
    fn local_label_is_head() {
        assert_eq!(RevisionRef::Local.label(), "HEAD");
        assert!(RevisionRef::Local.handle().is_none());
    }

    #[test]
    fn ordering_violations() {
        let r1 = RevisionRef::committed(record("#1", 1, 1));
        let r2 = RevisionRef::committed(record("#2", 2, 2));

        assert!(RevisionPair::new(r1.clone(), r2.clone()).ordering_violation().is_none());
        assert!(RevisionPair::new(r2.clone(), RevisionRef::Local).ordering_violation().is_none());
        assert!(RevisionPair::new(RevisionRef::NoRevision, r1.clone()).ordering_violation().is_none());

        assert!(RevisionPair::new(r2.clone(), r1.clone()).ordering_violation().is_some());
        assert!(RevisionPair::new(r1.clone(), r1.clone()).ordering_violation().is_some());
        assert!(RevisionPair::new(RevisionRef::Local, r1.clone()).ordering_violation().is_some());
        assert!(RevisionPair::new(r1, RevisionRef::NoRevision).ordering_violation().is_some());
    }

    #[test]
    fn view_only_pair() {
        let r1 = RevisionRef::committed(record("#1", 1, 1));
        assert!(RevisionPair::new(RevisionRef::NoRevision, r1).is_view_only());
    }
}
