//! An object's revision history and the comparison pairs derived from it.

use std::sync::Arc;

use ahx_types::{ObjectPath, RevisionPair, RevisionRecord, RevisionRef};

/// Revisions of one object, newest first, as returned by the provider.
///
/// Immutable once built; the resolver hands out `Arc<RevisionHistory>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevisionHistory {
    object: ObjectPath,
    revisions: Vec<Arc<RevisionRecord>>,
    locally_modified: bool,
}

impl RevisionHistory {
    pub fn new(object: ObjectPath, revisions: Vec<RevisionRecord>, locally_modified: bool) -> Self {
        Self {
            object,
            revisions: revisions.into_iter().map(Arc::new).collect(),
            locally_modified,
        }
    }

    /// A history with no revisions, shown as "no revisions found".
    pub fn empty(object: ObjectPath) -> Self {
        Self {
            object,
            revisions: Vec::new(),
            locally_modified: false,
        }
    }

    pub fn object(&self) -> &ObjectPath {
        &self.object
    }

    pub fn revisions(&self) -> &[Arc<RevisionRecord>] {
        &self.revisions
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn newest(&self) -> Option<&Arc<RevisionRecord>> {
        self.revisions.first()
    }

    pub fn is_locally_modified(&self) -> bool {
        self.locally_modified
    }

    /// Find a revision by its identifier.
    pub fn find(&self, revision_id: &str) -> Option<&Arc<RevisionRecord>> {
        self.revisions.iter().find(|r| r.revision_id == revision_id)
    }

    /// The (previous, candidate) pairs that can be diffed.
    ///
    /// Consecutive revisions pair up as `(history[i + 1], history[i])`. When
    /// the object is locally modified, `(history[0], HEAD)` comes first.
    pub fn diff_pairs(&self) -> Vec<RevisionPair> {
        let mut pairs = Vec::with_capacity(self.revisions.len());
        if let Some(newest) = self.local_pair() {
            pairs.push(newest);
        }
        pairs.extend(self.revisions.windows(2).map(|w| {
            RevisionPair::new(
                RevisionRef::Committed(Arc::clone(&w[1])),
                RevisionRef::Committed(Arc::clone(&w[0])),
            )
        }));
        pairs
    }

    /// Every entry a history listing offers: the diff pairs followed by the
    /// oldest revision paired with no previous revision, which can only be
    /// opened for viewing.
    pub fn selectable_pairs(&self) -> Vec<RevisionPair> {
        let mut pairs = self.diff_pairs();
        if let Some(oldest) = self.revisions.last() {
            pairs.push(RevisionPair::new(
                RevisionRef::NoRevision,
                RevisionRef::Committed(Arc::clone(oldest)),
            ));
        }
        pairs
    }

    /// The selectable pair whose candidate has the given label (`HEAD` for
    /// local state).
    pub fn pair_for_candidate(&self, label: &str) -> Option<RevisionPair> {
        self.selectable_pairs()
            .into_iter()
            .find(|p| p.candidate.label() == label)
    }

    fn local_pair(&self) -> Option<RevisionPair> {
        if !self.locally_modified {
            return None;
        }
        self.newest().map(|newest| {
            RevisionPair::new(RevisionRef::Committed(Arc::clone(newest)), RevisionRef::Local)
        })
    }
}
