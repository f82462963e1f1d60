//! The diff session: picks a revision pair, loads both sides, and keeps the
//! difference tree and its navigator in step.
//!
//! All state lives on the caller's task. [`select_pair`] loads both
//! snapshots concurrently and only touches session state once both have
//! arrived, so dropping its future abandons the load without side effects.
//!
//! [`select_pair`]: DiffSessionController::select_pair

use std::fmt;
use std::sync::Arc;

use ahx_diff::{
    compare, DifferenceEntry, DifferenceNavigator, DifferenceTree, UnresolvedProperty,
    RIGHT_REVISION_LABEL,
};
use ahx_history::{
    OperationId, QueryState, RevisionHistory, RevisionHistoryResolver, SourceControl,
};
use ahx_types::{ObjectPath, PropertyPath, RevisionPair, RevisionRef, SharedSnapshot};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::observer::{HistoryForwarder, SessionObserver};

/// What the session is currently showing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionStatus {
    /// No pair selected yet.
    #[default]
    Idle,
    /// Two revisions compared.
    Diffing,
    /// A single revision opened for viewing (no previous revision).
    Viewing,
    /// The last selection could not be loaded. The previous result, if any,
    /// is still shown.
    UnableToLoad { reason: String },
}

/// Orchestrates one object's diff session.
pub struct DiffSessionController {
    provider: Arc<dyn SourceControl>,
    config: SessionConfig,
    object: ObjectPath,
    live: Option<SharedSnapshot>,
    resolver: RevisionHistoryResolver,
    observer: Option<Arc<dyn SessionObserver>>,
    pair: Option<RevisionPair>,
    /// Loaded (previous, candidate) snapshots of the current diff.
    sides: Option<(SharedSnapshot, SharedSnapshot)>,
    viewed: Option<SharedSnapshot>,
    tree: DifferenceTree,
    skipped: Vec<UnresolvedProperty>,
    navigator: DifferenceNavigator,
    status: SessionStatus,
}

impl DiffSessionController {
    pub fn new(provider: Arc<dyn SourceControl>, object: ObjectPath, config: SessionConfig) -> Self {
        let resolver = RevisionHistoryResolver::new(Arc::clone(&provider), config.history.clone());
        let tree = DifferenceTree::empty();
        let navigator = DifferenceNavigator::new(&tree);
        Self {
            provider,
            config,
            object,
            live: None,
            resolver,
            observer: None,
            pair: None,
            sides: None,
            viewed: None,
            tree,
            skipped: Vec::new(),
            navigator,
            status: SessionStatus::Idle,
        }
    }

    /// Bind the live in-memory object that `HEAD` resolves to.
    pub fn with_live(mut self, live: SharedSnapshot) -> Self {
        self.live = Some(live);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.set_observer(observer);
        self
    }

    pub fn set_observer(&mut self, observer: Arc<dyn SessionObserver>) {
        self.resolver
            .set_observer(Arc::new(HistoryForwarder(Arc::clone(&observer))));
        let focus = Arc::clone(&observer);
        self.navigator
            .set_focus_handler(Box::new(move |path: &PropertyPath| focus.on_focus_requested(path)));
        self.observer = Some(observer);
    }

    pub fn object(&self) -> &ObjectPath {
        &self.object
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn pair(&self) -> Option<&RevisionPair> {
        self.pair.as_ref()
    }

    pub fn tree(&self) -> &DifferenceTree {
        &self.tree
    }

    pub fn navigator(&self) -> &DifferenceNavigator {
        &self.navigator
    }

    /// Properties the last comparison could not resolve on one side.
    pub fn skipped(&self) -> &[UnresolvedProperty] {
        &self.skipped
    }

    /// The snapshot opened by a view-only selection.
    pub fn viewed(&self) -> Option<&SharedSnapshot> {
        self.viewed.as_ref()
    }

    // -- History --

    pub fn history_state(&self) -> QueryState {
        self.resolver.state()
    }

    pub fn history(&self) -> Option<Arc<RevisionHistory>> {
        self.resolver.history()
    }

    pub fn resolver(&self) -> &RevisionHistoryResolver {
        &self.resolver
    }

    /// Start the history query for this session's object.
    pub fn open_history(&mut self) -> SessionResult<OperationId> {
        Ok(self.resolver.open(self.object.clone())?)
    }

    pub fn refresh_history(&mut self) -> SessionResult<OperationId> {
        Ok(self.resolver.refresh()?)
    }

    pub fn cancel_history(&mut self) -> bool {
        self.resolver.cancel()
    }

    /// Apply a finished history query, if any. Returns `true` on change.
    pub fn poll_history(&mut self) -> bool {
        self.resolver.poll()
    }

    pub async fn wait_for_history(&mut self) -> QueryState {
        self.resolver.wait().await
    }

    // -- Selection --

    /// Compare `pair`, replacing the current tree.
    ///
    /// Rejects a malformed pair without touching the session. A pair with no
    /// previous revision opens the candidate for viewing instead. On a load
    /// failure the status becomes `UnableToLoad` and the previous tree stays.
    pub async fn select_pair(&mut self, pair: RevisionPair) -> SessionResult<()> {
        if let Some(reason) = self.validate(&pair) {
            debug!(pair = %pair, reason = %reason, "rejecting revision pair");
            return Err(SessionError::InvalidRevisionPair {
                pair: pair.to_string(),
                reason,
            });
        }

        if pair.is_view_only() {
            let loaded = load_side(&self.provider, &self.object, self.live.as_ref(), &pair.candidate).await;
            return match loaded {
                Ok(snapshot) => {
                    self.show_view_only(pair, snapshot);
                    Ok(())
                }
                Err(error) => Err(self.unable_to_load(error)),
            };
        }

        let (previous, candidate) = {
            let live = self.live.as_ref();
            tokio::join!(
                load_side(&self.provider, &self.object, live, &pair.previous),
                load_side(&self.provider, &self.object, live, &pair.candidate),
            )
        };
        match (previous, candidate) {
            (Ok(previous), Ok(candidate)) => {
                self.show_diff(pair, previous, candidate);
                Ok(())
            }
            (Err(error), _) | (_, Err(error)) => Err(self.unable_to_load(error)),
        }
    }

    /// Recompare after the live object changed.
    ///
    /// Rebinds `HEAD` to `live`. When the current diff's candidate is `HEAD`
    /// the tree is rebuilt and the selection kept if its property still
    /// differs. Returns `true` if the tree was rebuilt.
    pub fn refresh_live(&mut self, live: SharedSnapshot) -> bool {
        self.live = Some(Arc::clone(&live));

        if !self.pair.as_ref().is_some_and(|p| p.candidate.is_local()) {
            return false;
        }
        let Some(previous) = self.sides.as_ref().map(|(p, _)| Arc::clone(p)) else {
            return false;
        };

        self.rebuild(&previous, &live);
        self.navigator.rebind(&self.tree);
        self.sides = Some((previous, live));
        debug!(object = %self.object, count = self.tree.real_differences().len(), "live diff refreshed");
        self.notify_differences();
        true
    }

    // -- Navigation --

    pub fn has_next(&self) -> bool {
        self.navigator.has_next()
    }

    pub fn has_prev(&self) -> bool {
        self.navigator.has_prev()
    }

    /// Focus the next real difference. Clamps at the end.
    pub fn next(&mut self) -> Option<Arc<DifferenceEntry>> {
        self.navigator.next()
    }

    /// Focus the previous real difference. Clamps at the start.
    pub fn prev(&mut self) -> Option<Arc<DifferenceEntry>> {
        self.navigator.prev()
    }

    /// Focus the difference for `path` directly.
    pub fn select(&mut self, path: &PropertyPath) -> bool {
        self.navigator.select(path)
    }

    pub fn current(&self) -> Option<&Arc<DifferenceEntry>> {
        self.navigator.current()
    }

    /// One-line description of a difference for display.
    pub fn describe(&self, entry: &DifferenceEntry) -> String {
        entry.message(RIGHT_REVISION_LABEL)
    }

    /// Window title for the current selection.
    pub fn title(&self) -> String {
        let name = self.object.base_name();
        match &self.pair {
            Some(pair) if pair.is_view_only() => format!("{name} - {}", pair.candidate),
            Some(pair) => format!("{name} - {} vs {}", pair.previous, pair.candidate),
            None => name.to_string(),
        }
    }

    // -- Internals --

    fn validate(&self, pair: &RevisionPair) -> Option<String> {
        if let Some(reason) = pair.ordering_violation() {
            return Some(reason);
        }
        if pair.candidate.is_local() && self.live.is_none() {
            return Some("no live object bound for HEAD".into());
        }
        None
    }

    fn unable_to_load(&mut self, error: SessionError) -> SessionError {
        warn!(object = %self.object, error = %error, "unable to load assets to diff");
        self.status = SessionStatus::UnableToLoad {
            reason: error.to_string(),
        };
        error
    }

    fn show_diff(&mut self, pair: RevisionPair, previous: SharedSnapshot, candidate: SharedSnapshot) {
        self.rebuild(&previous, &candidate);
        self.navigator.reset(&self.tree);
        info!(
            object = %self.object,
            pair = %pair,
            count = self.tree.real_differences().len(),
            skipped = self.skipped.len(),
            "revision pair compared"
        );
        self.pair = Some(pair);
        self.sides = Some((previous, candidate));
        self.viewed = None;
        self.status = SessionStatus::Diffing;
        self.notify_differences();
    }

    fn show_view_only(&mut self, pair: RevisionPair, snapshot: SharedSnapshot) {
        info!(object = %self.object, revision = %pair.candidate, "opening revision for viewing");
        self.tree = DifferenceTree::empty();
        self.skipped.clear();
        self.navigator.reset(&self.tree);
        self.pair = Some(pair);
        self.sides = None;
        self.viewed = Some(snapshot);
        self.status = SessionStatus::Viewing;
        self.notify_differences();
    }

    fn rebuild(&mut self, previous: &SharedSnapshot, candidate: &SharedSnapshot) {
        let comparison = compare(previous.as_ref(), candidate.as_ref());
        self.skipped = comparison.skipped;
        self.tree = DifferenceTree::build(comparison.entries, &self.config.diff.category());
    }

    fn notify_differences(&self) {
        if let Some(observer) = &self.observer {
            observer.on_differences_changed(&self.tree);
        }
    }
}

/// Fetch one side of a pair. `HEAD` is the live object.
async fn load_side(
    provider: &Arc<dyn SourceControl>,
    object: &ObjectPath,
    live: Option<&SharedSnapshot>,
    revision: &RevisionRef,
) -> SessionResult<SharedSnapshot> {
    match revision {
        RevisionRef::Committed(record) => provider
            .load_snapshot(object, &record.handle)
            .await
            .map_err(|source| SessionError::SnapshotLoadFailed {
                revision: revision.to_string(),
                source,
            }),
        // Validation rules these out before anything is loaded.
        RevisionRef::Local => live.cloned().ok_or_else(|| SessionError::InvalidRevisionPair {
            pair: revision.to_string(),
            reason: "no live object bound for HEAD".into(),
        }),
        RevisionRef::NoRevision => Err(SessionError::InvalidRevisionPair {
            pair: revision.to_string(),
            reason: "nothing to load".into(),
        }),
    }
}

impl fmt::Debug for DiffSessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiffSessionController")
            .field("object", &self.object)
            .field("status", &self.status)
            .field("pair", &self.pair)
            .field("differences", &self.tree.real_differences().len())
            .field("navigator", &self.navigator)
            .finish()
    }
}
