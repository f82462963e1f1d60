//! Asynchronous revision-history query with cancellation.
//!
//! The resolver drives one history query at a time through the
//! `NotQueried → QueryInProgress → Queried` state machine. Each query runs
//! on a spawned task and reports back over its own oneshot channel. The
//! resolver owns the receiving end only, so dropping the resolver (or
//! replacing the query) makes any late completion undeliverable and it is
//! discarded on the task side.
//!
//! Completions are applied on the owner's side, by [`poll`] or [`wait`],
//! never from the task.
//!
//! [`poll`]: RevisionHistoryResolver::poll
//! [`wait`]: RevisionHistoryResolver::wait

use std::fmt;
use std::sync::Arc;

use ahx_types::{ObjectPath, RevisionRecord};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{HistoryError, HistoryResult};
use crate::history::RevisionHistory;
use crate::provider::{OperationId, SourceControl};

/// Where the resolver is in its query lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryState {
    NotQueried,
    QueryInProgress,
    Queried,
}

/// Resolver tuning.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Always ask the provider for a full refresh on open, instead of
    /// accepting its cached history when it has one.
    pub always_refresh_on_open: bool,
}

/// Receives state transitions of a [`RevisionHistoryResolver`].
///
/// `history` is `None` until the first query completes. `error` is set when
/// the query failed; the history is then empty.
pub trait HistoryObserver: Send + Sync {
    fn on_history_state_changed(
        &self,
        state: QueryState,
        history: Option<&Arc<RevisionHistory>>,
        error: Option<&HistoryError>,
    );
}

type FetchOutcome = HistoryResult<Vec<RevisionRecord>>;

struct InFlight {
    operation: OperationId,
    receiver: oneshot::Receiver<FetchOutcome>,
    task: JoinHandle<()>,
    /// State to return to if this query is cancelled.
    prior: QueryState,
}

/// Fetches and caches the revision history of one object.
pub struct RevisionHistoryResolver {
    provider: Arc<dyn SourceControl>,
    config: HistoryConfig,
    observer: Option<Arc<dyn HistoryObserver>>,
    object: Option<ObjectPath>,
    state: QueryState,
    history: Option<Arc<RevisionHistory>>,
    last_error: Option<String>,
    in_flight: Option<InFlight>,
    next_operation: u64,
}

impl RevisionHistoryResolver {
    pub fn new(provider: Arc<dyn SourceControl>, config: HistoryConfig) -> Self {
        Self {
            provider,
            config,
            observer: None,
            object: None,
            state: QueryState::NotQueried,
            history: None,
            last_error: None,
            in_flight: None,
            next_operation: 0,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn HistoryObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn set_observer(&mut self, observer: Arc<dyn HistoryObserver>) {
        self.observer = Some(observer);
    }

    pub fn state(&self) -> QueryState {
        self.state
    }

    /// The last completed history. Replaced, never mutated, by later queries.
    pub fn history(&self) -> Option<Arc<RevisionHistory>> {
        self.history.clone()
    }

    /// Message of the failure behind the current (empty) history, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn object(&self) -> Option<&ObjectPath> {
        self.object.as_ref()
    }

    pub fn provider(&self) -> &Arc<dyn SourceControl> {
        &self.provider
    }

    pub fn uses_changelists(&self) -> bool {
        self.provider.uses_changelists()
    }

    /// The operation currently in flight.
    pub fn pending_operation(&self) -> Option<OperationId> {
        self.in_flight.as_ref().map(|f| f.operation)
    }

    /// Whether the in-flight query can be cancelled at the provider.
    pub fn can_cancel(&self) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|f| self.provider.can_cancel(f.operation))
    }

    /// Start fetching the history of `object`.
    ///
    /// Only valid from `NotQueried`. An empty provider cache forces a full
    /// refresh; otherwise the cached history is accepted. Must be called
    /// from within a Tokio runtime.
    pub fn open(&mut self, object: ObjectPath) -> HistoryResult<OperationId> {
        if self.state != QueryState::NotQueried {
            return Err(HistoryError::InvalidTransition {
                state: self.state,
                operation: "open",
            });
        }
        let cached = self.provider.cached_history_len(&object);
        let force_refresh = self.config.always_refresh_on_open || cached == 0;
        debug!(object = %object, cached, force_refresh, "opening revision history");
        self.start(object, force_refresh)
    }

    /// Re-query the history with a forced refresh.
    ///
    /// Only valid from `Queried`. The previous history stays visible through
    /// [`history`](Self::history) until the new query completes.
    pub fn refresh(&mut self) -> HistoryResult<OperationId> {
        let object = match (&self.state, &self.object) {
            (QueryState::Queried, Some(object)) => object.clone(),
            _ => {
                return Err(HistoryError::InvalidTransition {
                    state: self.state,
                    operation: "refresh",
                })
            }
        };
        debug!(object = %object, "refreshing revision history");
        self.start(object, true)
    }

    /// Abandon the in-flight query.
    ///
    /// The provider is asked to cancel when it supports it; either way the
    /// completion is discarded. State returns to what it was before the
    /// query started and the observer is not notified. Returns `false` when
    /// nothing was in flight.
    pub fn cancel(&mut self) -> bool {
        let Some(in_flight) = self.in_flight.take() else {
            return false;
        };
        let operation = in_flight.operation;
        let prior = in_flight.prior;
        let provider_cancelled = Self::abandon(self.provider.as_ref(), in_flight);

        self.state = prior;
        if prior == QueryState::NotQueried {
            self.object = None;
        }
        debug!(
            operation = operation.0,
            provider_cancelled,
            state = ?self.state,
            "history query cancelled"
        );
        true
    }

    /// Apply the in-flight query's completion if it has arrived.
    ///
    /// Returns `true` when state changed.
    pub fn poll(&mut self) -> bool {
        let Some(in_flight) = self.in_flight.as_mut() else {
            return false;
        };
        let outcome = match in_flight.receiver.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return false,
            Err(TryRecvError::Closed) => Err(self.task_lost()),
        };
        self.complete(outcome);
        true
    }

    /// Wait for the in-flight query (if any) and apply its completion.
    ///
    /// Dropping the returned future leaves the query in flight.
    pub async fn wait(&mut self) -> QueryState {
        if let Some(in_flight) = self.in_flight.as_mut() {
            let received = (&mut in_flight.receiver).await;
            let outcome = match received {
                Ok(outcome) => outcome,
                Err(_) => Err(self.task_lost()),
            };
            self.complete(outcome);
        }
        self.state
    }

    fn start(&mut self, object: ObjectPath, force_refresh: bool) -> HistoryResult<OperationId> {
        let runtime = Handle::try_current().map_err(|e| HistoryError::NoRuntime(e.to_string()))?;

        // One query per object at a time.
        if let Some(previous) = self.in_flight.take() {
            let operation = previous.operation;
            let provider_cancelled = Self::abandon(self.provider.as_ref(), previous);
            debug!(operation = operation.0, provider_cancelled, "superseding history query");
        }

        self.next_operation += 1;
        let operation = OperationId(self.next_operation);
        let (sender, receiver) = oneshot::channel();
        let provider = Arc::clone(&self.provider);
        let target = object.clone();

        let task = runtime.spawn(async move {
            let outcome = provider.fetch_history(operation, &target, force_refresh).await;
            if sender.send(outcome).is_err() {
                debug!(
                    operation = operation.0,
                    object = %target,
                    "history query released, discarding completion"
                );
            }
        });

        self.in_flight = Some(InFlight {
            operation,
            receiver,
            task,
            prior: self.state,
        });
        self.object = Some(object);
        self.transition(QueryState::QueryInProgress, None);
        Ok(operation)
    }

    fn complete(&mut self, outcome: FetchOutcome) {
        let (Some(in_flight), Some(object)) = (self.in_flight.take(), self.object.clone()) else {
            return;
        };

        match outcome {
            Ok(records) => {
                let locally_modified = self.provider.is_locally_modified(&object);
                info!(
                    object = %object,
                    operation = in_flight.operation.0,
                    count = records.len(),
                    locally_modified,
                    "revision history loaded"
                );
                self.history = Some(Arc::new(RevisionHistory::new(
                    object,
                    records,
                    locally_modified,
                )));
                self.last_error = None;
                self.transition(QueryState::Queried, None);
            }
            Err(HistoryError::Cancelled) => {
                debug!(
                    operation = in_flight.operation.0,
                    "provider reported cancellation"
                );
                self.state = in_flight.prior;
                if in_flight.prior == QueryState::NotQueried {
                    self.object = None;
                }
            }
            Err(error) => {
                warn!(
                    object = %object,
                    operation = in_flight.operation.0,
                    error = %error,
                    "revision history query failed"
                );
                self.history = Some(Arc::new(RevisionHistory::empty(object)));
                self.last_error = Some(error.to_string());
                self.transition(QueryState::Queried, Some(&error));
            }
        }
    }

    fn transition(&mut self, state: QueryState, error: Option<&HistoryError>) {
        debug!(from = ?self.state, to = ?state, "history state change");
        self.state = state;
        if let Some(observer) = &self.observer {
            observer.on_history_state_changed(state, self.history.as_ref(), error);
        }
    }

    fn task_lost(&self) -> HistoryError {
        HistoryError::FetchFailed {
            object: self.object.clone().unwrap_or_else(|| ObjectPath::new("")),
            reason: "history query ended without a result".into(),
        }
    }

    /// Drop a query's receiver, cancelling at the provider when allowed.
    fn abandon(provider: &dyn SourceControl, in_flight: InFlight) -> bool {
        if provider.can_cancel(in_flight.operation) && provider.cancel(in_flight.operation) {
            in_flight.task.abort();
            return true;
        }
        false
    }
}

impl Drop for RevisionHistoryResolver {
    fn drop(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            let operation = in_flight.operation;
            let provider_cancelled = Self::abandon(self.provider.as_ref(), in_flight);
            debug!(
                operation = operation.0,
                provider_cancelled,
                "resolver dropped with query in flight"
            );
        }
    }
}

impl fmt::Debug for RevisionHistoryResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevisionHistoryResolver")
            .field("object", &self.object)
            .field("state", &self.state)
            .field("revisions", &self.history.as_ref().map(|h| h.len()))
            .field("pending", &self.pending_operation())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemorySourceControl;
    use ahx_types::ContentHandle;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    fn record(id: &str, changelist: u64) -> RevisionRecord {
        RevisionRecord {
            revision_id: id.into(),
            changelist,
            timestamp: Utc.with_ymd_and_hms(2024, 3, changelist as u32, 9, 0, 0).unwrap(),
            author: "sam".into(),
            description: String::new(),
            handle: ContentHandle::new(id),
        }
    }

    fn hero() -> ObjectPath {
        ObjectPath::new("/Game/Hero")
    }

    fn provider_with_three() -> Arc<InMemorySourceControl> {
        let provider = InMemorySourceControl::new();
        provider.set_history(hero(), vec![record("R3", 3), record("R2", 2), record("R1", 1)]);
        Arc::new(provider)
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(QueryState, usize, bool)>>,
    }

    impl HistoryObserver for Recorder {
        fn on_history_state_changed(
            &self,
            state: QueryState,
            history: Option<&Arc<RevisionHistory>>,
            error: Option<&HistoryError>,
        ) {
            self.events.lock().unwrap().push((
                state,
                history.map_or(0, |h| h.len()),
                error.is_some(),
            ));
        }
    }

    #[tokio::test]
    async fn open_resolves_history() {
        let provider = provider_with_three();
        let mut resolver = RevisionHistoryResolver::new(provider.clone(), HistoryConfig::default());

        resolver.open(hero()).unwrap();
        assert_eq!(resolver.state(), QueryState::QueryInProgress);
        assert_eq!(resolver.wait().await, QueryState::Queried);

        let history = resolver.history().unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history.diff_pairs().len(), 2);
        assert!(resolver.last_error().is_none());
    }

    #[tokio::test]
    async fn local_modification_adds_head_pair() {
        let provider = provider_with_three();
        provider.set_locally_modified(hero(), true);
        let mut resolver = RevisionHistoryResolver::new(provider, HistoryConfig::default());

        resolver.open(hero()).unwrap();
        resolver.wait().await;

        let pairs = resolver.history().unwrap().diff_pairs();
        assert_eq!(pairs.len(), 3);
        assert!(pairs[0].candidate.is_local());
        assert_eq!(pairs[0].previous.label(), "R3");
    }

    #[tokio::test]
    async fn empty_cache_forces_refresh() {
        let provider = provider_with_three();
        let mut resolver = RevisionHistoryResolver::new(provider.clone(), HistoryConfig::default());
        resolver.open(hero()).unwrap();
        resolver.wait().await;

        let calls = provider.fetch_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].force_refresh);
    }

    #[tokio::test]
    async fn cached_history_is_accepted() {
        let provider = provider_with_three();
        provider.set_cached_len(hero(), 3);
        let mut resolver = RevisionHistoryResolver::new(provider.clone(), HistoryConfig::default());
        resolver.open(hero()).unwrap();
        resolver.wait().await;

        assert!(!provider.fetch_calls()[0].force_refresh);
    }

    #[tokio::test]
    async fn config_can_always_force_refresh() {
        let provider = provider_with_three();
        provider.set_cached_len(hero(), 3);
        let config = HistoryConfig {
            always_refresh_on_open: true,
        };
        let mut resolver = RevisionHistoryResolver::new(provider.clone(), config);
        resolver.open(hero()).unwrap();
        resolver.wait().await;

        assert!(provider.fetch_calls()[0].force_refresh);
    }

    #[tokio::test]
    async fn failure_yields_queried_with_empty_history() {
        let provider = provider_with_three();
        provider.fail_fetches("depot offline");
        let recorder = Arc::new(Recorder::default());
        let mut resolver = RevisionHistoryResolver::new(provider, HistoryConfig::default())
            .with_observer(recorder.clone());

        resolver.open(hero()).unwrap();
        assert_eq!(resolver.wait().await, QueryState::Queried);

        let history = resolver.history().unwrap();
        assert!(history.is_empty());
        assert!(history.selectable_pairs().is_empty());
        assert!(resolver.last_error().unwrap().contains("depot offline"));

        let events = recorder.events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                (QueryState::QueryInProgress, 0, false),
                (QueryState::Queried, 0, true)
            ]
        );
    }

    #[tokio::test]
    async fn illegal_transitions_are_rejected() {
        let provider = provider_with_three();
        let mut resolver = RevisionHistoryResolver::new(provider, HistoryConfig::default());

        assert!(matches!(
            resolver.refresh(),
            Err(HistoryError::InvalidTransition {
                state: QueryState::NotQueried,
                ..
            })
        ));

        resolver.open(hero()).unwrap();
        assert!(matches!(
            resolver.open(hero()),
            Err(HistoryError::InvalidTransition { .. })
        ));
        assert!(resolver.refresh().is_err());
        assert_eq!(resolver.state(), QueryState::QueryInProgress);
    }

    #[tokio::test]
    async fn refresh_replaces_history() {
        let provider = provider_with_three();
        let mut resolver = RevisionHistoryResolver::new(provider.clone(), HistoryConfig::default());
        resolver.open(hero()).unwrap();
        resolver.wait().await;
        let first = resolver.history().unwrap();

        provider.set_history(
            hero(),
            vec![record("R4", 4), record("R3", 3), record("R2", 2), record("R1", 1)],
        );
        resolver.refresh().unwrap();
        // Prior history stays readable while the refresh runs.
        assert_eq!(resolver.history().unwrap().len(), 3);
        resolver.wait().await;

        assert_eq!(resolver.history().unwrap().len(), 4);
        // Snapshots handed out earlier are not mutated.
        assert_eq!(first.len(), 3);
        assert!(provider.fetch_calls()[1].force_refresh);
    }

    #[tokio::test]
    async fn cancelling_refresh_keeps_prior_history_silently() {
        let provider = provider_with_three();
        provider.set_cancellable(true);
        let recorder = Arc::new(Recorder::default());
        let mut resolver = RevisionHistoryResolver::new(provider.clone(), HistoryConfig::default())
            .with_observer(recorder.clone());
        resolver.open(hero()).unwrap();
        resolver.wait().await;

        provider.hold_fetches();
        let operation = resolver.refresh().unwrap();
        assert!(resolver.can_cancel());
        let events_before = recorder.events.lock().unwrap().len();

        assert!(resolver.cancel());
        assert_eq!(resolver.state(), QueryState::Queried);
        assert_eq!(resolver.history().unwrap().len(), 3);
        assert_eq!(provider.cancelled(), vec![operation]);
        assert_eq!(recorder.events.lock().unwrap().len(), events_before);

        // Nothing left to apply.
        provider.release_fetches();
        assert!(!resolver.poll());
        assert!(!resolver.cancel());
    }

    #[tokio::test]
    async fn cancelling_open_returns_to_not_queried() {
        let provider = provider_with_three();
        provider.hold_fetches();
        let mut resolver = RevisionHistoryResolver::new(provider.clone(), HistoryConfig::default());
        resolver.open(hero()).unwrap();
        assert!(!resolver.can_cancel());

        assert!(resolver.cancel());
        assert_eq!(resolver.state(), QueryState::NotQueried);
        assert!(resolver.history().is_none());
        // Provider did not support cancellation.
        assert!(provider.cancelled().is_empty());

        // A fresh open works after the cancelled one.
        provider.release_fetches();
        resolver.open(hero()).unwrap();
        resolver.wait().await;
        assert_eq!(resolver.history().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn drop_cancels_when_supported() {
        let provider = provider_with_three();
        provider.set_cancellable(true);
        provider.hold_fetches();
        let mut resolver = RevisionHistoryResolver::new(provider.clone(), HistoryConfig::default());
        let operation = resolver.open(hero()).unwrap();

        drop(resolver);
        assert_eq!(provider.cancelled(), vec![operation]);
    }

    #[tokio::test]
    async fn late_completion_after_drop_is_discarded() {
        let provider = provider_with_three();
        provider.hold_fetches();
        let recorder = Arc::new(Recorder::default());
        let mut resolver = RevisionHistoryResolver::new(provider.clone(), HistoryConfig::default())
            .with_observer(recorder.clone());
        resolver.open(hero()).unwrap();
        drop(resolver);

        provider.release_fetches();
        // Let the detached task run to completion.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(provider.fetch_calls().len(), 1);
        // Only the in-progress notification was ever delivered.
        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec![(QueryState::QueryInProgress, 0, false)]
        );
    }

    #[tokio::test]
    async fn poll_applies_completion_once() {
        let provider = provider_with_three();
        let mut resolver = RevisionHistoryResolver::new(provider, HistoryConfig::default());
        resolver.open(hero()).unwrap();

        let mut applied = 0;
        for _ in 0..50 {
            if resolver.poll() {
                applied += 1;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(applied, 1);
        assert_eq!(resolver.state(), QueryState::Queried);
    }

    #[test]
    fn open_outside_runtime_is_an_error() {
        let provider = provider_with_three();
        let mut resolver = RevisionHistoryResolver::new(provider, HistoryConfig::default());
        assert!(matches!(resolver.open(hero()), Err(HistoryError::NoRuntime(_))));
        assert_eq!(resolver.state(), QueryState::NotQueried);
    }
}
