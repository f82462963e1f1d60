//! Notifications a diff session emits to its host.

use std::sync::Arc;

use ahx_diff::DifferenceTree;
use ahx_history::{HistoryError, HistoryObserver, QueryState, RevisionHistory};
use ahx_types::PropertyPath;

/// Receives session events. Every method defaults to doing nothing.
pub trait SessionObserver: Send + Sync {
    /// The difference tree was rebuilt.
    fn on_differences_changed(&self, _tree: &DifferenceTree) {}

    /// A difference was selected; the host should focus `path` in its
    /// details view.
    fn on_focus_requested(&self, _path: &PropertyPath) {}

    /// The revision history query changed state.
    fn on_history_state_changed(
        &self,
        _state: QueryState,
        _history: Option<&Arc<RevisionHistory>>,
        _error: Option<&HistoryError>,
    ) {
    }
}

/// Routes resolver notifications to a session observer.
pub(crate) struct HistoryForwarder(pub(crate) Arc<dyn SessionObserver>);

impl HistoryObserver for HistoryForwarder {
    fn on_history_state_changed(
        &self,
        state: QueryState,
        history: Option<&Arc<RevisionHistory>>,
        error: Option<&HistoryError>,
    ) {
        self.0.on_history_state_changed(state, history, error);
    }
}
