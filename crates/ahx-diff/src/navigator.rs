//! Cursor over the real differences of a [`DifferenceTree`].
//!
//! Navigation clamps at both ends: `next()` on the last difference and
//! `prev()` on the first leave the selection where it is.

use std::fmt;
use std::sync::Arc;

use ahx_types::PropertyPath;

use crate::comparator::DifferenceEntry;
use crate::tree::DifferenceTree;

/// Called with the identifier of each newly selected difference.
pub type FocusHandler = Box<dyn FnMut(&PropertyPath) + Send>;

/// Stateful cursor over a flattened real-difference list.
pub struct DifferenceNavigator {
    real: Vec<Arc<DifferenceEntry>>,
    current: Option<usize>,
    on_focus: Option<FocusHandler>,
}

impl DifferenceNavigator {
    /// A navigator over `tree` with nothing selected.
    pub fn new(tree: &DifferenceTree) -> Self {
        Self {
            real: tree.real_differences().to_vec(),
            current: None,
            on_focus: None,
        }
    }

    pub fn with_focus_handler(mut self, handler: FocusHandler) -> Self {
        self.on_focus = Some(handler);
        self
    }

    pub fn set_focus_handler(&mut self, handler: FocusHandler) {
        self.on_focus = Some(handler);
    }

    /// Index of the selected difference, if any.
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&Arc<DifferenceEntry>> {
        self.current.and_then(|i| self.real.get(i))
    }

    pub fn len(&self) -> usize {
        self.real.len()
    }

    pub fn is_empty(&self) -> bool {
        self.real.is_empty()
    }

    pub fn has_next(&self) -> bool {
        match self.current {
            None => !self.real.is_empty(),
            Some(i) => i + 1 < self.real.len(),
        }
    }

    pub fn has_prev(&self) -> bool {
        matches!(self.current, Some(i) if i > 0)
    }

    /// Select the next difference. With nothing selected this is the first.
    ///
    /// Returns the newly selected entry, or `None` (selection unchanged) at
    /// the end of the list.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<Arc<DifferenceEntry>> {
        if !self.has_next() {
            return None;
        }
        let target = self.current.map_or(0, |i| i + 1);
        self.focus(target)
    }

    /// Select the previous difference.
    ///
    /// Returns `None` (selection unchanged) with nothing selected or at the
    /// start of the list.
    pub fn prev(&mut self) -> Option<Arc<DifferenceEntry>> {
        if !self.has_prev() {
            return None;
        }
        let target = self.current.map_or(0, |i| i - 1);
        self.focus(target)
    }

    /// Select the difference for `path` directly (e.g. a click in the list).
    ///
    /// Returns `false` and leaves the selection alone if no real difference
    /// has that identifier.
    pub fn select(&mut self, path: &PropertyPath) -> bool {
        match self.real.iter().position(|e| &e.path == path) {
            Some(i) => self.focus(i).is_some(),
            None => false,
        }
    }

    pub fn clear_selection(&mut self) {
        self.current = None;
    }

    /// Point at a rebuilt tree and drop any selection.
    pub fn reset(&mut self, tree: &DifferenceTree) {
        self.real = tree.real_differences().to_vec();
        self.current = None;
    }

    /// Point at a rebuilt tree, keeping the selection when its identifier is
    /// still a real difference. Falls back to no selection otherwise.
    ///
    /// Does not fire the focus handler.
    pub fn rebind(&mut self, tree: &DifferenceTree) {
        let selected = self.current().map(|e| e.path.clone());
        self.real = tree.real_differences().to_vec();
        self.current = selected.and_then(|path| self.real.iter().position(|e| e.path == path));
    }

    fn focus(&mut self, index: usize) -> Option<Arc<DifferenceEntry>> {
        let entry = self.real.get(index)?.clone();
        self.current = Some(index);
        if let Some(handler) = self.on_focus.as_mut() {
            handler(&entry.path);
        }
        Some(entry)
    }
}

impl fmt::Debug for DifferenceNavigator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DifferenceNavigator")
            .field("len", &self.real.len())
            .field("current", &self.current)
            .field("has_focus_handler", &self.on_focus.is_some())
            .finish()
    }
}
