//! Diff engine for asset history.
//!
//! Compares two snapshots of an object's property set and arranges the
//! result for display and navigation.
//!
//! # Key Types
//!
//! - [`compare`] / [`Comparison`] / [`DifferenceEntry`] -- Property-level diff
//! - [`DifferenceTree`] / [`DiffNode`] -- Category, leaf, and sentinel nodes
//! - [`DifferenceNavigator`] -- Next/prev cursor over the real differences
//! - [`TextDiff`] -- Line-level diff for multi-line text values

pub mod comparator;
pub mod navigator;
pub mod text_diff;
pub mod tree;

pub use comparator::{compare, ChangeKind, Comparison, DifferenceEntry, UnresolvedProperty};
pub use navigator::{DifferenceNavigator, FocusHandler};
pub use text_diff::{diff_text, TextDiff, TextHunk, TextLine};
pub use tree::{CategoryLabel, DiffNode, DifferenceTree, TreeRow};

/// Label of the right-hand side in difference messages.
pub const RIGHT_REVISION_LABEL: &str = "Right Revision";
