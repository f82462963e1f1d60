//! Difference tree: comparator output arranged for display and navigation.
//!
//! The tree mixes "real" differences (leaves, each wrapping one
//! [`DifferenceEntry`]) with informational rows: the category that groups
//! them and the sentinel shown when nothing differs. Only leaves are real.

use std::sync::Arc;

use ahx_types::PropertyPath;
use serde::{Deserialize, Serialize};

use crate::comparator::DifferenceEntry;

/// Label and tooltip of the single top-level category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLabel {
    pub label: String,
    pub tooltip: String,
}

impl Default for CategoryLabel {
    fn default() -> Self {
        Self {
            label: "Defaults".into(),
            tooltip: "The list of changes made in the Defaults panel".into(),
        }
    }
}

/// A node of the difference tree.
#[derive(Clone, Debug, PartialEq)]
pub enum DiffNode {
    /// One property difference. Always real.
    Leaf(Arc<DifferenceEntry>),
    /// Sentinel row telling the user there is nothing to show. Not real.
    NoDifferences,
    /// A labelled group. Not real itself; its leaves are.
    Category {
        label: String,
        tooltip: String,
        /// Whether any child is a real difference.
        has_differences: bool,
        children: Vec<DiffNode>,
    },
}

impl DiffNode {
    pub fn is_real(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    pub fn entry(&self) -> Option<&Arc<DifferenceEntry>> {
        match self {
            Self::Leaf(entry) => Some(entry),
            _ => None,
        }
    }

    pub fn children(&self) -> &[DiffNode] {
        match self {
            Self::Category { children, .. } => children,
            _ => &[],
        }
    }

    /// Text shown for this node in a list.
    pub fn display_text(&self, revision_label: &str) -> String {
        match self {
            Self::Leaf(entry) => entry.message(revision_label),
            Self::NoDifferences => "No differences detected".into(),
            Self::Category { label, .. } => label.clone(),
        }
    }
}

/// A node flattened into display order with its nesting depth.
#[derive(Clone, Copy, Debug)]
pub struct TreeRow<'a> {
    pub depth: usize,
    pub node: &'a DiffNode,
}

/// The full node list for display plus the flattened real differences for
/// navigation, kept in the same relative order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DifferenceTree {
    nodes: Vec<DiffNode>,
    real: Vec<Arc<DifferenceEntry>>,
}

impl DifferenceTree {
    /// Wrap comparator output in one top-level category.
    ///
    /// An empty entry list yields the category holding only the
    /// `NoDifferences` sentinel.
    pub fn build(entries: Vec<DifferenceEntry>, category: &CategoryLabel) -> Self {
        let real: Vec<Arc<DifferenceEntry>> = entries.into_iter().map(Arc::new).collect();
        let has_differences = !real.is_empty();

        let children = if has_differences {
            real.iter().cloned().map(DiffNode::Leaf).collect()
        } else {
            vec![DiffNode::NoDifferences]
        };

        Self {
            nodes: vec![DiffNode::Category {
                label: category.label.clone(),
                tooltip: category.tooltip.clone(),
                has_differences,
                children,
            }],
            real,
        }
    }

    /// A tree with no rows at all, used when nothing is being compared.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[DiffNode] {
        &self.nodes
    }

    pub fn real_differences(&self) -> &[Arc<DifferenceEntry>] {
        &self.real
    }

    pub fn has_differences(&self) -> bool {
        !self.real.is_empty()
    }

    /// Index of the real difference for `path`.
    pub fn position_of(&self, path: &PropertyPath) -> Option<usize> {
        self.real.iter().position(|e| &e.path == path)
    }

    /// Depth-first display rows.
    pub fn rows(&self) -> Vec<TreeRow<'_>> {
        fn walk<'a>(nodes: &'a [DiffNode], depth: usize, out: &mut Vec<TreeRow<'a>>) {
            for node in nodes {
                out.push(TreeRow { depth, node });
                walk(node.children(), depth + 1, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.nodes, 0, &mut out);
        out
    }

    /// Paths of all real differences, for restricting a details view.
    pub fn changed_paths(&self) -> Vec<PropertyPath> {
        self.real.iter().map(|e| e.path.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::ChangeKind;
    use serde_json::json;

    fn entry(path: &str, kind: ChangeKind) -> DifferenceEntry {
        DifferenceEntry {
            path: PropertyPath::parse(path).unwrap(),
            old: (kind != ChangeKind::Added).then(|| json!(1)),
            new: (kind != ChangeKind::Removed).then(|| json!(2)),
            kind,
        }
    }

    #[test]
    fn empty_entries_yield_sentinel_only() {
        let tree = DifferenceTree::build(Vec::new(), &CategoryLabel::default());

        assert!(tree.real_differences().is_empty());
        assert_eq!(tree.nodes().len(), 1);
        match &tree.nodes()[0] {
            DiffNode::Category {
                label,
                has_differences,
                children,
                ..
            } => {
                assert_eq!(label, "Defaults");
                assert!(!has_differences);
                assert_eq!(children, &vec![DiffNode::NoDifferences]);
            }
            other => panic!("expected category, got {other:?}"),
        }
        assert!(!tree.rows().iter().any(|r| r.node.is_real()));
    }

    #[test]
    fn leaves_are_real_and_ordered() {
        let tree = DifferenceTree::build(
            vec![
                entry("y", ChangeKind::Changed),
                entry("z", ChangeKind::Added),
                entry("a", ChangeKind::Removed),
            ],
            &CategoryLabel::default(),
        );

        assert_eq!(tree.real_differences().len(), 3);
        let real_rows: Vec<_> = tree
            .rows()
            .into_iter()
            .filter_map(|r| r.node.entry().cloned())
            .collect();
        assert_eq!(real_rows, tree.real_differences());
        assert_eq!(
            tree.changed_paths(),
            vec![
                PropertyPath::field("y"),
                PropertyPath::field("z"),
                PropertyPath::field("a")
            ]
        );
    }

    #[test]
    fn category_is_not_real() {
        let tree = DifferenceTree::build(vec![entry("x", ChangeKind::Changed)], &CategoryLabel::default());
        let rows = tree.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].depth, 0);
        assert!(!rows[0].node.is_real());
        assert_eq!(rows[1].depth, 1);
        assert!(rows[1].node.is_real());
    }

    #[test]
    fn custom_label_and_display_text() {
        let label = CategoryLabel {
            label: "Stats".into(),
            tooltip: "Stat changes".into(),
        };
        let tree = DifferenceTree::build(vec![entry("hp", ChangeKind::Changed)], &label);
        assert_eq!(tree.nodes()[0].display_text("Right Revision"), "Stats");
        assert_eq!(
            tree.rows()[1].node.display_text("Right Revision"),
            "hp: 1 → 2 (Right Revision)"
        );
        assert_eq!(DiffNode::NoDifferences.display_text(""), "No differences detected");
    }

    #[test]
    fn position_of_finds_real_difference() {
        let tree = DifferenceTree::build(
            vec![entry("a", ChangeKind::Changed), entry("b", ChangeKind::Changed)],
            &CategoryLabel::default(),
        );
        assert_eq!(tree.position_of(&PropertyPath::field("b")), Some(1));
        assert_eq!(tree.position_of(&PropertyPath::field("c")), None);
    }

    #[test]
    fn empty_tree_has_no_rows() {
        assert!(DifferenceTree::empty().rows().is_empty());
    }
}
