//! Line-level diff for multi-line text property values.
//!
//! Uses the `similar` crate (Myers diff algorithm) to produce structured
//! hunks with context lines.

use similar::{ChangeTag, DiffOp, TextDiff as SimilarDiff};

/// Number of unchanged lines kept around each change.
const CONTEXT_LINES: usize = 3;

/// The result of diffing two text values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextDiff {
    pub hunks: Vec<TextHunk>,
    pub old_lines: usize,
    pub new_lines: usize,
}

impl TextDiff {
    /// Returns `true` if the two texts are identical.
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    pub fn additions(&self) -> usize {
        self.lines()
            .filter(|l| matches!(l, TextLine::Added(_)))
            .count()
    }

    pub fn deletions(&self) -> usize {
        self.lines()
            .filter(|l| matches!(l, TextLine::Removed(_)))
            .count()
    }

    fn lines(&self) -> impl Iterator<Item = &TextLine> {
        self.hunks.iter().flat_map(|h| &h.lines)
    }
}

/// A contiguous region of changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextHunk {
    /// 1-based start line in the old text.
    pub old_start: usize,
    pub old_count: usize,
    /// 1-based start line in the new text.
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<TextLine>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TextLine {
    Context(String),
    Added(String),
    Removed(String),
}

impl TextLine {
    fn new(tag: ChangeTag, line: &str) -> Self {
        let text = line.strip_suffix('\n').unwrap_or(line).to_string();
        match tag {
            ChangeTag::Equal => Self::Context(text),
            ChangeTag::Delete => Self::Removed(text),
            ChangeTag::Insert => Self::Added(text),
        }
    }
}

/// Compute a line-by-line diff between two strings.
pub fn diff_text(old: &str, new: &str) -> TextDiff {
    let hunks = if old == new {
        Vec::new()
    } else {
        let diff = SimilarDiff::from_lines(old, new);
        diff.grouped_ops(CONTEXT_LINES)
            .iter()
            .filter_map(|group| hunk(&diff, group))
            .collect()
    };

    TextDiff {
        hunks,
        old_lines: old.lines().count(),
        new_lines: new.lines().count(),
    }
}

/// One hunk spanning a group of ops. Line counts come from the ops' ranges,
/// which already include the surrounding context.
fn hunk(diff: &SimilarDiff<'_, '_, '_, str>, group: &[DiffOp]) -> Option<TextHunk> {
    let (first, last) = (group.first()?, group.last()?);
    let old = first.old_range().start..last.old_range().end;
    let new = first.new_range().start..last.new_range().end;

    Some(TextHunk {
        old_start: old.start + 1,
        old_count: old.len(),
        new_start: new.start + 1,
        new_count: new.len(),
        lines: group
            .iter()
            .flat_map(|op| diff.iter_changes(op))
            .map(|change| TextLine::new(change.tag(), change.value()))
            .collect(),
    })
}
