//! Property-level diff: compare two snapshots of an object's property set.
//!
//! Properties are enumerated from the old snapshot first, in declaration
//! order, then properties that exist only in the new snapshot are appended.
//! Each path is resolved independently against both sides.

use std::collections::HashSet;
use std::fmt;

use ahx_types::{PropertyPath, PropertySource, PropertyValue, TypeError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::text_diff::{diff_text, TextDiff};

/// How a property differs between the two snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    Changed,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => f.write_str("added"),
            Self::Removed => f.write_str("removed"),
            Self::Changed => f.write_str("changed"),
        }
    }
}

/// A single property difference. Immutable once produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DifferenceEntry {
    pub path: PropertyPath,
    pub old: Option<PropertyValue>,
    pub new: Option<PropertyValue>,
    pub kind: ChangeKind,
}

impl DifferenceEntry {
    /// Old value rendered for display, or `absent`.
    pub fn describe_old(&self) -> String {
        describe(self.old.as_ref())
    }

    /// New value rendered for display, or `absent`.
    pub fn describe_new(&self) -> String {
        describe(self.new.as_ref())
    }

    /// One-line description, e.g. `y: 2 → 3 (Right Revision)`.
    pub fn message(&self, label: &str) -> String {
        format!(
            "{}: {} → {} ({label})",
            self.path,
            self.describe_old(),
            self.describe_new()
        )
    }

    /// Line-level diff for multi-line string values.
    ///
    /// Returns `None` unless both sides are strings and at least one spans
    /// several lines.
    pub fn text_diff(&self) -> Option<TextDiff> {
        match (&self.old, &self.new) {
            (Some(PropertyValue::String(old)), Some(PropertyValue::String(new)))
                if old.contains('\n') || new.contains('\n') =>
            {
                Some(diff_text(old, new))
            }
            _ => None,
        }
    }
}

impl fmt::Display for DifferenceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {} → {}",
            self.kind,
            self.path,
            self.describe_old(),
            self.describe_new()
        )
    }
}

fn describe(value: Option<&PropertyValue>) -> String {
    match value {
        None => "absent".to_string(),
        Some(value) => value.to_string(),
    }
}

/// A property that could not be compared.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedProperty {
    pub path: PropertyPath,
    pub reason: String,
}

/// The result of comparing two snapshots.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Comparison {
    /// Differences in enumeration order.
    pub entries: Vec<DifferenceEntry>,
    /// Properties skipped because they could not be resolved on one side.
    pub skipped: Vec<UnresolvedProperty>,
}

impl Comparison {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn additions(&self) -> usize {
        self.count(ChangeKind::Added)
    }

    pub fn removals(&self) -> usize {
        self.count(ChangeKind::Removed)
    }

    pub fn modifications(&self) -> usize {
        self.count(ChangeKind::Changed)
    }

    /// Paths of every difference, for restricting a details view to the
    /// changed properties.
    pub fn changed_paths(&self) -> Vec<PropertyPath> {
        self.entries.iter().map(|e| e.path.clone()).collect()
    }

    fn count(&self, kind: ChangeKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }
}

/// Compare two snapshots.
///
/// Values present only in `old` are `Removed`, only in `new` are `Added`,
/// and present in both but unequal are `Changed`. Equal values are omitted.
/// A property whose path cannot be walked on either side is recorded in
/// [`Comparison::skipped`] and does not stop the comparison. The divergence
/// is reported instead at the deepest ancestor both snapshots hold, as one
/// `Changed` entry.
///
/// A path that nests inside, or contains, an already reported path is not
/// reported again.
pub fn compare<O, N>(old: &O, new: &N) -> Comparison
where
    O: PropertySource + ?Sized,
    N: PropertySource + ?Sized,
{
    let mut comparison = Comparison::default();

    let old_paths = old.enumerate_properties();
    let seen: HashSet<PropertyPath> = old_paths.iter().cloned().collect();
    let new_only = new
        .enumerate_properties()
        .into_iter()
        .filter(|path| !seen.contains(path));

    for path in old_paths.iter().cloned().chain(new_only) {
        if overlaps_reported(&comparison.entries, &path) {
            continue;
        }
        if let Err(error) = classify(&path, old, new, &mut comparison) {
            skip(&path, error, &mut comparison);
            report_divergence(&path, old, new, &mut comparison);
        }
    }

    debug!(
        differences = comparison.entries.len(),
        skipped = comparison.skipped.len(),
        "snapshot comparison complete"
    );
    comparison
}

fn overlaps_reported(entries: &[DifferenceEntry], path: &PropertyPath) -> bool {
    entries
        .iter()
        .any(|e| e.path.starts_with(path) || path.starts_with(&e.path))
}

fn classify<O, N>(
    path: &PropertyPath,
    old: &O,
    new: &N,
    out: &mut Comparison,
) -> Result<(), TypeError>
where
    O: PropertySource + ?Sized,
    N: PropertySource + ?Sized,
{
    let old_value = old.resolve(path)?;
    let new_value = new.resolve(path)?;

    let kind = match (&old_value, &new_value) {
        (Some(o), Some(n)) if o == n => return Ok(()),
        (Some(_), Some(_)) => ChangeKind::Changed,
        (Some(_), None) => ChangeKind::Removed,
        (None, Some(_)) => ChangeKind::Added,
        (None, None) => {
            out.skipped.push(UnresolvedProperty {
                path: path.clone(),
                reason: "absent from both snapshots".into(),
            });
            return Ok(());
        }
    };

    out.entries.push(DifferenceEntry {
        path: path.clone(),
        old: old_value,
        new: new_value,
        kind,
    });
    Ok(())
}

/// Walk up from an unresolvable `path` to the first ancestor that resolves
/// on both sides, and report it as `Changed` if the two values differ.
///
/// The root is never reported.
fn report_divergence<O, N>(path: &PropertyPath, old: &O, new: &N, out: &mut Comparison)
where
    O: PropertySource + ?Sized,
    N: PropertySource + ?Sized,
{
    let mut ancestor = path.parent();
    while let Some(candidate) = ancestor.take() {
        if candidate.is_root() {
            return;
        }
        match (old.resolve(&candidate), new.resolve(&candidate)) {
            (Ok(Some(o)), Ok(Some(n))) => {
                if o != n && !overlaps_reported(&out.entries, &candidate) {
                    debug!(property = %candidate, below = %path, "reporting shape divergence");
                    out.entries.push(DifferenceEntry {
                        path: candidate,
                        old: Some(o),
                        new: Some(n),
                        kind: ChangeKind::Changed,
                    });
                }
                return;
            }
            (Ok(_), Ok(_)) => return,
            _ => ancestor = candidate.parent(),
        }
    }
}

fn skip(path: &PropertyPath, error: TypeError, out: &mut Comparison) {
    debug!(property = %path, error = %error, "skipping unresolvable property");
    let reason = match error {
        TypeError::PropertyUnresolvable { reason, .. } => reason,
        other => other.to_string(),
    };
    out.skipped.push(UnresolvedProperty {
        path: path.clone(),
        reason,
    });
}
