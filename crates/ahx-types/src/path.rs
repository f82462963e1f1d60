use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// One step of a [`PropertyPath`].
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum PathSegment {
    /// A named field of a structured value.
    Field(String),
    /// A position inside a sequence value.
    Index(usize),
}

impl PathSegment {
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) if needs_quoting(name) => write_quoted(f, name),
            Self::Field(name) => write!(f, "{name}"),
            Self::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// Field names that would not survive the bare dotted form.
fn needs_quoting(name: &str) -> bool {
    name.is_empty() || name.contains(['.', '[', ']'])
}

/// `["a.b"]`, with the name escaped as a JSON string.
fn write_quoted(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    let quoted = serde_json::to_string(name).map_err(|_| fmt::Error)?;
    write!(f, "[{quoted}]")
}

/// Structural identifier of a single (possibly nested) property.
///
/// A path names a property by its position in an object's shape, never by
/// its value, so the same path can be resolved independently against two
/// snapshots of compatible shape. Equality is segment-wise.
///
/// The text form is dotted fields with bracketed indices:
/// `stats.damage[2].min`. A field name that is empty or contains `.`, `[`
/// or `]` is written as a bracketed JSON string, `loot["a.b"]`, so every
/// path parses back to itself.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PropertyPath(Vec<PathSegment>);

impl PropertyPath {
    /// The empty path, addressing the snapshot root.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }

    /// A single-field path.
    pub fn field(name: impl Into<String>) -> Self {
        Self(vec![PathSegment::Field(name.into())])
    }

    /// Return a new path extended by one segment.
    pub fn child(&self, segment: PathSegment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    pub fn with_field(&self, name: impl Into<String>) -> Self {
        self.child(PathSegment::Field(name.into()))
    }

    pub fn with_index(&self, index: usize) -> Self {
        self.child(PathSegment::Index(index))
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// The path one level up, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Returns `true` if `self` is `other` or lies underneath it.
    pub fn starts_with(&self, other: &PropertyPath) -> bool {
        self.0.starts_with(&other.0)
    }

    /// Parse the dotted/indexed text form.
    pub fn parse(input: &str) -> Result<Self, TypeError> {
        let invalid = |reason: &str| TypeError::InvalidPath {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        if input.is_empty() {
            return Ok(Self::root());
        }

        let mut segments = Vec::new();
        let mut chars = input.char_indices();
        let mut field_start: Option<usize> = Some(0);
        // Set after `]` so that `a[0].b` and `a[0][1]` are accepted but `a[0]b` is not.
        let mut after_index = false;

        while let Some((pos, c)) = chars.next() {
            match c {
                '.' => {
                    match field_start.take() {
                        Some(start) => {
                            if start == pos {
                                return Err(invalid("empty field name"));
                            }
                            segments.push(PathSegment::Field(input[start..pos].to_string()));
                        }
                        None if !after_index => return Err(invalid("empty field name")),
                        None => {}
                    }
                    after_index = false;
                    field_start = Some(pos + 1);
                }
                '[' => {
                    if let Some(start) = field_start.take() {
                        if start < pos {
                            segments.push(PathSegment::Field(input[start..pos].to_string()));
                        } else if pos != 0 {
                            // `a.[0]`; a leading `[0]` addresses a root sequence.
                            return Err(invalid("index must follow a field"));
                        }
                    }
                    if input[pos + 1..].starts_with('"') {
                        let name = parse_quoted(input, pos + 1, &mut chars).map_err(invalid)?;
                        segments.push(PathSegment::Field(name));
                        after_index = true;
                        continue;
                    }
                    let digits_start = pos + 1;
                    let mut end = None;
                    for (p, ch) in chars.by_ref() {
                        if ch == ']' {
                            end = Some(p);
                            break;
                        }
                    }
                    let end = end.ok_or_else(|| invalid("unterminated index"))?;
                    let digits = &input[digits_start..end];
                    let index = digits
                        .parse::<usize>()
                        .map_err(|_| invalid("index is not a non-negative integer"))?;
                    segments.push(PathSegment::Index(index));
                    after_index = true;
                }
                ']' => return Err(invalid("unbalanced ']'")),
                _ => {
                    if after_index {
                        return Err(invalid("expected '.' or '[' after index"));
                    }
                    if field_start.is_none() {
                        field_start = Some(pos);
                    }
                }
            }
        }

        if let Some(start) = field_start {
            if start == input.len() {
                return Err(invalid("empty field name"));
            }
            segments.push(PathSegment::Field(input[start..].to_string()));
        }

        Ok(Self(segments))
    }
}

/// Consume `"..."]` starting at the opening quote at byte `quote`.
fn parse_quoted(
    input: &str,
    quote: usize,
    chars: &mut std::str::CharIndices<'_>,
) -> Result<String, &'static str> {
    chars.next();
    let mut escaped = false;
    let mut close = None;
    for (p, ch) in chars.by_ref() {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => {
                close = Some(p);
                break;
            }
            _ => {}
        }
    }
    let close = close.ok_or("unterminated quoted field")?;
    if !matches!(chars.next(), Some((_, ']'))) {
        return Err("expected ']' after quoted field");
    }
    serde_json::from_str(&input[quote..=close]).map_err(|_| "invalid escape in quoted field")
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Field(name) if i > 0 && !needs_quoting(name) => write!(f, ".{name}")?,
                other => write!(f, "{other}")?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyPath({self})")
    }
}

impl FromStr for PropertyPath {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PropertyPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PropertyPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
