//! Property-set capability and the JSON-backed snapshot.
//!
//! The comparator never sees concrete asset types. Anything that can list
//! its properties and resolve a [`PropertyPath`] implements
//! [`PropertySource`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TypeError;
use crate::path::{PathSegment, PropertyPath};

/// The value of a single property. Equality is value-semantic.
pub type PropertyValue = Value;

/// Outcome of resolving a path that did not hit a shape divergence.
pub type Resolution = Result<Option<PropertyValue>, TypeError>;

/// A snapshot shared between the session, the comparator and the UI layer.
pub type SharedSnapshot = Arc<dyn PropertySource>;

/// Read-only view over an object's property set.
///
/// `resolve` distinguishes three outcomes:
///
/// - `Ok(Some(value))`: the property exists.
/// - `Ok(None)`: the property is absent in this snapshot.
/// - `Err(TypeError::PropertyUnresolvable)`: the path cannot be walked against
///   this snapshot's shape. Callers treat this as per-property and recoverable.
pub trait PropertySource: Send + Sync + fmt::Debug {
    /// A short display name for the object (used in titles and messages).
    fn object_name(&self) -> &str;

    /// Every property path reachable from this snapshot, in declaration order.
    fn enumerate_properties(&self) -> Vec<PropertyPath>;

    /// Resolve one property path against this snapshot.
    fn resolve(&self, path: &PropertyPath) -> Resolution;
}

/// How [`JsonSnapshot`] decides where enumeration stops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumerationOptions {
    /// Report whole arrays as single properties instead of descending into
    /// their elements.
    pub atomic_arrays: bool,
    /// Stop descending at this depth; the value found there is reported as
    /// one property. The root is always descended, so `Some(0)` behaves like
    /// `Some(1)`.
    pub max_depth: Option<usize>,
}

/// A snapshot over a JSON object tree.
///
/// Field order is document order, which is the declaration order the
/// comparator enumerates in. Leaves are scalars, `null`, empty objects and
/// empty arrays, plus anything cut off by [`EnumerationOptions`].
#[derive(Clone, Debug, PartialEq)]
pub struct JsonSnapshot {
    name: String,
    root: Value,
    options: EnumerationOptions,
}

impl JsonSnapshot {
    /// Wrap a JSON value. The root must be an object.
    pub fn new(name: impl Into<String>, root: Value) -> Result<Self, TypeError> {
        if !root.is_object() {
            return Err(TypeError::NotAnObject(kind_name(&root).to_string()));
        }
        Ok(Self {
            name: name.into(),
            root,
            options: EnumerationOptions::default(),
        })
    }

    /// Parse a snapshot from JSON text.
    pub fn from_json_str(name: impl Into<String>, text: &str) -> Result<Self, TypeError> {
        let root: Value = serde_json::from_str(text)
            .map_err(|e| TypeError::InvalidJson(e.to_string()))?;
        Self::new(name, root)
    }

    pub fn with_options(mut self, options: EnumerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> EnumerationOptions {
        self.options
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn into_shared(self) -> SharedSnapshot {
        Arc::new(self)
    }

    fn collect_leaves(&self, value: &Value, path: PropertyPath, out: &mut Vec<PropertyPath>) {
        let at_limit = self
            .options
            .max_depth
            .is_some_and(|max| !path.is_root() && path.depth() >= max);

        match value {
            Value::Object(map) if !map.is_empty() && !at_limit => {
                for (key, child) in map {
                    self.collect_leaves(child, path.with_field(key.clone()), out);
                }
            }
            Value::Array(items) if !items.is_empty() && !at_limit && !self.options.atomic_arrays => {
                for (i, child) in items.iter().enumerate() {
                    self.collect_leaves(child, path.with_index(i), out);
                }
            }
            _ => {
                if !path.is_root() {
                    out.push(path);
                }
            }
        }
    }
}

impl PropertySource for JsonSnapshot {
    fn object_name(&self) -> &str {
        &self.name
    }

    fn enumerate_properties(&self) -> Vec<PropertyPath> {
        let mut out = Vec::new();
        self.collect_leaves(&self.root, PropertyPath::root(), &mut out);
        out
    }

    fn resolve(&self, path: &PropertyPath) -> Resolution {
        let mut current = &self.root;
        for segment in path.segments() {
            let next = match (segment, current) {
                (PathSegment::Field(name), Value::Object(map)) => map.get(name),
                (PathSegment::Index(i), Value::Array(items)) => items.get(*i),
                (segment, other) => {
                    return Err(TypeError::PropertyUnresolvable {
                        path: path.clone(),
                        reason: format!("cannot apply `{segment}` to {}", kind_name(other)),
                    });
                }
            };
            match next {
                Some(value) => current = value,
                None => return Ok(None),
            }
        }
        Ok(Some(current.clone()))
    }
}

impl Default for JsonSnapshot {
    fn default() -> Self {
        Self {
            name: String::new(),
            root: Value::Object(Map::new()),
            options: EnumerationOptions::default(),
        }
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(value: Value) -> JsonSnapshot {
        JsonSnapshot::new("Sword", value).unwrap()
    }

    fn paths(snapshot: &JsonSnapshot) -> Vec<String> {
        snapshot
            .enumerate_properties()
            .iter()
            .map(|p| p.to_string())
            .collect()
    }

    #[test]
    fn rejects_non_object_root() {
        assert!(matches!(
            JsonSnapshot::new("x", json!([1, 2])),
            Err(TypeError::NotAnObject(_))
        ));
    }

    #[test]
    fn enumerates_leaves_in_document_order() {
        let s = snapshot(json!({
            "zeta": 1,
            "alpha": {"b": true, "a": null},
            "list": [10, {"w": 2}],
            "empty": {}
        }));
        assert_eq!(
            paths(&s),
            vec!["zeta", "alpha.b", "alpha.a", "list[0]", "list[1].w", "empty"]
        );
    }

    #[test]
    fn atomic_arrays_stop_at_the_array() {
        let s = snapshot(json!({"tags": ["a", "b"], "n": 1})).with_options(EnumerationOptions {
            atomic_arrays: true,
            max_depth: None,
        });
        assert_eq!(paths(&s), vec!["tags", "n"]);
    }

    #[test]
    fn max_depth_truncates_descent() {
        let s = snapshot(json!({"a": {"b": {"c": 1}}, "d": 2})).with_options(EnumerationOptions {
            atomic_arrays: false,
            max_depth: Some(2),
        });
        assert_eq!(paths(&s), vec!["a.b", "d"]);
    }

    #[test]
    fn zero_max_depth_still_lists_top_level_properties() {
        let s = snapshot(json!({"a": {"b": 1}, "x": 1})).with_options(EnumerationOptions {
            atomic_arrays: false,
            max_depth: Some(0),
        });
        assert_eq!(paths(&s), vec!["a", "x"]);
    }

    #[test]
    fn resolve_present_and_absent() {
        let s = snapshot(json!({"stats": {"hp": 10}, "drops": [1, 2]}));
        assert_eq!(
            s.resolve(&PropertyPath::parse("stats.hp").unwrap()).unwrap(),
            Some(json!(10))
        );
        assert_eq!(s.resolve(&PropertyPath::parse("stats.mp").unwrap()).unwrap(), None);
        assert_eq!(s.resolve(&PropertyPath::parse("drops[5]").unwrap()).unwrap(), None);
        assert_eq!(s.resolve(&PropertyPath::parse("missing.deep").unwrap()).unwrap(), None);
    }

    #[test]
    fn resolve_through_wrong_shape_is_unresolvable() {
        let s = snapshot(json!({"stats": 5, "drops": {"a": 1}}));
        let err = s.resolve(&PropertyPath::parse("stats.hp").unwrap()).unwrap_err();
        assert!(matches!(err, TypeError::PropertyUnresolvable { .. }));
        let err = s.resolve(&PropertyPath::parse("drops[0]").unwrap()).unwrap_err();
        assert!(err.to_string().contains("an object"));
    }

    #[test]
    fn every_enumerated_path_resolves() {
        let s = snapshot(json!({"a": [1, [2, 3]], "b": {"c": {"d": "x"}}}));
        for path in s.enumerate_properties() {
            assert!(s.resolve(&path).unwrap().is_some(), "{path} did not resolve");
        }
    }
}
