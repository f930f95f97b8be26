//! The document model.
//!
//! A [`Document`] is a JSON-like tree. Collections sit behind [`Arc`] so that
//! cloning a document is cheap and edits copy only the nodes along the edited
//! path (`Arc::make_mut`); untouched subtrees stay shared between branches.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::{CoreError, CoreResult};
use crate::path::{Path, Segment};

/// Keyed children of a mapping node. Keys iterate in sorted order.
pub type Mapping = BTreeMap<String, Document>;

/// A node of a structured document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum Document {
    /// Also stands for "unknown / not yet defined".
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Sequence(Arc<Vec<Document>>),
    Mapping(Arc<Mapping>),
}

impl Document {
    pub fn mapping<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Document)>,
    {
        Document::Mapping(Arc::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn sequence(items: impl IntoIterator<Item = Document>) -> Self {
        Document::Sequence(Arc::new(items.into_iter().collect()))
    }

    pub fn empty_mapping() -> Self {
        Document::Mapping(Arc::new(Mapping::new()))
    }

    /// Short name of the node kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Document::Null => "null",
            Document::Bool(_) => "boolean",
            Document::Number(_) => "number",
            Document::String(_) => "string",
            Document::Sequence(_) => "sequence",
            Document::Mapping(_) => "mapping",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Document::Null)
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Document::Sequence(_) | Document::Mapping(_))
    }

    /// Falsy values are `null`, `false`, zero, `""` and empty collections.
    pub fn is_truthy(&self) -> bool {
        match self {
            Document::Null => false,
            Document::Bool(b) => *b,
            Document::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
            Document::String(s) => !s.is_empty(),
            Document::Sequence(items) => !items.is_empty(),
            Document::Mapping(map) => !map.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Document::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Document::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Document::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Document::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Document]> {
        match self {
            Document::Sequence(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Document::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a mapping key.
    pub fn get(&self, key: &str) -> Option<&Document> {
        self.as_mapping().and_then(|map| map.get(key))
    }

    /// Look up the node at `path` without creating anything.
    pub fn node(&self, path: &Path) -> Option<&Document> {
        let mut node = self;
        for segment in path.segments() {
            node = match (node, segment) {
                (Document::Mapping(map), segment) => map.get(&segment.as_key())?,
                (Document::Sequence(items), Segment::Index(index)) => items.get(*index)?,
                _ => return None,
            };
        }
        Some(node)
    }

    /// Immediate children with their segments: mapping keys in sorted order,
    /// sequence indices ascending. Scalars have none.
    pub fn children(&self) -> Vec<(Segment, &Document)> {
        match self {
            Document::Mapping(map) => map
                .iter()
                .map(|(key, child)| (Segment::from_token(key), child))
                .collect(),
            Document::Sequence(items) => items
                .iter()
                .enumerate()
                .map(|(index, child)| (Segment::Index(index), child))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Return a copy of this document in which `path` exists.
    ///
    /// Missing mapping keys, and `null` nodes traversed by key, are created
    /// as `null`. When the path already resolves the document is returned
    /// with all of its structure still shared.
    pub fn materialize(&self, path: &Path) -> CoreResult<Document> {
        if self.node(path).is_some() {
            return Ok(self.clone());
        }
        let mut root = self.clone();
        root.node_mut(path)?;
        Ok(root)
    }

    /// Return a copy of this document with the node at `path` replaced.
    pub fn with_node(&self, path: &Path, value: Document) -> CoreResult<Document> {
        let mut root = self.clone();
        *root.node_mut(path)? = value;
        Ok(root)
    }

    /// Return a copy of this document with `value` added to the sequence at
    /// `path`. Values already present are not added twice.
    pub fn with_appended(&self, path: &Path, value: Document) -> CoreResult<Document> {
        let mut root = self.clone();
        let node = root.node_mut(path)?;
        match node {
            Document::Null => *node = Document::sequence([value]),
            Document::Sequence(items) => {
                if !items.contains(&value) {
                    Arc::make_mut(items).push(value);
                }
            }
            other => {
                return Err(CoreError::NotACollection {
                    path: path.to_string(),
                    kind: other.kind(),
                })
            }
        }
        Ok(root)
    }

    /// Walk to `path`, copying shared nodes on the way and creating missing
    /// mapping entries.
    fn node_mut(&mut self, path: &Path) -> CoreResult<&mut Document> {
        let mut node = self;
        for (depth, segment) in path.segments().iter().enumerate() {
            if node.is_null() {
                if let Segment::Key(_) = segment {
                    *node = Document::empty_mapping();
                }
            }
            node = match (node, segment) {
                (Document::Mapping(map), segment) => Arc::make_mut(map)
                    .entry(segment.as_key())
                    .or_insert(Document::Null),
                (Document::Sequence(items), Segment::Index(index)) => {
                    match Arc::make_mut(items).get_mut(*index) {
                        Some(item) => item,
                        None => {
                            return Err(CoreError::PathNotFound {
                                path: path.prefix(depth + 1).to_string(),
                            })
                        }
                    }
                }
                _ => {
                    return Err(CoreError::PathNotFound {
                        path: path.prefix(depth + 1).to_string(),
                    })
                }
            };
        }
        Ok(node)
    }

    /// True when both documents share the same allocation for a collection,
    /// or are equal scalars.
    pub fn ptr_eq(&self, other: &Document) -> bool {
        match (self, other) {
            (Document::Sequence(a), Document::Sequence(b)) => Arc::ptr_eq(a, b),
            (Document::Mapping(a), Document::Mapping(b)) => Arc::ptr_eq(a, b),
            (a, b) if !a.is_collection() && !b.is_collection() => a == b,
            _ => false,
        }
    }
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Document::Null,
            Value::Bool(b) => Document::Bool(b),
            Value::Number(n) => Document::Number(n),
            Value::String(s) => Document::String(s),
            Value::Array(items) => Document::sequence(items.into_iter().map(Document::from)),
            Value::Object(map) => {
                Document::mapping(map.into_iter().map(|(k, v)| (k, Document::from(v))))
            }
        }
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::from(&doc)
    }
}

impl From<&Document> for Value {
    fn from(doc: &Document) -> Self {
        match doc {
            Document::Null => Value::Null,
            Document::Bool(b) => Value::Bool(*b),
            Document::Number(n) => Value::Number(n.clone()),
            Document::String(s) => Value::String(s.clone()),
            Document::Sequence(items) => Value::Array(items.iter().map(Value::from).collect()),
            Document::Mapping(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Document {
    fn from(s: &str) -> Self {
        Document::String(s.to_string())
    }
}

impl From<String> for Document {
    fn from(s: String) -> Self {
        Document::String(s)
    }
}

impl From<bool> for Document {
    fn from(b: bool) -> Self {
        Document::Bool(b)
    }
}

impl From<i64> for Document {
    fn from(n: i64) -> Self {
        Document::Number(n.into())
    }
}

impl From<i32> for Document {
    fn from(n: i32) -> Self {
        Document::Number(n.into())
    }
}

impl From<u64> for Document {
    fn from(n: u64) -> Self {
        Document::Number(n.into())
    }
}

impl From<f64> for Document {
    fn from(n: f64) -> Self {
        Number::from_f64(n).map_or(Document::Null, Document::Number)
    }
}

impl From<Vec<Document>> for Document {
    fn from(items: Vec<Document>) -> Self {
        Document::Sequence(Arc::new(items))
    }
}

impl From<Mapping> for Document {
    fn from(map: Mapping) -> Self {
        Document::Mapping(Arc::new(map))
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::from(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from(value)
    }

    #[test]
    fn test_json_conversion() {
        let value = json!({"a": [1, 2, {"b": null}], "c": "x"});
        let document = doc(value.clone());
        assert_eq!(Value::from(&document), value);
        assert_eq!(document.to_string(), value.to_string());
    }

    #[test]
    fn test_truthiness() {
        assert!(!Document::Null.is_truthy());
        assert!(!doc(json!(false)).is_truthy());
        assert!(!doc(json!(0)).is_truthy());
        assert!(!doc(json!(0.0)).is_truthy());
        assert!(!doc(json!("")).is_truthy());
        assert!(!doc(json!([])).is_truthy());
        assert!(!doc(json!({})).is_truthy());
        assert!(doc(json!("x")).is_truthy());
        assert!(doc(json!([0])).is_truthy());
    }

    #[test]
    fn test_node_lookup() {
        let document = doc(json!({"a": {"b": [10, 20]}}));
        let path = Path::parse("/a/b/1").unwrap();
        assert_eq!(document.node(&path), Some(&Document::from(20)));
        assert_eq!(document.node(&Path::parse("/a/x").unwrap()), None);
        assert_eq!(document.node(&Path::parse("/a/b/5").unwrap()), None);
    }

    #[test]
    fn test_materialize_creates_missing_keys() {
        let document = doc(json!({"a": null}));
        let created = document.materialize(&Path::parse("/a/b/c").unwrap()).unwrap();
        assert_eq!(Value::from(&created), json!({"a": {"b": {"c": null}}}));
        // Original untouched.
        assert_eq!(Value::from(&document), json!({"a": null}));
    }

    #[test]
    fn test_materialize_faults() {
        let document = doc(json!({"s": 3, "list": [1], "n": null}));
        for selector in ["/s/x", "/list/4", "/n/0"] {
            let err = document
                .materialize(&Path::parse(selector).unwrap())
                .unwrap_err();
            assert!(matches!(err, CoreError::PathNotFound { .. }), "{selector}");
        }
    }

    #[test]
    fn test_with_node_shares_untouched_subtrees() {
        let document = doc(json!({"left": {"deep": [1, 2, 3]}, "right": {"x": 1}}));
        let edited = document
            .with_node(&Path::parse("/right/x").unwrap(), Document::from(2))
            .unwrap();

        assert_eq!(edited.node(&Path::parse("/right/x").unwrap()), Some(&Document::from(2)));
        assert_eq!(document.node(&Path::parse("/right/x").unwrap()), Some(&Document::from(1)));

        let left_before = document.get("left").unwrap();
        let left_after = edited.get("left").unwrap();
        assert!(left_before.ptr_eq(left_after));
    }

    #[test]
    fn test_append_is_idempotent() {
        let path = Path::parse("/tags").unwrap();
        let document = doc(json!({"tags": null}));
        let once = document.with_appended(&path, "x".into()).unwrap();
        let twice = once.with_appended(&path, "x".into()).unwrap();
        assert_eq!(Value::from(&twice), json!({"tags": ["x"]}));

        let mapping = doc(json!({"tags": {}}));
        assert!(matches!(
            mapping.with_appended(&path, "x".into()),
            Err(CoreError::NotACollection { kind: "mapping", .. })
        ));
    }

    #[test]
    fn test_children_order() {
        let document = doc(json!({"b": 2, "a": 1}));
        let keys: Vec<String> = document.children().iter().map(|(s, _)| s.as_key()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert!(doc(json!(5)).children().is_empty());
    }
}
