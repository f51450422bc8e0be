//! Property values and nested property trees.
//!
//! A [`PropertyTree`] is the unit everything in a twin is made of: the
//! desired bag, the reported bag, tags, and every diff handed to callers.
//! Values are a closed set ([`TwinValue`]); JSON arrays have no
//! representation and are rejected when converting from JSON.

use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Number, Value};
use std::collections::btree_map::{self, BTreeMap};
use std::fmt;

use crate::TwinError;

/// A single property value.
///
/// `Null` is a tombstone: in an update it deletes the key, and it is never
/// kept in a store.
#[derive(Debug, Clone, PartialEq)]
pub enum TwinValue {
    /// Delete instruction.
    Null,
    /// Boolean leaf.
    Bool(bool),
    /// Numeric leaf (integer or float, as written).
    Number(Number),
    /// String leaf.
    String(String),
    /// Nested tree.
    Tree(PropertyTree),
}

impl TwinValue {
    /// Build a numeric value from a float. Returns `None` for NaN or infinity.
    pub fn from_f64(value: f64) -> Option<Self> {
        Number::from_f64(value).map(TwinValue::Number)
    }

    /// Whether this is a tombstone.
    pub fn is_null(&self) -> bool {
        matches!(self, TwinValue::Null)
    }

    /// Borrow the nested tree, if this is one.
    pub fn as_tree(&self) -> Option<&PropertyTree> {
        match self {
            TwinValue::Tree(tree) => Some(tree),
            _ => None,
        }
    }

    /// Borrow the string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TwinValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Read an integer leaf.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TwinValue::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    /// Read a boolean leaf.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TwinValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Short name of the value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            TwinValue::Null => "null",
            TwinValue::Bool(_) => "boolean",
            TwinValue::Number(_) => "number",
            TwinValue::String(_) => "string",
            TwinValue::Tree(_) => "tree",
        }
    }

    /// Convert to a `serde_json::Value`.
    pub fn to_json_value(&self) -> Value {
        match self {
            TwinValue::Null => Value::Null,
            TwinValue::Bool(b) => Value::Bool(*b),
            TwinValue::Number(n) => Value::Number(n.clone()),
            TwinValue::String(s) => Value::String(s.clone()),
            TwinValue::Tree(tree) => tree.to_json_value(),
        }
    }

    /// Convert a JSON value held under `key`.
    ///
    /// The key only labels the error; arrays anywhere below are rejected.
    pub fn from_json(key: &str, value: Value) -> Result<Self, TwinError> {
        match value {
            Value::Null => Ok(TwinValue::Null),
            Value::Bool(b) => Ok(TwinValue::Bool(b)),
            Value::Number(n) => Ok(TwinValue::Number(n)),
            Value::String(s) => Ok(TwinValue::String(s)),
            Value::Object(map) => PropertyTree::from_json_map(map).map(TwinValue::Tree),
            Value::Array(_) => Err(TwinError::InvalidValueType {
                key: key.to_string(),
                found: "array",
            }),
        }
    }
}

impl From<bool> for TwinValue {
    fn from(value: bool) -> Self {
        TwinValue::Bool(value)
    }
}

impl From<i32> for TwinValue {
    fn from(value: i32) -> Self {
        TwinValue::Number(value.into())
    }
}

impl From<i64> for TwinValue {
    fn from(value: i64) -> Self {
        TwinValue::Number(value.into())
    }
}

impl From<u32> for TwinValue {
    fn from(value: u32) -> Self {
        TwinValue::Number(value.into())
    }
}

impl From<u64> for TwinValue {
    fn from(value: u64) -> Self {
        TwinValue::Number(value.into())
    }
}

impl From<Number> for TwinValue {
    fn from(value: Number) -> Self {
        TwinValue::Number(value)
    }
}

impl From<&str> for TwinValue {
    fn from(value: &str) -> Self {
        TwinValue::String(value.to_string())
    }
}

impl From<String> for TwinValue {
    fn from(value: String) -> Self {
        TwinValue::String(value)
    }
}

impl From<PropertyTree> for TwinValue {
    fn from(value: PropertyTree) -> Self {
        TwinValue::Tree(value)
    }
}

impl<T: Into<TwinValue>> From<Option<T>> for TwinValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(TwinValue::Null, Into::into)
    }
}

impl TryFrom<Value> for TwinValue {
    type Error = TwinError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        TwinValue::from_json("", value)
    }
}

impl Serialize for TwinValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TwinValue::Null => serializer.serialize_unit(),
            TwinValue::Bool(b) => serializer.serialize_bool(*b),
            TwinValue::Number(n) => n.serialize(serializer),
            TwinValue::String(s) => serializer.serialize_str(s),
            TwinValue::Tree(tree) => tree.serialize(serializer),
        }
    }
}

/// A mapping from key to [`TwinValue`].
///
/// Keys are case-sensitive and unique. Iteration is in key order so encoded
/// output is deterministic; insertion order carries no meaning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyTree(BTreeMap<String, TwinValue>);

impl PropertyTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<TwinValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a value, returning the previous one.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<TwinValue>,
    ) -> Option<TwinValue> {
        self.0.insert(key.into(), value.into())
    }

    /// Look up a direct child.
    pub fn get(&self, key: &str) -> Option<&TwinValue> {
        self.0.get(key)
    }

    /// Look up a value by path of keys.
    pub fn get_path(&self, path: &[&str]) -> Option<&TwinValue> {
        let (last, parents) = path.split_last()?;
        let mut tree = self;
        for key in parents {
            tree = tree.get(key)?.as_tree()?;
        }
        tree.get(last)
    }

    /// Mutable lookup of a direct child.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut TwinValue> {
        self.0.get_mut(key)
    }

    /// Remove a direct child.
    pub fn remove(&mut self, key: &str) -> Option<TwinValue> {
        self.0.remove(key)
    }

    /// Whether a direct child exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of direct children.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the tree has no children.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over direct children in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, TwinValue> {
        self.0.iter()
    }

    /// Iterate over keys in order.
    pub fn keys(&self) -> btree_map::Keys<'_, String, TwinValue> {
        self.0.keys()
    }

    /// Copy of this tree with every tombstone removed, at every depth.
    ///
    /// Branches are kept even if pruning leaves them empty.
    pub fn without_tombstones(&self) -> PropertyTree {
        let mut out = PropertyTree::new();
        for (key, value) in self.iter() {
            match value {
                TwinValue::Null => {}
                TwinValue::Tree(child) => {
                    out.insert(key.clone(), child.without_tombstones());
                }
                leaf => {
                    out.insert(key.clone(), leaf.clone());
                }
            }
        }
        out
    }

    /// Convert a JSON object map, rejecting arrays at any depth.
    pub fn from_json_map(map: Map<String, Value>) -> Result<Self, TwinError> {
        let mut tree = PropertyTree::new();
        for (key, value) in map {
            let converted = TwinValue::from_json(&key, value)?;
            tree.0.insert(key, converted);
        }
        Ok(tree)
    }

    /// Parse a JSON object from text.
    pub fn from_json_str(json: &str) -> Result<Self, TwinError> {
        match serde_json::from_str::<Value>(json)? {
            Value::Object(map) => Self::from_json_map(map),
            other => Err(TwinError::MalformedDocument(format!(
                "expected a JSON object, found {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Convert to a `serde_json::Value` object.
    pub fn to_json_value(&self) -> Value {
        Value::Object(self.to_json_map())
    }

    /// Convert to a `serde_json::Map`.
    pub fn to_json_map(&self) -> Map<String, Value> {
        self.iter()
            .map(|(key, value)| (key.clone(), value.to_json_value()))
            .collect()
    }

    /// Encode as compact JSON text.
    pub fn to_json_string(&self) -> String {
        self.to_json_value().to_string()
    }
}

/// Name of a JSON value's type, for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl fmt::Display for PropertyTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json_value())
    }
}

impl TryFrom<Value> for PropertyTree {
    type Error = TwinError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Self::from_json_map(map),
            other => Err(TwinError::MalformedDocument(format!(
                "expected a JSON object, found {}",
                json_type_name(&other)
            ))),
        }
    }
}

impl FromIterator<(String, TwinValue)> for PropertyTree {
    fn from_iter<I: IntoIterator<Item = (String, TwinValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for PropertyTree {
    type Item = (String, TwinValue);
    type IntoIter = btree_map::IntoIter<String, TwinValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a PropertyTree {
    type Item = (&'a String, &'a TwinValue);
    type IntoIter = btree_map::Iter<'a, String, TwinValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Serialize for PropertyTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PropertyTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        PropertyTree::try_from(value).map_err(de::Error::custom)
    }
}
