//! Metadata codec: a flat key -> value(s) bag.
//!
//! The wire and storage form is always wrapped exactly once under the `"meta"`
//! sentinel: `{"meta": {"filesize": "12", "url": ["http://a/"]}}`.
//! [`Metadata::encode`] wraps, [`Metadata::decode`] unwraps, and nothing else in
//! the crate touches the sentinel. A payload that is wrapped twice is rejected
//! rather than silently unwrapped again.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sentinel key wrapping the inner mapping.
pub const META_KEY: &str = "meta";

/// Well-known metadata keys.
pub mod keys {
    pub const FILE_SIZE: &str = "filesize";
    pub const FILE_PATH: &str = "filepath";
    pub const TIME: &str = "time";
    /// The only multi-valued key: every source URL the content was seen at.
    pub const URL: &str = "url";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, MetaValue>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Set a single-valued key. Last writer wins.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), MetaValue::One(value.into()));
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// First (or only) value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        match self.0.get(key)? {
            MetaValue::One(v) => Some(v),
            MetaValue::Many(vs) => vs.first().map(String::as_str),
        }
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        match self.0.get(key) {
            Some(MetaValue::One(v)) => vec![v.as_str()],
            Some(MetaValue::Many(vs)) => vs.iter().map(String::as_str).collect(),
            None => Vec::new(),
        }
    }

    /// Add `value` to the list under `key` unless already present.
    pub fn push_unique(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        let entry = self
            .0
            .entry(key.to_string())
            .or_insert_with(|| MetaValue::Many(Vec::new()));
        let upgraded = match entry {
            MetaValue::One(existing) if *existing != value => {
                Some(vec![std::mem::take(existing), value])
            }
            MetaValue::One(_) => None,
            MetaValue::Many(vs) => {
                if !vs.contains(&value) {
                    vs.push(value);
                }
                None
            }
        };
        if let Some(vs) = upgraded {
            *entry = MetaValue::Many(vs);
        }
    }

    pub fn urls(&self) -> Vec<&str> {
        self.get_all(keys::URL)
    }

    pub fn add_url(&mut self, url: impl Into<String>) {
        self.push_unique(keys::URL, url);
    }

    pub fn remove(&mut self, key: &str) -> Option<MetaValue> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetaValue)> {
        self.0.iter()
    }

    /// Fold `other` in: list values are unioned, single values are overwritten.
    pub fn merge(&mut self, other: &Metadata) {
        for (key, value) in &other.0 {
            match value {
                MetaValue::Many(vs) => {
                    for v in vs {
                        self.push_unique(key, v.clone());
                    }
                }
                MetaValue::One(v) if key == keys::URL => self.push_unique(key, v.clone()),
                MetaValue::One(v) => self.insert(key.clone(), v.clone()),
            }
        }
    }

    /// The inner mapping without the sentinel.
    pub fn to_inner_value(&self) -> Value {
        let mut inner = Map::new();
        for (key, value) in &self.0 {
            let v = match value {
                MetaValue::One(s) => Value::String(s.clone()),
                MetaValue::Many(vs) => Value::Array(vs.iter().cloned().map(Value::String).collect()),
            };
            inner.insert(key.clone(), v);
        }
        Value::Object(inner)
    }

    /// Canonical wrapped value: `{"meta": {...}}`.
    pub fn to_wrapped_value(&self) -> Value {
        let mut outer = Map::new();
        outer.insert(META_KEY.to_string(), self.to_inner_value());
        Value::Object(outer)
    }

    /// Serialize to the canonical wrapped text form.
    pub fn encode(&self) -> String {
        self.to_wrapped_value().to_string()
    }

    /// Parse the canonical wrapped text form.
    pub fn decode(text: &str) -> Result<Self, MetadataError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_wrapped_value(&value)
    }

    /// Unwrap the sentinel exactly once and read the inner mapping.
    pub fn from_wrapped_value(value: &Value) -> Result<Self, MetadataError> {
        let outer = value.as_object().ok_or(MetadataError::NotAnObject)?;
        let inner = outer.get(META_KEY).ok_or(MetadataError::NotWrapped)?;
        let inner = inner.as_object().ok_or(MetadataError::NotAnObject)?;
        if matches!(inner.get(META_KEY), Some(Value::Object(_))) {
            return Err(MetadataError::DoubleWrapped);
        }
        let mut out = Metadata::new();
        for (key, v) in inner {
            let mv = match v {
                Value::String(s) => MetaValue::One(s.clone()),
                Value::Number(n) => MetaValue::One(n.to_string()),
                Value::Bool(b) => MetaValue::One(b.to_string()),
                Value::Array(items) => {
                    let mut vs = Vec::with_capacity(items.len());
                    for item in items {
                        match item {
                            Value::String(s) => vs.push(s.clone()),
                            Value::Number(n) => vs.push(n.to_string()),
                            _ => return Err(MetadataError::InvalidValue(key.clone())),
                        }
                    }
                    MetaValue::Many(vs)
                }
                Value::Null => continue,
                Value::Object(_) => return Err(MetadataError::InvalidValue(key.clone())),
            };
            out.0.insert(key.clone(), mv);
        }
        Ok(out)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("metadata is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("metadata is not a JSON object")]
    NotAnObject,
    #[error("metadata is missing the \"meta\" wrapper")]
    NotWrapped,
    #[error("metadata is wrapped more than once")]
    DoubleWrapped,
    #[error("metadata key {0:?} holds an unsupported value")]
    InvalidValue(String),
}
