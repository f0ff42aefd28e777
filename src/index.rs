//! Conversation key extraction
//!
//! A rule's `index` field paths are read out of a message to produce the key
//! that ties independent messages to one conversation.

use crate::query::path::PATH_SEPARATOR;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Unordered set of `(field path, value)` pairs
///
/// Serialised as a list of `[path, value]` pairs. The legacy object form
/// `{path: value}` is accepted when reading.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexKey(BTreeMap<String, Value>);

impl IndexKey {
    /// Stable textual form, used to name per-key locks and index entries
    pub fn canonical(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Values are stored in normal form so that keys equal by value are equal
/// structurally and share one canonical form.
impl FromIterator<(String, Value)> for IndexKey {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(path, value)| (path, normalize(value)))
                .collect(),
        )
    }
}

/// Rewrite integral floats as integers, recursively (`1.0` becomes `1`)
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn normalize(value: Value) -> Value {
    match value {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                Value::from(f as i64)
            }
            _ => Value::Number(n),
        },
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, normalize(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Derive the key of `document` for the given field paths.
///
/// Descends through objects only; a missing segment or a non-object along the
/// way yields `null` for that path.
pub fn extract_key<S: AsRef<str>>(document: &Value, field_paths: &[S]) -> IndexKey {
    field_paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            (path.to_string(), lookup(document, path))
        })
        .collect()
}

fn lookup(document: &Value, path: &str) -> Value {
    let mut node = document;
    for segment in path.split(PATH_SEPARATOR) {
        match node {
            Value::Object(map) => match map.get(segment) {
                Some(child) => node = child,
                None => return Value::Null,
            },
            _ => return Value::Null,
        }
    }
    node.clone()
}

impl Serialize for IndexKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for pair in &self.0 {
            seq.serialize_element(&pair)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for IndexKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(IndexKeyVisitor)
    }
}

struct IndexKeyVisitor;

impl<'de> Visitor<'de> for IndexKeyVisitor {
    type Value = IndexKey;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a list of [path, value] pairs or an object")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<IndexKey, A::Error> {
        let mut pairs = Vec::new();
        while let Some(pair) = seq.next_element::<(String, Value)>()? {
            pairs.push(pair);
        }
        Ok(pairs.into_iter().collect())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<IndexKey, A::Error> {
        let mut pairs = Vec::new();
        while let Some(pair) = map.next_entry::<String, Value>()? {
            pairs.push(pair);
        }
        Ok(pairs.into_iter().collect())
    }

    fn visit_unit<E: de::Error>(self) -> Result<IndexKey, E> {
        Ok(IndexKey::default())
    }
}
