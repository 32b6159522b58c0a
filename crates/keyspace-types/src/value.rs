//! Structure kinds and their payloads.
//!
//! [`Value`] is a closed tagged variant with exactly one arm per present
//! [`DataType`], so every consumer that matches on it is checked for
//! exhaustiveness at compile time.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::bytes::Bytes;

/// Structure kind of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    /// Key does not exist
    None,
    String,
    List,
    Set,
    SortedSet,
    Hash,
    Stream,
    /// Any structure the engine has no dedicated comparison strategy for
    /// (module types and the like). Compared as opaque bytes.
    Unknown,
}

impl DataType {
    /// Redis type name as returned by the `TYPE` command.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::None => "none",
            DataType::String => "string",
            DataType::List => "list",
            DataType::Set => "set",
            DataType::SortedSet => "zset",
            DataType::Hash => "hash",
            DataType::Stream => "stream",
            DataType::Unknown => "unknown",
        }
    }

    /// Parse a type name. Unrecognized names map to [`DataType::Unknown`].
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "none" => DataType::None,
            "string" => DataType::String,
            "list" => DataType::List,
            "set" => DataType::Set,
            "zset" | "sorted_set" | "sortedset" => DataType::SortedSet,
            "hash" => DataType::Hash,
            "stream" => DataType::Stream,
            _ => DataType::Unknown,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(DataType::from_name(s))
    }
}

impl Serialize for DataType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DataType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(DataType::from_name(&name))
    }
}

/// Sorted set member with its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMember {
    pub member: Bytes,
    pub score: f64,
}

impl ScoredMember {
    pub fn new(member: impl Into<Bytes>, score: f64) -> Self {
        Self {
            member: member.into(),
            score,
        }
    }
}

/// One stream entry: an identifier plus its field map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEntry {
    /// Entry identifier, e.g. `1700000000000-0`
    pub id: String,
    /// Field/value pairs in insertion order
    pub fields: Vec<(Bytes, Bytes)>,
}

impl StreamEntry {
    pub fn new(id: impl Into<String>, fields: Vec<(Bytes, Bytes)>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

/// Type-dependent payload of a key.
///
/// Collections are held as plain vectors in the order the store returned
/// them; whether that order is significant is decided by the comparator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    String(Bytes),
    List(Vec<Bytes>),
    Set(Vec<Bytes>),
    #[serde(rename = "zset")]
    SortedSet(Vec<ScoredMember>),
    Hash(Vec<(Bytes, Bytes)>),
    Stream(Vec<StreamEntry>),
    Unknown(Bytes),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::String(_) => DataType::String,
            Value::List(_) => DataType::List,
            Value::Set(_) => DataType::Set,
            Value::SortedSet(_) => DataType::SortedSet,
            Value::Hash(_) => DataType::Hash,
            Value::Stream(_) => DataType::Stream,
            Value::Unknown(_) => DataType::Unknown,
        }
    }

    /// Number of top-level elements (1 for scalars).
    pub fn len(&self) -> usize {
        match self {
            Value::String(_) | Value::Unknown(_) => 1,
            Value::List(items) | Value::Set(items) => items.len(),
            Value::SortedSet(members) => members.len(),
            Value::Hash(fields) => fields.len(),
            Value::Stream(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Approximate payload size in bytes, used to decide when a value is
    /// too large to embed in a diff record.
    pub fn approximate_size(&self) -> usize {
        fn pairs(fields: &[(Bytes, Bytes)]) -> usize {
            fields.iter().map(|(f, v)| f.len() + v.len()).sum()
        }

        match self {
            Value::String(b) | Value::Unknown(b) => b.len(),
            Value::List(items) | Value::Set(items) => items.iter().map(Bytes::len).sum(),
            Value::SortedSet(members) => members
                .iter()
                .map(|m| m.member.len() + std::mem::size_of::<f64>())
                .sum(),
            Value::Hash(fields) => pairs(fields),
            Value::Stream(entries) => entries
                .iter()
                .map(|e| e.id.len() + pairs(&e.fields))
                .sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(DataType::from_name("zset"), DataType::SortedSet);
        assert_eq!(DataType::from_name("HASH"), DataType::Hash);
        assert_eq!(DataType::from_name("ReJSON-RL"), DataType::Unknown);
        assert_eq!(DataType::SortedSet.to_string(), "zset");
    }

    #[test]
    fn test_value_type_tag() {
        let v = Value::SortedSet(vec![ScoredMember::new("a", 1.5)]);
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "zset", "value": [{"member": "a", "score": 1.5}]})
        );
        let back: Value = serde_json::from_value(json).unwrap();
        assert_eq!(back.data_type(), DataType::SortedSet);
    }

    #[test]
    fn test_hash_pairs_shape() {
        let v: Value = serde_json::from_value(serde_json::json!({
            "type": "hash",
            "value": [["name", "alice"], ["age", 30]]
        }))
        .unwrap();
        match v {
            Value::Hash(fields) => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[1].1, Bytes::from("30"));
            }
            other => panic!("expected hash, got {other:?}"),
        }
    }

    #[test]
    fn test_approximate_size() {
        let v = Value::Stream(vec![StreamEntry::new(
            "1-1",
            vec![(Bytes::from("f"), Bytes::from("12"))],
        )]);
        assert_eq!(v.approximate_size(), 3 + 1 + 2);
        assert_eq!(Value::List(vec![]).len(), 0);
    }
}
