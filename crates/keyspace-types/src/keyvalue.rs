//! Per-key snapshots.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

use crate::bytes::Key;
use crate::error::TypesError;
use crate::value::{DataType, Value};

/// Remaining time-to-live of an existing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// The key has no expiry.
    Persistent,
    /// The key expires after the given duration.
    ExpiresIn(Duration),
}

impl Ttl {
    /// Convert a Redis `PTTL` reply.
    ///
    /// `-1` means no expiry, `-2` means the key does not exist (`None`).
    pub fn from_pttl(pttl: i64) -> Result<Option<Self>, TypesError> {
        match pttl {
            -2 => Ok(None),
            -1 => Ok(Some(Ttl::Persistent)),
            ms if ms >= 0 => Ok(Some(Ttl::ExpiresIn(Duration::from_millis(ms as u64)))),
            other => Err(TypesError::InvalidTtl(other)),
        }
    }

    /// Inverse of [`Ttl::from_pttl`] for an existing key.
    pub fn as_pttl(&self) -> i64 {
        match self {
            Ttl::Persistent => -1,
            Ttl::ExpiresIn(d) => d.as_millis().min(i64::MAX as u128) as i64,
        }
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self, Ttl::Persistent)
    }

    pub fn from_millis(ms: u64) -> Self {
        Ttl::ExpiresIn(Duration::from_millis(ms))
    }
}

impl Serialize for Ttl {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(self.as_pttl())
    }
}

impl<'de> Deserialize<'de> for Ttl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        let pttl = i64::deserialize(deserializer)?;
        match Ttl::from_pttl(pttl).map_err(D::Error::custom)? {
            Some(ttl) => Ok(ttl),
            None => Err(D::Error::custom("TTL -2 denotes a missing key")),
        }
    }
}

/// Observed state of one key on one side of a comparison.
///
/// A snapshot with `data_type == DataType::None` is absent: it carries no
/// value and no TTL. The constructors are the only way the engine builds
/// snapshots, which keeps that invariant intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: Key,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<Ttl>,
    /// Approximate byte footprint. Advisory only, never part of equality.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<u64>,
}

impl KeyValue {
    /// Snapshot of a key that does not exist.
    pub fn absent(key: Key) -> Self {
        Self {
            key,
            data_type: DataType::None,
            value: None,
            ttl: None,
            memory_usage: None,
        }
    }

    /// Snapshot of an existing key with its full value.
    pub fn new(key: Key, value: Value, ttl: Ttl) -> Self {
        Self {
            key,
            data_type: value.data_type(),
            value: Some(value),
            ttl: Some(ttl),
            memory_usage: None,
        }
    }

    /// Snapshot carrying only type and TTL (keys-only scans, quick mode).
    ///
    /// `DataType::None` yields an absent snapshot regardless of `ttl`.
    pub fn typed(key: Key, data_type: DataType, ttl: Ttl) -> Self {
        if data_type == DataType::None {
            return Self::absent(key);
        }
        Self {
            key,
            data_type,
            value: None,
            ttl: Some(ttl),
            memory_usage: None,
        }
    }

    pub fn with_memory_usage(mut self, bytes: u64) -> Self {
        self.memory_usage = Some(bytes);
        self
    }

    /// Same snapshot under a different key.
    pub fn with_key(mut self, key: Key) -> Self {
        self.key = key;
        self
    }

    /// Drop the value, keeping type and TTL.
    pub fn without_value(mut self) -> Self {
        self.value = None;
        self
    }

    pub fn exists(&self) -> bool {
        self.data_type != DataType::None
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytes::Bytes;

    #[test]
    fn test_from_pttl() {
        assert_eq!(Ttl::from_pttl(-2).unwrap(), None);
        assert_eq!(Ttl::from_pttl(-1).unwrap(), Some(Ttl::Persistent));
        assert_eq!(Ttl::from_pttl(1500).unwrap(), Some(Ttl::from_millis(1500)));
        assert_eq!(Ttl::from_pttl(-7), Err(TypesError::InvalidTtl(-7)));
    }

    #[test]
    fn test_absent_invariant() {
        let kv = KeyValue::typed(Bytes::from("k"), DataType::None, Ttl::Persistent);
        assert!(!kv.exists());
        assert!(kv.ttl.is_none());
        assert!(kv.value.is_none());
    }

    #[test]
    fn test_new_derives_type() {
        let kv = KeyValue::new(
            Bytes::from("k"),
            Value::List(vec![Bytes::from("1")]),
            Ttl::Persistent,
        );
        assert_eq!(kv.data_type, DataType::List);
        assert!(kv.has_value());
        assert!(!kv.clone().without_value().has_value());
    }

    #[test]
    fn test_snapshot_json_shape() {
        let kv = KeyValue::new(
            Bytes::from("a"),
            Value::String(Bytes::from("1")),
            Ttl::from_millis(10),
        );
        let json = serde_json::to_value(&kv).unwrap();
        assert_eq!(json["type"], "string");
        assert_eq!(json["ttl"], 10);
        assert_eq!(json["value"]["value"], "1");
        assert!(json.get("memory_usage").is_none());
    }
}
