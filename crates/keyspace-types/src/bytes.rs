//! Binary-safe byte strings.
//!
//! Keys, members, fields and scalar values are arbitrary byte sequences.
//! For JSON they are written as plain strings when they are valid UTF-8,
//! and as `{"base64": "..."}` otherwise.

use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::TypesError;

/// Binary-safe byte string.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bytes(pub Vec<u8>);

/// Key identity within one dataset.
pub type Key = Bytes;

impl Bytes {
    /// Create from anything convertible into a byte vector.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow as UTF-8 if the bytes are valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.0.starts_with(prefix)
    }

    /// Decode a standard base64 payload.
    pub fn from_base64(encoded: &str) -> Result<Self, TypesError> {
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map(Self)
            .map_err(|e| TypesError::Base64(e.to_string()))
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.0)
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl fmt::Display for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl From<&str> for Bytes {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<String> for Bytes {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(v: Vec<u8>) -> Self {
        Self(v)
    }
}

impl From<&[u8]> for Bytes {
    fn from(v: &[u8]) -> Self {
        Self(v.to_vec())
    }
}

impl AsRef<[u8]> for Bytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Bytes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeMap;

        match self.as_str() {
            Some(s) => serializer.serialize_str(s),
            None => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("base64", &self.to_base64())?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Bytes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{Error, MapAccess, Visitor};

        struct BytesVisitor;

        impl<'de> Visitor<'de> for BytesVisitor {
            type Value = Bytes;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string or a {\"base64\": ...} map")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: Error,
            {
                Ok(Bytes::from(value))
            }

            fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
            where
                E: Error,
            {
                Ok(Bytes::from(value))
            }

            // Numbers are accepted so dumps can write list elements like [1, 2, 3]
            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: Error,
            {
                Ok(Bytes::from(value.to_string()))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: Error,
            {
                Ok(Bytes::from(value.to_string()))
            }

            fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut encoded: Option<String> = None;
                while let Some(key) = map.next_key::<String>()? {
                    if key == "base64" {
                        encoded = Some(map.next_value()?);
                    } else {
                        return Err(M::Error::unknown_field(&key, &["base64"]));
                    }
                }
                let encoded = encoded.ok_or_else(|| M::Error::missing_field("base64"))?;
                Bytes::from_base64(&encoded).map_err(M::Error::custom)
            }
        }

        deserializer.deserialize_any(BytesVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_serializes_as_string() {
        let b = Bytes::from("hello");
        assert_eq!(serde_json::to_string(&b).unwrap(), "\"hello\"");
    }

    #[test]
    fn test_binary_serializes_as_base64() {
        let b = Bytes::new(vec![0xff, 0x00, 0xfe]);
        let json = serde_json::to_value(&b).unwrap();
        assert_eq!(json, serde_json::json!({"base64": "/wD+"}));

        let parsed: Bytes = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, b);
    }

    #[test]
    fn test_numbers_are_accepted() {
        let parsed: Vec<Bytes> = serde_json::from_str("[1, 2, \"3\"]").unwrap();
        assert_eq!(
            parsed,
            vec![Bytes::from("1"), Bytes::from("2"), Bytes::from("3")]
        );
    }

    #[test]
    fn test_unknown_map_field_rejected() {
        let result: Result<Bytes, _> = serde_json::from_str("{\"hex\": \"00\"}");
        assert!(result.is_err());
    }

    #[test]
    fn test_display_is_lossy() {
        let b = Bytes::new(vec![b'a', 0xff, b'b']);
        assert_eq!(b.to_string(), "a\u{fffd}b");
    }
}
