//! Key inclusion/exclusion.

use keyspace_types::{DataType, KeyValue};
use std::ops::RangeInclusive;

use crate::glob::glob_match;
use crate::slot::key_slot;

/// Which keys take part in a comparison.
///
/// A key is included iff it matches any include pattern (or there are
/// none), matches no exclude pattern, falls in one of the slot ranges (or
/// there are none), and its type is one of `types` (or there are none).
/// A key whose type is not yet known passes the type check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyFilter {
    pub includes: Vec<String>,
    pub excludes: Vec<String>,
    pub slots: Vec<RangeInclusive<u16>>,
    pub types: Vec<DataType>,
}

impl KeyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.includes.push(pattern.into());
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.excludes.push(pattern.into());
        self
    }

    pub fn slots(mut self, range: RangeInclusive<u16>) -> Self {
        self.slots.push(range);
        self
    }

    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.types.push(data_type);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.includes.is_empty()
            && self.excludes.is_empty()
            && self.slots.is_empty()
            && self.types.is_empty()
    }

    /// Key-only part of the predicate.
    pub fn matches_key(&self, key: &[u8]) -> bool {
        if !self.includes.is_empty()
            && !self
                .includes
                .iter()
                .any(|p| glob_match(p.as_bytes(), key))
        {
            return false;
        }
        if self.excludes.iter().any(|p| glob_match(p.as_bytes(), key)) {
            return false;
        }
        if !self.slots.is_empty() {
            let slot = key_slot(key);
            if !self.slots.iter().any(|r| r.contains(&slot)) {
                return false;
            }
        }
        true
    }

    /// Full predicate over a scanned snapshot.
    pub fn matches(&self, kv: &KeyValue) -> bool {
        if !self.matches_key(kv.key.as_slice()) {
            return false;
        }
        self.types.is_empty() || !kv.exists() || self.types.contains(&kv.data_type)
    }

    /// A single include pattern that a scanner can push down (`SCAN MATCH`).
    pub fn scan_pattern(&self) -> Option<&str> {
        match self.includes.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::key_slot;
    use keyspace_types::{Bytes, Ttl, Value};

    fn string_kv(key: &str) -> KeyValue {
        KeyValue::new(
            Bytes::from(key),
            Value::String(Bytes::from("v")),
            Ttl::Persistent,
        )
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let f = KeyFilter::new();
        assert!(f.is_empty());
        assert!(f.matches(&string_kv("anything")));
    }

    #[test]
    fn test_include_and_exclude() {
        let f = KeyFilter::new().include("user:*").exclude("user:tmp:*");
        assert!(f.matches_key(b"user:1"));
        assert!(!f.matches_key(b"user:tmp:1"));
        assert!(!f.matches_key(b"order:1"));
    }

    #[test]
    fn test_slot_ranges() {
        let slot = key_slot(b"foo");
        let f = KeyFilter::new().slots(slot..=slot);
        assert!(f.matches_key(b"foo"));
        assert!(!f.matches_key(b"bar"));
    }

    #[test]
    fn test_type_restriction() {
        let f = KeyFilter::new().data_type(DataType::Hash);
        assert!(!f.matches(&string_kv("a")));
        // Unknown type at scan time passes
        assert!(f.matches(&KeyValue::absent(Bytes::from("a"))));
    }

    #[test]
    fn test_scan_pattern_pushdown() {
        assert_eq!(KeyFilter::new().include("a*").scan_pattern(), Some("a*"));
        assert_eq!(
            KeyFilter::new().include("a*").include("b*").scan_pattern(),
            None
        );
    }
}
