//! Key rewriting and snapshot normalization.
//!
//! A [`KeyTransform`] maps a source key to the key it is stored under on
//! the target (and back, for target-driven traversal). A chain of
//! [`KeyValueProcessor`]s normalizes both snapshots identically before they
//! reach the comparator, e.g. to drop auto-generated fields.
//!
//! Both are plain injected functions. Whatever produces them (an
//! expression evaluator, CLI flags) lives outside this crate.

use keyspace_types::{Bytes, Key, KeyValue, Value};
use std::fmt;
use std::sync::Arc;

/// Pure mapping between source and target key names.
pub trait KeyTransform: Send + Sync + fmt::Debug {
    /// Key to look up on the target for a source key.
    fn to_target(&self, key: &Key) -> Key;

    /// Key to look up on the source for a target key, or `None` if the
    /// transform cannot be inverted.
    fn to_source(&self, key: &Key) -> Option<Key>;

    fn is_invertible(&self) -> bool {
        true
    }
}

/// Replaces a leading namespace prefix.
///
/// Keys that do not carry the expected prefix are passed through unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct PrefixRewrite {
    pub source_prefix: Bytes,
    pub target_prefix: Bytes,
}

impl PrefixRewrite {
    pub fn new(source_prefix: impl Into<Bytes>, target_prefix: impl Into<Bytes>) -> Self {
        Self {
            source_prefix: source_prefix.into(),
            target_prefix: target_prefix.into(),
        }
    }

    fn swap(key: &Key, from: &Bytes, to: &Bytes) -> Key {
        match key.as_slice().strip_prefix(from.as_slice()) {
            Some(rest) => {
                let mut out = Vec::with_capacity(to.len() + rest.len());
                out.extend_from_slice(to.as_slice());
                out.extend_from_slice(rest);
                Bytes(out)
            }
            None => key.clone(),
        }
    }
}

impl KeyTransform for PrefixRewrite {
    fn to_target(&self, key: &Key) -> Key {
        Self::swap(key, &self.source_prefix, &self.target_prefix)
    }

    fn to_source(&self, key: &Key) -> Option<Key> {
        Some(Self::swap(key, &self.target_prefix, &self.source_prefix))
    }
}

type KeyFn = Arc<dyn Fn(&Key) -> Key + Send + Sync>;

/// Transform built from closures.
#[derive(Clone)]
pub struct FnTransform {
    forward: KeyFn,
    inverse: Option<KeyFn>,
}

impl FnTransform {
    pub fn new(forward: impl Fn(&Key) -> Key + Send + Sync + 'static) -> Self {
        Self {
            forward: Arc::new(forward),
            inverse: None,
        }
    }

    pub fn with_inverse(mut self, inverse: impl Fn(&Key) -> Key + Send + Sync + 'static) -> Self {
        self.inverse = Some(Arc::new(inverse));
        self
    }
}

impl fmt::Debug for FnTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTransform")
            .field("invertible", &self.inverse.is_some())
            .finish()
    }
}

impl KeyTransform for FnTransform {
    fn to_target(&self, key: &Key) -> Key {
        (self.forward)(key)
    }

    fn to_source(&self, key: &Key) -> Option<Key> {
        self.inverse.as_ref().map(|f| f(key))
    }

    fn is_invertible(&self) -> bool {
        self.inverse.is_some()
    }
}

/// Normalizes a snapshot before comparison. Applied to both sides.
pub trait KeyValueProcessor: Send + Sync + fmt::Debug {
    fn process(&self, kv: KeyValue) -> KeyValue;
}

/// Removes the named fields from hashes and from stream entry field maps.
#[derive(Debug, Clone, PartialEq)]
pub struct IgnoreFields {
    pub fields: Vec<Bytes>,
}

impl IgnoreFields {
    pub fn new<I, B>(fields: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    fn keep(&self, field: &Bytes) -> bool {
        !self.fields.contains(field)
    }
}

impl KeyValueProcessor for IgnoreFields {
    fn process(&self, mut kv: KeyValue) -> KeyValue {
        match kv.value.as_mut() {
            Some(Value::Hash(fields)) => fields.retain(|(f, _)| self.keep(f)),
            Some(Value::Stream(entries)) => {
                for entry in entries.iter_mut() {
                    entry.fields.retain(|(f, _)| self.keep(f));
                }
            }
            _ => {}
        }
        kv
    }
}

/// Processor built from a closure.
#[derive(Clone)]
pub struct FnProcessor(Arc<dyn Fn(KeyValue) -> KeyValue + Send + Sync>);

impl FnProcessor {
    pub fn new(f: impl Fn(KeyValue) -> KeyValue + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }
}

impl fmt::Debug for FnProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnProcessor")
    }
}

impl KeyValueProcessor for FnProcessor {
    fn process(&self, kv: KeyValue) -> KeyValue {
        (self.0)(kv)
    }
}

/// Run `kv` through every processor in order.
pub fn apply_processors(processors: &[Arc<dyn KeyValueProcessor>], kv: KeyValue) -> KeyValue {
    processors.iter().fold(kv, |kv, p| p.process(kv))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyspace_types::{StreamEntry, Ttl};

    #[test]
    fn test_prefix_rewrite_roundtrip() {
        let t = PrefixRewrite::new("src:", "dst:");
        let target = t.to_target(&Key::from("src:user:1"));
        assert_eq!(target, Key::from("dst:user:1"));
        assert_eq!(t.to_source(&target), Some(Key::from("src:user:1")));
        // Non-matching keys pass through
        assert_eq!(t.to_target(&Key::from("other")), Key::from("other"));
    }

    #[test]
    fn test_fn_transform_invertibility() {
        let t = FnTransform::new(|k: &Key| Key::from(k.to_string().to_uppercase()));
        assert!(!t.is_invertible());
        assert_eq!(t.to_source(&Key::from("A")), None);

        let t = t.with_inverse(|k: &Key| Key::from(k.to_string().to_lowercase()));
        assert!(t.is_invertible());
        assert_eq!(t.to_source(&Key::from("A")), Some(Key::from("a")));
    }

    #[test]
    fn test_ignore_fields_hash_and_stream() {
        let p = IgnoreFields::new(["id"]);
        let hash = KeyValue::new(
            Key::from("h"),
            Value::Hash(vec![
                (Bytes::from("id"), Bytes::from("17")),
                (Bytes::from("name"), Bytes::from("x")),
            ]),
            Ttl::Persistent,
        );
        match p.process(hash).value {
            Some(Value::Hash(fields)) => assert_eq!(fields.len(), 1),
            other => panic!("unexpected {other:?}"),
        }

        let stream = KeyValue::new(
            Key::from("s"),
            Value::Stream(vec![StreamEntry::new(
                "1-1",
                vec![
                    (Bytes::from("id"), Bytes::from("1")),
                    (Bytes::from("f"), Bytes::from("1")),
                ],
            )]),
            Ttl::Persistent,
        );
        match p.process(stream).value {
            Some(Value::Stream(entries)) => assert_eq!(entries[0].fields.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_apply_processors_in_order() {
        let processors: Vec<Arc<dyn KeyValueProcessor>> = vec![
            Arc::new(FnProcessor::new(|kv: KeyValue| {
                let key = Key::from(format!("{}-a", kv.key));
                kv.with_key(key)
            })),
            Arc::new(FnProcessor::new(|kv: KeyValue| {
                let key = Key::from(format!("{}-b", kv.key));
                kv.with_key(key)
            })),
        ];
        let out = apply_processors(&processors, KeyValue::absent(Key::from("k")));
        assert_eq!(out.key, Key::from("k-a-b"));
    }
}
