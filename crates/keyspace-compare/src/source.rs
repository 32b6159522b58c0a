//! Collaborator traits for the two sides of a comparison.
//!
//! The engine needs three narrow capabilities from a dataset:
//! - enumeration of its keys ([`KeyScanner`]),
//! - point lookup of a single key ([`KeyLookup`]),
//! - a cheap approximate size ([`SizeEstimator`]).
//!
//! A [`Keyspace`] has all three and can be used on either side.

use async_trait::async_trait;
use futures::stream::BoxStream;
use keyspace_types::{Key, KeyValue};
use std::sync::Arc;

use crate::error::SourceError;
use crate::filter::KeyFilter;

/// Lazy sequence of scanned snapshots.
///
/// Items may be keys-only (type and TTL, no value) or carry inline values.
pub type KeyStream = BoxStream<'static, Result<KeyValue, SourceError>>;

/// How much of a key a lookup must return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetch {
    /// Type and TTL only.
    TypeAndTtl,
    /// Type, TTL and the complete value.
    Full,
}

/// Enumeration of a keyspace.
#[async_trait]
pub trait KeyScanner: Send + Sync {
    /// Number of independently scannable partitions.
    fn partitions(&self) -> usize {
        1
    }

    /// Open a scan over one partition.
    ///
    /// Implementations may push `filter` down; callers re-apply it to every
    /// yielded snapshot regardless. A scan is not resumable: an error in the
    /// middle of the stream ends it.
    async fn scan(&self, partition: usize, filter: &KeyFilter) -> Result<KeyStream, SourceError>;
}

/// Point reads, safe for concurrent use.
#[async_trait]
pub trait KeyLookup: Send + Sync {
    /// Current snapshot of `key`; [`KeyValue::absent`] if it does not exist.
    async fn get(&self, key: &Key, fetch: Fetch) -> Result<KeyValue, SourceError>;
}

/// Cheap, approximate key count used for progress only.
#[async_trait]
pub trait SizeEstimator: Send + Sync {
    /// `None` when the count is unavailable.
    async fn approximate_count(&self) -> Option<u64>;
}

/// A dataset that can play either side of a comparison.
pub trait Keyspace: KeyScanner + KeyLookup + SizeEstimator {}

impl<T> Keyspace for T where T: KeyScanner + KeyLookup + SizeEstimator {}

#[async_trait]
impl<T: KeyScanner + ?Sized> KeyScanner for Arc<T> {
    fn partitions(&self) -> usize {
        (**self).partitions()
    }

    async fn scan(&self, partition: usize, filter: &KeyFilter) -> Result<KeyStream, SourceError> {
        (**self).scan(partition, filter).await
    }
}

#[async_trait]
impl<T: KeyLookup + ?Sized> KeyLookup for Arc<T> {
    async fn get(&self, key: &Key, fetch: Fetch) -> Result<KeyValue, SourceError> {
        (**self).get(key, fetch).await
    }
}

#[async_trait]
impl<T: SizeEstimator + ?Sized> SizeEstimator for Arc<T> {
    async fn approximate_count(&self) -> Option<u64> {
        (**self).approximate_count().await
    }
}
