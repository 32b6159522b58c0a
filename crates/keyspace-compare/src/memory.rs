//! In-memory keyspace.

use async_trait::async_trait;
use futures::stream;
use keyspace_types::{Key, KeyValue};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use crate::error::SourceError;
use crate::filter::KeyFilter;
use crate::slot::{key_slot, partition_ranges, SLOT_COUNT};
use crate::source::{Fetch, KeyLookup, KeyScanner, KeyStream, SizeEstimator};

/// Thread-safe keyspace held in a sorted map.
///
/// Partitions are contiguous hash-slot ranges, so a key belongs to exactly
/// one partition regardless of the partition count.
#[derive(Debug)]
pub struct MemoryKeyspace {
    entries: RwLock<BTreeMap<Key, KeyValue>>,
    partitions: usize,
    inline_values: bool,
    estimate: bool,
}

impl Default for MemoryKeyspace {
    fn default() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            partitions: 1,
            inline_values: true,
            estimate: true,
        }
    }
}

impl MemoryKeyspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slot-range partitions exposed to scanners, at most one
    /// per hash slot.
    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions.clamp(1, SLOT_COUNT as usize);
        self
    }

    /// When disabled, scans yield type and TTL only and values have to be
    /// fetched through [`KeyLookup`].
    pub fn with_inline_values(mut self, inline: bool) -> Self {
        self.inline_values = inline;
        self
    }

    /// Report the size estimate as unavailable.
    pub fn without_estimate(mut self) -> Self {
        self.estimate = false;
        self
    }

    /// Insert or replace a snapshot. Absent snapshots remove the key.
    pub fn insert(&self, kv: KeyValue) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if kv.exists() {
            entries.insert(kv.key.clone(), kv);
        } else {
            entries.remove(&kv.key);
        }
    }

    pub fn remove(&self, key: &Key) -> Option<KeyValue> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All snapshots in key order.
    pub fn snapshots(&self) -> Vec<KeyValue> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

impl FromIterator<KeyValue> for MemoryKeyspace {
    fn from_iter<I: IntoIterator<Item = KeyValue>>(iter: I) -> Self {
        let keyspace = MemoryKeyspace::new();
        for kv in iter {
            keyspace.insert(kv);
        }
        keyspace
    }
}

#[async_trait]
impl KeyScanner for MemoryKeyspace {
    fn partitions(&self) -> usize {
        self.partitions
    }

    async fn scan(&self, partition: usize, filter: &KeyFilter) -> Result<KeyStream, SourceError> {
        let ranges = partition_ranges(self.partitions);
        let range = ranges.get(partition).cloned().ok_or_else(|| {
            SourceError::fatal(format!(
                "partition {partition} out of range (0..{})",
                ranges.len()
            ))
        })?;

        let batch: Vec<Result<KeyValue, SourceError>> = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            entries
                .values()
                .filter(|kv| range.contains(&key_slot(kv.key.as_slice())))
                .filter(|kv| filter.matches(kv))
                .map(|kv| {
                    if self.inline_values {
                        Ok(kv.clone())
                    } else {
                        Ok(kv.clone().without_value())
                    }
                })
                .collect()
        };

        tracing::debug!(
            "Memory scan of partition {} ({}..={}) yields {} keys",
            partition,
            range.start(),
            range.end(),
            batch.len()
        );

        Ok(Box::pin(stream::iter(batch)))
    }
}

#[async_trait]
impl KeyLookup for MemoryKeyspace {
    async fn get(&self, key: &Key, fetch: Fetch) -> Result<KeyValue, SourceError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(match entries.get(key) {
            Some(kv) if fetch == Fetch::TypeAndTtl => kv.clone().without_value(),
            Some(kv) => kv.clone(),
            None => KeyValue::absent(key.clone()),
        })
    }
}

#[async_trait]
impl SizeEstimator for MemoryKeyspace {
    async fn approximate_count(&self) -> Option<u64> {
        if self.estimate {
            Some(self.len() as u64)
        } else {
            None
        }
    }
}
