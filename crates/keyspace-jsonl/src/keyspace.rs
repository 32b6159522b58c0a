//! Dump files as comparison keyspaces.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{future, StreamExt};
use keyspace_compare::slot::{key_slot, partition_ranges, SLOT_COUNT};
use keyspace_compare::{
    Fetch, KeyFilter, KeyLookup, KeyScanner, KeyStream, MemoryKeyspace, SizeEstimator,
    SourceError,
};
use keyspace_types::{Key, KeyValue};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;

use crate::dump::parse_line;

/// Lines sampled from the head of the file for the size estimate.
const ESTIMATE_SAMPLE_LINES: usize = 64;

/// A keyspace backed by a JSON Lines dump.
///
/// Scans stream the file from disk line by line; point lookups are served
/// from an index built when the dump is opened.
#[derive(Debug)]
pub struct JsonlKeyspace {
    path: PathBuf,
    index: MemoryKeyspace,
    partitions: usize,
    estimate: Option<u64>,
}

impl JsonlKeyspace {
    /// Open and index a dump file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = tokio::fs::File::open(&path)
            .await
            .with_context(|| format!("Failed to open dump file {}", path.display()))?;
        let file_size = file.metadata().await?.len();

        let index = MemoryKeyspace::new();
        let mut sampled_bytes = 0u64;
        let mut sampled_lines = 0u64;
        let mut lines = BufReader::new(file).lines();
        let mut line_number = 0;
        while let Some(line) = lines
            .next_line()
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?
        {
            line_number += 1;
            if (sampled_lines as usize) < ESTIMATE_SAMPLE_LINES {
                // +1 for the newline stripped by the reader
                sampled_bytes += line.len() as u64 + 1;
                sampled_lines += 1;
            }
            if line.trim().is_empty() {
                continue;
            }
            let kv = parse_line(&line, line_number)
                .with_context(|| format!("Invalid dump {}", path.display()))?;
            index.insert(kv);
        }

        let estimate = (sampled_lines > 0 && sampled_bytes > 0)
            .then(|| (file_size as f64 / (sampled_bytes as f64 / sampled_lines as f64)).round() as u64);

        tracing::info!(
            "Loaded {} keys from {} (estimated {:?})",
            index.len(),
            path.display(),
            estimate
        );

        Ok(Self {
            path,
            index,
            partitions: 1,
            estimate,
        })
    }

    /// Split scans into `partitions` hash-slot ranges. Each partition
    /// re-reads the file and keeps only its own keys. There are never more
    /// partitions than hash slots.
    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions.clamp(1, SLOT_COUNT as usize);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of keys in the dump.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[async_trait]
impl KeyScanner for JsonlKeyspace {
    fn partitions(&self) -> usize {
        self.partitions
    }

    async fn scan(&self, partition: usize, filter: &KeyFilter) -> Result<KeyStream, SourceError> {
        let range = partition_ranges(self.partitions)
            .get(partition)
            .cloned()
            .ok_or_else(|| SourceError::fatal(format!("partition {partition} out of range")))?;

        let file = tokio::fs::File::open(&self.path).await.map_err(|e| {
            let message = format!("{}: {e}", self.path.display());
            match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => SourceError::fatal(message),
                _ => SourceError::transient(message),
            }
        })?;

        let filter = filter.clone();
        let lines = LinesStream::new(BufReader::new(file).lines());
        let keys = lines
            .enumerate()
            .filter_map(move |(i, line)| {
                let item = match line {
                    Err(e) => Some(Err(SourceError::fatal(format!("read error: {e}")))),
                    Ok(line) if line.trim().is_empty() => None,
                    Ok(line) => match parse_line(&line, i + 1) {
                        Err(e) => Some(Err(SourceError::fatal(format!("{e:#}")))),
                        Ok(kv) => {
                            let key = kv.key.as_slice();
                            (range.contains(&key_slot(key)) && filter.matches_key(key))
                                .then_some(Ok(kv))
                        }
                    },
                };
                future::ready(item)
            });
        Ok(Box::pin(keys))
    }
}

#[async_trait]
impl KeyLookup for JsonlKeyspace {
    async fn get(&self, key: &Key, fetch: Fetch) -> Result<KeyValue, SourceError> {
        self.index.get(key, fetch).await
    }
}

#[async_trait]
impl SizeEstimator for JsonlKeyspace {
    async fn approximate_count(&self) -> Option<u64> {
        self.estimate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump::write_dump;
    use keyspace_types::{Bytes, Ttl, Value};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn string(key: &str, value: &str) -> KeyValue {
        KeyValue::new(
            Bytes::from(key),
            Value::String(Bytes::from(value)),
            Ttl::Persistent,
        )
    }

    async fn collect(keyspace: &JsonlKeyspace, filter: &KeyFilter) -> Vec<KeyValue> {
        let mut out = Vec::new();
        for partition in 0..keyspace.partitions() {
            let mut stream = keyspace.scan(partition, filter).await.unwrap();
            while let Some(item) = stream.next().await {
                out.push(item.unwrap());
            }
        }
        out
    }

    #[tokio::test]
    async fn test_open_scan_and_lookup() {
        let file = NamedTempFile::new().unwrap();
        let snapshots: Vec<KeyValue> = (0..100)
            .map(|i| string(&format!("key:{i}"), &i.to_string()))
            .collect();
        write_dump(file.path(), &snapshots).await.unwrap();

        let keyspace = JsonlKeyspace::open(file.path()).await.unwrap().with_partitions(3);
        assert_eq!(keyspace.len(), 100);

        let scanned = collect(&keyspace, &KeyFilter::new()).await;
        assert_eq!(scanned.len(), 100);

        let kv = keyspace.get(&Key::from("key:42"), Fetch::Full).await.unwrap();
        assert_eq!(kv, string("key:42", "42"));
        let absent = keyspace.get(&Key::from("nope"), Fetch::Full).await.unwrap();
        assert!(!absent.exists());
    }

    #[tokio::test]
    async fn test_partitions_capped_at_slot_count() {
        let file = NamedTempFile::new().unwrap();
        write_dump(file.path(), &[string("a", "1")]).await.unwrap();

        let keyspace = JsonlKeyspace::open(file.path())
            .await
            .unwrap()
            .with_partitions(20_000);
        assert_eq!(keyspace.partitions(), SLOT_COUNT as usize);
        let last = keyspace
            .scan(SLOT_COUNT as usize - 1, &KeyFilter::new())
            .await;
        assert!(last.is_ok());
    }

    #[tokio::test]
    async fn test_estimate_is_close_for_uniform_lines() {
        let file = NamedTempFile::new().unwrap();
        let snapshots: Vec<KeyValue> = (0..1000)
            .map(|i| string(&format!("key:{i:05}"), "value"))
            .collect();
        write_dump(file.path(), &snapshots).await.unwrap();

        let keyspace = JsonlKeyspace::open(file.path()).await.unwrap();
        let estimate = keyspace.approximate_count().await.unwrap();
        assert!((990..=1010).contains(&estimate), "estimate {estimate}");
    }

    #[tokio::test]
    async fn test_empty_dump_has_no_estimate() {
        let file = NamedTempFile::new().unwrap();
        let keyspace = JsonlKeyspace::open(file.path()).await.unwrap();
        assert!(keyspace.is_empty());
        assert_eq!(keyspace.approximate_count().await, None);
    }

    #[tokio::test]
    async fn test_blank_lines_skipped_and_filter_pushed_down() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"key":"user:1","type":"string","value":"a"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"key":"order:1","type":"string","value":"b"}}"#).unwrap();
        file.flush().unwrap();

        let keyspace = JsonlKeyspace::open(file.path()).await.unwrap();
        let scanned = collect(&keyspace, &KeyFilter::new().include("user:*")).await;
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].key, Key::from("user:1"));
    }

    #[tokio::test]
    async fn test_malformed_line_is_rejected_with_line_number() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"key":"a","type":"string","value":"1"}}"#).unwrap();
        writeln!(file, "garbage").unwrap();
        file.flush().unwrap();

        let err = JsonlKeyspace::open(file.path()).await.unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[tokio::test]
    async fn test_missing_file() {
        assert!(JsonlKeyspace::open("/nonexistent/dump.jsonl").await.is_err());
    }
}
