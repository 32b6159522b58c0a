//! Comparison configuration.
//!
//! A [`CompareConfig`] is built once, validated before any key is touched,
//! and shared read-only by every task of a run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::CompareError;
use crate::filter::KeyFilter;
use crate::retry::RetryPolicy;
use crate::transform::{KeyTransform, KeyValueProcessor};

/// How much of each key is compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareMode {
    /// Type and TTL only; values are neither fetched nor compared.
    Quick,
    /// Complete value equality.
    #[default]
    Full,
}

impl fmt::Display for CompareMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareMode::Quick => f.write_str("quick"),
            CompareMode::Full => f.write_str("full"),
        }
    }
}

/// Which side drives the enumeration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Traversal {
    /// Enumerate the source, look up the target. Cannot see target-only keys.
    #[default]
    SourceDriven,
    /// Enumerate the target, look up the source. Cannot see source-only keys.
    TargetDriven,
    /// A source-driven pass followed by a target-driven pass that only
    /// records keys missing from the source.
    Bidirectional,
}

impl Traversal {
    pub fn needs_inverse_transform(&self) -> bool {
        !matches!(self, Traversal::SourceDriven)
    }
}

impl fmt::Display for Traversal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Traversal::SourceDriven => f.write_str("source-driven"),
            Traversal::TargetDriven => f.write_str("target-driven"),
            Traversal::Bidirectional => f.write_str("bidirectional"),
        }
    }
}

/// Settings for one comparison run.
#[derive(Clone)]
pub struct CompareConfig {
    pub mode: CompareMode,
    /// Largest TTL difference still considered equal.
    pub ttl_tolerance: Duration,
    /// Whether stream entry identifiers participate in equality.
    pub compare_stream_ids: bool,
    /// Largest sorted-set score difference still considered equal.
    pub score_tolerance: f64,
    pub filter: KeyFilter,
    pub transform: Option<Arc<dyn KeyTransform>>,
    pub processors: Vec<Arc<dyn KeyValueProcessor>>,
    pub traversal: Traversal,
    /// Size of the comparator worker pool (bounds in-flight lookups).
    pub workers: usize,
    /// Capacity of the producer-to-worker key queue.
    pub queue_capacity: usize,
    pub status_interval: Duration,
    /// Log every diff record. Periodic progress lines are suppressed.
    pub show_diffs: bool,
    /// Values larger than this are elided from diff records.
    pub max_diff_value_bytes: usize,
    pub retry: RetryPolicy,
    pub lookup_timeout: Duration,
    pub estimate_timeout: Duration,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            mode: CompareMode::Full,
            ttl_tolerance: Duration::ZERO,
            compare_stream_ids: true,
            score_tolerance: 0.0,
            filter: KeyFilter::default(),
            transform: None,
            processors: Vec::new(),
            traversal: Traversal::SourceDriven,
            workers: 8,
            queue_capacity: 10_000,
            status_interval: Duration::from_secs(1),
            show_diffs: false,
            max_diff_value_bytes: 64 * 1024,
            retry: RetryPolicy::default(),
            lookup_timeout: Duration::from_secs(10),
            estimate_timeout: Duration::from_secs(5),
        }
    }
}

impl fmt::Debug for CompareConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompareConfig")
            .field("mode", &self.mode)
            .field("ttl_tolerance", &self.ttl_tolerance)
            .field("compare_stream_ids", &self.compare_stream_ids)
            .field("score_tolerance", &self.score_tolerance)
            .field("filter", &self.filter)
            .field("transform", &self.transform)
            .field("processors", &self.processors.len())
            .field("traversal", &self.traversal)
            .field("workers", &self.workers)
            .field("queue_capacity", &self.queue_capacity)
            .field("show_diffs", &self.show_diffs)
            .field("retry", &self.retry)
            .finish()
    }
}

impl CompareConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: CompareMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_ttl_tolerance(mut self, tolerance: Duration) -> Self {
        self.ttl_tolerance = tolerance;
        self
    }

    /// Exclude stream entry identifiers from equality, for streams that
    /// were replicated with regenerated identifiers.
    pub fn with_compare_stream_ids(mut self, compare: bool) -> Self {
        self.compare_stream_ids = compare;
        self
    }

    pub fn with_score_tolerance(mut self, tolerance: f64) -> Self {
        self.score_tolerance = tolerance;
        self
    }

    pub fn with_filter(mut self, filter: KeyFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_transform(mut self, transform: Arc<dyn KeyTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_processor(mut self, processor: Arc<dyn KeyValueProcessor>) -> Self {
        self.processors.push(processor);
        self
    }

    pub fn with_traversal(mut self, traversal: Traversal) -> Self {
        self.traversal = traversal;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self
    }

    pub fn with_show_diffs(mut self, show: bool) -> Self {
        self.show_diffs = show;
        self
    }

    pub fn with_max_diff_value_bytes(mut self, bytes: usize) -> Self {
        self.max_diff_value_bytes = bytes;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub fn with_estimate_timeout(mut self, timeout: Duration) -> Self {
        self.estimate_timeout = timeout;
        self
    }

    /// Reject settings that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<(), CompareError> {
        if self.workers == 0 {
            return Err(CompareError::configuration("workers must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(CompareError::configuration(
                "queue capacity must be at least 1",
            ));
        }
        if self.status_interval.is_zero() {
            return Err(CompareError::configuration(
                "status interval must be greater than zero",
            ));
        }
        if self.lookup_timeout.is_zero() {
            return Err(CompareError::configuration(
                "lookup timeout must be greater than zero",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(CompareError::configuration(
                "retry attempts must be at least 1",
            ));
        }
        if !self.score_tolerance.is_finite() || self.score_tolerance < 0.0 {
            return Err(CompareError::configuration(format!(
                "score tolerance must be a non-negative number, got {}",
                self.score_tolerance
            )));
        }
        if self.mode == CompareMode::Quick && !self.compare_stream_ids {
            return Err(CompareError::configuration(
                "ignoring stream entry IDs requires full comparison (quick mode never compares stream contents)",
            ));
        }
        if self.traversal.needs_inverse_transform() {
            if let Some(transform) = &self.transform {
                if !transform.is_invertible() {
                    return Err(CompareError::configuration(format!(
                        "{} traversal requires an invertible key transform",
                        self.traversal
                    )));
                }
            }
        }
        for range in &self.filter.slots {
            if range.start() > range.end() || *range.end() >= crate::slot::SLOT_COUNT {
                return Err(CompareError::configuration(format!(
                    "invalid slot range {}:{}",
                    range.start(),
                    range.end()
                )));
            }
        }
        Ok(())
    }
}
