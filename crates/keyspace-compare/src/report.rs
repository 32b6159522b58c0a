//! Comparison report and diff record types.

use chrono::{DateTime, Utc};
use keyspace_types::{Key, KeyValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::comparator::Verdict;
use crate::config::{CompareMode, Traversal};
use crate::status::StatusCounts;

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// Aborted by an unrecoverable error.
    Failed {
        /// Error kind, e.g. `fatal_connectivity`.
        kind: String,
        error: String,
        /// Last key that received a verdict before the failure.
        last_key: Option<Key>,
    },
    /// Stopped on request. Counts are partial.
    Cancelled,
}

impl RunStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunStatus::Completed)
    }
}

/// How the caller should read a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Completed with no mismatches.
    Verified,
    /// Completed with at least one mismatch.
    Inconsistent,
    /// Failed or cancelled; the counts cover only part of the keyspace.
    Inconclusive,
}

/// Result of one comparison run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub run_id: Uuid,
    pub counts: StatusCounts,
    pub status: RunStatus,
    pub traversal: Traversal,
    pub mode: CompareMode,
    pub estimated_total: Option<u64>,
    pub last_key: Option<Key>,
    /// Total run time.
    pub duration: Duration,
}

impl ComparisonReport {
    /// Completed with zero non-matching keys.
    pub fn is_verified(&self) -> bool {
        self.outcome() == Outcome::Verified
    }

    pub fn outcome(&self) -> Outcome {
        match self.status {
            RunStatus::Completed if self.counts.mismatches() == 0 => Outcome::Verified,
            RunStatus::Completed => Outcome::Inconsistent,
            RunStatus::Failed { .. } | RunStatus::Cancelled => Outcome::Inconclusive,
        }
    }

    /// Comparison rate over the whole run.
    pub fn keys_per_second(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.counts.processed() as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> String {
        let c = &self.counts;
        let breakdown = format!(
            "{} missing, {} extra, {} type, {} value, {} ttl",
            c.missing, c.extra, c.type_mismatch, c.value_mismatch, c.ttl_mismatch
        );
        match &self.status {
            RunStatus::Completed if c.mismatches() == 0 => format!(
                "Verification PASSED: {}/{} keys matched in {:?}",
                c.matched,
                c.compared(),
                self.duration
            ),
            RunStatus::Completed => format!(
                "Verification FAILED: {} of {} keys differ ({breakdown})",
                c.mismatches(),
                c.compared()
            ),
            RunStatus::Failed { kind, error, last_key } => format!(
                "Verification INCOMPLETE ({kind}): {} keys compared before failure ({breakdown}), last key {}: {error}",
                c.compared(),
                last_key
                    .as_ref()
                    .map(|k| format!("'{k}'"))
                    .unwrap_or_else(|| "none".to_string())
            ),
            RunStatus::Cancelled => format!(
                "Verification INCOMPLETE (cancelled): {} keys compared ({breakdown})",
                c.compared()
            ),
        }
    }
}

/// Detailed record of one non-matching key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffRecord {
    /// Key on the side that drove the enumeration.
    pub key: Key,
    /// Key looked up on the other side, when it differs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_key: Option<Key>,
    pub verdict: Verdict,
    pub source: KeyValue,
    pub target: KeyValue,
    /// Whether oversized values were dropped from the snapshots.
    #[serde(default)]
    pub elided: bool,
    pub observed_at: DateTime<Utc>,
}

impl DiffRecord {
    /// Build a record, dropping any value larger than `max_value_bytes`.
    pub fn new(
        key: Key,
        target_key: Option<Key>,
        verdict: Verdict,
        source: KeyValue,
        target: KeyValue,
        max_value_bytes: usize,
    ) -> Self {
        let (source, source_elided) = elide(source, max_value_bytes);
        let (target, target_elided) = elide(target, max_value_bytes);
        Self {
            key,
            target_key,
            verdict,
            source,
            target,
            elided: source_elided || target_elided,
            observed_at: Utc::now(),
        }
    }
}

fn elide(kv: KeyValue, max_value_bytes: usize) -> (KeyValue, bool) {
    let oversized = kv
        .value
        .as_ref()
        .is_some_and(|v| v.approximate_size() > max_value_bytes);
    if oversized {
        (kv.without_value(), true)
    } else {
        (kv, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyspace_types::{Bytes, Ttl, Value};

    fn report(counts: StatusCounts, status: RunStatus) -> ComparisonReport {
        ComparisonReport {
            run_id: Uuid::new_v4(),
            counts,
            status,
            traversal: Traversal::SourceDriven,
            mode: CompareMode::Full,
            estimated_total: None,
            last_key: None,
            duration: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_verified() {
        let r = report(
            StatusCounts {
                matched: 100,
                ..Default::default()
            },
            RunStatus::Completed,
        );
        assert!(r.is_verified());
        assert_eq!(r.outcome(), Outcome::Verified);
        assert!(r.summary().contains("PASSED"));
        assert!(r.summary().contains("100/100"));
        assert_eq!(r.keys_per_second(), 50.0);
    }

    #[test]
    fn test_inconsistent() {
        let r = report(
            StatusCounts {
                matched: 97,
                missing: 2,
                ttl_mismatch: 1,
                ..Default::default()
            },
            RunStatus::Completed,
        );
        assert_eq!(r.outcome(), Outcome::Inconsistent);
        assert!(r.summary().contains("3 of 100 keys differ"));
    }

    #[test]
    fn test_failed_and_cancelled_are_inconclusive() {
        let failed = report(
            StatusCounts {
                matched: 5,
                ..Default::default()
            },
            RunStatus::Failed {
                kind: "fatal_connectivity".into(),
                error: "refused".into(),
                last_key: Some(Key::from("k9")),
            },
        );
        assert_eq!(failed.outcome(), Outcome::Inconclusive);
        assert!(!failed.is_verified());
        assert!(failed.summary().contains("'k9'"));
        assert!(failed.summary().contains("5 keys compared"));

        let cancelled = report(StatusCounts::default(), RunStatus::Cancelled);
        assert_eq!(cancelled.outcome(), Outcome::Inconclusive);
        assert!(cancelled.summary().contains("cancelled"));
    }

    #[test]
    fn test_diff_record_elides_large_values() {
        let big = KeyValue::new(
            Bytes::from("k"),
            Value::String(Bytes::from("x".repeat(100))),
            Ttl::Persistent,
        );
        let small = KeyValue::new(
            Bytes::from("k"),
            Value::String(Bytes::from("y")),
            Ttl::Persistent,
        );
        let record = DiffRecord::new(
            Key::from("k"),
            None,
            Verdict::ValueMismatch,
            big,
            small,
            10,
        );
        assert!(record.elided);
        assert!(!record.source.has_value());
        assert!(record.target.has_value());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["verdict"], "value_mismatch");
        assert!(json.get("target_key").is_none());
    }
}
