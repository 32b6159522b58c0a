//! Verdict counting and progress reporting.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::comparator::Verdict;

const UNKNOWN_TOTAL: u64 = u64::MAX;

/// Lock-free verdict counters shared by every worker of a run.
#[derive(Debug)]
pub struct StatusAggregator {
    verdicts: [AtomicU64; 6],
    skipped: AtomicU64,
    filtered: AtomicU64,
    estimated_total: AtomicU64,
    start_time: Instant,
}

impl Default for StatusAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusAggregator {
    pub fn new() -> Self {
        Self {
            verdicts: Default::default(),
            skipped: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            estimated_total: AtomicU64::new(UNKNOWN_TOTAL),
            start_time: Instant::now(),
        }
    }

    fn slot(verdict: Verdict) -> usize {
        match verdict {
            Verdict::Match => 0,
            Verdict::Missing => 1,
            Verdict::Extra => 2,
            Verdict::TypeMismatch => 3,
            Verdict::ValueMismatch => 4,
            Verdict::TtlMismatch => 5,
        }
    }

    pub fn record(&self, verdict: Verdict) {
        self.verdicts[Self::slot(verdict)].fetch_add(1, Ordering::Relaxed);
    }

    /// A key disappeared from the driving side between scan and fetch.
    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// A scanned key was rejected by the key filter.
    pub fn record_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self, verdict: Verdict) -> u64 {
        self.verdicts[Self::slot(verdict)].load(Ordering::Relaxed)
    }

    /// Advisory total from the size estimator.
    pub fn set_estimated_total(&self, total: u64) {
        self.estimated_total
            .store(total.min(UNKNOWN_TOTAL - 1), Ordering::Relaxed);
    }

    pub fn estimated_total(&self) -> Option<u64> {
        match self.estimated_total.load(Ordering::Relaxed) {
            UNKNOWN_TOTAL => None,
            total => Some(total),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self) -> StatusCounts {
        StatusCounts {
            matched: self.count(Verdict::Match),
            missing: self.count(Verdict::Missing),
            extra: self.count(Verdict::Extra),
            type_mismatch: self.count(Verdict::TypeMismatch),
            value_mismatch: self.count(Verdict::ValueMismatch),
            ttl_mismatch: self.count(Verdict::TtlMismatch),
            skipped: self.skipped.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
        }
    }

    /// Human-readable progress line.
    ///
    /// `Comparing 45.0% (450/1000) 1200 keys/s | missing: 3 | ttl: 1`
    pub fn status_line(&self) -> String {
        format_status_line(
            &self.snapshot(),
            self.estimated_total(),
            self.elapsed(),
        )
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub matched: u64,
    pub missing: u64,
    pub extra: u64,
    pub type_mismatch: u64,
    pub value_mismatch: u64,
    pub ttl_mismatch: u64,
    pub skipped: u64,
    pub filtered: u64,
}

impl StatusCounts {
    pub fn get(&self, verdict: Verdict) -> u64 {
        match verdict {
            Verdict::Match => self.matched,
            Verdict::Missing => self.missing,
            Verdict::Extra => self.extra,
            Verdict::TypeMismatch => self.type_mismatch,
            Verdict::ValueMismatch => self.value_mismatch,
            Verdict::TtlMismatch => self.ttl_mismatch,
        }
    }

    /// Keys that received a verdict.
    pub fn compared(&self) -> u64 {
        Verdict::ALL.iter().map(|v| self.get(*v)).sum()
    }

    /// Keys that received a verdict other than match.
    pub fn mismatches(&self) -> u64 {
        self.compared() - self.matched
    }

    /// Compared plus skipped keys, i.e. progress through the driving side.
    pub fn processed(&self) -> u64 {
        self.compared() + self.skipped
    }
}

pub fn format_status_line(counts: &StatusCounts, total: Option<u64>, elapsed: Duration) -> String {
    let done = counts.processed();
    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 { done as f64 / secs } else { 0.0 };

    let mut line = match total {
        Some(total) if total > 0 => {
            let pct = (done as f64 / total as f64 * 100.0).min(100.0);
            format!("Comparing {pct:.1}% ({done}/{total}) {rate:.0} keys/s")
        }
        _ => format!("Comparing unknown ({done}/?) {rate:.0} keys/s"),
    };

    for verdict in [
        Verdict::Missing,
        Verdict::TypeMismatch,
        Verdict::ValueMismatch,
        Verdict::TtlMismatch,
        Verdict::Extra,
    ] {
        let n = counts.get(verdict);
        if n > 0 {
            line.push_str(&format!(" | {}: {}", verdict.label(), n));
        }
    }
    line
}

/// Periodic progress logging.
pub struct StatusReporter;

impl StatusReporter {
    /// Log a status line every `interval` while the counts keep changing.
    ///
    /// The task logs one final line and exits once `stop` is cancelled.
    pub fn spawn(
        aggregator: Arc<StatusAggregator>,
        interval: Duration,
        stop: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            // The first tick completes immediately
            timer.tick().await;
            let mut last = aggregator.snapshot();

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = timer.tick() => {
                        let current = aggregator.snapshot();
                        if current != last {
                            tracing::info!("{}", aggregator.status_line());
                            last = current;
                        }
                    }
                }
            }

            tracing::info!("{}", aggregator.status_line());
        })
    }
}
