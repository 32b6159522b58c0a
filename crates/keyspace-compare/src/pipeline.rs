//! The comparison pipeline.
//!
//! ```text
//! ┌─────────────┐   bounded    ┌──────────────┐   lookup    ┌────────────┐
//! │ producer ×P │ ───queue───▶ │  worker ×W   │ ──────────▶ │ other side │
//! │ (partition) │              │ fetch/compare│             └────────────┘
//! └─────────────┘              └──────┬───────┘
//!                                     │ verdict
//!                                     ▼
//!                              ┌──────────────┐
//!                              │  aggregator  │ ──▶ status lines, diff records
//!                              └──────────────┘
//! ```
//!
//! One producer task per scan partition feeds a bounded queue; a fixed pool
//! of workers drains it. The queue capacity plus the pool size bound the
//! number of snapshots held in memory at any time.

use futures::StreamExt;
use keyspace_types::{Key, KeyValue};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::comparator::{KeyComparator, Verdict};
use crate::config::{CompareConfig, CompareMode, Traversal};
use crate::error::{CompareError, SourceError};
use crate::report::{ComparisonReport, DiffRecord, RunStatus};
use crate::source::{Fetch, KeyLookup, KeyScanner, Keyspace, SizeEstimator};
use crate::status::{StatusAggregator, StatusReporter};
use crate::transform::apply_processors;

/// Lifecycle of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Initializing,
    /// Entered when the first key is enumerated.
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Completed | PipelineState::Failed | PipelineState::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Enumerate the source, look up the target.
    Forward,
    /// Enumerate the target, look up the source.
    Reverse,
}

/// Orchestrates enumerate, lookup, compare and aggregate for one pair of
/// keyspaces.
pub struct ComparisonPipeline {
    source: Arc<dyn Keyspace>,
    target: Arc<dyn Keyspace>,
    config: Arc<CompareConfig>,
    diff_sink: Option<mpsc::Sender<DiffRecord>>,
    state: Arc<watch::Sender<PipelineState>>,
}

impl ComparisonPipeline {
    pub fn new(source: Arc<dyn Keyspace>, target: Arc<dyn Keyspace>, config: CompareConfig) -> Self {
        let (state, _) = watch::channel(PipelineState::Initializing);
        Self {
            source,
            target,
            config: Arc::new(config),
            diff_sink: None,
            state: Arc::new(state),
        }
    }

    /// Send a [`DiffRecord`] for every non-matching key to `sink`.
    pub fn with_diff_sink(mut self, sink: mpsc::Sender<DiffRecord>) -> Self {
        self.diff_sink = Some(sink);
        self
    }

    pub fn config(&self) -> &CompareConfig {
        &self.config
    }

    /// Observe state transitions.
    pub fn state(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// Run a full comparison.
    ///
    /// Configuration errors are returned before any key is touched. Every
    /// other outcome, including connectivity failures and cancellation, is
    /// described by the returned report.
    pub async fn run(&self, cancel: CancellationToken) -> Result<ComparisonReport, CompareError> {
        self.state.send_replace(PipelineState::Initializing);
        if let Err(e) = self.config.validate() {
            error!("Invalid comparison configuration: {}", e);
            self.state.send_replace(PipelineState::Failed);
            return Err(e);
        }

        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let aggregator = Arc::new(StatusAggregator::new());
        let last_key = Arc::new(Mutex::new(None));

        info!(
            "Starting comparison {} ({} mode, {} traversal, {} workers)",
            run_id, self.config.mode, self.config.traversal, self.config.workers
        );

        let first_driver = match self.config.traversal {
            Traversal::TargetDriven => self.target.clone(),
            Traversal::SourceDriven | Traversal::Bidirectional => self.source.clone(),
        };
        let estimator = self.spawn_estimator(first_driver, aggregator.clone());

        let stop_reporter = CancellationToken::new();
        // Per-diff logging replaces periodic progress lines
        let reporter = (!self.config.show_diffs).then(|| {
            StatusReporter::spawn(
                aggregator.clone(),
                self.config.status_interval,
                stop_reporter.clone(),
            )
        });

        let run_token = cancel.child_token();
        let mut failure = None;
        for (direction, extra_only) in self.passes() {
            if run_token.is_cancelled() {
                break;
            }
            let pass = Arc::new(self.pass_context(
                direction,
                extra_only,
                aggregator.clone(),
                last_key.clone(),
            ));
            if let Err(e) = run_pass(pass, run_token.clone()).await {
                failure = Some(e);
                break;
            }
        }

        estimator.abort();
        stop_reporter.cancel();
        if let Some(reporter) = reporter {
            if let Err(e) = reporter.await {
                debug!("Status reporter ended abnormally: {}", e);
            }
        }

        let last_key = last_key
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let (status, state) = match failure {
            Some(e) => {
                error!("Comparison {} failed: {}", run_id, e);
                (
                    RunStatus::Failed {
                        kind: e.kind().to_string(),
                        error: e.to_string(),
                        last_key: last_key.clone(),
                    },
                    PipelineState::Failed,
                )
            }
            None if cancel.is_cancelled() => {
                warn!("Comparison {} cancelled, counts are incomplete", run_id);
                (RunStatus::Cancelled, PipelineState::Cancelled)
            }
            None => (RunStatus::Completed, PipelineState::Completed),
        };

        let report = ComparisonReport {
            run_id,
            counts: aggregator.snapshot(),
            status,
            traversal: self.config.traversal,
            mode: self.config.mode,
            estimated_total: aggregator.estimated_total(),
            last_key,
            duration: started.elapsed(),
        };
        info!("{}", report.summary());
        self.state.send_replace(state);
        Ok(report)
    }

    fn passes(&self) -> Vec<(Direction, bool)> {
        match self.config.traversal {
            Traversal::SourceDriven => vec![(Direction::Forward, false)],
            Traversal::TargetDriven => vec![(Direction::Reverse, false)],
            Traversal::Bidirectional => {
                vec![(Direction::Forward, false), (Direction::Reverse, true)]
            }
        }
    }

    fn pass_context(
        &self,
        direction: Direction,
        extra_only: bool,
        aggregator: Arc<StatusAggregator>,
        last_key: Arc<Mutex<Option<Key>>>,
    ) -> PassContext {
        let (driver, other) = match direction {
            Direction::Forward => (self.source.clone(), self.target.clone()),
            Direction::Reverse => (self.target.clone(), self.source.clone()),
        };
        PassContext {
            driver,
            other,
            direction,
            extra_only,
            config: self.config.clone(),
            comparator: KeyComparator::from(self.config.as_ref()),
            aggregator,
            last_key,
            diff_sink: self.diff_sink.clone(),
            state: self.state.clone(),
        }
    }

    fn spawn_estimator(
        &self,
        driver: Arc<dyn Keyspace>,
        aggregator: Arc<StatusAggregator>,
    ) -> tokio::task::JoinHandle<()> {
        let timeout = self.config.estimate_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, driver.approximate_count()).await {
                Ok(Some(total)) => {
                    debug!("Estimated {} keys to compare", total);
                    aggregator.set_estimated_total(total);
                }
                Ok(None) => debug!("Size estimate unavailable, progress will show as unknown"),
                Err(_) => warn!(
                    "Size estimate timed out after {:?}, progress will show as unknown",
                    timeout
                ),
            }
        })
    }
}

/// Everything a producer or worker needs for one pass.
struct PassContext {
    driver: Arc<dyn Keyspace>,
    other: Arc<dyn Keyspace>,
    direction: Direction,
    /// Record only keys absent from the source (second bidirectional pass).
    extra_only: bool,
    config: Arc<CompareConfig>,
    comparator: KeyComparator,
    aggregator: Arc<StatusAggregator>,
    last_key: Arc<Mutex<Option<Key>>>,
    diff_sink: Option<mpsc::Sender<DiffRecord>>,
    state: Arc<watch::Sender<PipelineState>>,
}

impl PassContext {
    fn driver_name(&self) -> &'static str {
        match self.direction {
            Direction::Forward => "source",
            Direction::Reverse => "target",
        }
    }

    fn other_name(&self) -> &'static str {
        match self.direction {
            Direction::Forward => "target",
            Direction::Reverse => "source",
        }
    }

    fn fetch(&self) -> Fetch {
        match self.config.mode {
            CompareMode::Quick => Fetch::TypeAndTtl,
            CompareMode::Full => Fetch::Full,
        }
    }

    fn other_key(&self, key: &Key) -> Key {
        match (&self.config.transform, self.direction) {
            (None, _) => key.clone(),
            (Some(t), Direction::Forward) => t.to_target(key),
            (Some(t), Direction::Reverse) => t.to_source(key).unwrap_or_else(|| key.clone()),
        }
    }

    async fn lookup(
        &self,
        side: &dyn Keyspace,
        side_name: &str,
        key: &Key,
        fetch: Fetch,
    ) -> Result<KeyValue, CompareError> {
        let timeout = self.config.lookup_timeout;
        let operation = format!("{side_name} lookup");
        self.config
            .retry
            .run(&operation, Some(key), || async move {
                match tokio::time::timeout(timeout, side.get(key, fetch)).await {
                    Ok(result) => result,
                    Err(_) => Err(SourceError::transient(format!(
                        "lookup timed out after {timeout:?}"
                    ))),
                }
            })
            .await
    }

    /// Enumerate one partition into the queue.
    async fn produce(
        &self,
        partition: usize,
        queue: mpsc::Sender<KeyValue>,
        cancel: CancellationToken,
    ) -> Result<(), CompareError> {
        let operation = format!("{} scan", self.driver_name());
        let filter = &self.config.filter;
        let driver = &self.driver;
        let mut keys = self
            .config
            .retry
            .run(&operation, None, || driver.scan(partition, filter))
            .await?;

        let mut enumerated = 0u64;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = keys.next() => next,
            };
            let kv = match next {
                Some(Ok(kv)) => kv,
                Some(Err(e)) => {
                    return Err(CompareError::fatal(
                        operation,
                        None,
                        1,
                        format!("partition {partition} interrupted after {enumerated} keys: {e}"),
                    ))
                }
                None => break,
            };
            enumerated += 1;
            self.state.send_if_modified(|state| {
                if *state == PipelineState::Initializing {
                    *state = PipelineState::Running;
                    true
                } else {
                    false
                }
            });

            if !filter.matches(&kv) {
                self.aggregator.record_filtered();
                continue;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sent = queue.send(kv) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }

        debug!(
            "{} partition {} enumerated {} keys",
            self.driver_name(),
            partition,
            enumerated
        );
        Ok(())
    }

    /// Drain the shared queue until it closes or the pass is cancelled.
    async fn work(
        &self,
        queue: Arc<tokio::sync::Mutex<mpsc::Receiver<KeyValue>>>,
        cancel: CancellationToken,
    ) -> Result<(), CompareError> {
        loop {
            let next = {
                let mut queue = queue.lock().await;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    next = queue.recv() => next,
                }
            };
            let Some(kv) = next else {
                return Ok(());
            };
            self.process(kv).await?;
        }
    }

    async fn process(&self, scanned: KeyValue) -> Result<(), CompareError> {
        let driver_key = scanned.key.clone();
        let other_key = self.other_key(&driver_key);

        if self.extra_only {
            let other = self
                .lookup(
                    self.other.as_ref(),
                    self.other_name(),
                    &other_key,
                    Fetch::TypeAndTtl,
                )
                .await?;
            if !other.exists() {
                self.record(driver_key, other_key, Verdict::Extra, other, scanned)
                    .await;
            }
            return Ok(());
        }

        let fetch = self.fetch();
        let needs_fetch = !scanned.exists() || (fetch == Fetch::Full && !scanned.has_value());
        let driver = if needs_fetch {
            self.lookup(self.driver.as_ref(), self.driver_name(), &driver_key, fetch)
                .await?
        } else if fetch == Fetch::TypeAndTtl {
            scanned.without_value()
        } else {
            scanned
        };

        if !driver.exists() {
            debug!(
                "Key {} vanished from the {} before it could be compared",
                driver_key,
                self.driver_name()
            );
            self.aggregator.record_skipped();
            return Ok(());
        }
        // The type may only be known now
        if !self.config.filter.matches(&driver) {
            self.aggregator.record_filtered();
            return Ok(());
        }

        let other = self
            .lookup(self.other.as_ref(), self.other_name(), &other_key, fetch)
            .await?;

        let driver = apply_processors(&self.config.processors, driver);
        let other = apply_processors(&self.config.processors, other);
        let (source, target) = match self.direction {
            Direction::Forward => (driver, other),
            Direction::Reverse => (other, driver),
        };

        let verdict = self.comparator.compare(&source, &target);
        self.record(driver_key, other_key, verdict, source, target)
            .await;
        Ok(())
    }

    async fn record(
        &self,
        key: Key,
        other_key: Key,
        verdict: Verdict,
        source: KeyValue,
        target: KeyValue,
    ) {
        self.aggregator.record(verdict);

        if !verdict.is_match() && (self.config.show_diffs || self.diff_sink.is_some()) {
            let other_key = (other_key != key).then_some(other_key);
            let record = DiffRecord::new(
                key.clone(),
                other_key,
                verdict,
                source,
                target,
                self.config.max_diff_value_bytes,
            );
            if self.config.show_diffs {
                match serde_json::to_string(&record) {
                    Ok(json) => warn!("{} {}: {}", record.verdict, record.key, json),
                    Err(_) => warn!("{} {}", record.verdict, record.key),
                }
            }
            if let Some(sink) = &self.diff_sink {
                if sink.send(record).await.is_err() {
                    debug!("Diff receiver dropped, discarding record");
                }
            }
        }

        *self.last_key.lock().unwrap_or_else(PoisonError::into_inner) = Some(key);
    }
}

async fn run_pass(pass: Arc<PassContext>, cancel: CancellationToken) -> Result<(), CompareError> {
    let partitions = pass.driver.partitions().max(1);
    info!(
        "Comparing {} against {} ({} partitions{})",
        pass.driver_name(),
        pass.other_name(),
        partitions,
        if pass.extra_only { ", extra keys only" } else { "" }
    );

    // Fatal errors stop this pass without cancelling the caller's token.
    let pass_token = cancel.child_token();
    let (tx, rx) = mpsc::channel(pass.config.queue_capacity);
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    let mut producers = JoinSet::new();
    for partition in 0..partitions {
        let pass = pass.clone();
        let tx = tx.clone();
        let token = pass_token.clone();
        producers.spawn(async move {
            let result = pass.produce(partition, tx, token.clone()).await;
            if result.is_err() {
                token.cancel();
            }
            result
        });
    }
    drop(tx);

    let mut workers = JoinSet::new();
    for _ in 0..pass.config.workers {
        let pass = pass.clone();
        let rx = rx.clone();
        let token = pass_token.clone();
        workers.spawn(async move {
            let result = pass.work(rx, token.clone()).await;
            if result.is_err() {
                token.cancel();
            }
            result
        });
    }

    let mut first_error = None;
    for tasks in [&mut producers, &mut workers] {
        while let Some(joined) = tasks.join_next().await {
            let result = joined.unwrap_or_else(|e| Err(CompareError::Internal(e.to_string())));
            if let Err(e) = result {
                pass_token.cancel();
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
