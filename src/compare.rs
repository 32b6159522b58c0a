//! The `compare` command.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use keyspace_compare::slot::{parse_slot_range, SLOT_COUNT};
use keyspace_compare::{
    CompareConfig, CompareMode, ComparisonPipeline, ComparisonReport, DiffRecord, IgnoreFields,
    KeyFilter, Outcome, PrefixRewrite, Traversal,
};
use keyspace_jsonl::JsonlKeyspace;
use keyspace_types::DataType;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{parse_duration, Settings};

/// Exit code of a verified run.
pub const EXIT_VERIFIED: i32 = 0;
/// Exit code of a completed run that found differences.
pub const EXIT_INCONSISTENT: i32 = 1;
/// Exit code of a failed or cancelled run, or a startup error.
pub const EXIT_INCONCLUSIVE: i32 = 2;

const DIFF_CHANNEL_CAPACITY: usize = 1024;

/// Which side drives the enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TraversalArg {
    /// Enumerate the source, look up the target
    Source,
    /// Enumerate the target, look up the source
    Target,
    /// Both passes; also reports keys only present on the target
    Both,
}

impl From<TraversalArg> for Traversal {
    fn from(arg: TraversalArg) -> Self {
        match arg {
            TraversalArg::Source => Traversal::SourceDriven,
            TraversalArg::Target => Traversal::TargetDriven,
            TraversalArg::Both => Traversal::Bidirectional,
        }
    }
}

/// Compare two keyspace dumps.
#[derive(Parser, Debug, Clone)]
pub struct CompareArgs {
    /// Source keyspace dump (JSON Lines)
    #[arg(long, env = "KEYSPACE_VERIFY_SOURCE")]
    pub source: PathBuf,

    /// Target keyspace dump (JSON Lines)
    #[arg(long, env = "KEYSPACE_VERIFY_TARGET")]
    pub target: PathBuf,

    /// Settings file (.yaml, .yml or .toml); flags override its values
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Compare type and TTL only, skipping values
    #[arg(long)]
    pub quick: bool,

    /// Largest TTL difference still considered equal (e.g. 500ms, 2s)
    #[arg(long, value_parser = parse_duration)]
    pub ttl_tolerance: Option<Duration>,

    /// Ignore stream entry IDs, comparing entry contents in order
    #[arg(long)]
    pub no_stream_id: bool,

    /// Largest sorted-set score difference still considered equal
    #[arg(long)]
    pub score_tolerance: Option<f64>,

    /// Log every difference (disables periodic progress lines)
    #[arg(long)]
    pub show_diffs: bool,

    /// Write a JSON line per difference to this file
    #[arg(long, value_name = "PATH")]
    pub diff_output: Option<PathBuf>,

    /// Which side drives the enumeration
    #[arg(long, value_enum)]
    pub traversal: Option<TraversalArg>,

    /// Number of comparator workers
    #[arg(long)]
    pub threads: Option<usize>,

    /// Capacity of the queue between scanners and workers
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Interval between progress lines
    #[arg(long, value_parser = parse_duration)]
    pub status_interval: Option<Duration>,

    /// Number of hash-slot partitions scanned concurrently
    #[arg(long)]
    pub scan_partitions: Option<usize>,

    /// Only compare keys matching this glob (repeatable)
    #[arg(long = "key-include", value_name = "GLOB")]
    pub key_include: Vec<String>,

    /// Skip keys matching this glob (repeatable)
    #[arg(long = "key-exclude", value_name = "GLOB")]
    pub key_exclude: Vec<String>,

    /// Only compare keys in this hash-slot range, e.g. 0:5460 (repeatable)
    #[arg(long = "key-slots", value_name = "START:END")]
    pub key_slots: Vec<String>,

    /// Only compare keys of this type, e.g. hash (repeatable)
    #[arg(long = "key-type", value_name = "TYPE")]
    pub key_type: Vec<String>,

    /// Key prefix on the source, replaced by --target-prefix for lookups
    #[arg(long, requires = "target_prefix")]
    pub source_prefix: Option<String>,

    /// Key prefix on the target
    #[arg(long, requires = "source_prefix")]
    pub target_prefix: Option<String>,

    /// Hash and stream field to leave out of the comparison (repeatable)
    #[arg(long = "ignore-hash-field", value_name = "FIELD")]
    pub ignore_hash_fields: Vec<String>,

    /// Attempts per lookup before the run fails
    #[arg(long)]
    pub retry_attempts: Option<u32>,

    /// Timeout for a single lookup
    #[arg(long, value_parser = parse_duration)]
    pub lookup_timeout: Option<Duration>,
}

fn setting_duration(value: &Option<String>, name: &str) -> Result<Option<Duration>> {
    value
        .as_deref()
        .map(|s| parse_duration(s).with_context(|| format!("Invalid {name} in settings file")))
        .transpose()
}

fn pick_list<'a>(cli: &'a [String], file: &'a [String]) -> &'a [String] {
    if cli.is_empty() {
        file
    } else {
        cli
    }
}

/// Merge flags, settings file and defaults into a comparison configuration.
pub fn build_config(args: &CompareArgs, settings: &Settings) -> Result<CompareConfig> {
    let mut config = CompareConfig::new();

    let mode = if args.quick {
        CompareMode::Quick
    } else {
        match settings.mode.as_deref() {
            None | Some("full") => CompareMode::Full,
            Some("quick") => CompareMode::Quick,
            Some(other) => bail!("Invalid mode '{other}' in settings file (expected quick or full)"),
        }
    };
    config = config.with_mode(mode);

    if let Some(tolerance) = args
        .ttl_tolerance
        .or(setting_duration(&settings.ttl_tolerance, "ttl_tolerance")?)
    {
        config = config.with_ttl_tolerance(tolerance);
    }
    let compare_ids = !args.no_stream_id && settings.compare_stream_ids.unwrap_or(true);
    config = config.with_compare_stream_ids(compare_ids);
    if let Some(tolerance) = args.score_tolerance.or(settings.score_tolerance) {
        config = config.with_score_tolerance(tolerance);
    }
    config = config.with_show_diffs(args.show_diffs || settings.show_diffs.unwrap_or(false));

    let traversal = match args.traversal {
        Some(arg) => arg.into(),
        None => match settings.traversal.as_deref() {
            None | Some("source") => Traversal::SourceDriven,
            Some("target") => Traversal::TargetDriven,
            Some("both") => Traversal::Bidirectional,
            Some(other) => bail!(
                "Invalid traversal '{other}' in settings file (expected source, target or both)"
            ),
        },
    };
    config = config.with_traversal(traversal);

    if let Some(workers) = args.threads.or(settings.threads) {
        config = config.with_workers(workers);
    }
    if let Some(capacity) = args.queue_capacity.or(settings.queue_capacity) {
        config = config.with_queue_capacity(capacity);
    }
    if let Some(interval) = args
        .status_interval
        .or(setting_duration(&settings.status_interval, "status_interval")?)
    {
        config = config.with_status_interval(interval);
    }
    if let Some(attempts) = args.retry_attempts.or(settings.retry_attempts) {
        let mut retry = config.retry.clone();
        retry.max_attempts = attempts;
        config = config.with_retry(retry);
    }
    if let Some(timeout) = args
        .lookup_timeout
        .or(setting_duration(&settings.lookup_timeout, "lookup_timeout")?)
    {
        config = config.with_lookup_timeout(timeout);
    }

    let mut filter = KeyFilter::new();
    for pattern in pick_list(&args.key_include, &settings.key_include) {
        filter = filter.include(pattern.clone());
    }
    for pattern in pick_list(&args.key_exclude, &settings.key_exclude) {
        filter = filter.exclude(pattern.clone());
    }
    for spec in pick_list(&args.key_slots, &settings.key_slots) {
        let range = parse_slot_range(spec).map_err(anyhow::Error::msg)?;
        filter = filter.slots(range);
    }
    for name in pick_list(&args.key_type, &settings.key_type) {
        let data_type = DataType::from_name(name);
        if matches!(data_type, DataType::None | DataType::Unknown) {
            bail!("Invalid key type '{name}'");
        }
        filter = filter.data_type(data_type);
    }
    config = config.with_filter(filter);

    let source_prefix = args.source_prefix.clone().or(settings.source_prefix.clone());
    let target_prefix = args.target_prefix.clone().or(settings.target_prefix.clone());
    match (source_prefix, target_prefix) {
        (Some(source), Some(target)) => {
            config = config.with_transform(Arc::new(PrefixRewrite::new(source, target)));
        }
        (None, None) => {}
        _ => bail!("source_prefix and target_prefix must be given together"),
    }

    let ignored = pick_list(&args.ignore_hash_fields, &settings.ignore_hash_fields);
    if !ignored.is_empty() {
        config = config.with_processor(Arc::new(IgnoreFields::new(ignored.iter().cloned())));
    }

    config.validate()?;
    Ok(config)
}

/// Number of hash-slot partitions to scan each dump with.
pub fn scan_partitions(args: &CompareArgs, settings: &Settings) -> Result<usize> {
    let partitions = args.scan_partitions.or(settings.scan_partitions).unwrap_or(1);
    if partitions == 0 || partitions > SLOT_COUNT as usize {
        bail!("scan partitions must be between 1 and {SLOT_COUNT}, got {partitions}");
    }
    Ok(partitions)
}

/// Create the diff output file, then write every received diff record to
/// it as one JSON line.
async fn spawn_diff_writer(
    path: &Path,
    mut records: mpsc::Receiver<DiffRecord>,
) -> Result<JoinHandle<Result<u64>>> {
    let file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create diff output {}", path.display()))?;
    Ok(tokio::spawn(async move {
        let mut writer = tokio::io::BufWriter::new(file);
        let mut written = 0u64;
        while let Some(record) = records.recv().await {
            let json_line = serde_json::to_string(&record)?;
            writer.write_all(json_line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            written += 1;
        }
        writer.flush().await?;
        Ok(written)
    }))
}

async fn open_keyspace(path: &Path, partitions: usize, side: &str) -> Result<JsonlKeyspace> {
    Ok(JsonlKeyspace::open(path)
        .await
        .with_context(|| format!("Failed to open {side} keyspace"))?
        .with_partitions(partitions))
}

/// Run a comparison as described by `args`.
pub async fn run_compare(args: CompareArgs, cancel: CancellationToken) -> Result<ComparisonReport> {
    let settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let config = build_config(&args, &settings)?;
    tracing::debug!("Comparison configuration: {:?}", config);

    let partitions = scan_partitions(&args, &settings)?;
    let source = open_keyspace(&args.source, partitions, "source").await?;
    let target = open_keyspace(&args.target, partitions, "target").await?;

    let mut pipeline = ComparisonPipeline::new(Arc::new(source), Arc::new(target), config);

    let mut writer = None;
    if let Some(path) = args.diff_output.clone().or(settings.diff_output.clone()) {
        let (tx, rx) = mpsc::channel(DIFF_CHANNEL_CAPACITY);
        pipeline = pipeline.with_diff_sink(tx);
        writer = Some((path.clone(), spawn_diff_writer(&path, rx).await?));
    }

    let result = pipeline.run(cancel).await;
    // Closes the diff channel so the writer can finish
    drop(pipeline);

    if let Some((path, writer)) = writer {
        let written = writer.await.context("Diff writer task failed")??;
        tracing::info!("Wrote {} diff records to {}", written, path.display());
    }

    Ok(result?)
}

/// Process exit code for a finished run.
pub fn exit_code(report: &ComparisonReport) -> i32 {
    match report.outcome() {
        Outcome::Verified => EXIT_VERIFIED,
        Outcome::Inconsistent => EXIT_INCONSISTENT,
        Outcome::Inconclusive => EXIT_INCONCLUSIVE,
    }
}
