//! Keyspace comparison engine
//!
//! Verifies that two key-value datasets (a source and a target, typically a
//! primary and its replica or a migration destination) are equivalent, and
//! classifies every discrepancy.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐                           ┌──────────────┐
//! │    source    │   KeyScanner / KeyLookup  │    target    │
//! │  (Keyspace)  │                           │  (Keyspace)  │
//! └──────┬───────┘                           └──────▲───────┘
//!        │ scan partitions                          │ point lookups
//!        ▼                                          │
//! ┌─────────────────────────────────────────────────┴──────┐
//! │ ComparisonPipeline                                     │
//! │   KeyFilter ─▶ KeyTransform ─▶ processors ─▶ Comparator│
//! └──────────────────────────┬─────────────────────────────┘
//!                            ▼
//!                 StatusAggregator ─▶ ComparisonReport
//! ```
//!
//! Neither keyspace is loaded into memory: the driving side is streamed
//! through a bounded queue and the other side is consulted key by key.
//!
//! # Example
//!
//! ```ignore
//! let pipeline = ComparisonPipeline::new(source, target, CompareConfig::new());
//! let report = pipeline.run(CancellationToken::new()).await?;
//! println!("{}", report.summary());
//! ```

pub mod comparator;
pub mod config;
pub mod error;
pub mod filter;
pub mod glob;
pub mod memory;
pub mod pipeline;
pub mod report;
pub mod retry;
pub mod slot;
pub mod source;
pub mod status;
pub mod transform;

pub use comparator::{KeyComparator, Verdict};
pub use config::{CompareConfig, CompareMode, Traversal};
pub use error::{CompareError, SourceError};
pub use filter::KeyFilter;
pub use memory::MemoryKeyspace;
pub use pipeline::{ComparisonPipeline, PipelineState};
pub use report::{ComparisonReport, DiffRecord, Outcome, RunStatus};
pub use retry::RetryPolicy;
pub use source::{Fetch, KeyLookup, KeyScanner, KeyStream, Keyspace, SizeEstimator};
pub use status::{StatusAggregator, StatusCounts, StatusReporter};
pub use transform::{
    apply_processors, FnProcessor, FnTransform, IgnoreFields, KeyTransform, KeyValueProcessor,
    PrefixRewrite,
};

pub use keyspace_types::{DataType, Key, KeyValue, Ttl, Value};
