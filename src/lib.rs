//! keyspace-verify
//!
//! Verifies that a replicated key-value keyspace matches its source.
//!
//! # Features
//!
//! - Quick mode: compares type and TTL of every key
//! - Full mode: additionally compares values, type by type
//! - Source-driven, target-driven or bidirectional traversal
//! - Key filters by glob, hash slot and type
//! - Key prefix rewriting between source and target
//! - Periodic progress lines and an optional JSON Lines diff log
//!
//! # Crates
//!
//! - `keyspace_types` - keys, values and TTLs
//! - `keyspace_compare` - the comparison engine
//! - `keyspace_jsonl` - JSON Lines keyspace dumps
//!
//! # CLI Usage
//!
//! ```bash
//! # Full comparison of two dumps
//! keyspace-verify compare --source source.jsonl --target replica.jsonl
//!
//! # Quick mode, both directions, differences written to a file
//! keyspace-verify compare --source source.jsonl --target replica.jsonl \
//!   --quick --traversal both --diff-output diffs.jsonl
//! ```

pub mod compare;
pub mod config;
pub mod shutdown;

pub use compare::{
    build_config, exit_code, run_compare, scan_partitions, CompareArgs, TraversalArg,
};
pub use config::{parse_duration, Settings};
pub use shutdown::cancel_on_ctrl_c;
