//! Core types for keyspace-verify.
//!
//! This crate provides the data model shared by every other crate in the
//! workspace:
//!
//! - [`Bytes`] / [`Key`] - Binary-safe byte strings
//! - [`DataType`] - The closed set of structure kinds a key can hold
//! - [`Value`] - Type-dependent payload, one variant per [`DataType`]
//! - [`Ttl`] - Remaining time-to-live or the "no expiry" sentinel
//! - [`KeyValue`] - The observed state of one key on one side of a comparison
//!
//! # Architecture
//!
//! ```text
//! keyspace-types (this crate)
//!    │
//!    ├─── keyspace-compare  (comparator, pipeline, status aggregation)
//!    └─── keyspace-jsonl    (JSON Lines dump reader and writer)
//! ```
//!
//! # Example
//!
//! ```rust
//! use keyspace_types::{Bytes, KeyValue, Ttl, Value};
//! use std::time::Duration;
//!
//! let snapshot = KeyValue::new(
//!     Bytes::from("user:1"),
//!     Value::String(Bytes::from("alice")),
//!     Ttl::ExpiresIn(Duration::from_secs(60)),
//! );
//! assert!(snapshot.exists());
//! ```

pub mod bytes;
pub mod error;
pub mod keyvalue;
pub mod value;

pub use bytes::{Bytes, Key};
pub use error::TypesError;
pub use keyvalue::{KeyValue, Ttl};
pub use value::{DataType, ScoredMember, StreamEntry, Value};
