//! JSON Lines keyspace dumps
//!
//! Lets a comparison run against keyspaces exported to files, one key per
//! line. [`JsonlKeyspace`] implements every collaborator trait the
//! comparison pipeline needs, so a dump can stand in for either side.
//!
//! See [`dump`] for the line format.

pub mod dump;
pub mod keyspace;

pub use dump::{parse_line, to_line, write_dump};
pub use keyspace::JsonlKeyspace;
