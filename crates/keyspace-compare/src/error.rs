//! Error types for the comparison engine.

use keyspace_types::Key;
use thiserror::Error;

/// Failures reported by enumeration and lookup collaborators.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// Retryable I/O failure (timeouts, dropped connections, busy nodes).
    #[error("Transient I/O error: {0}")]
    Transient(String),

    /// The collaborator cannot continue (authentication, permanently lost connection).
    #[error("Connection lost: {0}")]
    Fatal(String),
}

impl SourceError {
    pub fn transient(message: impl Into<String>) -> Self {
        SourceError::Transient(message.into())
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        SourceError::Fatal(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Transient(_))
    }
}

/// Errors surfaced by a comparison run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompareError {
    /// Invalid tolerance/mode combination, detected before any key is processed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Retries exhausted or the connection is permanently gone.
    #[error("Connectivity lost during {operation} after {attempts} attempt(s){}: {message}", key_suffix(.key))]
    FatalConnectivity {
        operation: String,
        key: Option<Key>,
        attempts: u32,
        message: String,
    },

    /// A pipeline task panicked or was aborted.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn key_suffix(key: &Option<Key>) -> String {
    match key {
        Some(k) => format!(" on key '{k}'"),
        None => String::new(),
    }
}

impl CompareError {
    /// Create a Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        CompareError::Configuration(message.into())
    }

    /// Create a FatalConnectivity error
    pub fn fatal(
        operation: impl Into<String>,
        key: Option<Key>,
        attempts: u32,
        message: impl Into<String>,
    ) -> Self {
        CompareError::FatalConnectivity {
            operation: operation.into(),
            key,
            attempts,
            message: message.into(),
        }
    }

    /// Short name of the error kind for reports.
    pub fn kind(&self) -> &'static str {
        match self {
            CompareError::Configuration(_) => "configuration",
            CompareError::FatalConnectivity { .. } => "fatal_connectivity",
            CompareError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_message_names_key() {
        let err = CompareError::fatal("lookup", Some(Key::from("user:1")), 3, "refused");
        let msg = err.to_string();
        assert!(msg.contains("lookup"));
        assert!(msg.contains("'user:1'"));
        assert!(msg.contains("3 attempt(s)"));
        assert_eq!(err.kind(), "fatal_connectivity");
    }

    #[test]
    fn test_fatal_message_without_key() {
        let err = CompareError::fatal("scan", None, 1, "gone");
        assert_eq!(
            err.to_string(),
            "Connectivity lost during scan after 1 attempt(s): gone"
        );
    }
}
