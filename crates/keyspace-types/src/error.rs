//! Error types for snapshot construction and decoding.

use thiserror::Error;

/// Errors raised while building or decoding snapshot types.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypesError {
    /// A TTL integer outside the Redis `PTTL` convention.
    #[error("Invalid TTL value: {0}")]
    InvalidTtl(i64),

    /// A payload whose shape does not fit the declared type.
    #[error("Invalid {data_type} value: {message}")]
    InvalidValue { data_type: String, message: String },

    /// Base64 payload that failed to decode.
    #[error("Invalid base64 payload: {0}")]
    Base64(String),
}

impl TypesError {
    /// Create an InvalidValue error
    pub fn invalid_value(data_type: impl Into<String>, message: impl Into<String>) -> Self {
        TypesError::InvalidValue {
            data_type: data_type.into(),
            message: message.into(),
        }
    }
}
