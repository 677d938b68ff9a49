//! Error types for cfgsync
//!
//! `ConfigError` covers everything the manager can report; `StoreError` is
//! what a backing store reports and is wrapped by `ConfigError::Store`.

use std::fmt;

use thiserror::Error;

/// Result type alias using ConfigError
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Result type alias for backing store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Unified error type for manager operations
#[derive(Debug, Error)]
pub enum ConfigError {
    // -------------------------------------------------------------------------
    // Construction Errors
    // -------------------------------------------------------------------------
    /// Malformed schema: duplicate topic, bad segment, unsupported node kind
    #[error("Schema error at '{topic}': {reason}")]
    Schema { topic: String, reason: String },

    // -------------------------------------------------------------------------
    // Per-call Errors
    // -------------------------------------------------------------------------
    #[error("Topic not found: '{topic}'")]
    NotFound { topic: String },

    #[error("Type mismatch at '{topic}': {reason}")]
    TypeMismatch { topic: String, reason: String },

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ConfigError {
    pub(crate) fn schema(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Schema {
            topic: topic.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(topic: impl Into<String>) -> Self {
        ConfigError::NotFound {
            topic: topic.into(),
        }
    }

    pub(crate) fn mismatch(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::TypeMismatch {
            topic: topic.into(),
            reason: reason.into(),
        }
    }
}

/// One failed `validate` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    /// Topic of the node that rejected its staged value
    pub topic: String,

    /// Message returned by the validator
    pub message: String,
}

/// Every validation failure of a single update, deepest node first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    pub failures: Vec<ValidationFailure>,
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationFailure> {
        self.failures.iter()
    }

    pub(crate) fn push(&mut self, topic: impl Into<String>, message: impl Into<String>) {
        self.failures.push(ValidationFailure {
            topic: topic.into(),
            message: message.into(),
        });
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            let topic = if failure.topic.is_empty() { "<root>" } else { &failure.topic };
            write!(f, "{}: {}", topic, failure.message)?;
        }
        Ok(())
    }
}

/// Error type reported by backing stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Key not found: '{0}'")]
    KeyNotFound(String),

    #[error("Log corruption detected: {0}")]
    Corruption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The transaction closure gave up; nothing was applied
    #[error("Transaction aborted: {0}")]
    Aborted(String),
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
