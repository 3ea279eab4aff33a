//! Error types for DDSP.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for DDSP operations.
pub type Result<T> = std::result::Result<T, DdspError>;

/// Main error type for DDSP operations.
#[derive(Error, Debug)]
pub enum DdspError {
    /// Operation not implemented by this provider or schema.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// A required configuration value was never bound.
    #[error("Missing required configuration value: {0}")]
    MissingRequired(String),

    /// A serialized feature disagrees with its declared shape or dtype.
    #[error("Schema mismatch for feature '{feature}': {reason}")]
    SchemaMismatch {
        /// Feature name.
        feature: String,
        /// What disagreed.
        reason: String,
    },

    /// A record lacks an expected field.
    #[error("Missing field: {0}")]
    MissingField(String),

    /// A TFRecord file is truncated or fails its checksum.
    #[error("Corrupt record in {}: {reason}", path.display())]
    CorruptRecord {
        /// File being read.
        path: PathBuf,
        /// Description of the corruption.
        reason: String,
    },

    /// Malformed protobuf payload.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Configuration errors (syntax, unknown selectors, type mismatches).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid file pattern.
    #[error("Invalid file pattern: {0}")]
    Pattern(String),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DdspError {
    /// Shorthand for a [`DdspError::SchemaMismatch`].
    pub fn schema_mismatch(feature: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            feature: feature.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`DdspError::CorruptRecord`].
    pub fn corrupt_record(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
