//! Error types for MEMOIR operations

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
///
/// Always surfaced to the caller, never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid expiration expression '{expression}': {reason}")]
    InvalidExpiration { expression: String, reason: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Serialization and deserialization errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SerializationError {
    /// The stored text is not structurally valid. Carries the offending
    /// content for diagnostics.
    #[error("Malformed cache document: {reason}")]
    MalformedDocument { content: String, reason: String },

    /// A recorded type name has no registered deserializer and cannot be
    /// reconstructed as the requested type.
    #[error("Cannot resolve type '{type_name}' for deserialization")]
    UnresolvableType { type_name: String },

    #[error("Failed to encode cache payload: {reason}")]
    Encode { reason: String },

    #[error("Failed to decode cache payload: {reason}")]
    Decode { reason: String },
}

/// Errors from the human date-expression parser.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TimeParseError {
    #[error("Unable to parse the date expression: '{input}'")]
    Unparseable { input: String },
}

/// Top-level error type aggregating all MEMOIR failure modes.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Cache-only mode with no valid entry. Carries the derived key and
    /// function name for diagnostics.
    #[error("No valid cache entry for '{function}' (key {key})")]
    Miss { function: String, key: String },

    /// The file lock was not acquired within the configured timeout.
    /// Recoverable: callers may retry.
    #[error("Timed out acquiring lock for {path} after {timeout:?}")]
    LockTimeout { path: PathBuf, timeout: Duration },

    /// An internal synchronization primitive was poisoned by a panic.
    #[error("Internal lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    TimeParse(#[from] TimeParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for MEMOIR operations.
pub type CacheResult<T> = Result<T, CacheError>;

impl CacheError {
    /// Returns true if the error is a recoverable condition the caller
    /// may retry (currently only lock timeouts).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CacheError::LockTimeout { .. })
    }

    /// Returns true if this is a cache-only miss.
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::Miss { .. })
    }
}
