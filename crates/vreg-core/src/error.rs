//! Error types for Vreg core operations.
//!
//! This module defines well-structured error types using `thiserror` for
//! library-level errors. Record sources are external collaborators and report
//! failures through `anyhow`; those are converted into the variants below at
//! the sync boundary.

use thiserror::Error;

/// Result type alias using VregError
pub type Result<T> = std::result::Result<T, VregError>;

/// Core error types for Vreg operations.
///
/// These errors represent specific failure modes that callers may want to
/// handle differently (e.g., keeping a stale mirror on a fetch failure but
/// reporting a failed write to the user).
#[derive(Error, Debug)]
pub enum VregError {
    // === Record Errors ===
    /// No record with this identifier exists in the store
    #[error("record not found: {id}")]
    RecordNotFound { id: String },

    /// A searchable field could not be normalized for indexing
    #[error("malformed field {field}: {reason}")]
    MalformedField { field: &'static str, reason: String },

    // === Remote Store Errors ===
    /// Reading the full record set failed or timed out
    #[error("fetch from {source_name} failed: {reason}")]
    FetchFailed { source_name: String, reason: String },

    /// A create/update/delete against the remote store failed
    #[error("{operation} failed: {reason}")]
    WriteFailed {
        operation: &'static str,
        reason: String,
    },

    // === Search Errors ===
    /// A query could not be compiled into a matcher
    #[error("invalid search pattern: {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    // === Configuration Errors ===
    /// Configuration file parsing or validation failed
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    // === I/O Errors ===
    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// Serialization/deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    // === Internal Errors ===
    /// Internal error that should not happen
    #[error("internal error: {0}")]
    Internal(String),
}

impl VregError {
    /// Returns true if the last good mirror is still usable after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, VregError::FetchFailed { .. } | VregError::Io(_))
    }

    /// Returns true if this error comes from a rejected write
    pub fn is_write_failure(&self) -> bool {
        matches!(self, VregError::WriteFailed { .. })
    }

    /// Create a fetch error from a source failure, keeping its context chain
    pub fn fetch(source_name: impl Into<String>, err: &anyhow::Error) -> Self {
        VregError::FetchFailed {
            source_name: source_name.into(),
            reason: format!("{:#}", err),
        }
    }

    /// Create a write error from a source failure, keeping its context chain
    pub fn write(operation: &'static str, err: &anyhow::Error) -> Self {
        VregError::WriteFailed {
            operation,
            reason: format!("{:#}", err),
        }
    }

    /// Create a serialization error
    pub fn serialization(reason: impl Into<String>) -> Self {
        VregError::Serialization(reason.into())
    }
}

impl From<serde_json::Error> for VregError {
    fn from(err: serde_json::Error) -> Self {
        VregError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_recoverable() {
        let err = VregError::FetchFailed {
            source_name: "memory".to_string(),
            reason: "connection reset".to_string(),
        };
        assert!(err.is_recoverable());
        assert!(!err.is_write_failure());

        let err = VregError::WriteFailed {
            operation: "create",
            reason: "quota exceeded".to_string(),
        };
        assert!(!err.is_recoverable());
        assert!(err.is_write_failure());
    }

    #[test]
    fn test_fetch_keeps_context_chain() {
        let inner = anyhow::anyhow!("socket closed").context("reading records");
        let err = VregError::fetch("remote", &inner);
        let message = err.to_string();
        assert!(message.contains("reading records"));
        assert!(message.contains("socket closed"));
    }
}
