//! Error types for auditship

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for auditship operations
pub type Result<T> = std::result::Result<T, ShipError>;

/// Main error type for auditship.
///
/// `State` is the only fatal kind: it means the watermark file could not be
/// read or written, and the run as a whole must stop. Every other kind is
/// scoped to the subtree (server, database, subfolder or blob) it occurred
/// in and is recorded in the failure ledger instead of aborting the run.
#[derive(Error, Debug)]
pub enum ShipError {
    #[error("state file error at {path}: {reason}")]
    State { path: PathBuf, reason: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("ingestion error: {0}")]
    Ingestion(String),

    #[error("decompression error: {0}")]
    Decompress(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ShipError {
    pub fn state(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        ShipError::State {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Fatal errors abort the whole run instead of being recorded per subtree.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ShipError::State { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_errors_are_fatal() {
        let err = ShipError::state("/tmp/watermarks.json", "permission denied");
        assert!(err.is_fatal());
        assert!(err.to_string().contains("watermarks.json"));
    }

    #[test]
    fn test_subtree_errors_are_not_fatal() {
        assert!(!ShipError::Storage("listing failed".into()).is_fatal());
        assert!(!ShipError::Ingestion("503".into()).is_fatal());
        assert!(!ShipError::Decompress("bad gzip header".into()).is_fatal());
    }
}
