//! Error handling for the retrieval core

use thiserror::Error;

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, RagError>;

/// Main error type for the retrieval core
#[derive(Error, Debug)]
pub enum RagError {
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("shape error: {0}")]
    ShapeError(String),

    #[error("duplicate filename: {0}")]
    Duplicate(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("corruption detected in {artifact}: {reason}")]
    Corruption { artifact: String, reason: String },

    #[error("IO failure: {0}")]
    IoFailure(#[from] std::io::Error),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("backend error: {0}")]
    BackendError(String),

    #[error("unrecoverable parse error: {0}")]
    ParseError(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl RagError {
    /// Whether the boundary layer may safely retry the operation that produced this error.
    ///
    /// Per the propagation policy, no error kind is retried automatically within the core;
    /// this only advises the boundary about idempotent operations (search, list).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagError::Timeout(_) | RagError::Http(_) | RagError::BackendError(_)
        )
    }

    /// Short category label for logging.
    pub fn category(&self) -> &'static str {
        match self {
            RagError::DimensionMismatch { .. } => "dimension_mismatch",
            RagError::ShapeError(_) => "shape_error",
            RagError::Duplicate(_) => "duplicate",
            RagError::NotFound(_) => "not_found",
            RagError::Corruption { .. } => "corruption",
            RagError::IoFailure(_) => "io_failure",
            RagError::Timeout(_) => "timeout",
            RagError::BackendError(_) => "backend_error",
            RagError::ParseError(_) => "parse_error",
            RagError::Config(_) => "config",
            RagError::Serialization(_) => "serialization",
            RagError::Http(_) => "http",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let timeout_error = RagError::Timeout("embedder".to_string());
        assert!(timeout_error.is_retryable());

        let dup_error = RagError::Duplicate("x.txt".to_string());
        assert!(!dup_error.is_retryable());
    }

    #[test]
    fn test_error_category() {
        let err = RagError::NotFound("file_id".to_string());
        assert_eq!(err.category(), "not_found");

        let err = RagError::DimensionMismatch {
            expected: 512,
            actual: 384,
        };
        assert_eq!(err.category(), "dimension_mismatch");
    }
}
