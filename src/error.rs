//! Error types for the stock query engine

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, QueryError>;

/// Pipeline stage that produced a failure.
///
/// Stages are mutually exclusive so a caller can distinguish
/// "fix your query" from "service unavailable" from "internal issue".
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStage {
    Validation,
    Preprocessing,
    DataFetching,
    Transfer,
}

#[derive(Error, Debug)]
pub enum QueryError {

    // =============================
    // Input errors (rejected before any external call)
    // =============================

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    // =============================
    // Extraction errors
    // =============================

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Model rate-limited: {0}")]
    RateLimited(String),

    #[error("Malformed model output: {0}")]
    MalformedModelOutput(String),

    // =============================
    // Validation errors
    // =============================

    #[error("Invalid database fields: {}", invalid_fields.join(", "))]
    InvalidFields {
        invalid_fields: Vec<String>,
        suggestions: Vec<crate::models::FieldSuggestion>,
    },

    // =============================
    // Retrieval errors
    // =============================

    #[error("Data provider error: {0}")]
    DataFetch(String),

    #[error("Unrecognized provider response shape: {0}")]
    UnrecognizedShape(String),

    #[error("Internal error: {0}")]
    Internal(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl QueryError {
    /// Map an error onto the stage tag reported to callers.
    pub fn stage(&self) -> ErrorStage {
        match self {
            QueryError::InvalidQuery(_) => ErrorStage::Validation,
            QueryError::Extraction(_)
            | QueryError::RateLimited(_)
            | QueryError::MalformedModelOutput(_) => ErrorStage::Preprocessing,
            QueryError::InvalidFields { .. } => ErrorStage::Validation,
            QueryError::DataFetch(_) | QueryError::UnrecognizedShape(_) => {
                ErrorStage::DataFetching
            }
            _ => ErrorStage::Transfer,
        }
    }

    /// True when the failure means "try the next tier in a fallback chain".
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, QueryError::RateLimited(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_tags() {
        assert_eq!(
            QueryError::InvalidQuery("empty".into()).stage(),
            ErrorStage::Validation
        );
        assert_eq!(
            QueryError::RateLimited("429".into()).stage(),
            ErrorStage::Preprocessing
        );
        assert_eq!(
            QueryError::DataFetch("unreachable".into()).stage(),
            ErrorStage::DataFetching
        );
        assert_eq!(
            QueryError::Internal("boom".into()).stage(),
            ErrorStage::Transfer
        );
    }
}
