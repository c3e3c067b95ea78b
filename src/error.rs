use std::time::Duration;
use thiserror::Error;

use crate::services::storage::StorageError;

/// Which external call ran out of time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Storage,
    Model,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Storage => "storage fetch",
            Stage::Model => "model invocation",
        };
        write!(f, "{}", s)
    }
}

/// Everything that can go wrong while analyzing one brew photo
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("Unable to load photo: {0}")]
    UpstreamImage(#[source] StorageError),

    #[error("Image encoding failed: {0}")]
    Encoding(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },

    #[error("Malformed model response: {0}")]
    ModelResponseMalformed(String),

    #[error("Model output contains no JSON object: {0}")]
    ModelOutputNotJson(String),

    #[error("Model output violates schema at `{field}`: expected {expected}, found {found}")]
    ModelOutputSchemaViolation {
        field: String,
        expected: &'static str,
        found: String,
    },

    #[error("Model output was truncated by the token budget")]
    ModelOutputTruncated,
}

impl AnalysisError {
    /// Stable error code for logs, API bodies and the `analysis_error` column
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::InvalidRequest(_) => "InvalidRequest",
            AnalysisError::MissingConfiguration(_) => "MissingConfiguration",
            AnalysisError::UpstreamImage(_) => "UpstreamImageError",
            AnalysisError::Encoding(_) => "EncodingError",
            AnalysisError::ModelUnavailable(_) => "ModelUnavailable",
            AnalysisError::Timeout { .. } => "Timeout",
            AnalysisError::ModelResponseMalformed(_) => "ModelResponseMalformed",
            AnalysisError::ModelOutputNotJson(_) => "ModelOutputNotJSON",
            AnalysisError::ModelOutputSchemaViolation { .. } => "ModelOutputSchemaViolation",
            AnalysisError::ModelOutputTruncated => "ModelOutputTruncated",
        }
    }

    /// Whether re-running the same request has a reasonable chance of succeeding
    /// without any change to prompt or configuration.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnalysisError::ModelUnavailable(_)
                | AnalysisError::Timeout { .. }
                | AnalysisError::UpstreamImage(StorageError::Unavailable(_))
        )
    }

    /// Text that may be shown to an end user. Details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            AnalysisError::InvalidRequest(msg) => msg.clone(),
            AnalysisError::UpstreamImage(_) => "Unable to load photo".to_string(),
            _ => "Analysis failed. Please try again.".to_string(),
        }
    }
}

impl From<StorageError> for AnalysisError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::MissingConfiguration(var) => AnalysisError::MissingConfiguration(var),
            other => AnalysisError::UpstreamImage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_bucket_is_configuration_error() {
        let err: AnalysisError = StorageError::MissingConfiguration("BUCKET_NAME".to_string()).into();
        assert_eq!(err.kind(), "MissingConfiguration");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_storage_errors_wrap_as_upstream() {
        let err: AnalysisError = StorageError::EmptyObject("k.jpg".to_string()).into();
        assert!(matches!(err, AnalysisError::UpstreamImage(StorageError::EmptyObject(_))));
        assert_eq!(err.user_message(), "Unable to load photo");

        let err: AnalysisError = StorageError::Unavailable("connection refused".to_string()).into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_user_message_hides_model_details() {
        let err = AnalysisError::ModelOutputSchemaViolation {
            field: "channeling".to_string(),
            expected: "boolean",
            found: "missing".to_string(),
        };
        assert_eq!(err.user_message(), "Analysis failed. Please try again.");
        assert!(err.to_string().contains("channeling"));
        assert!(!err.is_retryable());
    }
}
