use thiserror::Error;

use crate::models::MediaType;

/// An image ready to be sent to a model: base64 payload plus declared type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelImage {
    pub media_type: MediaType,
    pub base64: String,
}

impl ModelImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type.mime(), self.base64)
    }
}

/// Why the model stopped generating
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    Other(String),
}

impl StopReason {
    pub fn from_provider(reason: Option<&str>) -> Self {
        match reason {
            Some("end_turn") | Some("stop") | Some("stop_sequence") | None => StopReason::EndTurn,
            Some("max_tokens") | Some("length") => StopReason::MaxTokens,
            Some(other) => StopReason::Other(other.to_string()),
        }
    }
}

/// Decoded model response envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub stop_reason: StopReason,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

impl Completion {
    pub fn new(text: impl Into<String>, stop_reason: StopReason) -> Self {
        Self {
            text: text.into(),
            stop_reason,
            input_tokens: None,
            output_tokens: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    /// Transport failure, throttling or a server-side error
    #[error("model service unavailable: {0}")]
    Unavailable(String),

    /// The service refused the request (4xx other than throttling)
    #[error("model service rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The request body could not be built
    #[error("could not build model request: {0}")]
    Request(String),

    /// The response body did not have the expected envelope
    #[error("malformed model response: {0}")]
    MalformedResponse(String),
}

/// Trait for multimodal model backends (Bedrock, OpenRouter, test stubs)
#[async_trait::async_trait]
pub trait ModelClient: Send + Sync {
    fn model_id(&self) -> &str;

    /// Send one image plus one text instruction, get one text completion back.
    async fn invoke(&self, image: &ModelImage, instruction: &str) -> Result<Completion, ModelError>;
}

/// Classify a non-success HTTP status from a model endpoint.
pub fn status_error(status: reqwest::StatusCode, body: String) -> ModelError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ModelError::Unavailable(format!("HTTP {}: {}", status, body))
    } else {
        ModelError::Rejected {
            status: status.as_u16(),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_reason_mapping() {
        assert_eq!(StopReason::from_provider(Some("end_turn")), StopReason::EndTurn);
        assert_eq!(StopReason::from_provider(Some("stop")), StopReason::EndTurn);
        assert_eq!(StopReason::from_provider(None), StopReason::EndTurn);
        assert_eq!(StopReason::from_provider(Some("max_tokens")), StopReason::MaxTokens);
        assert_eq!(StopReason::from_provider(Some("length")), StopReason::MaxTokens);
        assert_eq!(
            StopReason::from_provider(Some("content_filtered")),
            StopReason::Other("content_filtered".to_string())
        );
    }

    #[test]
    fn test_status_error_classification() {
        assert!(matches!(
            status_error(reqwest::StatusCode::TOO_MANY_REQUESTS, String::new()),
            ModelError::Unavailable(_)
        ));
        assert!(matches!(
            status_error(reqwest::StatusCode::BAD_GATEWAY, String::new()),
            ModelError::Unavailable(_)
        ));
        assert!(matches!(
            status_error(reqwest::StatusCode::BAD_REQUEST, "bad".to_string()),
            ModelError::Rejected { status: 400, .. }
        ));
    }

    #[test]
    fn test_data_url() {
        let image = ModelImage {
            media_type: MediaType::Png,
            base64: "AAEC".to_string(),
        };
        assert_eq!(image.data_url(), "data:image/png;base64,AAEC");
    }
}
