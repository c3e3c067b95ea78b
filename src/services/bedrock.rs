use serde::{Deserialize, Serialize};

use super::ai_service::{status_error, Completion, ModelClient, ModelError, ModelImage, StopReason};
use super::aws_sigv4::{host_header, uri_encode_path, AwsCredentials, Signer, SigningRequest};

pub const DEFAULT_MODEL_ID: &str = "us.amazon.nova-lite-v1:0";

#[derive(Debug, Clone)]
pub struct BedrockConfig {
    pub model_id: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct NovaRequest {
    messages: Vec<NovaMessage>,
    #[serde(rename = "inferenceConfig")]
    inference_config: InferenceConfig,
}

#[derive(Debug, Serialize)]
struct NovaMessage {
    role: String,
    content: Vec<NovaContent>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum NovaContent {
    Image { image: NovaImage },
    Text { text: String },
}

#[derive(Debug, Serialize)]
struct NovaImage {
    format: String,
    source: NovaImageSource,
}

#[derive(Debug, Serialize)]
struct NovaImageSource {
    bytes: String,
}

#[derive(Debug, Serialize)]
struct InferenceConfig {
    max_new_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct NovaResponse {
    output: Option<NovaOutput>,
    #[serde(rename = "stopReason")]
    stop_reason: Option<String>,
    usage: Option<NovaUsage>,
}

#[derive(Debug, Deserialize)]
struct NovaOutput {
    message: Option<NovaOutputMessage>,
}

#[derive(Debug, Deserialize)]
struct NovaOutputMessage {
    #[serde(default)]
    content: Vec<NovaOutputContent>,
}

#[derive(Debug, Deserialize)]
struct NovaOutputContent {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NovaUsage {
    #[serde(rename = "inputTokens")]
    input_tokens: Option<u64>,
    #[serde(rename = "outputTokens")]
    output_tokens: Option<u64>,
}

/// Amazon Bedrock `InvokeModel` client speaking the Nova messages format
pub struct BedrockClient {
    config: BedrockConfig,
    credentials: AwsCredentials,
    client: reqwest::Client,
}

impl BedrockClient {
    pub fn new(config: BedrockConfig, credentials: AwsCredentials) -> Self {
        Self {
            config,
            credentials,
            client: reqwest::Client::new(),
        }
    }

    fn base_url(&self) -> String {
        match &self.config.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://bedrock-runtime.{}.amazonaws.com", self.config.region),
        }
    }

    fn build_request(&self, image: &ModelImage, instruction: &str) -> NovaRequest {
        NovaRequest {
            messages: vec![NovaMessage {
                role: "user".to_string(),
                content: vec![
                    NovaContent::Image {
                        image: NovaImage {
                            format: image.media_type.format().to_string(),
                            source: NovaImageSource {
                                bytes: image.base64.clone(),
                            },
                        },
                    },
                    NovaContent::Text {
                        text: instruction.to_string(),
                    },
                ],
            }],
            inference_config: InferenceConfig {
                max_new_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            },
        }
    }
}

/// Pull the completion text out of a Nova response body.
fn decode_response(body: &[u8]) -> Result<Completion, ModelError> {
    let response: NovaResponse = serde_json::from_slice(body)
        .map_err(|e| ModelError::MalformedResponse(format!("invalid JSON envelope: {}", e)))?;

    let message = response
        .output
        .and_then(|o| o.message)
        .ok_or_else(|| ModelError::MalformedResponse("missing output.message".to_string()))?;

    let text = message
        .content
        .into_iter()
        .find_map(|c| c.text)
        .ok_or_else(|| ModelError::MalformedResponse("no text content in output.message".to_string()))?;

    Ok(Completion {
        text,
        stop_reason: StopReason::from_provider(response.stop_reason.as_deref()),
        input_tokens: response.usage.as_ref().and_then(|u| u.input_tokens),
        output_tokens: response.usage.as_ref().and_then(|u| u.output_tokens),
    })
}

#[async_trait::async_trait]
impl ModelClient for BedrockClient {
    fn model_id(&self) -> &str {
        &self.config.model_id
    }

    async fn invoke(&self, image: &ModelImage, instruction: &str) -> Result<Completion, ModelError> {
        let request = self.build_request(image, instruction);
        let payload = serde_json::to_vec(&request)
            .map_err(|e| ModelError::Request(e.to_string()))?;

        let path = uri_encode_path(&format!("/model/{}/invoke", self.config.model_id));
        let url = reqwest::Url::parse(&format!("{}{}", self.base_url(), path))
            .map_err(|e| ModelError::Unavailable(format!("invalid endpoint: {}", e)))?;
        let host = host_header(&url);
        // Everything but S3 signs the path encoded a second time
        let canonical_uri = uri_encode_path(&path);

        let signed = Signer::new(&self.credentials, &self.config.region, "bedrock").sign(
            &SigningRequest {
                method: "POST",
                host: &host,
                canonical_uri: &canonical_uri,
                canonical_query: "",
                headers: &[("accept", "application/json"), ("content-type", "application/json")],
                payload: &payload,
            },
            chrono::Utc::now(),
        );

        log::info!("🤖 Invoking Bedrock model: {}", self.config.model_id);
        log::debug!("📤 Request payload size: {} bytes", payload.len());

        let mut builder = self
            .client
            .post(url)
            .header("accept", "application/json")
            .header("content-type", "application/json");
        for (name, value) in signed {
            builder = builder.header(name, value);
        }

        let response = builder
            .body(payload)
            .send()
            .await
            .map_err(|e| ModelError::Unavailable(e.to_string()))?;

        let status = response.status();
        log::debug!("📥 Bedrock response status: {}", status);

        let body = response
            .bytes()
            .await
            .map_err(|e| ModelError::Unavailable(format!("reading response body: {}", e)))?;

        if !status.is_success() {
            let error_text = String::from_utf8_lossy(&body).to_string();
            log::error!("❌ Bedrock API error ({}): {}", status, error_text);
            return Err(status_error(status, error_text));
        }

        let completion = decode_response(&body)?;
        log::debug!(
            "✅ Bedrock completion: {} chars, stop={:?}, tokens in/out={:?}/{:?}",
            completion.text.len(),
            completion.stop_reason,
            completion.input_tokens,
            completion.output_tokens
        );
        Ok(completion)
    }
}
