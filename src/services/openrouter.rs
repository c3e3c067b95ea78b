use serde::{Deserialize, Serialize};

use super::ai_service::{status_error, Completion, ModelClient, ModelError, ModelImage, StopReason};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ContentPart {
    Text {
        #[serde(rename = "type")]
        content_type: String,
        text: String
    },
    ImageUrl {
        #[serde(rename = "type")]
        content_type: String,
        image_url: ImageData
    },
}

#[derive(Debug, Serialize)]
struct ImageData {
    url: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<MessageContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
}

/// OpenAI-compatible chat completions backend (OpenRouter)
pub struct OpenRouterClient {
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl OpenRouterClient {
    pub fn new(api_key: String, model: String, max_tokens: u32) -> Self {
        Self {
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens,
            temperature: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    fn build_request(&self, image: &ModelImage, instruction: &str) -> ChatRequest {
        let messages = vec![ChatMessage {
            role: "user".to_string(),
            content: vec![
                ContentPart::Text {
                    content_type: "text".to_string(),
                    text: instruction.to_string(),
                },
                ContentPart::ImageUrl {
                    content_type: "image_url".to_string(),
                    image_url: ImageData {
                        url: image.data_url(),
                    },
                },
            ],
        }];

        ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

fn decode_response(body: &str) -> Result<Completion, ModelError> {
    let chat_response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ModelError::MalformedResponse(format!("invalid JSON envelope: {}", e)))?;

    let choice = chat_response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ModelError::MalformedResponse("response has no choices".to_string()))?;

    let text = choice
        .message
        .and_then(|m| m.content)
        .ok_or_else(|| ModelError::MalformedResponse("choice has no message content".to_string()))?;

    Ok(Completion {
        text,
        stop_reason: StopReason::from_provider(choice.finish_reason.as_deref()),
        input_tokens: chat_response.usage.as_ref().and_then(|u| u.prompt_tokens),
        output_tokens: chat_response.usage.as_ref().and_then(|u| u.completion_tokens),
    })
}

#[async_trait::async_trait]
impl ModelClient for OpenRouterClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, image: &ModelImage, instruction: &str) -> Result<Completion, ModelError> {
        let request = self.build_request(image, instruction);

        log::info!("🤖 Sending request to OpenRouter with model: {}", self.model);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("X-Title", "Brew Analyzer")
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::Unavailable(e.to_string()))?;

        let status = response.status();
        log::debug!("📥 OpenRouter response status: {}", status);

        let response_text = response
            .text()
            .await
            .map_err(|e| ModelError::Unavailable(format!("reading response body: {}", e)))?;

        if !status.is_success() {
            log::error!("❌ OpenRouter API error ({}): {}", status, response_text);
            return Err(status_error(status, response_text));
        }

        log::debug!("📄 Raw OpenRouter response size: {} bytes", response_text.len());
        decode_response(&response_text)
    }
}
