use base64::{engine::general_purpose, Engine};
use std::sync::Arc;
use std::time::Duration;

use super::prompt::{build_instruction, PROMPT_VERSION};
use super::response_parser::parse_completion;
use crate::error::{AnalysisError, Stage};
use crate::models::{AnalysisRequest, AnalysisResult, RawImage};
use crate::services::{ImageFetcher, ModelClient, ModelError, ModelImage, StorageError};

pub const DEFAULT_MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    pub storage_timeout: Duration,
    pub model_timeout: Duration,
    pub max_image_bytes: usize,
    /// Keys must start with this prefix when set (e.g. `brew-photos/`)
    pub key_prefix: Option<String>,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            storage_timeout: Duration::from_secs(10),
            model_timeout: Duration::from_secs(55),
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            key_prefix: None,
        }
    }
}

/// Runs the fetch → prompt → model → parse pipeline for one brew photo.
///
/// Holds no per-request state; share it behind an `Arc` across tasks.
pub struct BrewAnalyzer {
    fetcher: Arc<dyn ImageFetcher>,
    model: Arc<dyn ModelClient>,
    settings: AnalyzerSettings,
}

impl BrewAnalyzer {
    pub fn new(fetcher: Arc<dyn ImageFetcher>, model: Arc<dyn ModelClient>, settings: AnalyzerSettings) -> Self {
        Self {
            fetcher,
            model,
            settings,
        }
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        self.validate_request(request)?;

        log::info!(
            "☕ Analyzing {} brew photo {} (model={}, prompt={})",
            request.brew_method,
            request.photo_key,
            self.model.model_id(),
            PROMPT_VERSION
        );

        let image = self.fetch_image(&request.photo_key).await?;
        let encoded = encode_image(&image, self.settings.max_image_bytes)?;
        drop(image);

        let instruction = build_instruction(&request.brew_method);

        let completion = tokio::time::timeout(
            self.settings.model_timeout,
            self.model.invoke(&encoded, &instruction),
        )
        .await
        .map_err(|_| {
            log::error!("⏱️ Model call timed out after {:?}", self.settings.model_timeout);
            AnalysisError::Timeout {
                stage: Stage::Model,
                after: self.settings.model_timeout,
            }
        })?
        .map_err(model_error)?;
        drop(encoded);

        log::debug!("💬 Model completion: {}", completion.text);

        let result = parse_completion(&completion).map_err(|e| {
            log::warn!("⚠️ Rejected model output for {}: {}", request.photo_key, e);
            e
        })?;

        log::info!(
            "✅ Analysis complete for {}: score={}, channeling={}, over_extraction={}",
            request.photo_key,
            result.extraction_score,
            result.channeling,
            result.over_extraction
        );
        Ok(result)
    }

    fn validate_request(&self, request: &AnalysisRequest) -> Result<(), AnalysisError> {
        if request.photo_key.trim().is_empty() {
            return Err(AnalysisError::InvalidRequest("photoKey is required".to_string()));
        }
        if request.brew_method.trim().is_empty() {
            return Err(AnalysisError::InvalidRequest("brewMethod is required".to_string()));
        }
        if let Some(prefix) = &self.settings.key_prefix {
            if !request.photo_key.starts_with(prefix.as_str()) {
                return Err(AnalysisError::InvalidRequest(format!(
                    "photoKey must start with {}",
                    prefix
                )));
            }
        }
        Ok(())
    }

    async fn fetch_image(&self, key: &str) -> Result<RawImage, AnalysisError> {
        let image = tokio::time::timeout(self.settings.storage_timeout, self.fetcher.fetch(key))
            .await
            .map_err(|_| {
                log::error!("⏱️ Storage fetch for {} timed out after {:?}", key, self.settings.storage_timeout);
                AnalysisError::Timeout {
                    stage: Stage::Storage,
                    after: self.settings.storage_timeout,
                }
            })?
            .map_err(|e| {
                log::error!("❌ Could not load photo {}: {}", key, e);
                AnalysisError::from(e)
            })?;

        if image.is_empty() {
            log::error!("❌ Storage returned no bytes for {}", key);
            return Err(AnalysisError::UpstreamImage(StorageError::EmptyObject(key.to_string())));
        }

        log::debug!("📊 Photo {} loaded: {} bytes ({})", key, image.len(), image.media_type);
        Ok(image)
    }
}

/// Base64-encode the image for transport, refusing oversized or short output.
pub fn encode_image(image: &RawImage, max_bytes: usize) -> Result<ModelImage, AnalysisError> {
    if image.len() > max_bytes {
        return Err(AnalysisError::Encoding(format!(
            "image is {} bytes, limit is {}",
            image.len(),
            max_bytes
        )));
    }

    let base64 = general_purpose::STANDARD.encode(&image.bytes);
    let expected = image.len().div_ceil(3) * 4;
    if base64.len() != expected {
        return Err(AnalysisError::Encoding(format!(
            "encoded length {} does not match expected {}",
            base64.len(),
            expected
        )));
    }

    log::debug!("🔄 Base64 encoded size: {} bytes", base64.len());
    Ok(ModelImage {
        media_type: image.media_type,
        base64,
    })
}

fn model_error(err: ModelError) -> AnalysisError {
    log::error!("❌ Model invocation failed: {}", err);
    match err {
        ModelError::Unavailable(msg) => AnalysisError::ModelUnavailable(msg),
        ModelError::Rejected { status, body } => {
            AnalysisError::ModelUnavailable(format!("request rejected ({}): {}", status, body))
        }
        ModelError::Request(msg) => AnalysisError::Encoding(msg),
        ModelError::MalformedResponse(msg) => AnalysisError::ModelResponseMalformed(msg),
    }
}
