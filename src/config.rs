use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::handlers::analyzer::DEFAULT_MAX_IMAGE_BYTES;
use crate::handlers::AnalyzerSettings;
use crate::services::aws_sigv4::AwsCredentials;
use crate::services::bedrock::DEFAULT_MODEL_ID;

const DEFAULT_REGION: &str = "us-west-2";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    S3 { endpoint: Option<String> },
    Local { root: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelProvider {
    Bedrock { endpoint: Option<String> },
    OpenRouter { api_key: String, endpoint: Option<String> },
}

/// Process-wide configuration, read once at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Checked when a photo is fetched, not here
    pub bucket_name: Option<String>,
    pub storage: StorageBackend,
    pub region: String,
    pub model_provider: ModelProvider,
    pub model_id: String,
    pub model_region: String,
    pub model_max_tokens: u32,
    pub model_temperature: Option<f32>,
    pub analyzer: AnalyzerSettings,
    pub aws_credentials: Option<AwsCredentials>,
    pub database_url: Option<String>,
    pub bind_addr: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        let mut config = Self::from_vars(&vars)?;
        config.aws_credentials = AwsCredentials::from_env();

        let needs_aws = matches!(config.storage, StorageBackend::S3 { .. })
            || matches!(config.model_provider, ModelProvider::Bedrock { .. });
        if needs_aws && config.aws_credentials.is_none() {
            return Err(ConfigError::Missing("AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY"));
        }
        Ok(config)
    }

    /// Build from an explicit variable map (credentials are left unset).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &str| vars.get(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let region = get("AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string());

        let storage = match get("STORAGE_BACKEND").as_deref().unwrap_or("s3") {
            "s3" => StorageBackend::S3 {
                endpoint: get("STORAGE_ENDPOINT"),
            },
            "local" => StorageBackend::Local {
                root: PathBuf::from(get("LOCAL_STORAGE_ROOT").unwrap_or_else(|| "./data".to_string())),
            },
            other => {
                return Err(ConfigError::Invalid {
                    var: "STORAGE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let model_provider = match get("MODEL_PROVIDER").as_deref().unwrap_or("bedrock") {
            "bedrock" => ModelProvider::Bedrock {
                endpoint: get("MODEL_ENDPOINT"),
            },
            "openrouter" => ModelProvider::OpenRouter {
                api_key: get("OPENROUTER_API_KEY").ok_or(ConfigError::Missing("OPENROUTER_API_KEY"))?,
                endpoint: get("MODEL_ENDPOINT"),
            },
            other => {
                return Err(ConfigError::Invalid {
                    var: "MODEL_PROVIDER",
                    value: other.to_string(),
                })
            }
        };

        let analyzer = AnalyzerSettings {
            storage_timeout: Duration::from_secs(parse_or(vars, "STORAGE_TIMEOUT_SECS", 10)?),
            model_timeout: Duration::from_secs(parse_or(vars, "MODEL_TIMEOUT_SECS", 55)?),
            max_image_bytes: parse_or(vars, "MAX_IMAGE_BYTES", DEFAULT_MAX_IMAGE_BYTES)?,
            key_prefix: get("PHOTO_KEY_PREFIX"),
        };

        Ok(Self {
            bucket_name: get("BUCKET_NAME"),
            storage,
            model_region: get("MODEL_REGION").unwrap_or_else(|| region.clone()),
            region,
            model_provider,
            model_id: get("MODEL_ID").unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
            model_max_tokens: parse_or(vars, "MODEL_MAX_TOKENS", 1024)?,
            model_temperature: parse_opt(vars, "MODEL_TEMPERATURE")?,
            analyzer,
            aws_credentials: None,
            database_url: get("DATABASE_URL"),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        })
    }
}

fn parse_opt<T: FromStr>(vars: &HashMap<String, String>, var: &'static str) -> Result<Option<T>, ConfigError> {
    match vars.get(var).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| ConfigError::Invalid {
            var,
            value: raw.to_string(),
        }),
    }
}

fn parse_or<T: FromStr>(vars: &HashMap<String, String>, var: &'static str, default: T) -> Result<T, ConfigError> {
    Ok(parse_opt(vars, var)?.unwrap_or(default))
}
