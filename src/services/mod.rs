pub mod ai_service; // Model client trait + shared types
pub mod aws_sigv4;
pub mod bedrock; // Amazon Bedrock (Nova)
pub mod database;
pub mod openrouter; // OpenRouter AI service
pub mod storage; // Brew photo storage (S3 / local)

pub use ai_service::{Completion, ModelClient, ModelError, ModelImage, StopReason};
pub use bedrock::{BedrockClient, BedrockConfig};
pub use database::{BrewLogStore, Database};
pub use openrouter::OpenRouterClient;
pub use storage::{ImageFetcher, LocalImageStore, S3ImageStore, StorageError};
