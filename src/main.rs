mod api;
mod config;
mod error;
mod handlers;
mod models;
mod services;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::sync::Arc;

use config::{AppConfig, ModelProvider, StorageBackend};
use handlers::{BrewAnalyzer, BrewLogHandler};
use models::AnalysisRequest;
use services::{
    BedrockClient, BedrockConfig, Database, ImageFetcher, LocalImageStore, ModelClient, OpenRouterClient,
    S3ImageStore,
};

#[derive(Parser)]
#[command(name = "brew-analyzer", version, about = "Coffee brew photo analysis service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Analyze a single stored photo and print the result as JSON
    Analyze {
        #[arg(long)]
        photo_key: String,
        #[arg(long)]
        brew_method: String,
    },
}

fn build_fetcher(config: &AppConfig) -> Result<Arc<dyn ImageFetcher>> {
    let fetcher: Arc<dyn ImageFetcher> = match &config.storage {
        StorageBackend::S3 { endpoint } => {
            let credentials = config
                .aws_credentials
                .clone()
                .ok_or_else(|| anyhow::anyhow!("AWS credentials are required for S3 storage"))?;
            if config.bucket_name.is_none() {
                log::warn!("⚠️ BUCKET_NAME not set, every analysis will fail until it is configured");
            }
            log::info!("✅ S3 storage initialized (bucket={:?}, region={})", config.bucket_name, config.region);
            Arc::new(S3ImageStore::new(
                config.bucket_name.clone(),
                config.region.clone(),
                endpoint.clone(),
                credentials,
            ))
        }
        StorageBackend::Local { root } => {
            log::info!("✅ Local photo storage initialized at {}", root.display());
            Arc::new(LocalImageStore::new(root.clone()))
        }
    };
    Ok(fetcher)
}

fn build_model(config: &AppConfig) -> Result<Arc<dyn ModelClient>> {
    let model: Arc<dyn ModelClient> = match &config.model_provider {
        ModelProvider::Bedrock { endpoint } => {
            let credentials = config
                .aws_credentials
                .clone()
                .ok_or_else(|| anyhow::anyhow!("AWS credentials are required for Bedrock"))?;
            Arc::new(BedrockClient::new(
                BedrockConfig {
                    model_id: config.model_id.clone(),
                    region: config.model_region.clone(),
                    endpoint: endpoint.clone(),
                    max_tokens: config.model_max_tokens,
                    temperature: config.model_temperature,
                },
                credentials,
            ))
        }
        ModelProvider::OpenRouter { api_key, endpoint } => {
            let mut client = OpenRouterClient::new(api_key.clone(), config.model_id.clone(), config.model_max_tokens)
                .with_temperature(config.model_temperature);
            if let Some(endpoint) = endpoint {
                client = client.with_base_url(endpoint);
            }
            Arc::new(client)
        }
    };
    log::info!("✅ Model client initialized with model: {}", model.model_id());
    Ok(model)
}

async fn run_once(analyzer: &BrewAnalyzer, photo_key: String, brew_method: String) -> Result<()> {
    let request = AnalysisRequest::new(photo_key, brew_method);
    match analyzer.analyze(&request).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(e) => {
            log::error!("❌ Analysis failed: {} ({})", e.kind(), e);
            anyhow::bail!("{}: {}", e.kind(), e)
        }
    }
}

#[cfg(feature = "http-server")]
async fn serve(config: &AppConfig, analyzer: Arc<BrewAnalyzer>) -> Result<()> {
    use api::server::create_router;

    let brew_logs = match &config.database_url {
        Some(url) => {
            let db = Arc::new(Database::new(url).await?);
            log::info!("✅ PostgreSQL database initialized");
            Some(Arc::new(BrewLogHandler::new(db, analyzer.clone())))
        }
        None => {
            log::warn!("⚠️ DATABASE_URL not set, brew log routes are disabled");
            None
        }
    };

    let app = create_router(analyzer, brew_logs);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    log::info!("🌐 API server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("🛑 Shutting down...");
        })
        .await?;

    Ok(())
}

#[cfg(not(feature = "http-server"))]
async fn serve(_config: &AppConfig, _analyzer: Arc<BrewAnalyzer>) -> Result<()> {
    anyhow::bail!("built without the http-server feature; use the analyze subcommand")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables (before the logger so RUST_LOG from .env applies)
    dotenv().ok();

    // Initialize logger
    env_logger::init();

    let cli = Cli::parse();

    log::info!("🚀 Starting Brew Analyzer...");

    let config = AppConfig::from_env()?;
    let fetcher = build_fetcher(&config)?;
    let model = build_model(&config)?;
    let analyzer = Arc::new(BrewAnalyzer::new(fetcher, model, config.analyzer.clone()));
    log::info!("✅ Analyzer ready (prompt {})", handlers::prompt::PROMPT_VERSION);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, analyzer).await,
        Command::Analyze { photo_key, brew_method } => run_once(&analyzer, photo_key, brew_method).await,
    }
}
