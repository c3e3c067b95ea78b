use std::sync::Arc;
use thiserror::Error;

use super::BrewAnalyzer;
use crate::error::AnalysisError;
use crate::models::{AnalysisRequest, AnalysisStatus, BrewLog, NewBrewLog};
use crate::services::BrewLogStore;

#[derive(Debug, Error)]
pub enum BrewLogError {
    #[error("Brew log {0} not found")]
    NotFound(i64),

    #[error("Invalid brew log: {0}")]
    Invalid(String),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

/// Brew records plus the analyze-and-record flow around `BrewAnalyzer`
pub struct BrewLogHandler {
    db: Arc<dyn BrewLogStore>,
    analyzer: Arc<BrewAnalyzer>,
}

impl BrewLogHandler {
    pub fn new(db: Arc<dyn BrewLogStore>, analyzer: Arc<BrewAnalyzer>) -> Self {
        Self { db, analyzer }
    }

    pub async fn create(&self, new_log: &NewBrewLog) -> Result<BrewLog, BrewLogError> {
        if new_log.photo_key.trim().is_empty() {
            return Err(BrewLogError::Invalid("photoKey is required".to_string()));
        }
        let log = self.db.create_brew_log(new_log).await?;
        log::info!("📝 Brew log {} created for {}", log.id, log.photo_key);
        Ok(log)
    }

    pub async fn get(&self, id: i64) -> Result<BrewLog, BrewLogError> {
        self.db.get_brew_log(id).await?.ok_or(BrewLogError::NotFound(id))
    }

    pub async fn list(&self, status: Option<AnalysisStatus>, limit: i64) -> Result<Vec<BrewLog>, BrewLogError> {
        Ok(self.db.list_brew_logs(status, limit.clamp(1, 500)).await?)
    }

    /// Analyze the record's photo and store the outcome on the record.
    ///
    /// On failure the record is marked `failed` with the error kind and the
    /// analysis error is returned; nothing is written in place of missing fields.
    pub async fn analyze(&self, id: i64) -> Result<BrewLog, BrewLogError> {
        let brew_log = self.get(id).await?;
        let brew_method = brew_log.brew_method.clone().unwrap_or_default();
        let request = AnalysisRequest::new(brew_log.photo_key.clone(), brew_method);

        self.db.set_analysis_status(id, AnalysisStatus::Analyzing).await?;

        match self.analyzer.analyze(&request).await {
            Ok(result) => {
                let updated = self
                    .db
                    .record_analysis(id, &result)
                    .await?
                    .ok_or(BrewLogError::NotFound(id))?;
                log::info!("✅ Brew log {} analyzed (score {})", id, result.extraction_score);
                Ok(updated)
            }
            Err(e) => {
                log::error!("❌ Analysis of brew log {} failed: {} ({})", id, e.kind(), e);
                if let Err(db_err) = self.db.record_failure(id, e.kind()).await {
                    log::error!("❌ Could not mark brew log {} as failed: {}", id, db_err);
                }
                Err(e.into())
            }
        }
    }
}
