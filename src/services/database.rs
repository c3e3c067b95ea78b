use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::{PgPoolOptions, PgRow}, PgPool, Row};

use crate::models::{AnalysisResult, AnalysisStatus, BrewLog, NewBrewLog, VisualFeedback};

const BREW_LOG_COLUMNS: &str = "id, photo_key, brew_method, coffee_bean, grind_size, water_temp, brew_time, notes, \
     analysis_status, extraction_score, color_analysis, pattern_analysis, texture_notes, \
     channeling, over_extraction, ai_suggestions, analysis_error, created_at, updated_at";

/// Persistence for brew records and their analysis outcome
#[async_trait]
pub trait BrewLogStore: Send + Sync {
    async fn create_brew_log(&self, new_log: &NewBrewLog) -> Result<BrewLog>;
    async fn get_brew_log(&self, id: i64) -> Result<Option<BrewLog>>;
    /// Newest first, optionally restricted to one analysis status
    async fn list_brew_logs(&self, status: Option<AnalysisStatus>, limit: i64) -> Result<Vec<BrewLog>>;
    async fn set_analysis_status(&self, id: i64, status: AnalysisStatus) -> Result<()>;
    /// Returns `None` when the record no longer exists
    async fn record_analysis(&self, id: i64, result: &AnalysisResult) -> Result<Option<BrewLog>>;
    async fn record_failure(&self, id: i64, error_kind: &str) -> Result<()>;
}

pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let db = Database { pool };
        db.init_tables().await?;
        Ok(db)
    }

    async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS brew_logs (
                id BIGSERIAL PRIMARY KEY,
                photo_key TEXT NOT NULL,
                brew_method TEXT,
                coffee_bean TEXT,
                grind_size TEXT,
                water_temp DOUBLE PRECISION,
                brew_time INTEGER,
                notes TEXT,
                analysis_status TEXT NOT NULL DEFAULT 'pending',
                extraction_score DOUBLE PRECISION,
                color_analysis TEXT,
                pattern_analysis TEXT,
                texture_notes TEXT,
                channeling BOOLEAN,
                over_extraction BOOLEAN,
                ai_suggestions TEXT,
                analysis_error TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_brew_logs_status_created ON brew_logs (analysis_status, created_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl BrewLogStore for Database {
    async fn create_brew_log(&self, new_log: &NewBrewLog) -> Result<BrewLog> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO brew_logs (
                photo_key, brew_method, coffee_bean, grind_size, water_temp, brew_time, notes,
                analysis_status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING {}
            "#,
            BREW_LOG_COLUMNS
        ))
        .bind(&new_log.photo_key)
        .bind(&new_log.brew_method)
        .bind(&new_log.coffee_bean)
        .bind(&new_log.grind_size)
        .bind(new_log.water_temp)
        .bind(new_log.brew_time)
        .bind(&new_log.notes)
        .bind(AnalysisStatus::Pending.to_string())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        row_to_brew_log(&row)
    }

    async fn get_brew_log(&self, id: i64) -> Result<Option<BrewLog>> {
        let row = sqlx::query(&format!("SELECT {} FROM brew_logs WHERE id = $1", BREW_LOG_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_brew_log).transpose()
    }

    async fn list_brew_logs(&self, status: Option<AnalysisStatus>, limit: i64) -> Result<Vec<BrewLog>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {} FROM brew_logs WHERE analysis_status = $1 ORDER BY created_at DESC LIMIT $2",
                    BREW_LOG_COLUMNS
                ))
                .bind(status.to_string())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM brew_logs ORDER BY created_at DESC LIMIT $1",
                    BREW_LOG_COLUMNS
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(row_to_brew_log).collect()
    }

    async fn set_analysis_status(&self, id: i64, status: AnalysisStatus) -> Result<()> {
        sqlx::query("UPDATE brew_logs SET analysis_status = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(status.to_string())
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn record_analysis(&self, id: i64, result: &AnalysisResult) -> Result<Option<BrewLog>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE brew_logs SET
                analysis_status = $2,
                extraction_score = $3,
                color_analysis = $4,
                pattern_analysis = $5,
                texture_notes = $6,
                channeling = $7,
                over_extraction = $8,
                ai_suggestions = $9,
                analysis_error = NULL,
                updated_at = $10
            WHERE id = $1
            RETURNING {}
            "#,
            BREW_LOG_COLUMNS
        ))
        .bind(id)
        .bind(AnalysisStatus::Completed.to_string())
        .bind(result.extraction_score)
        .bind(&result.visual_feedback.color_analysis)
        .bind(&result.visual_feedback.pattern_analysis)
        .bind(&result.visual_feedback.texture_notes)
        .bind(result.channeling)
        .bind(result.over_extraction)
        .bind(&result.ai_suggestions)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_brew_log).transpose()
    }

    async fn record_failure(&self, id: i64, error_kind: &str) -> Result<()> {
        sqlx::query(
            "UPDATE brew_logs SET analysis_status = $2, analysis_error = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(AnalysisStatus::Failed.to_string())
        .bind(error_kind)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_brew_log(row: &PgRow) -> Result<BrewLog> {
    let status: String = row.get("analysis_status");
    let analysis_status = AnalysisStatus::from_string(&status)
        .ok_or_else(|| anyhow::anyhow!("Unknown analysis status in database: {}", status))?;

    let color_analysis: Option<String> = row.get("color_analysis");
    let pattern_analysis: Option<String> = row.get("pattern_analysis");
    let texture_notes: Option<String> = row.get("texture_notes");
    let visual_feedback = match (color_analysis, pattern_analysis, texture_notes) {
        (Some(color_analysis), Some(pattern_analysis), Some(texture_notes)) => Some(VisualFeedback {
            color_analysis,
            pattern_analysis,
            texture_notes,
        }),
        _ => None,
    };

    Ok(BrewLog {
        id: row.get("id"),
        photo_key: row.get("photo_key"),
        brew_method: row.get("brew_method"),
        coffee_bean: row.get("coffee_bean"),
        grind_size: row.get("grind_size"),
        water_temp: row.get("water_temp"),
        brew_time: row.get("brew_time"),
        notes: row.get("notes"),
        analysis_status,
        extraction_score: row.get("extraction_score"),
        visual_feedback,
        channeling: row.get("channeling"),
        over_extraction: row.get("over_extraction"),
        ai_suggestions: row.get("ai_suggestions"),
        analysis_error: row.get("analysis_error"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

/// In-process `BrewLogStore` that also remembers every status it was given
#[cfg(test)]
pub mod memory {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryBrewLogStore {
        logs: Mutex<Vec<BrewLog>>,
        statuses: Mutex<Vec<(i64, AnalysisStatus)>>,
    }

    impl MemoryBrewLogStore {
        /// Every status written for `id`, in order
        pub fn status_history(&self, id: i64) -> Vec<AnalysisStatus> {
            self.statuses
                .lock()
                .unwrap()
                .iter()
                .filter(|(log_id, _)| *log_id == id)
                .map(|(_, status)| *status)
                .collect()
        }

        fn update(&self, id: i64, status: AnalysisStatus, apply: impl FnOnce(&mut BrewLog)) -> Option<BrewLog> {
            let mut logs = self.logs.lock().unwrap();
            let log = logs.iter_mut().find(|log| log.id == id)?;
            log.analysis_status = status;
            log.updated_at = Utc::now();
            apply(log);
            self.statuses.lock().unwrap().push((id, status));
            Some(log.clone())
        }
    }

    #[async_trait]
    impl BrewLogStore for MemoryBrewLogStore {
        async fn create_brew_log(&self, new_log: &NewBrewLog) -> Result<BrewLog> {
            let mut logs = self.logs.lock().unwrap();
            let now = Utc::now();
            let log = BrewLog {
                id: logs.len() as i64 + 1,
                photo_key: new_log.photo_key.clone(),
                brew_method: new_log.brew_method.clone(),
                coffee_bean: new_log.coffee_bean.clone(),
                grind_size: new_log.grind_size.clone(),
                water_temp: new_log.water_temp,
                brew_time: new_log.brew_time,
                notes: new_log.notes.clone(),
                analysis_status: AnalysisStatus::Pending,
                extraction_score: None,
                visual_feedback: None,
                channeling: None,
                over_extraction: None,
                ai_suggestions: None,
                analysis_error: None,
                created_at: now,
                updated_at: now,
            };
            logs.push(log.clone());
            self.statuses.lock().unwrap().push((log.id, AnalysisStatus::Pending));
            Ok(log)
        }

        async fn get_brew_log(&self, id: i64) -> Result<Option<BrewLog>> {
            Ok(self.logs.lock().unwrap().iter().find(|log| log.id == id).cloned())
        }

        async fn list_brew_logs(&self, status: Option<AnalysisStatus>, limit: i64) -> Result<Vec<BrewLog>> {
            Ok(self
                .logs
                .lock()
                .unwrap()
                .iter()
                .rev()
                .filter(|log| status.map_or(true, |s| log.analysis_status == s))
                .take(limit.max(0) as usize)
                .cloned()
                .collect())
        }

        async fn set_analysis_status(&self, id: i64, status: AnalysisStatus) -> Result<()> {
            self.update(id, status, |_| {});
            Ok(())
        }

        async fn record_analysis(&self, id: i64, result: &AnalysisResult) -> Result<Option<BrewLog>> {
            Ok(self.update(id, AnalysisStatus::Completed, |log| {
                log.extraction_score = Some(result.extraction_score);
                log.visual_feedback = Some(result.visual_feedback.clone());
                log.channeling = Some(result.channeling);
                log.over_extraction = Some(result.over_extraction);
                log.ai_suggestions = Some(result.ai_suggestions.clone());
                log.analysis_error = None;
            }))
        }

        async fn record_failure(&self, id: i64, error_kind: &str) -> Result<()> {
            self.update(id, AnalysisStatus::Failed, |log| {
                log.analysis_error = Some(error_kind.to_string());
            });
            Ok(())
        }
    }
}
