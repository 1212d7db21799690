use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::MySqlPool;

use super::StatisticsRepository;
use crate::core::{AppError, Result};
use crate::modules::batch::models::ProcessingStatistics;

pub struct MySqlStatisticsRepository {
    pool: MySqlPool,
}

impl MySqlStatisticsRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatisticsRepository for MySqlStatisticsRepository {
    async fn insert(&self, statistics: &ProcessingStatistics) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO processing_statistics (
                id, run_kind, processing_date, processed_count, failed_count,
                skipped_count, total_amount, duration_ms, correlation_id, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&statistics.id)
        .bind(statistics.run_kind.to_string())
        .bind(statistics.processing_date)
        .bind(statistics.processed_count)
        .bind(statistics.failed_count)
        .bind(statistics.skipped_count)
        .bind(statistics.total_amount)
        .bind(statistics.duration_ms)
        .bind(statistics.correlation_id.as_str())
        .bind(statistics.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_db("Failed to insert processing statistics", e))?;

        Ok(())
    }

    async fn find_by_date(&self, date: NaiveDate) -> Result<Vec<ProcessingStatistics>> {
        sqlx::query_as::<_, ProcessingStatistics>(
            r#"
            SELECT id, run_kind, processing_date, processed_count, failed_count,
                   skipped_count, total_amount, duration_ms, correlation_id, created_at
            FROM processing_statistics
            WHERE processing_date = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::from_db("Failed to fetch processing statistics", e))
    }
}
