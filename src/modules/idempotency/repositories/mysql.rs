use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use std::sync::Arc;
use std::time::Duration;

use super::{expiry, IdempotencyStore};
use crate::core::{AppError, Clock, Result};

/// `idempotency_entries` table as a TTL key/value store
pub struct MySqlIdempotencyStore {
    pool: MySqlPool,
    clock: Arc<dyn Clock>,
}

impl MySqlIdempotencyStore {
    pub fn new(pool: MySqlPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

#[async_trait]
impl IdempotencyStore for MySqlIdempotencyStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar(
            "SELECT entry_value FROM idempotency_entries WHERE entry_key = ? AND expires_at > ?",
        )
        .bind(key)
        .bind(self.now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::from_db("Failed to read idempotency entry", e))?;

        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO idempotency_entries (entry_key, entry_value, expires_at)
            VALUES (?, ?, ?)
            ON DUPLICATE KEY UPDATE
                entry_value = VALUES(entry_value),
                expires_at = VALUES(expires_at)
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expiry(self.now(), ttl))
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_db("Failed to write idempotency entry", e))?;

        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = self.now();

        // an expired holder must not block the insert below
        sqlx::query("DELETE FROM idempotency_entries WHERE entry_key = ? AND expires_at <= ?")
            .bind(key)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::from_db("Failed to clear expired idempotency entry", e))?;

        let result = sqlx::query(
            "INSERT IGNORE INTO idempotency_entries (entry_key, entry_value, expires_at) VALUES (?, ?, ?)",
        )
        .bind(key)
        .bind(value)
        .bind(expiry(now, ttl))
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_db("Failed to acquire idempotency entry", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM idempotency_entries WHERE entry_key = ? AND entry_value = ?")
                .bind(key)
                .bind(expected)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::from_db("Failed to release idempotency entry", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM idempotency_entries WHERE expires_at <= ?")
            .bind(self.now())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::from_db("Failed to purge idempotency entries", e))?;

        Ok(result.rows_affected())
    }
}
