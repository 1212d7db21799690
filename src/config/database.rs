use crate::core::{AppError, Result};
use serde::Deserialize;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use std::time::Duration;

use super::{env_or, env_required};

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self> {
        Ok(DatabaseConfig {
            url: env_required("DATABASE_URL")?,
            pool_size: env_or("DATABASE_POOL_SIZE", "10")?,
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", "20")?,
            acquire_timeout_secs: env_or("DATABASE_ACQUIRE_TIMEOUT_SECS", "30")?,
        })
    }

    /// Create a MySQL connection pool
    ///
    /// Batch chunks fan out up to `chunk_size` concurrent attempts, each of
    /// which holds a connection briefly, so `max_connections` bounds the real
    /// store concurrency of a run.
    pub async fn create_pool(&self) -> Result<MySqlPool> {
        MySqlPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.pool_size)
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(600)) // 10 minutes
            .max_lifetime(Duration::from_secs(1800)) // 30 minutes
            .test_before_acquire(true)
            .connect(&self.url)
            .await
            .map_err(|e| AppError::store_unavailable(format!("Failed to connect: {}", e)))
    }

    /// Apply pending schema migrations
    pub async fn migrate(pool: &MySqlPool) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(|e| AppError::internal(format!("Migration failed: {}", e)))
    }
}
