use chrono::Duration as ChronoDuration;
use serde::Deserialize;
use std::time::Duration;

use super::env_or;
use crate::core::{AppError, Result};

/// Batch, retry and escalation tuning
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingConfig {
    /// Installments dispatched concurrently per chunk
    pub chunk_size: usize,
    /// Pause between chunks, keeps the gateway under its rate limit
    pub inter_chunk_delay_ms: u64,
    /// Pause between serial retries in the retry sweep
    pub retry_delay_ms: u64,
    pub max_retry_attempts: i32,
    /// Backoff in hours, indexed by attempt count (1-based); the last entry
    /// applies to every later attempt
    pub retry_backoff_hours: Vec<i64>,
    pub overdue_threshold_days: i64,
    pub collection_escalation_days: i64,
    /// Failures in the trailing 24h above which health is degraded
    pub failure_alert_threshold: i64,
    /// Recent installments handed to the risk collaborator
    pub payment_history_limit: u32,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            inter_chunk_delay_ms: 1000,
            retry_delay_ms: 500,
            max_retry_attempts: 4,
            retry_backoff_hours: vec![1, 4, 24, 72],
            overdue_threshold_days: 3,
            collection_escalation_days: 30,
            failure_alert_threshold: 100,
            payment_history_limit: 12,
        }
    }
}

impl ProcessingConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let backoff: String = env_or("RETRY_BACKOFF_HOURS", "1,4,24,72")?;

        Ok(Self {
            chunk_size: env_or("BATCH_CHUNK_SIZE", &defaults.chunk_size.to_string())?,
            inter_chunk_delay_ms: env_or(
                "BATCH_CHUNK_DELAY_MS",
                &defaults.inter_chunk_delay_ms.to_string(),
            )?,
            retry_delay_ms: env_or("RETRY_DELAY_MS", &defaults.retry_delay_ms.to_string())?,
            max_retry_attempts: env_or(
                "MAX_RETRY_ATTEMPTS",
                &defaults.max_retry_attempts.to_string(),
            )?,
            retry_backoff_hours: parse_backoff(&backoff)?,
            overdue_threshold_days: env_or(
                "OVERDUE_THRESHOLD_DAYS",
                &defaults.overdue_threshold_days.to_string(),
            )?,
            collection_escalation_days: env_or(
                "COLLECTION_ESCALATION_DAYS",
                &defaults.collection_escalation_days.to_string(),
            )?,
            failure_alert_threshold: env_or(
                "FAILURE_ALERT_THRESHOLD",
                &defaults.failure_alert_threshold.to_string(),
            )?,
            payment_history_limit: env_or(
                "PAYMENT_HISTORY_LIMIT",
                &defaults.payment_history_limit.to_string(),
            )?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(AppError::Configuration(
                "Batch chunk size must be greater than 0".to_string(),
            ));
        }

        if self.max_retry_attempts < 1 {
            return Err(AppError::Configuration(
                "Max retry attempts must be at least 1".to_string(),
            ));
        }

        if self.retry_backoff_hours.is_empty() || self.retry_backoff_hours.iter().any(|h| *h < 0) {
            return Err(AppError::Configuration(
                "Retry backoff table must contain non-negative hours".to_string(),
            ));
        }

        if self.overdue_threshold_days < 0 || self.collection_escalation_days < 0 {
            return Err(AppError::Configuration(
                "Overdue and escalation thresholds cannot be negative".to_string(),
            ));
        }

        Ok(())
    }

    pub fn inter_chunk_delay(&self) -> Duration {
        Duration::from_millis(self.inter_chunk_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Backoff for an installment that has already been attempted
    /// `attempt_count` times. Zero attempts uses the first entry.
    pub fn backoff_for(&self, attempt_count: i32) -> ChronoDuration {
        let index = attempt_count.max(1) as usize - 1;
        let hours = self
            .retry_backoff_hours
            .get(index)
            .or(self.retry_backoff_hours.last())
            .copied()
            .unwrap_or(0);
        ChronoDuration::hours(hours)
    }
}

fn parse_backoff(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(|part| {
            part.trim().parse::<i64>().map_err(|_| {
                AppError::Configuration(format!("Invalid RETRY_BACKOFF_HOURS entry: {}", part))
            })
        })
        .collect()
}

/// Idempotency coordinator TTLs, lock timeout and operation retry policy
#[derive(Debug, Clone, Deserialize)]
pub struct IdempotencyConfig {
    /// How long a Completed result is replayed
    pub default_ttl_secs: u64,
    /// How long a Failed result is replayed
    pub failure_ttl_secs: u64,
    /// After this, a held lock is considered abandoned
    pub lock_timeout_secs: u64,
    pub lock_retry_interval_ms: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 24 * 3600,
            failure_ttl_secs: 3600,
            lock_timeout_secs: 300,
            lock_retry_interval_ms: 100,
            max_attempts: 3,
            retry_delay_ms: 200,
        }
    }
}

impl IdempotencyConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            default_ttl_secs: env_or(
                "IDEMPOTENCY_TTL_SECS",
                &defaults.default_ttl_secs.to_string(),
            )?,
            failure_ttl_secs: env_or(
                "IDEMPOTENCY_FAILURE_TTL_SECS",
                &defaults.failure_ttl_secs.to_string(),
            )?,
            lock_timeout_secs: env_or(
                "IDEMPOTENCY_LOCK_TIMEOUT_SECS",
                &defaults.lock_timeout_secs.to_string(),
            )?,
            lock_retry_interval_ms: env_or(
                "IDEMPOTENCY_LOCK_RETRY_MS",
                &defaults.lock_retry_interval_ms.to_string(),
            )?,
            max_attempts: env_or(
                "IDEMPOTENCY_MAX_ATTEMPTS",
                &defaults.max_attempts.to_string(),
            )?,
            retry_delay_ms: env_or(
                "IDEMPOTENCY_RETRY_DELAY_MS",
                &defaults.retry_delay_ms.to_string(),
            )?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.lock_timeout_secs == 0 {
            return Err(AppError::Configuration(
                "Idempotency lock timeout must be greater than 0".to_string(),
            ));
        }

        if self.max_attempts == 0 {
            return Err(AppError::Configuration(
                "Idempotency max attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
