use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::modules::idempotency::repositories::expiry;

/// Persisted state of one idempotent execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// Normalized key, prefix included
    pub key: String,
    pub status: RecordStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    InProgress,
    Completed,
    Failed,
}

impl IdempotencyRecord {
    pub fn in_progress(key: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            key,
            status: RecordStatus::InProgress,
            result: None,
            error: None,
            completed_at: None,
            expires_at,
        }
    }

    pub fn completed(key: String, result: Value, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            key,
            status: RecordStatus::Completed,
            result: Some(result),
            error: None,
            completed_at: Some(now),
            expires_at: expiry(now, ttl),
        }
    }

    pub fn failed(key: String, error: String, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            key,
            status: RecordStatus::Failed,
            result: None,
            error: Some(error),
            completed_at: Some(now),
            expires_at: expiry(now, ttl),
        }
    }

    /// Completed and Failed records are replayed instead of re-executing
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, RecordStatus::Completed | RecordStatus::Failed)
    }
}

/// What a caller of `IdempotencyCoordinator::execute` observes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Failed,
    /// Mirrors `RecordStatus::InProgress` on the wire. `execute` never returns
    /// it: a caller that finds a live in-progress record gets `Locked`.
    InProgress,
    /// Another executor holds the key; try again later
    Locked,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult<T> {
    pub success: bool,
    pub value: Option<T>,
    pub error: Option<String>,
    pub status: ExecutionStatus,
    /// True when served from a stored record rather than a fresh execution
    pub replayed: bool,
}

impl<T> ExecutionResult<T> {
    pub fn completed(value: T, replayed: bool) -> Self {
        Self {
            success: true,
            value: Some(value),
            error: None,
            status: ExecutionStatus::Completed,
            replayed,
        }
    }

    pub fn failed(error: String, replayed: bool) -> Self {
        Self {
            success: false,
            value: None,
            error: Some(error),
            status: ExecutionStatus::Failed,
            replayed,
        }
    }

    pub fn locked() -> Self {
        Self {
            success: false,
            value: None,
            error: None,
            status: ExecutionStatus::Locked,
            replayed: false,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.status == ExecutionStatus::Locked
    }
}

/// Per-call tuning; defaults come from `IdempotencyConfig`
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub success_ttl: Duration,
    pub failure_ttl: Duration,
    pub lock_timeout: Duration,
    pub lock_retry_interval: Duration,
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl From<&crate::config::IdempotencyConfig> for ExecuteOptions {
    fn from(config: &crate::config::IdempotencyConfig) -> Self {
        Self {
            success_ttl: Duration::from_secs(config.default_ttl_secs),
            failure_ttl: Duration::from_secs(config.failure_ttl_secs),
            lock_timeout: Duration::from_secs(config.lock_timeout_secs),
            lock_retry_interval: Duration::from_millis(config.lock_retry_interval_ms),
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self::from(&crate::config::IdempotencyConfig::default())
    }
}
