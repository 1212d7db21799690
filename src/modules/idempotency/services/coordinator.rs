use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::key::canonical_key;
use crate::core::{AppError, Clock, IdGenerator, Result};
use crate::modules::idempotency::models::{
    ExecuteOptions, ExecutionResult, IdempotencyRecord, RecordStatus,
};
use crate::modules::idempotency::repositories::{expiry, IdempotencyStore};

const RECORD_PREFIX: &str = "idempotency:";
const LOCK_PREFIX: &str = "idempotency-lock:";

/// Runs an operation at most once per key across every worker sharing the
/// store. Terminal outcomes are stored and replayed until they expire.
pub struct IdempotencyCoordinator {
    store: Arc<dyn IdempotencyStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    defaults: ExecuteOptions,
}

impl IdempotencyCoordinator {
    pub fn new(
        store: Arc<dyn IdempotencyStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        defaults: ExecuteOptions,
    ) -> Self {
        Self {
            store,
            clock,
            ids,
            defaults,
        }
    }

    pub fn defaults(&self) -> &ExecuteOptions {
        &self.defaults
    }

    /// Execute `operation` once for `key`.
    ///
    /// Returns `Err` only when the store itself fails before the operation
    /// could run. Operation errors come back as a `Failed` result.
    pub async fn execute<T, F, Fut>(
        &self,
        key: &str,
        mut operation: F,
        options: Option<&ExecuteOptions>,
    ) -> Result<ExecutionResult<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if key.trim().is_empty() {
            return Err(AppError::validation("Idempotency key must not be empty"));
        }

        let options = options.unwrap_or(&self.defaults);
        let record_key = format!("{}{}", RECORD_PREFIX, key);
        let lock_key = format!("{}{}", LOCK_PREFIX, key);

        if let Some(result) = self.replay(&record_key).await? {
            debug!(key = key, "Replaying stored idempotent result");
            return Ok(result);
        }

        let token = self.ids.new_id();
        if !self
            .store
            .set_if_absent(&lock_key, &token, options.lock_timeout)
            .await?
        {
            debug!(key = key, "Idempotency lock held elsewhere, waiting one interval");
            tokio::time::sleep(options.lock_retry_interval).await;

            if let Some(result) = self.replay(&record_key).await? {
                return Ok(result);
            }
            return Ok(ExecutionResult::locked());
        }

        let outcome = self
            .run_locked(&record_key, &mut operation, options)
            .await;

        match self.store.delete_if_equals(&lock_key, &token).await {
            Ok(true) => {}
            Ok(false) => warn!(key = key, "Idempotency lock expired before release"),
            Err(e) => warn!(key = key, error = %e, "Failed to release idempotency lock"),
        }

        outcome
    }

    /// Key derived from a serializable request, see [`canonical_key`]
    pub fn generate_key<R: Serialize>(
        &self,
        operation: &str,
        request: &R,
        customer_id: Option<&str>,
        window: Option<Duration>,
    ) -> Result<String> {
        canonical_key(operation, request, customer_id, window, self.clock.now())
    }

    /// Remove expired records and abandoned locks
    pub async fn purge_expired(&self) -> Result<u64> {
        let purged = self.store.purge_expired().await?;
        if purged > 0 {
            debug!(purged = purged, "Purged expired idempotency entries");
        }
        Ok(purged)
    }

    async fn run_locked<T, F, Fut>(
        &self,
        record_key: &str,
        operation: &mut F,
        options: &ExecuteOptions,
    ) -> Result<ExecutionResult<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        // a previous holder may have finished between our check and the lock
        if let Some(result) = self.replay(record_key).await? {
            return Ok(result);
        }

        let in_progress = IdempotencyRecord::in_progress(
            record_key.to_string(),
            expiry(self.clock.now(), options.lock_timeout),
        );
        self.store
            .set(
                record_key,
                &serde_json::to_string(&in_progress)?,
                options.lock_timeout,
            )
            .await?;

        let mut attempt = 0;
        let outcome = loop {
            attempt += 1;
            match operation().await {
                Ok(value) => break Ok(value),
                Err(e) if e.is_transient() && attempt < options.max_attempts => {
                    warn!(
                        key = record_key,
                        attempt = attempt,
                        error = %e,
                        "Transient failure, retrying idempotent operation"
                    );
                    tokio::time::sleep(options.retry_delay).await;
                }
                Err(e) => break Err(e),
            }
        };

        let now = self.clock.now();
        match outcome {
            Ok(value) => {
                let record = IdempotencyRecord::completed(
                    record_key.to_string(),
                    serde_json::to_value(&value)?,
                    now,
                    options.success_ttl,
                );
                self.persist(&record, options.success_ttl).await;
                Ok(ExecutionResult::completed(value, false))
            }
            Err(e) => {
                let record = IdempotencyRecord::failed(
                    record_key.to_string(),
                    e.to_string(),
                    now,
                    options.failure_ttl,
                );
                self.persist(&record, options.failure_ttl).await;
                Ok(ExecutionResult::failed(e.to_string(), false))
            }
        }
    }

    /// The operation already ran; losing the record only weakens replay, so
    /// the caller still gets the real outcome.
    async fn persist(&self, record: &IdempotencyRecord, ttl: Duration) {
        let stored = match serde_json::to_string(record) {
            Ok(stored) => stored,
            Err(e) => {
                error!(key = %record.key, error = %e, "Failed to encode idempotency record");
                return;
            }
        };

        if let Err(e) = self.store.set(&record.key, &stored, ttl).await {
            error!(key = %record.key, error = %e, "Failed to persist idempotency record");
        }
    }

    async fn replay<T: DeserializeOwned>(
        &self,
        record_key: &str,
    ) -> Result<Option<ExecutionResult<T>>> {
        let Some(raw) = self.store.get(record_key).await? else {
            return Ok(None);
        };

        let record: IdempotencyRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(key = record_key, error = %e, "Ignoring unreadable idempotency record");
                return Ok(None);
            }
        };

        match record.status {
            RecordStatus::Completed => {
                let value = serde_json::from_value(record.result.unwrap_or(Value::Null))?;
                Ok(Some(ExecutionResult::completed(value, true)))
            }
            RecordStatus::Failed => Ok(Some(ExecutionResult::failed(
                record.error.unwrap_or_default(),
                true,
            ))),
            RecordStatus::InProgress => Ok(None),
        }
    }
}
