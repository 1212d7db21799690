use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::core::Result;

pub mod memory;
pub mod mysql;

pub use memory::InMemoryIdempotencyStore;
pub use mysql::MySqlIdempotencyStore;

/// Shared key/value store with per-entry expiry. Expired entries behave as
/// absent for every operation.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or overwrite
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Atomic insert; returns false when a live entry already holds the key
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Remove the entry only while it still holds `expected`
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool>;

    /// Drop expired entries, returning how many were removed
    async fn purge_expired(&self) -> Result<u64>;
}

/// `now + ttl`, saturating instead of overflowing
pub(crate) fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
