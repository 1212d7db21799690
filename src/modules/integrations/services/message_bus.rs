use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{types::Json, MySqlPool};

use crate::core::{AppError, CorrelationId, Result};

/// Topics announced to the rest of the platform
pub mod topics {
    pub const INSTALLMENT_PAID: &str = "installment.paid";
    pub const INSTALLMENT_RETRY_DUE: &str = "installment.retry_due";
    pub const COLLECTIONS_ESCALATION: &str = "collections.escalation";
    pub const SETTLEMENT_TRIGGER: &str = "settlement.trigger";
}

/// Envelope for every published event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEvent {
    pub event_id: String,
    pub correlation_id: CorrelationId,
    pub occurred_at: DateTime<Utc>,
    pub payload: Value,
}

/// Delivery is at-least-once: consumers must dedupe on `event_id`.
/// `scheduled_at` asks the bus to hold the event until that instant.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        event: BusEvent,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
}

/// Transactional-outbox bus: events land in `outbox_events` and a relay
/// outside this service forwards them to the broker.
pub struct OutboxMessageBus {
    pool: MySqlPool,
}

impl OutboxMessageBus {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageBus for OutboxMessageBus {
    async fn publish(
        &self,
        topic: &str,
        event: BusEvent,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO outbox_events (
                id, topic, payload, correlation_id, scheduled_at, published_at,
                attempts, created_at
            ) VALUES (?, ?, ?, ?, ?, NULL, 0, ?)
            "#,
        )
        .bind(&event.event_id)
        .bind(topic)
        .bind(Json(&event.payload))
        .bind(event.correlation_id.as_str())
        .bind(scheduled_at)
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_db("Failed to enqueue outbox event", e))?;

        tracing::debug!(
            topic = topic,
            event_id = %event.event_id,
            correlation_id = %event.correlation_id,
            "Event enqueued to outbox"
        );

        Ok(())
    }
}
