use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::core::CorrelationId;

/// Append-only audit record; one per meaningful state transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub id: String,
    pub payment_id: String,
    pub installment_id: Option<String>,
    pub event_type: PaymentEventType,
    pub description: String,
    pub amount: Option<Decimal>,
    pub metadata: BTreeMap<String, Value>,
    pub correlation_id: CorrelationId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentEventType {
    InstallmentPaid,
    InstallmentFailed,
    RiskBlocked,
    SystemError,
    InstallmentOverdue,
    CollectionsEscalated,
    PaymentCompleted,
}

impl PaymentEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InstallmentPaid => "installment_paid",
            Self::InstallmentFailed => "installment_failed",
            Self::RiskBlocked => "risk_blocked",
            Self::SystemError => "system_error",
            Self::InstallmentOverdue => "installment_overdue",
            Self::CollectionsEscalated => "collections_escalated",
            Self::PaymentCompleted => "payment_completed",
        }
    }
}

impl std::fmt::Display for PaymentEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for PaymentEventType {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.as_str() {
            "installment_paid" => Ok(Self::InstallmentPaid),
            "installment_failed" => Ok(Self::InstallmentFailed),
            "risk_blocked" => Ok(Self::RiskBlocked),
            "system_error" => Ok(Self::SystemError),
            "installment_overdue" => Ok(Self::InstallmentOverdue),
            "collections_escalated" => Ok(Self::CollectionsEscalated),
            "payment_completed" => Ok(Self::PaymentCompleted),
            _ => Err(format!("Invalid payment event type: {}", value)),
        }
    }
}

impl PaymentEvent {
    pub fn new(
        id: String,
        payment_id: impl Into<String>,
        event_type: PaymentEventType,
        description: impl Into<String>,
        correlation_id: CorrelationId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            payment_id: payment_id.into(),
            installment_id: None,
            event_type,
            description: description.into(),
            amount: None,
            metadata: BTreeMap::new(),
            correlation_id,
            created_at,
        }
    }

    pub fn for_installment(mut self, installment_id: impl Into<String>) -> Self {
        self.installment_id = Some(installment_id.into());
        self
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}
