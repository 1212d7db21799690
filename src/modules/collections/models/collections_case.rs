use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::LateFee;
use crate::core::{CorrelationId, Currency};
use crate::modules::installments::models::Installment;

/// Hand-off of a chronically delinquent installment to collections.
/// At most one exists per installment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CollectionsCase {
    pub id: String,
    pub installment_id: String,
    pub payment_id: String,
    pub customer_id: String,
    pub original_amount: Decimal,
    pub late_fee: Decimal,
    pub total_due: Decimal,
    #[sqlx(try_from = "String")]
    pub currency: Currency,
    pub days_overdue: i64,
    #[sqlx(try_from = "String")]
    pub status: CollectionsStatus,
    #[sqlx(try_from = "String")]
    pub correlation_id: CorrelationId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionsStatus {
    Active,
    Closed,
}

impl CollectionsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for CollectionsStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for CollectionsStatus {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.as_str() {
            "active" => Ok(Self::Active),
            "closed" => Ok(Self::Closed),
            _ => Err(format!("Invalid collections status: {}", value)),
        }
    }
}

impl CollectionsCase {
    pub fn open(
        id: String,
        installment: &Installment,
        late_fee: &LateFee,
        days_overdue: i64,
        correlation_id: CorrelationId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            installment_id: installment.id.clone(),
            payment_id: installment.payment_id.clone(),
            customer_id: installment.customer_id.clone(),
            original_amount: installment.amount,
            late_fee: late_fee.fee,
            total_due: late_fee.total_due,
            currency: installment.currency,
            days_overdue,
            status: CollectionsStatus::Active,
            correlation_id,
            created_at: now,
        }
    }
}

/// What an escalation request ended up doing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "case", rename_all = "snake_case")]
pub enum EscalationOutcome {
    Created(CollectionsCase),
    AlreadyEscalated(CollectionsCase),
    /// Another worker is escalating the same installment right now
    Locked,
}

impl EscalationOutcome {
    pub fn case(&self) -> Option<&CollectionsCase> {
        match self {
            Self::Created(case) | Self::AlreadyEscalated(case) => Some(case),
            Self::Locked => None,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}
