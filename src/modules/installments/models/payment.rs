use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::core::{AppError, Currency, Result};

/// A customer's BNPL purchase; owns its installments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: String,
    pub customer_id: String,
    pub customer_email: Option<String>,
    pub merchant_id: String,
    #[sqlx(try_from = "String")]
    pub currency: Currency,
    pub total_amount: Decimal,
    /// e.g. "card", "bank_debit"
    pub payment_method: String,
    /// Tokenized instrument at the gateway
    pub payment_method_id: String,
    #[sqlx(try_from = "String")]
    pub status: PaymentStatus,
    pub version: i32,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// At least one installment still unpaid
    Active,
    /// Every installment paid
    Completed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for PaymentStatus {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.as_str() {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Invalid payment status: {}", value)),
        }
    }
}

impl Payment {
    pub fn new(
        id: String,
        customer_id: String,
        customer_email: Option<String>,
        merchant_id: String,
        currency: Currency,
        total_amount: Decimal,
        payment_method: String,
        payment_method_id: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            customer_id,
            customer_email,
            merchant_id,
            currency,
            total_amount,
            payment_method,
            payment_method_id,
            status: PaymentStatus::Active,
            version: 0,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status == PaymentStatus::Completed {
            return Err(AppError::validation(format!(
                "Payment {} is already completed",
                self.id
            )));
        }

        self.status = PaymentStatus::Completed;
        self.completed_at = Some(now);
        self.updated_at = now;

        Ok(())
    }
}
