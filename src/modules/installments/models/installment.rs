use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::core::{AppError, Currency, Result};

/// One scheduled partial payment of a BNPL plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Installment {
    pub id: String,
    pub payment_id: String,
    pub customer_id: String,
    /// Sequential number within the owning payment (1, 2, 3...)
    pub installment_number: i32,
    pub amount: Decimal,
    #[sqlx(try_from = "String")]
    pub currency: Currency,
    pub due_date: NaiveDate,
    #[sqlx(try_from = "String")]
    pub status: InstallmentStatus,
    /// Charge attempts so far; never decreases
    pub attempt_count: i32,
    /// Whether the last failure may be picked up by the retry sweep
    pub retry_eligible: bool,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Set iff status is Paid
    pub paid_at: Option<DateTime<Utc>>,
    pub gateway_transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    /// Optimistic concurrency token, bumped by every successful write
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Installment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentStatus {
    /// Due, never attempted
    Pending,
    /// Charged successfully (terminal)
    Paid,
    /// Last attempt failed; may be retried
    Failed,
    /// Exhausted retries and past the overdue threshold (terminal)
    Overdue,
}

impl InstallmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Overdue => "overdue",
        }
    }
}

impl std::fmt::Display for InstallmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for InstallmentStatus {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "overdue" => Ok(Self::Overdue),
            _ => Err(format!("Invalid installment status: {}", value)),
        }
    }
}

impl Installment {
    /// Create a pending installment
    pub fn new(
        id: String,
        payment_id: String,
        customer_id: String,
        installment_number: i32,
        amount: Decimal,
        currency: Currency,
        due_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if installment_number < 1 {
            return Err(AppError::validation(format!(
                "Installment number must be positive, got {}",
                installment_number
            )));
        }

        currency
            .validate_charge_amount(amount)
            .map_err(AppError::validation)?;

        Ok(Self {
            id,
            payment_id,
            customer_id,
            installment_number,
            amount,
            currency,
            due_date,
            status: InstallmentStatus::Pending,
            attempt_count: 0,
            retry_eligible: false,
            last_attempt_at: None,
            paid_at: None,
            gateway_transaction_id: None,
            failure_reason: None,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Pending and Failed installments may be sent to the gateway
    pub fn is_chargeable(&self) -> bool {
        matches!(
            self.status,
            InstallmentStatus::Pending | InstallmentStatus::Failed
        )
    }

    /// Merchant-scoped reference the gateway uses to dedupe charges.
    /// Stable for a given attempt so a replayed request collides upstream too.
    pub fn order_reference(&self, merchant_id: &str) -> String {
        format!("{}-{}-{}", merchant_id, self.id, self.attempt_count + 1)
    }

    /// Gateway accepted the charge
    pub fn record_success(&mut self, transaction_id: String, now: DateTime<Utc>) -> Result<()> {
        if !self.is_chargeable() {
            return Err(AppError::validation(format!(
                "Installment {} cannot be paid from status {}",
                self.id, self.status
            )));
        }

        self.status = InstallmentStatus::Paid;
        self.paid_at = Some(now);
        self.gateway_transaction_id = Some(transaction_id);
        self.failure_reason = None;
        self.retry_eligible = false;
        self.bump_attempt(now);

        Ok(())
    }

    /// Any failed attempt: gateway decline, risk block or system error.
    /// The attempt still counts.
    pub fn record_failure(
        &mut self,
        reason: impl Into<String>,
        retry_eligible: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !self.is_chargeable() {
            return Err(AppError::validation(format!(
                "Installment {} cannot fail from status {}",
                self.id, self.status
            )));
        }

        self.status = InstallmentStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.retry_eligible = retry_eligible;
        self.bump_attempt(now);

        Ok(())
    }

    /// Only exhausted failures become overdue
    pub fn mark_overdue(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != InstallmentStatus::Failed {
            return Err(AppError::validation(format!(
                "Cannot mark {} installment as overdue",
                self.status
            )));
        }

        self.status = InstallmentStatus::Overdue;
        self.retry_eligible = false;
        self.updated_at = now;

        Ok(())
    }

    /// Whole days past the due date; zero when not yet due
    pub fn days_overdue(&self, today: NaiveDate) -> i64 {
        (today - self.due_date).num_days().max(0)
    }

    fn bump_attempt(&mut self, now: DateTime<Utc>) {
        self.attempt_count += 1;
        self.last_attempt_at = Some(now);
        self.updated_at = now;
    }
}
