// Ledger repositories for installments, payments and their audit trail.
//
// Every write to an installment or payment is a compare-and-swap on `version`:
// a stale write fails with `AppError::Conflict` and leaves the row untouched.

pub mod memory;
pub mod mysql;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::core::Result;
use crate::modules::installments::models::{Installment, Payment, PaymentEvent};

pub use memory::InMemoryLedger;
pub use mysql::{MySqlInstallmentRepository, MySqlPaymentEventRepository, MySqlPaymentRepository};

#[async_trait]
pub trait InstallmentRepository: Send + Sync {
    /// Cheap round-trip proving the store is reachable
    async fn ping(&self) -> Result<()>;

    async fn insert(&self, installment: &Installment) -> Result<()>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Installment>>;

    async fn find_by_payment(&self, payment_id: &str) -> Result<Vec<Installment>>;

    /// Pending installments due exactly on `date`, ordered by customer
    async fn find_due(&self, date: NaiveDate) -> Result<Vec<Installment>>;

    /// Failed, retry-eligible installments with fewer than `max_attempts`
    /// attempts, oldest attempt first
    async fn find_retry_candidates(&self, max_attempts: i32) -> Result<Vec<Installment>>;

    /// Failed or Overdue installments due on or before `due_on_or_before`
    /// with at least `min_attempts` attempts
    async fn find_overdue_candidates(
        &self,
        due_on_or_before: NaiveDate,
        min_attempts: i32,
    ) -> Result<Vec<Installment>>;

    /// Most recent installments of a customer, newest due date first
    async fn find_recent_for_customer(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> Result<Vec<Installment>>;

    /// Failed installments whose last attempt happened at or after `since`
    async fn count_failures_since(&self, since: DateTime<Utc>) -> Result<i64>;

    /// Optimistic write; returns the stored row with its new version
    async fn update(&self, installment: &Installment) -> Result<Installment>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn insert(&self, payment: &Payment) -> Result<()>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Payment>>;

    /// Optimistic write; returns the stored row with its new version
    async fn update(&self, payment: &Payment) -> Result<Payment>;
}

#[async_trait]
pub trait PaymentEventRepository: Send + Sync {
    async fn append(&self, event: &PaymentEvent) -> Result<()>;

    async fn find_by_payment(&self, payment_id: &str) -> Result<Vec<PaymentEvent>>;
}
