use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{InstallmentRepository, PaymentEventRepository, PaymentRepository};
use crate::core::{AppError, Result};
use crate::modules::installments::models::{
    Installment, InstallmentStatus, Payment, PaymentEvent,
};

/// In-process ledger implementing every ledger repository trait over one
/// shared state. Mirrors the MySQL semantics, including version checks.
#[derive(Default)]
pub struct InMemoryLedger {
    installments: RwLock<HashMap<String, Installment>>,
    payments: RwLock<HashMap<String, Payment>>,
    events: RwLock<Vec<PaymentEvent>>,
    unavailable: AtomicBool,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing connectivity to the store
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::store_unavailable("in-memory ledger offline"));
        }
        Ok(())
    }

    /// Every event appended so far, in order
    pub async fn all_events(&self) -> Vec<PaymentEvent> {
        self.events.read().await.clone()
    }

    async fn select<F>(&self, filter: F) -> Result<Vec<Installment>>
    where
        F: Fn(&Installment) -> bool,
    {
        self.check_available()?;
        Ok(self
            .installments
            .read()
            .await
            .values()
            .filter(|i| filter(i))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl InstallmentRepository for InMemoryLedger {
    async fn ping(&self) -> Result<()> {
        self.check_available()
    }

    async fn insert(&self, installment: &Installment) -> Result<()> {
        self.check_available()?;
        let mut installments = self.installments.write().await;
        if installments.contains_key(&installment.id) {
            return Err(AppError::validation(format!(
                "Installment {} already exists",
                installment.id
            )));
        }
        installments.insert(installment.id.clone(), installment.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Installment>> {
        self.check_available()?;
        Ok(self.installments.read().await.get(id).cloned())
    }

    async fn find_by_payment(&self, payment_id: &str) -> Result<Vec<Installment>> {
        let mut rows = self.select(|i| i.payment_id == payment_id).await?;
        rows.sort_by_key(|i| i.installment_number);
        Ok(rows)
    }

    async fn find_due(&self, date: NaiveDate) -> Result<Vec<Installment>> {
        let mut rows = self
            .select(|i| i.due_date == date && i.status == InstallmentStatus::Pending)
            .await?;
        rows.sort_by(|a, b| (&a.customer_id, &a.id).cmp(&(&b.customer_id, &b.id)));
        Ok(rows)
    }

    async fn find_retry_candidates(&self, max_attempts: i32) -> Result<Vec<Installment>> {
        let mut rows = self
            .select(|i| {
                i.status == InstallmentStatus::Failed
                    && i.retry_eligible
                    && i.attempt_count < max_attempts
            })
            .await?;
        rows.sort_by(|a, b| (a.last_attempt_at, &a.id).cmp(&(b.last_attempt_at, &b.id)));
        Ok(rows)
    }

    async fn find_overdue_candidates(
        &self,
        due_on_or_before: NaiveDate,
        min_attempts: i32,
    ) -> Result<Vec<Installment>> {
        let mut rows = self
            .select(|i| {
                matches!(
                    i.status,
                    InstallmentStatus::Failed | InstallmentStatus::Overdue
                ) && i.due_date <= due_on_or_before
                    && i.attempt_count >= min_attempts
            })
            .await?;
        rows.sort_by(|a, b| (&a.customer_id, &a.id).cmp(&(&b.customer_id, &b.id)));
        Ok(rows)
    }

    async fn find_recent_for_customer(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> Result<Vec<Installment>> {
        let mut rows = self.select(|i| i.customer_id == customer_id).await?;
        rows.sort_by(|a, b| {
            (b.due_date, b.installment_number).cmp(&(a.due_date, a.installment_number))
        });
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn count_failures_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let rows = self
            .select(|i| {
                i.status == InstallmentStatus::Failed
                    && i.last_attempt_at.is_some_and(|at| at >= since)
            })
            .await?;
        Ok(rows.len() as i64)
    }

    async fn update(&self, installment: &Installment) -> Result<Installment> {
        self.check_available()?;
        let mut installments = self.installments.write().await;
        let current = installments
            .get_mut(&installment.id)
            .ok_or_else(|| AppError::not_found("Installment not found"))?;

        if current.version != installment.version {
            return Err(AppError::conflict(format!(
                "Installment {} was modified concurrently (version {})",
                installment.id, installment.version
            )));
        }

        let mut stored = installment.clone();
        stored.version += 1;
        *current = stored.clone();
        Ok(stored)
    }
}

#[async_trait]
impl PaymentRepository for InMemoryLedger {
    async fn insert(&self, payment: &Payment) -> Result<()> {
        self.check_available()?;
        self.payments
            .write()
            .await
            .insert(payment.id.clone(), payment.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Payment>> {
        self.check_available()?;
        Ok(self.payments.read().await.get(id).cloned())
    }

    async fn update(&self, payment: &Payment) -> Result<Payment> {
        self.check_available()?;
        let mut payments = self.payments.write().await;
        let current = payments
            .get_mut(&payment.id)
            .ok_or_else(|| AppError::not_found("Payment not found"))?;

        if current.version != payment.version {
            return Err(AppError::conflict(format!(
                "Payment {} was modified concurrently (version {})",
                payment.id, payment.version
            )));
        }

        let mut stored = payment.clone();
        stored.version += 1;
        *current = stored.clone();
        Ok(stored)
    }
}

#[async_trait]
impl PaymentEventRepository for InMemoryLedger {
    async fn append(&self, event: &PaymentEvent) -> Result<()> {
        self.check_available()?;
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn find_by_payment(&self, payment_id: &str) -> Result<Vec<PaymentEvent>> {
        self.check_available()?;
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.payment_id == payment_id)
            .cloned()
            .collect())
    }
}
