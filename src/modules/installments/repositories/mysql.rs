use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::{types::Json, FromRow, MySqlPool};
use std::collections::BTreeMap;

use super::{InstallmentRepository, PaymentEventRepository, PaymentRepository};
use crate::core::{AppError, CorrelationId, Result};
use crate::modules::installments::models::{Installment, Payment, PaymentEvent};

const INSTALLMENT_COLUMNS: &str = r#"
    id, payment_id, customer_id, installment_number, amount, currency, due_date,
    status, attempt_count, retry_eligible, last_attempt_at, paid_at,
    gateway_transaction_id, failure_reason, version, created_at, updated_at
"#;

/// MySQL-backed installment repository
pub struct MySqlInstallmentRepository {
    pool: MySqlPool,
}

impl MySqlInstallmentRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn fetch_where(&self, clause: &str, binds: Vec<BindValue>) -> Result<Vec<Installment>> {
        let sql = format!("SELECT {} FROM installments {}", INSTALLMENT_COLUMNS, clause);
        let mut query = sqlx::query_as::<_, Installment>(&sql);
        for bind in binds {
            query = match bind {
                BindValue::Text(v) => query.bind(v),
                BindValue::Date(v) => query.bind(v),
                BindValue::Int(v) => query.bind(v),
            };
        }

        query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::from_db("Failed to fetch installments", e))
    }
}

enum BindValue {
    Text(String),
    Date(NaiveDate),
    Int(i64),
}

#[async_trait]
impl InstallmentRepository for MySqlInstallmentRepository {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::store_unavailable(format!("Store ping failed: {}", e)))?;
        Ok(())
    }

    async fn insert(&self, installment: &Installment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO installments (
                id, payment_id, customer_id, installment_number, amount, currency,
                due_date, status, attempt_count, retry_eligible, last_attempt_at,
                paid_at, gateway_transaction_id, failure_reason, version,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&installment.id)
        .bind(&installment.payment_id)
        .bind(&installment.customer_id)
        .bind(installment.installment_number)
        .bind(installment.amount)
        .bind(installment.currency.to_string())
        .bind(installment.due_date)
        .bind(installment.status.to_string())
        .bind(installment.attempt_count)
        .bind(installment.retry_eligible)
        .bind(installment.last_attempt_at)
        .bind(installment.paid_at)
        .bind(&installment.gateway_transaction_id)
        .bind(&installment.failure_reason)
        .bind(installment.version)
        .bind(installment.created_at)
        .bind(installment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_db("Failed to insert installment", e))?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Installment>> {
        let mut rows = self
            .fetch_where("WHERE id = ?", vec![BindValue::Text(id.to_string())])
            .await?;
        Ok(rows.pop())
    }

    async fn find_by_payment(&self, payment_id: &str) -> Result<Vec<Installment>> {
        self.fetch_where(
            "WHERE payment_id = ? ORDER BY installment_number ASC",
            vec![BindValue::Text(payment_id.to_string())],
        )
        .await
    }

    async fn find_due(&self, date: NaiveDate) -> Result<Vec<Installment>> {
        self.fetch_where(
            "WHERE due_date = ? AND status = 'pending' ORDER BY customer_id ASC, id ASC",
            vec![BindValue::Date(date)],
        )
        .await
    }

    async fn find_retry_candidates(&self, max_attempts: i32) -> Result<Vec<Installment>> {
        self.fetch_where(
            r#"WHERE status = 'failed' AND retry_eligible = TRUE AND attempt_count < ?
               ORDER BY last_attempt_at ASC, id ASC"#,
            vec![BindValue::Int(max_attempts as i64)],
        )
        .await
    }

    async fn find_overdue_candidates(
        &self,
        due_on_or_before: NaiveDate,
        min_attempts: i32,
    ) -> Result<Vec<Installment>> {
        self.fetch_where(
            r#"WHERE status IN ('failed', 'overdue') AND due_date <= ? AND attempt_count >= ?
               ORDER BY customer_id ASC, id ASC"#,
            vec![
                BindValue::Date(due_on_or_before),
                BindValue::Int(min_attempts as i64),
            ],
        )
        .await
    }

    async fn find_recent_for_customer(
        &self,
        customer_id: &str,
        limit: u32,
    ) -> Result<Vec<Installment>> {
        self.fetch_where(
            "WHERE customer_id = ? ORDER BY due_date DESC, installment_number DESC LIMIT ?",
            vec![
                BindValue::Text(customer_id.to_string()),
                BindValue::Int(limit as i64),
            ],
        )
        .await
    }

    async fn count_failures_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM installments WHERE status = 'failed' AND last_attempt_at >= ?",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_db("Failed to count failures", e))?;

        Ok(count)
    }

    async fn update(&self, installment: &Installment) -> Result<Installment> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE installments
            SET
                status = ?,
                attempt_count = ?,
                retry_eligible = ?,
                last_attempt_at = ?,
                paid_at = ?,
                gateway_transaction_id = ?,
                failure_reason = ?,
                updated_at = ?,
                version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(installment.status.to_string())
        .bind(installment.attempt_count)
        .bind(installment.retry_eligible)
        .bind(installment.last_attempt_at)
        .bind(installment.paid_at)
        .bind(&installment.gateway_transaction_id)
        .bind(&installment.failure_reason)
        .bind(installment.updated_at)
        .bind(&installment.id)
        .bind(installment.version)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_db("Failed to update installment", e))?
        .rows_affected();

        if rows_affected == 0 {
            return Err(AppError::conflict(format!(
                "Installment {} was modified concurrently (version {})",
                installment.id, installment.version
            )));
        }

        let mut stored = installment.clone();
        stored.version += 1;
        Ok(stored)
    }
}

/// MySQL-backed payment repository
pub struct MySqlPaymentRepository {
    pool: MySqlPool,
}

impl MySqlPaymentRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentRepository for MySqlPaymentRepository {
    async fn insert(&self, payment: &Payment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, customer_id, customer_email, merchant_id, currency, total_amount,
                payment_method, payment_method_id, status, version, completed_at,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.customer_id)
        .bind(&payment.customer_email)
        .bind(&payment.merchant_id)
        .bind(payment.currency.to_string())
        .bind(payment.total_amount)
        .bind(&payment.payment_method)
        .bind(&payment.payment_method_id)
        .bind(payment.status.to_string())
        .bind(payment.version)
        .bind(payment.completed_at)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_db("Failed to insert payment", e))?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Payment>> {
        sqlx::query_as::<_, Payment>(
            r#"
            SELECT
                id, customer_id, customer_email, merchant_id, currency, total_amount,
                payment_method, payment_method_id, status, version, completed_at,
                created_at, updated_at
            FROM payments
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::from_db("Failed to fetch payment", e))
    }

    async fn update(&self, payment: &Payment) -> Result<Payment> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE payments
            SET status = ?, completed_at = ?, updated_at = ?, version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(payment.status.to_string())
        .bind(payment.completed_at)
        .bind(payment.updated_at)
        .bind(&payment.id)
        .bind(payment.version)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_db("Failed to update payment", e))?
        .rows_affected();

        if rows_affected == 0 {
            return Err(AppError::conflict(format!(
                "Payment {} was modified concurrently (version {})",
                payment.id, payment.version
            )));
        }

        let mut stored = payment.clone();
        stored.version += 1;
        Ok(stored)
    }
}

/// MySQL-backed append-only event log
pub struct MySqlPaymentEventRepository {
    pool: MySqlPool,
}

impl MySqlPaymentEventRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct PaymentEventRow {
    id: String,
    payment_id: String,
    installment_id: Option<String>,
    event_type: String,
    description: String,
    amount: Option<Decimal>,
    metadata: Json<BTreeMap<String, Value>>,
    correlation_id: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<PaymentEventRow> for PaymentEvent {
    type Error = AppError;

    fn try_from(row: PaymentEventRow) -> Result<Self> {
        Ok(PaymentEvent {
            id: row.id,
            payment_id: row.payment_id,
            installment_id: row.installment_id,
            event_type: row.event_type.try_into().map_err(AppError::Internal)?,
            description: row.description,
            amount: row.amount,
            metadata: row.metadata.0,
            correlation_id: CorrelationId::new(row.correlation_id),
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl PaymentEventRepository for MySqlPaymentEventRepository {
    async fn append(&self, event: &PaymentEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_events (
                id, payment_id, installment_id, event_type, description, amount,
                metadata, correlation_id, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.id)
        .bind(&event.payment_id)
        .bind(&event.installment_id)
        .bind(event.event_type.to_string())
        .bind(&event.description)
        .bind(event.amount)
        .bind(Json(&event.metadata))
        .bind(event.correlation_id.as_str())
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_db("Failed to append payment event", e))?;

        Ok(())
    }

    async fn find_by_payment(&self, payment_id: &str) -> Result<Vec<PaymentEvent>> {
        let rows = sqlx::query_as::<_, PaymentEventRow>(
            r#"
            SELECT
                id, payment_id, installment_id, event_type, description, amount,
                metadata, correlation_id, created_at
            FROM payment_events
            WHERE payment_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::from_db("Failed to fetch payment events", e))?;

        rows.into_iter().map(|row| row.try_into()).collect()
    }
}
