use async_trait::async_trait;
use sqlx::MySqlPool;

use super::CollectionsRepository;
use crate::core::{AppError, Result};
use crate::modules::collections::models::CollectionsCase;

pub struct MySqlCollectionsRepository {
    pool: MySqlPool,
}

impl MySqlCollectionsRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CollectionsRepository for MySqlCollectionsRepository {
    async fn find_by_installment(&self, installment_id: &str) -> Result<Option<CollectionsCase>> {
        sqlx::query_as::<_, CollectionsCase>(
            r#"
            SELECT id, installment_id, payment_id, customer_id, original_amount,
                   late_fee, total_due, currency, days_overdue, status,
                   correlation_id, created_at
            FROM collections_cases
            WHERE installment_id = ?
            "#,
        )
        .bind(installment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::from_db("Failed to fetch collections case", e))
    }

    async fn insert(&self, case: &CollectionsCase) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO collections_cases (
                id, installment_id, payment_id, customer_id, original_amount,
                late_fee, total_due, currency, days_overdue, status,
                correlation_id, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&case.id)
        .bind(&case.installment_id)
        .bind(&case.payment_id)
        .bind(&case.customer_id)
        .bind(case.original_amount)
        .bind(case.late_fee)
        .bind(case.total_due)
        .bind(case.currency.to_string())
        .bind(case.days_overdue)
        .bind(case.status.to_string())
        .bind(case.correlation_id.as_str())
        .bind(case.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => AppError::conflict(
                format!("Installment {} already has a collections case", case.installment_id),
            ),
            other => AppError::from_db("Failed to insert collections case", other),
        })?;

        Ok(())
    }
}
