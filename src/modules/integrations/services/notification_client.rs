use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;

use crate::core::{AppError, Currency, Result};

/// Customer-facing notifications. Callers treat these as fire-and-forget:
/// an error is logged, never retried or propagated.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_payment_confirmation(&self, notice: PaymentNotice) -> Result<()>;

    async fn send_payment_failure_notification(&self, notice: PaymentNotice) -> Result<()>;

    async fn send_overdue_notice(&self, notice: OverdueNotice) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentNotice {
    pub customer_id: String,
    pub customer_email: Option<String>,
    pub installment_id: String,
    pub installment_number: i32,
    pub amount: Decimal,
    pub currency: Currency,
    pub transaction_id: Option<String>,
    /// Customer-safe reason; never the raw risk or gateway detail
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverdueNotice {
    pub customer_id: String,
    pub customer_email: Option<String>,
    pub installment_id: String,
    pub due_date: NaiveDate,
    pub days_overdue: i64,
    pub amount: Decimal,
    pub late_fee: Decimal,
    pub total_due: Decimal,
    pub currency: Currency,
}

/// REST client for the notification service
pub struct HttpNotificationClient {
    client: Client,
    base_url: String,
}

impl HttpNotificationClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("Invalid notification client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<T: Serialize + Sync>(&self, template: &str, payload: &T) -> Result<()> {
        let url = format!("{}/v1/notifications/{}", self.base_url, template);
        let response = self.client.post(&url).json(payload).send().await?;

        if !response.status().is_success() {
            return Err(AppError::collaborator(format!(
                "Notification service rejected {}: {}",
                template,
                response.status()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl Notifier for HttpNotificationClient {
    async fn send_payment_confirmation(&self, notice: PaymentNotice) -> Result<()> {
        self.post("installment-paid", &notice).await
    }

    async fn send_payment_failure_notification(&self, notice: PaymentNotice) -> Result<()> {
        self.post("installment-failed", &notice).await
    }

    async fn send_overdue_notice(&self, notice: OverdueNotice) -> Result<()> {
        self.post("installment-overdue", &notice).await
    }
}
