use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::{AppError, Currency, Result};
use crate::modules::installments::models::{Installment, InstallmentStatus};

/// Scores an installment charge before it reaches the gateway
#[async_trait]
pub trait RiskAssessor: Send + Sync {
    async fn assess_installment_risk(&self, request: RiskRequest) -> Result<RiskAssessment>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRequest {
    pub installment_id: String,
    pub customer_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    /// The attempt about to be made (1-based)
    pub attempt_number: i32,
    pub payment_history: Vec<PaymentHistoryEntry>,
}

/// Compact view of one of the customer's installments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentHistoryEntry {
    pub installment_id: String,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub status: InstallmentStatus,
    pub attempt_count: i32,
}

impl From<&Installment> for PaymentHistoryEntry {
    fn from(installment: &Installment) -> Self {
        Self {
            installment_id: installment.id.clone(),
            amount: installment.amount,
            due_date: installment.due_date,
            status: installment.status,
            attempt_count: installment.attempt_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    /// Highest tier; charges are blocked outright
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn blocks_charge(&self) -> bool {
        *self == RiskLevel::Critical
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub risk_score: Decimal,
}

/// REST client for the risk service
pub struct HttpRiskClient {
    client: Client,
    base_url: String,
}

impl HttpRiskClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("Invalid risk client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RiskAssessor for HttpRiskClient {
    async fn assess_installment_risk(&self, request: RiskRequest) -> Result<RiskAssessment> {
        let url = format!("{}/v1/risk/installments/assess", self.base_url);

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::collaborator(format!(
                "Risk service error {}: {}",
                status, body
            )));
        }

        response
            .json::<RiskAssessment>()
            .await
            .map_err(|e| AppError::collaborator(format!("Failed to parse risk response: {}", e)))
    }
}
