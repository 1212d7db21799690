use crate::core::{Currency, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Payment gateway used to charge installments against a stored instrument.
///
/// A declined charge is an `Ok(ChargeOutcome { success: false, .. })`;
/// `Err` is reserved for failures where the outcome is unknown to the caller.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn process_payment(&self, request: ChargeRequest) -> Result<ChargeOutcome>;

    /// Get gateway name
    fn name(&self) -> &str;
}

/// Charge request data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub customer_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    /// e.g. "card", "bank_debit"
    pub payment_method: String,
    /// Tokenized instrument at the gateway
    pub payment_method_id: String,
    /// Merchant-scoped reference; the gateway dedupes on it
    pub order_reference: String,
    pub description: String,
    pub customer_email: Option<String>,
    pub merchant_id: String,
}

/// Charge outcome from gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeOutcome {
    pub success: bool,
    pub transaction_id: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    /// Nothing was charged and the failure is transient (unreachable, 408,
    /// 429, 5xx); worth a backoff retry
    pub retryable: bool,
}

impl ChargeOutcome {
    pub fn approved(transaction_id: impl Into<String>) -> Self {
        Self {
            success: true,
            transaction_id: Some(transaction_id.into()),
            error_code: None,
            error_message: None,
            retryable: false,
        }
    }

    pub fn declined(
        error_code: impl Into<String>,
        error_message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self {
            success: false,
            transaction_id: None,
            error_code: Some(error_code.into()),
            error_message: Some(error_message.into()),
            retryable,
        }
    }
}
