use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Error codes the state machine produces itself (gateway codes pass through)
pub mod codes {
    pub const RISK_BLOCKED: &str = "RISK_BLOCKED";
    pub const SYSTEM_ERROR: &str = "SYSTEM_ERROR";
    pub const CONCURRENT_MODIFICATION: &str = "CONCURRENT_MODIFICATION";
    pub const NOT_CHARGEABLE: &str = "NOT_CHARGEABLE";
    pub const LOCKED: &str = "LOCKED";
}

/// Outcome of one charge attempt. Stored verbatim as the idempotent result
/// of the attempt, so a replayed trigger sees exactly what the first run saw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptResult {
    pub installment_id: String,
    pub customer_id: String,
    pub amount: Decimal,
    pub success: bool,
    pub transaction_id: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub retryable: bool,
    /// Attempt count after this attempt
    pub attempt_count: i32,
}

impl AttemptResult {
    pub fn paid(
        installment_id: &str,
        customer_id: &str,
        amount: Decimal,
        transaction_id: String,
        attempt_count: i32,
    ) -> Self {
        Self {
            installment_id: installment_id.to_string(),
            customer_id: customer_id.to_string(),
            amount,
            success: true,
            transaction_id: Some(transaction_id),
            error_code: None,
            error_message: None,
            retryable: false,
            attempt_count,
        }
    }

    pub fn failed(
        installment_id: &str,
        customer_id: &str,
        amount: Decimal,
        error_code: impl Into<String>,
        error_message: impl Into<String>,
        retryable: bool,
        attempt_count: i32,
    ) -> Self {
        Self {
            installment_id: installment_id.to_string(),
            customer_id: customer_id.to_string(),
            amount,
            success: false,
            transaction_id: None,
            error_code: Some(error_code.into()),
            error_message: Some(error_message.into()),
            retryable,
            attempt_count,
        }
    }
}
