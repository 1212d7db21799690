use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::Currency;

/// Flat component of the late fee
pub const LATE_FEE_BASE: Decimal = Decimal::from_parts(47, 0, 0, false, 0);
/// Share of the installment amount added on top of the base
pub const LATE_FEE_RATE: Decimal = Decimal::from_parts(5, 0, 0, false, 2);
/// Upper bound of the fee
pub const LATE_FEE_CAP: Decimal = Decimal::from_parts(100, 0, 0, false, 0);

/// Penalty on an overdue installment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LateFee {
    pub fee: Decimal,
    pub total_due: Decimal,
}

impl LateFee {
    /// `min(47 + 5% of amount, 100)`, rounded to the currency scale
    pub fn calculate(amount: Decimal, currency: Currency) -> Self {
        let fee = currency.round((LATE_FEE_BASE + amount * LATE_FEE_RATE).min(LATE_FEE_CAP));
        Self {
            fee,
            total_due: currency.round(amount + fee),
        }
    }
}
