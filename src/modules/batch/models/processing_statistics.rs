use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::core::CorrelationId;

/// One row per batch run; written once when the run ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ProcessingStatistics {
    pub id: String,
    #[sqlx(try_from = "String")]
    pub run_kind: RunKind,
    pub processing_date: NaiveDate,
    pub processed_count: i32,
    pub failed_count: i32,
    pub skipped_count: i32,
    pub total_amount: Decimal,
    pub duration_ms: i64,
    #[sqlx(try_from = "String")]
    pub correlation_id: CorrelationId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Due,
    Retry,
    Overdue,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Due => "due",
            Self::Retry => "retry",
            Self::Overdue => "overdue",
        }
    }
}

impl std::fmt::Display for RunKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for RunKind {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.as_str() {
            "due" => Ok(Self::Due),
            "retry" => Ok(Self::Retry),
            "overdue" => Ok(Self::Overdue),
            _ => Err(format!("Invalid run kind: {}", value)),
        }
    }
}

/// Counts are stored as INT; saturate rather than wrap
pub(crate) fn as_count(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
