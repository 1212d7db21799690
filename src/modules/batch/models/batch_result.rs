use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::processing_statistics::{as_count, ProcessingStatistics, RunKind};
use crate::core::{AppError, CorrelationId};
use crate::modules::collections::EscalationOutcome;
use crate::modules::installments::models::{codes, AttemptResult, Installment};

/// Failure detail reported back for one installment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedInstallment {
    pub installment_id: String,
    pub customer_id: String,
    pub error_code: String,
    pub error_message: String,
    pub retryable: bool,
}

impl FailedInstallment {
    fn from_error(installment: &Installment, error: &AppError) -> Self {
        Self {
            installment_id: installment.id.clone(),
            customer_id: installment.customer_id.clone(),
            error_code: codes::SYSTEM_ERROR.to_string(),
            error_message: error.to_string(),
            retryable: error.is_transient(),
        }
    }
}

/// Aggregate outcome of a due or retry run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub run_kind: RunKind,
    pub processing_date: NaiveDate,
    pub correlation_id: CorrelationId,
    /// Successful charges
    pub processed_count: usize,
    pub failed_count: usize,
    /// Locked or no longer chargeable; never counted as failures
    pub skipped_count: usize,
    /// Sum of successfully charged amounts
    pub total_amount: Decimal,
    pub failed_details: Vec<FailedInstallment>,
    /// Size of each dispatched chunk, in order
    pub chunk_sizes: Vec<usize>,
    /// True when a cancellation stopped the run before all work was dispatched
    pub cancelled: bool,
    pub duration_ms: i64,
}

impl BatchResult {
    pub fn new(run_kind: RunKind, processing_date: NaiveDate, correlation_id: CorrelationId) -> Self {
        Self {
            run_kind,
            processing_date,
            correlation_id,
            processed_count: 0,
            failed_count: 0,
            skipped_count: 0,
            total_amount: Decimal::ZERO,
            failed_details: Vec::new(),
            chunk_sizes: Vec::new(),
            cancelled: false,
            duration_ms: 0,
        }
    }

    pub fn record(&mut self, result: &AttemptResult) {
        if result.success {
            self.processed_count += 1;
            self.total_amount += result.amount;
            return;
        }

        let code = result.error_code.as_deref().unwrap_or(codes::SYSTEM_ERROR);
        if code == codes::LOCKED || code == codes::NOT_CHARGEABLE {
            self.skipped_count += 1;
            return;
        }

        self.failed_count += 1;
        self.failed_details.push(FailedInstallment {
            installment_id: result.installment_id.clone(),
            customer_id: result.customer_id.clone(),
            error_code: code.to_string(),
            error_message: result.error_message.clone().unwrap_or_default(),
            retryable: result.retryable,
        });
    }

    /// The attempt could not even be coordinated
    pub fn record_error(&mut self, installment: &Installment, error: &AppError) {
        self.failed_count += 1;
        self.failed_details
            .push(FailedInstallment::from_error(installment, error));
    }

    pub fn total_count(&self) -> usize {
        self.processed_count + self.failed_count + self.skipped_count
    }

    pub fn to_statistics(&self, id: String, created_at: DateTime<Utc>) -> ProcessingStatistics {
        ProcessingStatistics {
            id,
            run_kind: self.run_kind,
            processing_date: self.processing_date,
            processed_count: as_count(self.processed_count),
            failed_count: as_count(self.failed_count),
            skipped_count: as_count(self.skipped_count),
            total_amount: self.total_amount,
            duration_ms: self.duration_ms,
            correlation_id: self.correlation_id.clone(),
            created_at,
        }
    }
}

/// Aggregate outcome of an overdue sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverdueSweepResult {
    pub processing_date: NaiveDate,
    pub correlation_id: CorrelationId,
    pub examined_count: usize,
    /// Failed installments moved to Overdue in this sweep
    pub marked_overdue: usize,
    /// Collections cases opened in this sweep
    pub escalated: usize,
    pub already_escalated: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
    pub failed_details: Vec<FailedInstallment>,
    /// Late fees priced on installments marked overdue in this sweep
    pub total_late_fees: Decimal,
    pub cancelled: bool,
    pub duration_ms: i64,
}

/// What the sweep did to one installment
#[derive(Debug, Clone, PartialEq)]
pub struct OverdueAction {
    pub marked_overdue: bool,
    pub late_fee: Option<Decimal>,
    pub escalation: Option<EscalationOutcome>,
}

impl OverdueSweepResult {
    pub fn new(processing_date: NaiveDate, correlation_id: CorrelationId) -> Self {
        Self {
            processing_date,
            correlation_id,
            examined_count: 0,
            marked_overdue: 0,
            escalated: 0,
            already_escalated: 0,
            skipped_count: 0,
            failed_count: 0,
            failed_details: Vec::new(),
            total_late_fees: Decimal::ZERO,
            cancelled: false,
            duration_ms: 0,
        }
    }

    pub fn record(&mut self, action: OverdueAction) {
        self.examined_count += 1;

        if action.marked_overdue {
            self.marked_overdue += 1;
            self.total_late_fees += action.late_fee.unwrap_or_default();
        }

        match action.escalation {
            Some(EscalationOutcome::Created(_)) => self.escalated += 1,
            Some(EscalationOutcome::AlreadyEscalated(_)) => self.already_escalated += 1,
            Some(EscalationOutcome::Locked) => self.skipped_count += 1,
            None if !action.marked_overdue => self.skipped_count += 1,
            None => {}
        }
    }

    pub fn record_error(&mut self, installment: &Installment, error: &AppError) {
        self.examined_count += 1;
        self.failed_count += 1;
        self.failed_details
            .push(FailedInstallment::from_error(installment, error));
    }

    pub fn to_statistics(&self, id: String, created_at: DateTime<Utc>) -> ProcessingStatistics {
        let acted_on = self
            .examined_count
            .saturating_sub(self.skipped_count + self.failed_count);

        ProcessingStatistics {
            id,
            run_kind: RunKind::Overdue,
            processing_date: self.processing_date,
            processed_count: as_count(acted_on),
            failed_count: as_count(self.failed_count),
            skipped_count: as_count(self.skipped_count),
            total_amount: self.total_late_fees,
            duration_ms: self.duration_ms,
            correlation_id: self.correlation_id.clone(),
            created_at,
        }
    }
}
