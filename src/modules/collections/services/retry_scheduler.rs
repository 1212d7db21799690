// Retry & escalation scheduling
//
// Decides when a failed installment is due for another attempt, prices the
// late fee on overdue ones, and opens collections cases exactly once.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::ProcessingConfig;
use crate::core::{AppError, Clock, CorrelationId, Currency, IdGenerator, Result};
use crate::modules::collections::models::{CollectionsCase, EscalationOutcome, LateFee};
use crate::modules::collections::repositories::CollectionsRepository;
use crate::modules::idempotency::IdempotencyCoordinator;
use crate::modules::installments::models::{
    Installment, InstallmentStatus, PaymentEvent, PaymentEventType,
};
use crate::modules::installments::repositories::PaymentEventRepository;
use crate::modules::integrations::{topics, BusEvent, MessageBus};

/// Service for retry timing, late fees and collections escalation
pub struct RetryScheduler {
    config: ProcessingConfig,
    cases: Arc<dyn CollectionsRepository>,
    events: Arc<dyn PaymentEventRepository>,
    bus: Arc<dyn MessageBus>,
    coordinator: Arc<IdempotencyCoordinator>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl RetryScheduler {
    pub fn new(
        config: ProcessingConfig,
        cases: Arc<dyn CollectionsRepository>,
        events: Arc<dyn PaymentEventRepository>,
        bus: Arc<dyn MessageBus>,
        coordinator: Arc<IdempotencyCoordinator>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            config,
            cases,
            events,
            bus,
            coordinator,
            clock,
            ids,
        }
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Wait before the next attempt after `attempt_count` attempts
    pub fn backoff_delay(&self, attempt_count: i32) -> ChronoDuration {
        self.config.backoff_for(attempt_count)
    }

    pub fn next_retry_at(&self, attempt_count: i32) -> DateTime<Utc> {
        self.clock.now() + self.backoff_delay(attempt_count)
    }

    /// Failed, retry-eligible, under the attempt cap, and its backoff elapsed
    pub fn is_retry_due(&self, installment: &Installment) -> bool {
        if installment.status != InstallmentStatus::Failed
            || !installment.retry_eligible
            || installment.attempt_count >= self.config.max_retry_attempts
        {
            return false;
        }

        match installment.last_attempt_at {
            Some(last) => last + self.backoff_delay(installment.attempt_count) <= self.clock.now(),
            None => true,
        }
    }

    /// Announce the next attempt on the bus, held until the backoff elapses.
    /// Returns the scheduled instant.
    pub async fn schedule_retry(
        &self,
        installment: &Installment,
        correlation_id: &CorrelationId,
    ) -> Result<DateTime<Utc>> {
        let retry_at = self.next_retry_at(installment.attempt_count);

        let event = BusEvent {
            event_id: self.ids.new_id(),
            correlation_id: correlation_id.clone(),
            occurred_at: self.clock.now(),
            payload: json!({
                "installment_id": installment.id,
                "payment_id": installment.payment_id,
                "customer_id": installment.customer_id,
                "attempt_count": installment.attempt_count,
                "retry_at": retry_at,
            }),
        };

        self.bus
            .publish(topics::INSTALLMENT_RETRY_DUE, event, Some(retry_at))
            .await?;

        info!(
            installment_id = %installment.id,
            attempt_count = installment.attempt_count,
            retry_at = %retry_at,
            correlation_id = %correlation_id,
            "Scheduled installment retry"
        );

        Ok(retry_at)
    }

    pub fn calculate_late_fee(&self, amount: Decimal, currency: Currency) -> LateFee {
        LateFee::calculate(amount, currency)
    }

    /// Strictly past the escalation threshold and out of attempts
    pub fn should_escalate(&self, installment: &Installment, today: NaiveDate) -> bool {
        installment.days_overdue(today) > self.config.collection_escalation_days
            && installment.attempt_count >= self.config.max_retry_attempts
    }

    /// Open a collections case for the installment unless one exists.
    ///
    /// Guarded twice: a lookup on the installment id and the idempotency key
    /// `collections-escalation:{installment id}`, so concurrent or repeated
    /// sweeps produce one case.
    pub async fn escalate(
        &self,
        installment: &Installment,
        correlation_id: &CorrelationId,
    ) -> Result<EscalationOutcome> {
        let key = format!("collections-escalation:{}", installment.id);

        let result = self
            .coordinator
            .execute(
                &key,
                || self.open_case(installment, correlation_id),
                None,
            )
            .await?;

        if result.is_locked() {
            return Ok(EscalationOutcome::Locked);
        }

        match result.value {
            // a replay means some earlier sweep created it
            Some(EscalationOutcome::Created(case)) if result.replayed => {
                Ok(EscalationOutcome::AlreadyEscalated(case))
            }
            Some(outcome) => Ok(outcome),
            None => Err(AppError::internal(format!(
                "Escalation of installment {} failed: {}",
                installment.id,
                result.error.unwrap_or_default()
            ))),
        }
    }

    async fn open_case(
        &self,
        installment: &Installment,
        correlation_id: &CorrelationId,
    ) -> Result<EscalationOutcome> {
        if let Some(existing) = self.cases.find_by_installment(&installment.id).await? {
            return Ok(EscalationOutcome::AlreadyEscalated(existing));
        }

        let now = self.clock.now();
        let days_overdue = installment.days_overdue(self.clock.today());
        let late_fee = self.calculate_late_fee(installment.amount, installment.currency);
        let case = CollectionsCase::open(
            self.ids.new_id(),
            installment,
            &late_fee,
            days_overdue,
            correlation_id.clone(),
            now,
        );

        match self.cases.insert(&case).await {
            Ok(()) => {}
            Err(AppError::Conflict(_)) => {
                if let Some(existing) = self.cases.find_by_installment(&installment.id).await? {
                    return Ok(EscalationOutcome::AlreadyEscalated(existing));
                }
                return Err(AppError::internal(format!(
                    "Collections case for {} conflicted but was not found",
                    installment.id
                )));
            }
            Err(e) => return Err(e),
        }

        let event = PaymentEvent::new(
            self.ids.new_id(),
            &installment.payment_id,
            PaymentEventType::CollectionsEscalated,
            format!(
                "Installment {} escalated to collections after {} days overdue",
                installment.installment_number, days_overdue
            ),
            correlation_id.clone(),
            now,
        )
        .for_installment(&installment.id)
        .with_amount(case.total_due)
        .with_metadata("case_id", case.id.clone())
        .with_metadata("late_fee", case.late_fee.to_string())
        .with_metadata("days_overdue", days_overdue)
        .with_metadata("attempt_count", installment.attempt_count);

        if let Err(e) = self.events.append(&event).await {
            warn!(
                installment_id = %installment.id,
                error = %e,
                "Failed to record escalation event"
            );
        }

        let bus_event = BusEvent {
            event_id: self.ids.new_id(),
            correlation_id: correlation_id.clone(),
            occurred_at: now,
            payload: json!({
                "case_id": case.id,
                "installment_id": case.installment_id,
                "payment_id": case.payment_id,
                "customer_id": case.customer_id,
                "original_amount": case.original_amount,
                "late_fee": case.late_fee,
                "total_due": case.total_due,
                "currency": case.currency,
                "days_overdue": case.days_overdue,
            }),
        };

        if let Err(e) = self
            .bus
            .publish(topics::COLLECTIONS_ESCALATION, bus_event, None)
            .await
        {
            warn!(
                installment_id = %installment.id,
                error = %e,
                "Failed to publish collections escalation"
            );
        }

        info!(
            installment_id = %installment.id,
            case_id = %case.id,
            days_overdue = days_overdue,
            total_due = %case.total_due,
            correlation_id = %correlation_id,
            "Installment escalated to collections"
        );

        Ok(EscalationOutcome::Created(case))
    }
}
