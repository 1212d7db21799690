// Per-installment charge state machine
//
// Pending -> Paid | Failed, Failed -> Paid | Failed (retry), Failed -> Overdue.
// Every attempt runs under the idempotency key
// `installment-attempt:{id}:{attempt_count}` and re-reads the row inside the
// lock, so a repeated trigger never charges twice.

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::ProcessingConfig;
use crate::core::{AppError, Clock, CorrelationId, IdGenerator, Result};
use crate::modules::collections::{LateFee, RetryScheduler};
use crate::modules::gateways::{ChargeOutcome, ChargeRequest, PaymentGateway};
use crate::modules::idempotency::IdempotencyCoordinator;
use crate::modules::installments::models::{
    codes, AttemptResult, Installment, InstallmentStatus, Payment, PaymentEvent,
    PaymentEventType, PaymentStatus,
};
use crate::modules::installments::repositories::{
    InstallmentRepository, PaymentEventRepository, PaymentRepository,
};
use crate::modules::integrations::{
    topics, BusEvent, MessageBus, Notifier, OverdueNotice, PaymentHistoryEntry, PaymentNotice,
    RiskAssessment, RiskAssessor, RiskRequest,
};

const RISK_BLOCKED_REASON: &str = "risk blocked";
const CUSTOMER_SAFE_DECLINE: &str = "Your installment payment could not be processed";

/// Ledger stores the processor writes through
#[derive(Clone)]
pub struct LedgerRepositories {
    pub installments: Arc<dyn InstallmentRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub events: Arc<dyn PaymentEventRepository>,
}

/// External services an attempt talks to
#[derive(Clone)]
pub struct Collaborators {
    pub gateway: Arc<dyn PaymentGateway>,
    pub risk: Arc<dyn RiskAssessor>,
    pub notifier: Arc<dyn Notifier>,
    pub bus: Arc<dyn MessageBus>,
}

pub struct InstallmentProcessor {
    ledger: LedgerRepositories,
    collaborators: Collaborators,
    scheduler: Arc<RetryScheduler>,
    coordinator: Arc<IdempotencyCoordinator>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    config: ProcessingConfig,
    merchant_id: String,
}

impl InstallmentProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: LedgerRepositories,
        collaborators: Collaborators,
        scheduler: Arc<RetryScheduler>,
        coordinator: Arc<IdempotencyCoordinator>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        config: ProcessingConfig,
        merchant_id: String,
    ) -> Self {
        Self {
            ledger,
            collaborators,
            scheduler,
            coordinator,
            clock,
            ids,
            config,
            merchant_id,
        }
    }

    /// Attempt to charge `installment` exactly once for its current attempt
    /// count.
    ///
    /// # Returns
    /// * `Ok(AttemptResult)` - charged, failed, or skipped (`LOCKED` /
    ///   `NOT_CHARGEABLE`)
    /// * `Err` - the idempotency store could not be used at all
    pub async fn process(
        &self,
        installment: &Installment,
        correlation_id: &CorrelationId,
    ) -> Result<AttemptResult> {
        let key = format!(
            "installment-attempt:{}:{}",
            installment.id, installment.attempt_count
        );
        let expected_attempts = installment.attempt_count;
        let span = info_span!(
            "installment_attempt",
            installment_id = %installment.id,
            attempt = expected_attempts + 1,
            correlation_id = %correlation_id
        );

        let result = self
            .coordinator
            .execute(
                &key,
                || self.attempt(&installment.id, expected_attempts, correlation_id),
                None,
            )
            .instrument(span)
            .await?;

        if result.is_locked() {
            debug!(installment_id = %installment.id, "Attempt already running elsewhere");
            return Ok(failure(
                installment,
                codes::LOCKED,
                "Installment attempt in progress elsewhere",
                true,
            ));
        }

        Ok(result.value.unwrap_or_else(|| {
            failure(
                installment,
                codes::SYSTEM_ERROR,
                result
                    .error
                    .unwrap_or_else(|| "Attempt produced no result".to_string()),
                false,
            )
        }))
    }

    /// One charge attempt against the freshly read row
    pub async fn attempt(
        &self,
        installment_id: &str,
        expected_attempts: i32,
        correlation_id: &CorrelationId,
    ) -> Result<AttemptResult> {
        let current = self
            .ledger
            .installments
            .find_by_id(installment_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Installment {}", installment_id)))?;

        if !current.is_chargeable() || current.attempt_count != expected_attempts {
            debug!(
                installment_id = installment_id,
                status = %current.status,
                attempt_count = current.attempt_count,
                "Installment no longer chargeable for this attempt"
            );
            return Ok(failure(
                &current,
                codes::NOT_CHARGEABLE,
                format!(
                    "Installment is {} after {} attempts",
                    current.status, current.attempt_count
                ),
                false,
            ));
        }

        match self.charge(&current, correlation_id).await {
            Ok(result) => Ok(result),
            Err(AppError::Conflict(message)) => {
                warn!(
                    installment_id = installment_id,
                    correlation_id = %correlation_id,
                    "Concurrent modification during attempt"
                );
                Ok(failure(
                    &current,
                    codes::CONCURRENT_MODIFICATION,
                    message,
                    true,
                ))
            }
            Err(e) => Ok(self.record_system_error(&current, &e, correlation_id).await),
        }
    }

    /// Move an exhausted Failed installment to Overdue, record it and tell
    /// the customer what is now owed.
    pub async fn mark_overdue(
        &self,
        installment: &Installment,
        correlation_id: &CorrelationId,
    ) -> Result<Installment> {
        let now = self.clock.now();
        let mut overdue = installment.clone();
        overdue.mark_overdue(now)?;
        let stored = self.ledger.installments.update(&overdue).await?;

        let days_overdue = stored.days_overdue(self.clock.today());
        let late_fee = LateFee::calculate(stored.amount, stored.currency);

        let event = self
            .event(&stored, PaymentEventType::InstallmentOverdue, correlation_id)
            .with_amount(late_fee.total_due)
            .with_metadata("days_overdue", days_overdue)
            .with_metadata("late_fee", late_fee.fee.to_string())
            .with_metadata("attempt_count", stored.attempt_count);
        self.append_event(&event).await;

        let customer_email = match self.ledger.payments.find_by_id(&stored.payment_id).await {
            Ok(payment) => payment.and_then(|p| p.customer_email),
            Err(e) => {
                warn!(payment_id = %stored.payment_id, error = %e, "Payment lookup failed");
                None
            }
        };

        let notice = OverdueNotice {
            customer_id: stored.customer_id.clone(),
            customer_email,
            installment_id: stored.id.clone(),
            due_date: stored.due_date,
            days_overdue,
            amount: stored.amount,
            late_fee: late_fee.fee,
            total_due: late_fee.total_due,
            currency: stored.currency,
        };
        if let Err(e) = self.collaborators.notifier.send_overdue_notice(notice).await {
            warn!(installment_id = %stored.id, error = %e, "Overdue notice failed");
        }

        info!(
            installment_id = %stored.id,
            days_overdue = days_overdue,
            late_fee = %late_fee.fee,
            correlation_id = %correlation_id,
            "Installment marked overdue"
        );

        Ok(stored)
    }

    async fn charge(
        &self,
        installment: &Installment,
        correlation_id: &CorrelationId,
    ) -> Result<AttemptResult> {
        let payment = self
            .ledger
            .payments
            .find_by_id(&installment.payment_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Payment {}", installment.payment_id)))?;

        let history = self
            .ledger
            .installments
            .find_recent_for_customer(&installment.customer_id, self.config.payment_history_limit)
            .await?;

        let assessment = self
            .collaborators
            .risk
            .assess_installment_risk(RiskRequest {
                installment_id: installment.id.clone(),
                customer_id: installment.customer_id.clone(),
                amount: installment.amount,
                currency: installment.currency,
                attempt_number: installment.attempt_count + 1,
                payment_history: history.iter().map(PaymentHistoryEntry::from).collect(),
            })
            .await?;

        if assessment.risk_level.blocks_charge() {
            return self
                .record_risk_block(installment, &payment, &assessment, correlation_id)
                .await;
        }

        let outcome = self
            .collaborators
            .gateway
            .process_payment(ChargeRequest {
                customer_id: installment.customer_id.clone(),
                amount: installment.amount,
                currency: installment.currency,
                payment_method: payment.payment_method.clone(),
                payment_method_id: payment.payment_method_id.clone(),
                order_reference: installment.order_reference(&self.merchant_id),
                description: format!(
                    "Installment {} of payment {}",
                    installment.installment_number, payment.id
                ),
                customer_email: payment.customer_email.clone(),
                merchant_id: self.merchant_id.clone(),
            })
            .await?;

        match outcome {
            ChargeOutcome {
                success: true,
                transaction_id: Some(transaction_id),
                ..
            } => {
                self.record_paid(installment, &payment, transaction_id, correlation_id)
                    .await
            }
            ChargeOutcome { success: true, .. } => Err(AppError::gateway(
                "Gateway approved the charge without a transaction id",
            )),
            declined => {
                self.record_declined(installment, &payment, declined, correlation_id)
                    .await
            }
        }
    }

    async fn record_paid(
        &self,
        installment: &Installment,
        payment: &Payment,
        transaction_id: String,
        correlation_id: &CorrelationId,
    ) -> Result<AttemptResult> {
        let now = self.clock.now();
        let mut paid = installment.clone();
        paid.record_success(transaction_id.clone(), now)?;
        let stored = self.ledger.installments.update(&paid).await?;

        let event = self
            .event(&stored, PaymentEventType::InstallmentPaid, correlation_id)
            .with_amount(stored.amount)
            .with_metadata("transaction_id", transaction_id.clone())
            .with_metadata("attempt_count", stored.attempt_count)
            .with_metadata("gateway", self.collaborators.gateway.name());
        self.append_event(&event).await;

        let notice = self.payment_notice(&stored, payment, Some(transaction_id.clone()), None);
        if let Err(e) = self
            .collaborators
            .notifier
            .send_payment_confirmation(notice)
            .await
        {
            warn!(installment_id = %stored.id, error = %e, "Payment confirmation failed");
        }

        self.publish(
            topics::INSTALLMENT_PAID,
            json!({
                "installment_id": stored.id,
                "payment_id": stored.payment_id,
                "customer_id": stored.customer_id,
                "installment_number": stored.installment_number,
                "amount": stored.amount,
                "currency": stored.currency,
                "transaction_id": transaction_id,
                "paid_at": stored.paid_at,
            }),
            correlation_id,
        )
        .await;

        self.complete_payment_if_settled(&stored, payment, correlation_id)
            .await;

        info!(
            installment_id = %stored.id,
            amount = %stored.amount,
            attempt_count = stored.attempt_count,
            correlation_id = %correlation_id,
            "Installment paid"
        );

        Ok(AttemptResult::paid(
            &stored.id,
            &stored.customer_id,
            stored.amount,
            transaction_id,
            stored.attempt_count,
        ))
    }

    async fn record_declined(
        &self,
        installment: &Installment,
        payment: &Payment,
        outcome: ChargeOutcome,
        correlation_id: &CorrelationId,
    ) -> Result<AttemptResult> {
        let error_code = outcome
            .error_code
            .unwrap_or_else(|| "GATEWAY_DECLINED".to_string());
        let error_message = outcome
            .error_message
            .unwrap_or_else(|| "Charge declined".to_string());

        // eligibility accounts for the attempt being recorded now
        let retry_eligible =
            outcome.retryable && installment.attempt_count + 1 < self.config.max_retry_attempts;

        let mut failed = installment.clone();
        failed.record_failure(error_message.clone(), retry_eligible, self.clock.now())?;
        let stored = self.ledger.installments.update(&failed).await?;

        let event = self
            .event(&stored, PaymentEventType::InstallmentFailed, correlation_id)
            .with_amount(stored.amount)
            .with_metadata("error_code", error_code.clone())
            .with_metadata("error_message", error_message.clone())
            .with_metadata("retryable", outcome.retryable)
            .with_metadata("attempt_count", stored.attempt_count);
        self.append_event(&event).await;

        if retry_eligible {
            if let Err(e) = self.scheduler.schedule_retry(&stored, correlation_id).await {
                warn!(installment_id = %stored.id, error = %e, "Failed to schedule retry");
            }
        } else {
            let notice = self.payment_notice(
                &stored,
                payment,
                None,
                Some(CUSTOMER_SAFE_DECLINE.to_string()),
            );
            if let Err(e) = self
                .collaborators
                .notifier
                .send_payment_failure_notification(notice)
                .await
            {
                warn!(installment_id = %stored.id, error = %e, "Failure notification failed");
            }
        }

        warn!(
            installment_id = %stored.id,
            error_code = %error_code,
            retryable = outcome.retryable,
            attempt_count = stored.attempt_count,
            correlation_id = %correlation_id,
            "Installment charge failed"
        );

        Ok(AttemptResult::failed(
            &stored.id,
            &stored.customer_id,
            stored.amount,
            error_code,
            error_message,
            outcome.retryable,
            stored.attempt_count,
        ))
    }

    async fn record_risk_block(
        &self,
        installment: &Installment,
        payment: &Payment,
        assessment: &RiskAssessment,
        correlation_id: &CorrelationId,
    ) -> Result<AttemptResult> {
        let mut blocked = installment.clone();
        blocked.record_failure(RISK_BLOCKED_REASON, false, self.clock.now())?;
        let stored = self.ledger.installments.update(&blocked).await?;

        let event = self
            .event(&stored, PaymentEventType::RiskBlocked, correlation_id)
            .with_amount(stored.amount)
            .with_metadata("risk_level", assessment.risk_level.as_str())
            .with_metadata("risk_score", assessment.risk_score.to_string())
            .with_metadata("attempt_count", stored.attempt_count);
        self.append_event(&event).await;

        let notice = self.payment_notice(
            &stored,
            payment,
            None,
            Some(CUSTOMER_SAFE_DECLINE.to_string()),
        );
        if let Err(e) = self
            .collaborators
            .notifier
            .send_payment_failure_notification(notice)
            .await
        {
            warn!(installment_id = %stored.id, error = %e, "Failure notification failed");
        }

        warn!(
            installment_id = %stored.id,
            risk_score = %assessment.risk_score,
            correlation_id = %correlation_id,
            "Installment blocked by risk assessment"
        );

        Ok(AttemptResult::failed(
            &stored.id,
            &stored.customer_id,
            stored.amount,
            codes::RISK_BLOCKED,
            RISK_BLOCKED_REASON,
            false,
            stored.attempt_count,
        ))
    }

    /// Unexpected failure: count the attempt and park the installment as a
    /// non-retryable failure. Never fails itself.
    async fn record_system_error(
        &self,
        installment: &Installment,
        cause: &AppError,
        correlation_id: &CorrelationId,
    ) -> AttemptResult {
        error!(
            installment_id = %installment.id,
            error = %cause,
            correlation_id = %correlation_id,
            "System error during installment attempt"
        );

        let reason = format!("system error: {}", cause);
        let mut failed = installment.clone();
        if let Err(e) = failed.record_failure(reason.clone(), false, self.clock.now()) {
            warn!(installment_id = %installment.id, error = %e, "Cannot record system error");
            return failure(installment, codes::SYSTEM_ERROR, reason, false);
        }

        match self.ledger.installments.update(&failed).await {
            Ok(stored) => {
                let event = self
                    .event(&stored, PaymentEventType::SystemError, correlation_id)
                    .with_amount(stored.amount)
                    .with_metadata("error", cause.to_string())
                    .with_metadata("attempt_count", stored.attempt_count);
                self.append_event(&event).await;
                failure(&stored, codes::SYSTEM_ERROR, reason, false)
            }
            Err(e) => {
                error!(
                    installment_id = %installment.id,
                    error = %e,
                    "Failed to persist system error"
                );
                failure(installment, codes::SYSTEM_ERROR, reason, false)
            }
        }
    }

    async fn complete_payment_if_settled(
        &self,
        paid: &Installment,
        payment: &Payment,
        correlation_id: &CorrelationId,
    ) {
        if payment.status == PaymentStatus::Completed {
            return;
        }

        let siblings = match self.ledger.installments.find_by_payment(&payment.id).await {
            Ok(siblings) => siblings,
            Err(e) => {
                warn!(payment_id = %payment.id, error = %e, "Cannot check payment completion");
                return;
            }
        };

        let settled = siblings
            .iter()
            .all(|i| i.id == paid.id || i.status == InstallmentStatus::Paid);
        if !settled {
            return;
        }

        // re-read so the version check runs against the latest row
        let mut latest = match self.ledger.payments.find_by_id(&payment.id).await {
            Ok(Some(latest)) => latest,
            Ok(None) => return,
            Err(e) => {
                warn!(payment_id = %payment.id, error = %e, "Cannot reload payment");
                return;
            }
        };
        if latest.complete(self.clock.now()).is_err() {
            return;
        }

        let completed = match self.ledger.payments.update(&latest).await {
            Ok(completed) => completed,
            Err(e) => {
                warn!(payment_id = %payment.id, error = %e, "Failed to complete payment");
                return;
            }
        };

        let event = PaymentEvent::new(
            self.ids.new_id(),
            &completed.id,
            PaymentEventType::PaymentCompleted,
            format!("All {} installments paid", siblings.len()),
            correlation_id.clone(),
            self.clock.now(),
        )
        .with_amount(completed.total_amount);
        self.append_event(&event).await;

        self.publish(
            topics::SETTLEMENT_TRIGGER,
            json!({
                "payment_id": completed.id,
                "customer_id": completed.customer_id,
                "merchant_id": completed.merchant_id,
                "total_amount": completed.total_amount,
                "currency": completed.currency,
                "completed_at": completed.completed_at,
            }),
            correlation_id,
        )
        .await;

        info!(
            payment_id = %completed.id,
            correlation_id = %correlation_id,
            "Payment completed"
        );
    }

    fn event(
        &self,
        installment: &Installment,
        event_type: PaymentEventType,
        correlation_id: &CorrelationId,
    ) -> PaymentEvent {
        let description = match event_type {
            PaymentEventType::InstallmentPaid => "paid",
            PaymentEventType::InstallmentFailed => "failed",
            PaymentEventType::RiskBlocked => "blocked by risk assessment",
            PaymentEventType::SystemError => "failed with a system error",
            PaymentEventType::InstallmentOverdue => "is overdue",
            PaymentEventType::CollectionsEscalated => "escalated to collections",
            PaymentEventType::PaymentCompleted => "completed its payment",
        };

        PaymentEvent::new(
            self.ids.new_id(),
            &installment.payment_id,
            event_type,
            format!("Installment {} {}", installment.installment_number, description),
            correlation_id.clone(),
            self.clock.now(),
        )
        .for_installment(&installment.id)
    }

    async fn append_event(&self, event: &PaymentEvent) {
        if let Err(e) = self.ledger.events.append(event).await {
            error!(
                payment_id = %event.payment_id,
                event_type = %event.event_type,
                error = %e,
                "Failed to append payment event"
            );
        }
    }

    /// Store first, publish second: a failed publish is logged only
    async fn publish(
        &self,
        topic: &str,
        payload: serde_json::Value,
        correlation_id: &CorrelationId,
    ) {
        let event = BusEvent {
            event_id: self.ids.new_id(),
            correlation_id: correlation_id.clone(),
            occurred_at: self.clock.now(),
            payload,
        };

        if let Err(e) = self.collaborators.bus.publish(topic, event, None).await {
            warn!(topic = topic, error = %e, "Failed to publish event");
        }
    }

    fn payment_notice(
        &self,
        installment: &Installment,
        payment: &Payment,
        transaction_id: Option<String>,
        reason: Option<String>,
    ) -> PaymentNotice {
        PaymentNotice {
            customer_id: installment.customer_id.clone(),
            customer_email: payment.customer_email.clone(),
            installment_id: installment.id.clone(),
            installment_number: installment.installment_number,
            amount: installment.amount,
            currency: installment.currency,
            transaction_id,
            reason,
        }
    }
}

fn failure(
    installment: &Installment,
    code: &str,
    message: impl Into<String>,
    retryable: bool,
) -> AttemptResult {
    AttemptResult::failed(
        &installment.id,
        &installment.customer_id,
        installment.amount,
        code,
        message,
        retryable,
        installment.attempt_count,
    )
}
