use chrono::{Duration as ChronoDuration, NaiveDate};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::ProcessingConfig;
use crate::core::{Clock, CorrelationId, IdGenerator, Result};
use crate::modules::batch::models::{
    BatchResult, HealthReport, HealthState, OverdueAction, OverdueSweepResult,
    ProcessingStatistics, RunKind,
};
use crate::modules::batch::repositories::StatisticsRepository;
use crate::modules::collections::{CollectionsRepository, LateFee, RetryScheduler};
use crate::modules::installments::models::{Installment, InstallmentStatus};
use crate::modules::installments::repositories::InstallmentRepository;
use crate::modules::installments::services::InstallmentProcessor;

/// Drives the recurring runs: due charges, retries and the overdue sweep
pub struct BatchOrchestrator {
    installments: Arc<dyn InstallmentRepository>,
    cases: Arc<dyn CollectionsRepository>,
    statistics: Arc<dyn StatisticsRepository>,
    processor: Arc<InstallmentProcessor>,
    scheduler: Arc<RetryScheduler>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    config: ProcessingConfig,
    cancel: CancellationToken,
}

impl BatchOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        installments: Arc<dyn InstallmentRepository>,
        cases: Arc<dyn CollectionsRepository>,
        statistics: Arc<dyn StatisticsRepository>,
        processor: Arc<InstallmentProcessor>,
        scheduler: Arc<RetryScheduler>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        config: ProcessingConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            installments,
            cases,
            statistics,
            processor,
            scheduler,
            clock,
            ids,
            config,
            cancel,
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Charge every Pending installment due on `date`.
    ///
    /// Chunks of `chunk_size` run concurrently; each chunk fully resolves
    /// before the next starts. Store failures while loading propagate, while
    /// per-installment errors are recorded as failures.
    pub async fn process_due(
        &self,
        date: NaiveDate,
        correlation_id: &CorrelationId,
    ) -> Result<BatchResult> {
        let span = info_span!("process_due", %date, correlation_id = %correlation_id);

        async move {
            let started = Instant::now();
            let mut due = self.installments.find_due(date).await?;
            due.sort_by(|a, b| (&a.customer_id, &a.id).cmp(&(&b.customer_id, &b.id)));

            info!(count = due.len(), "Processing due installments");

            let mut result = BatchResult::new(RunKind::Due, date, correlation_id.clone());
            let chunk_size = self.config.chunk_size.max(1);

            for (index, chunk) in due.chunks(chunk_size).enumerate() {
                if index > 0 && !self.pause(self.config.inter_chunk_delay()).await {
                    result.cancelled = true;
                    break;
                }
                if self.cancel.is_cancelled() {
                    result.cancelled = true;
                    break;
                }

                result.chunk_sizes.push(chunk.len());
                let outcomes = join_all(
                    chunk
                        .iter()
                        .map(|installment| self.processor.process(installment, correlation_id)),
                )
                .await;

                for (installment, outcome) in chunk.iter().zip(outcomes) {
                    match outcome {
                        Ok(attempt) => result.record(&attempt),
                        Err(e) => {
                            error!(installment_id = %installment.id, error = %e, "Attempt errored");
                            result.record_error(installment, &e);
                        }
                    }
                }

                debug!(chunk = index + 1, size = chunk.len(), "Chunk processed");
            }

            if result.cancelled {
                warn!(
                    dispatched = result.total_count(),
                    remaining = due.len() - result.total_count(),
                    "Due run cancelled before completion"
                );
            }

            result.duration_ms = started.elapsed().as_millis() as i64;
            self.persist(result.to_statistics(self.ids.new_id(), self.clock.now()))
                .await;

            info!(
                processed = result.processed_count,
                failed = result.failed_count,
                skipped = result.skipped_count,
                total_amount = %result.total_amount,
                duration_ms = result.duration_ms,
                "Due run finished"
            );

            Ok(result)
        }
        .instrument(span)
        .await
    }

    /// Re-attempt Failed, retry-eligible installments whose backoff elapsed,
    /// one at a time with `retry_delay_ms` between them.
    pub async fn process_retries(&self, correlation_id: &CorrelationId) -> Result<BatchResult> {
        let span = info_span!("process_retries", correlation_id = %correlation_id);

        async move {
            let started = Instant::now();
            let candidates = self
                .installments
                .find_retry_candidates(self.config.max_retry_attempts)
                .await?;
            let due: Vec<Installment> = candidates
                .into_iter()
                .filter(|i| self.scheduler.is_retry_due(i))
                .collect();

            info!(count = due.len(), "Processing installment retries");

            let mut result =
                BatchResult::new(RunKind::Retry, self.clock.today(), correlation_id.clone());

            for (index, installment) in due.iter().enumerate() {
                if index > 0 && !self.pause(self.config.retry_delay()).await {
                    result.cancelled = true;
                    break;
                }
                if self.cancel.is_cancelled() {
                    result.cancelled = true;
                    break;
                }

                match self.processor.process(installment, correlation_id).await {
                    Ok(attempt) => result.record(&attempt),
                    Err(e) => {
                        error!(installment_id = %installment.id, error = %e, "Retry errored");
                        result.record_error(installment, &e);
                    }
                }
            }

            result.duration_ms = started.elapsed().as_millis() as i64;
            self.persist(result.to_statistics(self.ids.new_id(), self.clock.now()))
                .await;

            info!(
                processed = result.processed_count,
                failed = result.failed_count,
                skipped = result.skipped_count,
                "Retry run finished"
            );

            Ok(result)
        }
        .instrument(span)
        .await
    }

    /// Mark exhausted failures Overdue and escalate the chronic ones
    pub async fn process_overdue(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<OverdueSweepResult> {
        let span = info_span!("process_overdue", correlation_id = %correlation_id);

        async move {
            let started = Instant::now();
            let today = self.clock.today();
            let cutoff = today - ChronoDuration::days(self.config.overdue_threshold_days);

            let candidates = self
                .installments
                .find_overdue_candidates(cutoff, self.config.max_retry_attempts)
                .await?;

            info!(count = candidates.len(), %cutoff, "Sweeping overdue installments");

            let mut result = OverdueSweepResult::new(today, correlation_id.clone());

            for installment in &candidates {
                if self.cancel.is_cancelled() {
                    result.cancelled = true;
                    break;
                }

                match self.sweep_one(installment, today, correlation_id).await {
                    Ok(action) => result.record(action),
                    Err(e) => {
                        error!(installment_id = %installment.id, error = %e, "Overdue sweep errored");
                        result.record_error(installment, &e);
                    }
                }
            }

            result.duration_ms = started.elapsed().as_millis() as i64;
            self.persist(result.to_statistics(self.ids.new_id(), self.clock.now()))
                .await;

            info!(
                marked_overdue = result.marked_overdue,
                escalated = result.escalated,
                failed = result.failed_count,
                "Overdue sweep finished"
            );

            Ok(result)
        }
        .instrument(span)
        .await
    }

    /// Healthy, Degraded when 24h failures exceed the alert threshold,
    /// Unhealthy when the store cannot be reached.
    pub async fn health_status(&self) -> HealthReport {
        let checked_at = self.clock.now();
        let threshold = self.config.failure_alert_threshold;

        let unhealthy = |detail: String| HealthReport {
            status: HealthState::Unhealthy,
            store_reachable: false,
            recent_failures: None,
            failure_threshold: threshold,
            checked_at,
            detail: Some(detail),
        };

        if let Err(e) = self.installments.ping().await {
            warn!(error = %e, "Health check: store unreachable");
            return unhealthy(e.to_string());
        }

        let failures = match self
            .installments
            .count_failures_since(checked_at - ChronoDuration::hours(24))
            .await
        {
            Ok(failures) => failures,
            Err(e) => {
                warn!(error = %e, "Health check: failure count unavailable");
                return unhealthy(e.to_string());
            }
        };

        let status = if failures > threshold {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };

        HealthReport {
            status,
            store_reachable: true,
            recent_failures: Some(failures),
            failure_threshold: threshold,
            checked_at,
            detail: None,
        }
    }

    /// Store reachability only
    pub async fn is_ready(&self) -> bool {
        self.installments.ping().await.is_ok()
    }

    async fn sweep_one(
        &self,
        installment: &Installment,
        today: NaiveDate,
        correlation_id: &CorrelationId,
    ) -> Result<OverdueAction> {
        let mut action = OverdueAction {
            marked_overdue: false,
            late_fee: None,
            escalation: None,
        };

        let current = match installment.status {
            InstallmentStatus::Failed => {
                let overdue = self.processor.mark_overdue(installment, correlation_id).await?;
                action.marked_overdue = true;
                action.late_fee = Some(LateFee::calculate(overdue.amount, overdue.currency).fee);
                overdue
            }
            InstallmentStatus::Overdue => {
                if self.cases.find_by_installment(&installment.id).await?.is_some() {
                    return Ok(action);
                }
                installment.clone()
            }
            _ => return Ok(action),
        };

        if self.scheduler.should_escalate(&current, today) {
            action.escalation = Some(self.scheduler.escalate(&current, correlation_id).await?);
        }

        Ok(action)
    }

    /// Sleep unless cancelled first; false means cancelled
    async fn pause(&self, delay: std::time::Duration) -> bool {
        if delay.is_zero() {
            return !self.cancel.is_cancelled();
        }

        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn persist(&self, statistics: ProcessingStatistics) {
        if let Err(e) = self.statistics.insert(&statistics).await {
            error!(
                run_kind = %statistics.run_kind,
                error = %e,
                "Failed to persist processing statistics"
            );
        }
    }
}
