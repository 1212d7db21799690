use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::BatchOrchestrator;
use crate::core::{Clock, CorrelationId};
use crate::modules::idempotency::IdempotencyCoordinator;

/// Background job ticking the due, retry and overdue runs plus the
/// idempotency purge. Spawned from `main`; stops when the token is cancelled.
pub struct BatchJobRunner {
    orchestrator: Arc<BatchOrchestrator>,
    coordinator: Arc<IdempotencyCoordinator>,
    clock: Arc<dyn Clock>,
    period: Duration,
    cancel: CancellationToken,
}

impl BatchJobRunner {
    pub fn new(
        orchestrator: Arc<BatchOrchestrator>,
        coordinator: Arc<IdempotencyCoordinator>,
        clock: Arc<dyn Clock>,
        period: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            orchestrator,
            coordinator,
            clock,
            period,
            cancel,
        }
    }

    pub async fn start(self: Arc<Self>) {
        info!(
            period_secs = self.period.as_secs(),
            "Starting installment job runner"
        );

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Installment job runner stopped");
                    break;
                }
                _ = ticker.tick() => self.run_cycle().await,
            }
        }
    }

    /// One full pass; each step logs its own failure and the next still runs
    pub async fn run_cycle(&self) {
        let correlation_id = CorrelationId::generate();
        let today = self.clock.today();

        if let Err(e) = self
            .orchestrator
            .process_due(today, &correlation_id.child("due"))
            .await
        {
            error!(error = %e, correlation_id = %correlation_id, "Due run failed");
        }

        if self.cancel.is_cancelled() {
            return;
        }

        if let Err(e) = self
            .orchestrator
            .process_retries(&correlation_id.child("retries"))
            .await
        {
            error!(error = %e, correlation_id = %correlation_id, "Retry run failed");
        }

        if self.cancel.is_cancelled() {
            return;
        }

        if let Err(e) = self
            .orchestrator
            .process_overdue(&correlation_id.child("overdue"))
            .await
        {
            error!(error = %e, correlation_id = %correlation_id, "Overdue sweep failed");
        }

        match self.coordinator.purge_expired().await {
            Ok(purged) if purged > 0 => info!(purged = purged, "Idempotency entries purged"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "Idempotency purge failed"),
        }
    }
}
