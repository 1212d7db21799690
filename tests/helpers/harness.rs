use chrono::{Duration as ChronoDuration, NaiveDate};
use paylater::config::ProcessingConfig;
use paylater::core::{Clock, CorrelationId, Currency, IdGenerator};
use paylater::modules::batch::{BatchOrchestrator, InMemoryStatisticsRepository};
use paylater::modules::collections::{InMemoryCollectionsRepository, RetryScheduler};
use paylater::modules::idempotency::{
    ExecuteOptions, IdempotencyCoordinator, InMemoryIdempotencyStore,
};
use paylater::modules::installments::{
    Collaborators, InMemoryLedger, Installment, InstallmentProcessor, InstallmentRepository,
    InstallmentStatus, LedgerRepositories, Payment, PaymentRepository,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::clock::{FixedClock, SequentialIds};
use super::doubles::{RecordingBus, RecordingNotifier, ScriptedGateway, ScriptedRisk};

pub const MERCHANT_ID: &str = "merchant-1";

/// Default tuning with every pause removed
pub fn test_processing_config() -> ProcessingConfig {
    ProcessingConfig {
        inter_chunk_delay_ms: 0,
        retry_delay_ms: 0,
        ..ProcessingConfig::default()
    }
}

pub fn test_idempotency_options() -> ExecuteOptions {
    ExecuteOptions {
        lock_retry_interval: Duration::from_millis(20),
        retry_delay: Duration::ZERO,
        ..ExecuteOptions::default()
    }
}

/// Fully wired engine over in-memory stores and scripted collaborators
pub struct Harness {
    pub clock: Arc<FixedClock>,
    pub ids: Arc<SequentialIds>,
    pub ledger: Arc<InMemoryLedger>,
    pub cases: Arc<InMemoryCollectionsRepository>,
    pub statistics: Arc<InMemoryStatisticsRepository>,
    pub idempotency_store: Arc<InMemoryIdempotencyStore>,
    pub gateway: Arc<ScriptedGateway>,
    pub risk: Arc<ScriptedRisk>,
    pub notifier: Arc<RecordingNotifier>,
    pub bus: Arc<RecordingBus>,
    pub coordinator: Arc<IdempotencyCoordinator>,
    pub scheduler: Arc<RetryScheduler>,
    pub processor: Arc<InstallmentProcessor>,
    pub orchestrator: Arc<BatchOrchestrator>,
    pub cancel: CancellationToken,
    pub config: ProcessingConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(test_processing_config(), ScriptedGateway::approving())
    }

    pub fn with_config(config: ProcessingConfig) -> Self {
        Self::build(config, ScriptedGateway::approving())
    }

    pub fn with_gateway(config: ProcessingConfig, gateway: ScriptedGateway) -> Self {
        Self::build(config, gateway)
    }

    fn build(config: ProcessingConfig, gateway: ScriptedGateway) -> Self {
        let clock = Arc::new(FixedClock::at(FixedClock::default_start()));
        let ids = Arc::new(SequentialIds::default());
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let dyn_ids: Arc<dyn IdGenerator> = ids.clone();

        let ledger = Arc::new(InMemoryLedger::new());
        let cases = Arc::new(InMemoryCollectionsRepository::new());
        let statistics = Arc::new(InMemoryStatisticsRepository::new());
        let idempotency_store = Arc::new(InMemoryIdempotencyStore::new(dyn_clock.clone()));
        let gateway = Arc::new(gateway);
        let risk = Arc::new(ScriptedRisk::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let bus = Arc::new(RecordingBus::default());
        let cancel = CancellationToken::new();

        let repositories = LedgerRepositories {
            installments: ledger.clone(),
            payments: ledger.clone(),
            events: ledger.clone(),
        };

        let coordinator = Arc::new(IdempotencyCoordinator::new(
            idempotency_store.clone(),
            dyn_clock.clone(),
            dyn_ids.clone(),
            test_idempotency_options(),
        ));

        let scheduler = Arc::new(RetryScheduler::new(
            config.clone(),
            cases.clone(),
            ledger.clone(),
            bus.clone(),
            coordinator.clone(),
            dyn_clock.clone(),
            dyn_ids.clone(),
        ));

        let processor = Arc::new(InstallmentProcessor::new(
            repositories,
            Collaborators {
                gateway: gateway.clone(),
                risk: risk.clone(),
                notifier: notifier.clone(),
                bus: bus.clone(),
            },
            scheduler.clone(),
            coordinator.clone(),
            dyn_clock.clone(),
            dyn_ids.clone(),
            config.clone(),
            MERCHANT_ID.to_string(),
        ));

        let orchestrator = Arc::new(BatchOrchestrator::new(
            ledger.clone(),
            cases.clone(),
            statistics.clone(),
            processor.clone(),
            scheduler.clone(),
            dyn_clock,
            dyn_ids,
            config.clone(),
            cancel.clone(),
        ));

        Self {
            clock,
            ids,
            ledger,
            cases,
            statistics,
            idempotency_store,
            gateway,
            risk,
            notifier,
            bus,
            coordinator,
            scheduler,
            processor,
            orchestrator,
            cancel,
            config,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn correlation_id(&self) -> CorrelationId {
        CorrelationId::new("test-run")
    }

    /// A payment of `count` monthly installments of `amount` each, the first
    /// due on `first_due`. Ids are `{customer}-pay` and `{customer}-inst-{n}`.
    pub async fn seed_payment(
        &self,
        customer_id: &str,
        count: i32,
        first_due: NaiveDate,
        amount: Decimal,
    ) -> (Payment, Vec<Installment>) {
        let now = self.clock.now();
        let payment = Payment::new(
            format!("{}-pay", customer_id),
            customer_id.to_string(),
            Some(format!("{}@example.com", customer_id)),
            MERCHANT_ID.to_string(),
            Currency::USD,
            amount * Decimal::from(count),
            "card".to_string(),
            format!("pm-{}", customer_id),
            now,
        );
        PaymentRepository::insert(self.ledger.as_ref(), &payment)
            .await
            .unwrap();

        let mut installments = Vec::new();
        for n in 1..=count {
            let installment = Installment::new(
                format!("{}-inst-{}", customer_id, n),
                payment.id.clone(),
                customer_id.to_string(),
                n,
                amount,
                Currency::USD,
                first_due + ChronoDuration::days(30 * i64::from(n - 1)),
                now,
            )
            .unwrap();
            InstallmentRepository::insert(self.ledger.as_ref(), &installment)
                .await
                .unwrap();
            installments.push(installment);
        }

        (payment, installments)
    }

    /// A single installment already in `Failed` after `attempt_count`
    /// attempts, the last one made now.
    pub async fn seed_failed(
        &self,
        customer_id: &str,
        due_date: NaiveDate,
        amount: Decimal,
        attempt_count: i32,
        retry_eligible: bool,
    ) -> Installment {
        let (_, installments) = self.seed_payment(customer_id, 1, due_date, amount).await;
        let mut installment = self.installment(&installments[0].id).await;

        installment.status = InstallmentStatus::Failed;
        installment.attempt_count = attempt_count;
        installment.retry_eligible = retry_eligible;
        installment.failure_reason = Some("Insufficient funds".to_string());
        installment.last_attempt_at = Some(self.clock.now());

        InstallmentRepository::update(self.ledger.as_ref(), &installment)
            .await
            .unwrap()
    }

    pub async fn installment(&self, id: &str) -> Installment {
        InstallmentRepository::find_by_id(self.ledger.as_ref(), id)
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("installment {} missing", id))
    }

    pub async fn payment(&self, id: &str) -> Payment {
        PaymentRepository::find_by_id(self.ledger.as_ref(), id)
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("payment {} missing", id))
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
