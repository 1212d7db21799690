use actix_web::{web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paylater::config::{Config, DatabaseConfig};
use paylater::core::{Clock, IdGenerator, SystemClock, UuidGenerator};
use paylater::middleware::CorrelationIdMiddleware;
use paylater::modules::batch::{self, BatchJobRunner, BatchOrchestrator, MySqlStatisticsRepository};
use paylater::modules::collections::{MySqlCollectionsRepository, RetryScheduler};
use paylater::modules::gateways::HttpGatewayClient;
use paylater::modules::health;
use paylater::modules::idempotency::{ExecuteOptions, IdempotencyCoordinator, MySqlIdempotencyStore};
use paylater::modules::installments::repositories::{
    MySqlInstallmentRepository, MySqlPaymentEventRepository, MySqlPaymentRepository,
};
use paylater::modules::installments::{Collaborators, InstallmentProcessor, LedgerRepositories};
use paylater::modules::integrations::{HttpNotificationClient, HttpRiskClient, OutboxMessageBus};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    init_tracing(&config);

    tracing::info!("Starting Paylater installment collection engine");
    tracing::info!("Environment: {}", config.app.env);
    tracing::info!("Server binding to: {}", config.server.bind_address());

    // Create database connection pool
    let db_pool = config
        .database
        .create_pool()
        .await
        .context("Failed to create database pool")?;
    DatabaseConfig::migrate(&db_pool)
        .await
        .context("Failed to run migrations")?;

    tracing::info!(
        "Database pool initialized ({} connections)",
        config.database.pool_size
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ids: Arc<dyn IdGenerator> = Arc::new(UuidGenerator);
    let timeout = Duration::from_secs(config.integrations.request_timeout_secs);
    let cancel = CancellationToken::new();

    let ledger = LedgerRepositories {
        installments: Arc::new(MySqlInstallmentRepository::new(db_pool.clone())),
        payments: Arc::new(MySqlPaymentRepository::new(db_pool.clone())),
        events: Arc::new(MySqlPaymentEventRepository::new(db_pool.clone())),
    };

    let collaborators = Collaborators {
        gateway: Arc::new(HttpGatewayClient::new(
            config.integrations.gateway_api_key.clone(),
            config.integrations.gateway_base_url.clone(),
            timeout,
        )?),
        risk: Arc::new(HttpRiskClient::new(
            config.integrations.risk_base_url.clone(),
            timeout,
        )?),
        notifier: Arc::new(HttpNotificationClient::new(
            config.integrations.notification_base_url.clone(),
            timeout,
        )?),
        bus: Arc::new(OutboxMessageBus::new(db_pool.clone())),
    };

    let coordinator = Arc::new(IdempotencyCoordinator::new(
        Arc::new(MySqlIdempotencyStore::new(db_pool.clone(), clock.clone())),
        clock.clone(),
        ids.clone(),
        ExecuteOptions::from(&config.idempotency),
    ));

    let cases = Arc::new(MySqlCollectionsRepository::new(db_pool.clone()));

    let scheduler = Arc::new(RetryScheduler::new(
        config.processing.clone(),
        cases.clone(),
        ledger.events.clone(),
        collaborators.bus.clone(),
        coordinator.clone(),
        clock.clone(),
        ids.clone(),
    ));

    let processor = Arc::new(InstallmentProcessor::new(
        ledger.clone(),
        collaborators,
        scheduler.clone(),
        coordinator.clone(),
        clock.clone(),
        ids.clone(),
        config.processing.clone(),
        config.integrations.merchant_id.clone(),
    ));

    let orchestrator = Arc::new(BatchOrchestrator::new(
        ledger.installments.clone(),
        cases,
        Arc::new(MySqlStatisticsRepository::new(db_pool.clone())),
        processor,
        scheduler,
        clock.clone(),
        ids,
        config.processing.clone(),
        cancel.child_token(),
    ));

    // Start the scheduled sweeps
    let runner = Arc::new(BatchJobRunner::new(
        orchestrator.clone(),
        coordinator,
        clock.clone(),
        Duration::from_secs(config.app.job_interval_minutes * 60),
        cancel.clone(),
    ));
    let runner_handle = tokio::spawn(runner.start());

    // Start HTTP server
    let bind_address = config.server.bind_address();
    let workers = config.server.workers;
    let orchestrator_data = web::Data::from(orchestrator);
    let clock_data: web::Data<dyn Clock> = web::Data::from(clock);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(CorrelationIdMiddleware)
            .wrap(TracingLogger::default())
            .app_data(orchestrator_data.clone())
            .app_data(clock_data.clone())
            .configure(health::configure)
            .configure(batch::controllers::configure)
    })
    .workers(workers)
    .bind(&bind_address)?
    .run();

    tracing::info!("Server started at http://{}", bind_address);

    let result = server.await;

    // Server stopped: let in-flight chunks finish, then stop the runner
    cancel.cancel();
    if let Err(e) = runner_handle.await {
        tracing::error!(error = %e, "Job runner terminated abnormally");
    }

    result.context("HTTP server failed")
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("paylater={},actix_web=info", config.app.log_level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);

    if config.app.is_production() {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
