// Due-date batch runs: chunking, aggregation, cancellation and the HTTP
// trigger endpoints

#[path = "../helpers/mod.rs"]
mod helpers;

use actix_web::{test, web, App};
use chrono::Duration as ChronoDuration;
use helpers::*;
use paylater::batch::{self, BatchJobRunner, BatchResult, RunKind};
use paylater::config::ProcessingConfig;
use paylater::core::{AppError, Clock, CorrelationId};
use paylater::installments::models::codes;
use paylater::installments::InstallmentStatus;
use paylater::integrations::RiskLevel;
use paylater::middleware::{CorrelationIdMiddleware, CORRELATION_HEADER};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

async fn seed_customers(h: &Harness, count: usize) {
    for n in 0..count {
        h.seed_payment(&format!("cust-{:03}", n), 1, h.today(), dec!(10))
            .await;
    }
}

/// 250 due installments go out as 100, 100, 50 with no overlap between chunks
#[tokio::test]
async fn test_due_run_chunks_by_configured_size() {
    let h = Harness::with_gateway(
        test_processing_config(),
        ScriptedGateway::with_delay(Duration::from_millis(20)),
    );
    seed_customers(&h, 250).await;

    let result = h
        .orchestrator
        .process_due(h.today(), &h.correlation_id())
        .await
        .unwrap();

    assert_eq!(result.chunk_sizes, vec![100, 100, 50]);
    assert_eq!(result.processed_count, 250);
    assert_eq!(result.failed_count, 0);
    assert_eq!(result.total_amount, dec!(2500));
    assert!(!result.cancelled);

    let peak = h.gateway.peak_concurrency();
    assert!(peak <= 100, "At most one chunk in flight, saw {}", peak);
    assert!(peak > 1, "Installments within a chunk run concurrently");

    // every call of chunk k starts after all calls of chunk k-1 completed
    let starts = h.gateway.start_observations();
    assert_eq!(starts.len(), 250);
    assert!(starts[100..200].iter().all(|&done| done >= 100));
    assert!(starts[200..].iter().all(|&done| done >= 200));
}

#[tokio::test]
async fn test_due_run_dispatches_in_customer_order() {
    let h = Harness::with_config(ProcessingConfig {
        chunk_size: 1,
        ..test_processing_config()
    });
    for customer in ["cust-c", "cust-a", "cust-b"] {
        h.seed_payment(customer, 1, h.today(), dec!(10)).await;
    }

    h.orchestrator
        .process_due(h.today(), &h.correlation_id())
        .await
        .unwrap();

    let order: Vec<String> = h
        .gateway
        .calls()
        .into_iter()
        .map(|c| c.customer_id)
        .collect();
    assert_eq!(order, vec!["cust-a", "cust-b", "cust-c"]);
}

/// Only Pending installments due exactly on the run date are charged
#[tokio::test]
async fn test_due_run_selects_only_pending_due_today() {
    let h = Harness::new();
    let today = h.today();
    h.seed_payment("cust-today", 1, today, dec!(10)).await;
    h.seed_payment("cust-tomorrow", 1, today + ChronoDuration::days(1), dec!(10))
        .await;
    h.seed_payment("cust-yesterday", 1, today - ChronoDuration::days(1), dec!(10))
        .await;
    h.seed_failed("cust-failed", today, dec!(10), 1, true).await;

    let result = h
        .orchestrator
        .process_due(today, &h.correlation_id())
        .await
        .unwrap();

    assert_eq!(result.total_count(), 1);
    assert_eq!(h.gateway.calls_for("cust-today"), 1);
    assert_eq!(h.gateway.call_count(), 1);
}

/// Failures are reported per installment and never abort the run
#[tokio::test]
async fn test_mixed_outcomes_are_aggregated() {
    let h = Harness::new();
    seed_customers(&h, 5).await;
    h.gateway.decline("cust-001", "INSUFFICIENT_FUNDS", true);
    h.gateway.decline("cust-002", "CARD_EXPIRED", false);
    h.risk.set_level("cust-003", RiskLevel::Critical);

    let result = h
        .orchestrator
        .process_due(h.today(), &h.correlation_id())
        .await
        .unwrap();

    assert_eq!(result.processed_count, 2);
    assert_eq!(result.failed_count, 3);
    assert_eq!(result.skipped_count, 0);
    assert_eq!(result.total_amount, dec!(20));

    let mut codes_seen: Vec<&str> = result
        .failed_details
        .iter()
        .map(|f| f.error_code.as_str())
        .collect();
    codes_seen.sort_unstable();
    assert_eq!(
        codes_seen,
        vec!["CARD_EXPIRED", "INSUFFICIENT_FUNDS", codes::RISK_BLOCKED]
    );

    let retryable: Vec<bool> = result
        .failed_details
        .iter()
        .filter(|f| f.customer_id == "cust-001")
        .map(|f| f.retryable)
        .collect();
    assert_eq!(retryable, vec![true]);
}

/// A second run on the same date finds nothing left to charge
#[tokio::test]
async fn test_rerun_for_same_date_is_a_no_op() {
    let h = Harness::new();
    seed_customers(&h, 3).await;

    h.orchestrator
        .process_due(h.today(), &h.correlation_id())
        .await
        .unwrap();
    let rerun = h
        .orchestrator
        .process_due(h.today(), &h.correlation_id())
        .await
        .unwrap();

    assert_eq!(rerun.total_count(), 0);
    assert_eq!(h.gateway.call_count(), 3);
}

/// Overlapping runs charge each installment once; the loser skips
#[tokio::test]
async fn test_overlapping_runs_never_double_charge() {
    let h = Harness::with_gateway(
        test_processing_config(),
        ScriptedGateway::with_delay(Duration::from_millis(100)),
    );
    seed_customers(&h, 4).await;
    let today = h.today();

    let first_id = CorrelationId::new("run-a");
    let second_id = CorrelationId::new("run-b");
    let (a, b) = tokio::join!(
        h.orchestrator.process_due(today, &first_id),
        h.orchestrator.process_due(today, &second_id)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(h.gateway.call_count(), 4);
    assert_eq!(a.processed_count + b.processed_count, 4);
    assert_eq!(a.skipped_count + b.skipped_count, 4);
    assert_eq!(a.failed_count + b.failed_count, 0);
}

#[tokio::test]
async fn test_statistics_persisted_per_run() {
    let h = Harness::new();
    seed_customers(&h, 2).await;
    h.gateway.decline("cust-001", "DO_NOT_HONOR", false);

    h.orchestrator
        .process_due(h.today(), &h.correlation_id())
        .await
        .unwrap();

    let stats = h.statistics.all().await;
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].run_kind, RunKind::Due);
    assert_eq!(stats[0].processing_date, h.today());
    assert_eq!(stats[0].processed_count, 1);
    assert_eq!(stats[0].failed_count, 1);
    assert_eq!(stats[0].total_amount, dec!(10));
    assert_eq!(stats[0].correlation_id, h.correlation_id());
}

/// Runs with nothing due still leave a statistics row
#[tokio::test]
async fn test_empty_run_still_records_statistics() {
    let h = Harness::new();

    let result = h
        .orchestrator
        .process_due(h.today(), &h.correlation_id())
        .await
        .unwrap();

    assert_eq!(result.total_count(), 0);
    assert!(result.chunk_sizes.is_empty());
    assert_eq!(h.statistics.all().await.len(), 1);
}

#[tokio::test]
async fn test_store_outage_fails_the_run() {
    let h = Harness::new();
    seed_customers(&h, 2).await;
    h.ledger.set_unavailable(true);

    let result = h
        .orchestrator
        .process_due(h.today(), &h.correlation_id())
        .await;

    assert!(matches!(result, Err(AppError::StoreUnavailable(_))));
    assert_eq!(h.gateway.call_count(), 0);
}

/// Cancelled before starting: nothing dispatched
#[tokio::test]
async fn test_cancelled_before_start_dispatches_nothing() {
    let h = Harness::new();
    seed_customers(&h, 3).await;
    h.cancel.cancel();

    let result = h
        .orchestrator
        .process_due(h.today(), &h.correlation_id())
        .await
        .unwrap();

    assert!(result.cancelled);
    assert!(result.chunk_sizes.is_empty());
    assert_eq!(h.gateway.call_count(), 0);
}

/// Cancellation during the inter-chunk pause lets the in-flight chunk finish
#[tokio::test]
async fn test_cancel_between_chunks_stops_cleanly() {
    let h = Harness::with_config(ProcessingConfig {
        chunk_size: 2,
        inter_chunk_delay_ms: 500,
        ..test_processing_config()
    });
    seed_customers(&h, 6).await;

    let cancel = h.cancel.clone();
    let trigger = async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    };
    let correlation_id = h.correlation_id();
    let (result, _) = tokio::join!(
        h.orchestrator.process_due(h.today(), &correlation_id),
        trigger
    );
    let result = result.unwrap();

    assert!(result.cancelled);
    assert_eq!(result.chunk_sizes, vec![2]);
    assert_eq!(result.processed_count, 2);
    assert_eq!(h.gateway.call_count(), 2);
    assert_eq!(
        h.installment("cust-002-inst-1").await.status,
        InstallmentStatus::Pending
    );
}

/// One runner cycle charges due installments and purges expired keys
#[tokio::test]
async fn test_runner_cycle_runs_every_step() {
    let h = Harness::new();
    seed_customers(&h, 2).await;
    let runner = BatchJobRunner::new(
        h.orchestrator.clone(),
        h.coordinator.clone(),
        h.clock.clone(),
        Duration::from_secs(60),
        h.cancel.clone(),
    );

    runner.run_cycle().await;

    assert_eq!(h.gateway.call_count(), 2);
    let kinds: Vec<RunKind> = h
        .statistics
        .all()
        .await
        .into_iter()
        .map(|s| s.run_kind)
        .collect();
    assert_eq!(kinds, vec![RunKind::Due, RunKind::Retry, RunKind::Overdue]);

    h.clock.advance(ChronoDuration::days(2));
    runner.run_cycle().await;
    assert!(h.idempotency_store.is_empty().await);
}

/// The runner loop exits once its token is cancelled
#[tokio::test]
async fn test_runner_stops_on_cancel() {
    let h = Harness::new();
    let runner = Arc::new(BatchJobRunner::new(
        h.orchestrator.clone(),
        h.coordinator.clone(),
        h.clock.clone(),
        Duration::from_millis(10),
        h.cancel.clone(),
    ));

    let handle = tokio::spawn(runner.start());
    tokio::time::sleep(Duration::from_millis(30)).await;
    h.cancel.cancel();

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("runner did not stop")
        .unwrap();
}

#[actix_web::test]
async fn test_http_due_trigger_uses_requested_date() {
    let h = Harness::new();
    let date = h.today() + ChronoDuration::days(3);
    h.seed_payment("cust-1", 1, date, dec!(42)).await;
    let clock: Arc<dyn Clock> = h.clock.clone();

    let app = test::init_service(
        App::new()
            .wrap(CorrelationIdMiddleware)
            .app_data(web::Data::from(h.orchestrator.clone()))
            .app_data(web::Data::from(clock))
            .configure(batch::controllers::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/jobs/due")
        .insert_header((CORRELATION_HEADER, "ops-trigger-7"))
        .set_json(serde_json::json!({ "date": date }))
        .to_request();
    let result: BatchResult = test::call_and_read_body_json(&app, req).await;

    assert_eq!(result.processing_date, date);
    assert_eq!(result.processed_count, 1);
    assert_eq!(result.correlation_id, CorrelationId::new("ops-trigger-7"));
}

#[actix_web::test]
async fn test_http_due_trigger_defaults_to_today() {
    let h = Harness::new();
    h.seed_payment("cust-1", 1, h.today(), dec!(42)).await;
    let clock: Arc<dyn Clock> = h.clock.clone();

    let app = test::init_service(
        App::new()
            .wrap(CorrelationIdMiddleware)
            .app_data(web::Data::from(h.orchestrator.clone()))
            .app_data(web::Data::from(clock))
            .configure(batch::controllers::configure),
    )
    .await;

    let req = test::TestRequest::post().uri("/jobs/due").to_request();
    let resp = test::call_service(&app, req).await;

    assert!(resp.status().is_success());
    assert!(resp.headers().contains_key(CORRELATION_HEADER));
    let result: BatchResult = test::read_body_json(resp).await;
    assert_eq!(result.processing_date, h.today());
    assert_eq!(result.processed_count, 1);
}

#[actix_web::test]
async fn test_http_trigger_reports_store_outage() {
    let h = Harness::new();
    h.ledger.set_unavailable(true);
    let clock: Arc<dyn Clock> = h.clock.clone();

    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(h.orchestrator.clone()))
            .app_data(web::Data::from(clock))
            .configure(batch::controllers::configure),
    )
    .await;

    let req = test::TestRequest::post().uri("/jobs/retries").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), actix_web::http::StatusCode::SERVICE_UNAVAILABLE);
}
