// Retry eligibility, backoff ladder and the serial retry sweep

#[path = "../helpers/mod.rs"]
mod helpers;

use chrono::Duration as ChronoDuration;
use helpers::*;
use paylater::batch::RunKind;
use paylater::core::Clock;
use paylater::installments::InstallmentStatus;
use paylater::integrations::topics;
use rust_decimal_macros::dec;
use std::time::Duration;

#[tokio::test]
async fn test_retry_due_only_after_backoff() {
    let h = Harness::new();
    let failed = h.seed_failed("cust-1", h.today(), dec!(100), 1, true).await;

    assert!(!h.scheduler.is_retry_due(&failed));

    h.clock.advance(ChronoDuration::minutes(59));
    assert!(!h.scheduler.is_retry_due(&failed));

    h.clock.advance(ChronoDuration::minutes(1));
    assert!(h.scheduler.is_retry_due(&failed), "Due exactly at the boundary");
}

#[tokio::test]
async fn test_backoff_grows_with_attempts() {
    let h = Harness::new();
    let failed = h.seed_failed("cust-1", h.today(), dec!(100), 2, true).await;

    h.clock.advance(ChronoDuration::hours(3));
    assert!(!h.scheduler.is_retry_due(&failed));

    h.clock.advance(ChronoDuration::hours(1));
    assert!(h.scheduler.is_retry_due(&failed));
    assert_eq!(h.scheduler.backoff_delay(3), ChronoDuration::hours(24));
}

#[tokio::test]
async fn test_ineligible_installments_are_never_due() {
    let h = Harness::new();
    let (_, pending) = h.seed_payment("cust-p", 1, h.today(), dec!(100)).await;
    let not_eligible = h.seed_failed("cust-n", h.today(), dec!(100), 1, false).await;
    let exhausted = h.seed_failed("cust-x", h.today(), dec!(100), 4, true).await;

    h.clock.advance(ChronoDuration::days(10));

    assert!(!h.scheduler.is_retry_due(&pending[0]));
    assert!(!h.scheduler.is_retry_due(&not_eligible));
    assert!(!h.scheduler.is_retry_due(&exhausted));
}

#[tokio::test]
async fn test_missing_last_attempt_is_due_immediately() {
    let h = Harness::new();
    let mut failed = h.seed_failed("cust-1", h.today(), dec!(100), 1, true).await;
    failed.last_attempt_at = None;

    assert!(h.scheduler.is_retry_due(&failed));
}

#[tokio::test]
async fn test_schedule_retry_publishes_delayed_event() {
    let h = Harness::new();
    let failed = h.seed_failed("cust-1", h.today(), dec!(100), 2, true).await;

    let retry_at = h
        .scheduler
        .schedule_retry(&failed, &h.correlation_id())
        .await
        .unwrap();

    assert_eq!(retry_at, h.clock.now() + ChronoDuration::hours(4));
    let published = h.bus.on_topic(topics::INSTALLMENT_RETRY_DUE);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].scheduled_at, Some(retry_at));
    assert_eq!(published[0].event.payload["installment_id"], failed.id.as_str());
}

#[tokio::test]
async fn test_schedule_retry_surfaces_bus_failure() {
    let h = Harness::new();
    let failed = h.seed_failed("cust-1", h.today(), dec!(100), 1, true).await;
    h.bus.set_failing(true);

    let result = h.scheduler.schedule_retry(&failed, &h.correlation_id()).await;

    assert!(result.is_err());
}

/// A due retry is charged under the next attempt number
#[tokio::test]
async fn test_retry_sweep_charges_due_installment() {
    let h = Harness::new();
    let failed = h.seed_failed("cust-1", h.today(), dec!(100), 1, true).await;
    h.clock.advance(ChronoDuration::hours(1));

    let result = h
        .orchestrator
        .process_retries(&h.correlation_id())
        .await
        .unwrap();

    assert_eq!(result.run_kind, RunKind::Retry);
    assert_eq!(result.processed_count, 1);
    assert_eq!(result.total_amount, dec!(100));

    let calls = h.gateway.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].order_reference.ends_with("-2"));

    let stored = h.installment(&failed.id).await;
    assert_eq!(stored.status, InstallmentStatus::Paid);
    assert_eq!(stored.attempt_count, 2);
}

#[tokio::test]
async fn test_retry_sweep_skips_installments_still_backing_off() {
    let h = Harness::new();
    h.seed_failed("cust-1", h.today(), dec!(100), 1, true).await;
    h.clock.advance(ChronoDuration::minutes(30));

    let result = h
        .orchestrator
        .process_retries(&h.correlation_id())
        .await
        .unwrap();

    assert_eq!(result.total_count(), 0);
    assert_eq!(h.gateway.call_count(), 0);
}

/// Retries go out one at a time
#[tokio::test]
async fn test_retry_sweep_is_serial() {
    let h = Harness::with_gateway(
        test_processing_config(),
        ScriptedGateway::with_delay(Duration::from_millis(20)),
    );
    for customer in ["cust-1", "cust-2", "cust-3"] {
        h.seed_failed(customer, h.today(), dec!(100), 1, true).await;
    }
    h.clock.advance(ChronoDuration::hours(2));

    let result = h
        .orchestrator
        .process_retries(&h.correlation_id())
        .await
        .unwrap();

    assert_eq!(result.processed_count, 3);
    assert_eq!(h.gateway.peak_concurrency(), 1);
}

/// Declines walk the 1h, 4h, 24h ladder until the attempt cap, then stop
#[tokio::test]
async fn test_full_backoff_ladder_until_exhausted() {
    let h = Harness::new();
    let (_, installments) = h.seed_payment("cust-1", 1, h.today(), dec!(100)).await;
    for _ in 0..4 {
        h.gateway.decline("cust-1", "INSUFFICIENT_FUNDS", true);
    }

    h.orchestrator
        .process_due(h.today(), &h.correlation_id())
        .await
        .unwrap();

    for (attempts_so_far, wait_hours) in [(1, 1), (2, 4), (3, 24)] {
        let stored = h.installment(&installments[0].id).await;
        assert_eq!(stored.attempt_count, attempts_so_far);
        assert!(stored.retry_eligible);

        let scheduled = h.bus.on_topic(topics::INSTALLMENT_RETRY_DUE);
        assert_eq!(
            scheduled.last().unwrap().scheduled_at,
            Some(h.clock.now() + ChronoDuration::hours(wait_hours))
        );

        h.clock.advance(ChronoDuration::hours(wait_hours));
        let result = h
            .orchestrator
            .process_retries(&h.correlation_id())
            .await
            .unwrap();
        assert_eq!(result.failed_count, 1);
    }

    let exhausted = h.installment(&installments[0].id).await;
    assert_eq!(exhausted.status, InstallmentStatus::Failed);
    assert_eq!(exhausted.attempt_count, 4);
    assert!(!exhausted.retry_eligible);
    assert_eq!(h.gateway.call_count(), 4);
    assert_eq!(h.bus.on_topic(topics::INSTALLMENT_RETRY_DUE).len(), 3);
    assert!(matches!(
        h.notifier.sent().as_slice(),
        [SentNotice::Failure(_)]
    ));

    h.clock.advance(ChronoDuration::days(7));
    let result = h
        .orchestrator
        .process_retries(&h.correlation_id())
        .await
        .unwrap();
    assert_eq!(result.total_count(), 0);
    assert_eq!(h.gateway.call_count(), 4);
}

#[tokio::test]
async fn test_retry_sweep_persists_statistics() {
    let h = Harness::new();
    h.seed_failed("cust-1", h.today(), dec!(100), 1, true).await;
    h.clock.advance(ChronoDuration::hours(1));

    h.orchestrator
        .process_retries(&h.correlation_id())
        .await
        .unwrap();

    let stats = h.statistics.all().await;
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].run_kind, RunKind::Retry);
    assert_eq!(stats[0].processed_count, 1);
}
