// Idempotency coordinator behaviour over the in-memory store

#[path = "../helpers/mod.rs"]
mod helpers;

use chrono::Duration as ChronoDuration;
use futures_util::future::join_all;
use helpers::*;
use paylater::core::{AppError, Clock, IdGenerator};
use paylater::idempotency::{
    ExecuteOptions, ExecutionStatus, IdempotencyCoordinator, InMemoryIdempotencyStore,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    clock: Arc<FixedClock>,
    store: Arc<InMemoryIdempotencyStore>,
    coordinator: IdempotencyCoordinator,
}

fn fixture() -> Fixture {
    let clock = Arc::new(FixedClock::at(FixedClock::default_start()));
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let ids: Arc<dyn IdGenerator> = Arc::new(SequentialIds::default());
    let store = Arc::new(InMemoryIdempotencyStore::new(dyn_clock.clone()));
    let coordinator =
        IdempotencyCoordinator::new(store.clone(), dyn_clock, ids, test_idempotency_options());

    Fixture {
        clock,
        store,
        coordinator,
    }
}

/// The second call replays the stored value without running the operation
#[tokio::test]
async fn test_second_execution_replays() {
    let f = fixture();
    let calls = AtomicUsize::new(0);

    let operation = || {
        let calls = &calls;
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, AppError>(json!({"charged": 42}))
        }
    };

    let first = f.coordinator.execute("charge-1", operation, None).await.unwrap();
    let second = f.coordinator.execute("charge-1", operation, None).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1, "Operation must run once");
    assert!(first.success && !first.replayed);
    assert!(second.success && second.replayed);
    assert_eq!(first.value, second.value);
    assert_eq!(second.status, ExecutionStatus::Completed);
}

/// Concurrent callers on one key share a single execution
#[tokio::test]
async fn test_concurrent_callers_run_once() {
    let f = fixture();
    let calls = AtomicUsize::new(0);
    let options = ExecuteOptions {
        lock_retry_interval: Duration::from_millis(300),
        ..test_idempotency_options()
    };

    let executions = (0..10).map(|_| {
        f.coordinator.execute(
            "charge-concurrent",
            || {
                let calls = &calls;
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, AppError>(7u32)
                }
            },
            Some(&options),
        )
    });
    let results = join_all(executions).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for result in results {
        let result = result.unwrap();
        assert!(result.success, "Every caller should observe the result");
        assert_eq!(result.value, Some(7));
    }
    assert_eq!(
        f.store.len().await,
        1,
        "Only the record remains once the lock is released"
    );
}

/// A holder slower than one retry interval leaves the waiter Locked
#[tokio::test]
async fn test_waiter_gets_locked_when_holder_is_slow() {
    let f = fixture();

    let slow = f.coordinator.execute(
        "charge-slow",
        || async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, AppError>(1u8)
        },
        None,
    );
    let waiter = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        f.coordinator
            .execute("charge-slow", || async { Ok::<_, AppError>(2u8) }, None)
            .await
    };

    let (slow, waiter) = tokio::join!(slow, waiter);

    assert_eq!(slow.unwrap().value, Some(1));
    let waiter = waiter.unwrap();
    assert!(waiter.is_locked());
    assert!(!waiter.success);
    assert!(waiter.value.is_none());
}

/// Business errors are stored and replayed, never re-executed
#[tokio::test]
async fn test_failure_is_stored_and_replayed() {
    let f = fixture();
    let calls = AtomicUsize::new(0);

    let operation = || {
        let calls = &calls;
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<u32, _>(AppError::validation("card expired"))
        }
    };

    let first = f.coordinator.execute("charge-bad", operation, None).await.unwrap();
    let second = f.coordinator.execute("charge-bad", operation, None).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.status, ExecutionStatus::Failed);
    assert!(first.error.as_deref().unwrap().contains("card expired"));
    assert!(second.replayed);
    assert_eq!(second.error, first.error);
}

/// Transient errors are retried up to max_attempts
#[tokio::test]
async fn test_transient_errors_are_retried() {
    let f = fixture();
    let calls = AtomicUsize::new(0);

    let result = f
        .coordinator
        .execute(
            "charge-flaky",
            || {
                let calls = &calls;
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        return Err(AppError::store_unavailable("connection reset"));
                    }
                    Ok("done".to_string())
                }
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(result.value.as_deref(), Some("done"));
}

#[tokio::test]
async fn test_retries_stop_at_max_attempts() {
    let f = fixture();
    let calls = AtomicUsize::new(0);
    let options = ExecuteOptions {
        max_attempts: 2,
        ..test_idempotency_options()
    };

    let result = f
        .coordinator
        .execute(
            "charge-down",
            || {
                let calls = &calls;
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, _>(AppError::conflict("version moved"))
                }
            },
            Some(&options),
        )
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(result.status, ExecutionStatus::Failed);
}

/// Once the success TTL passes the key can run again
#[tokio::test]
async fn test_expired_record_allows_rerun() {
    let f = fixture();
    let calls = AtomicUsize::new(0);
    let operation = || {
        let calls = &calls;
        async move { Ok::<_, AppError>(calls.fetch_add(1, Ordering::SeqCst)) }
    };

    f.coordinator.execute("charge-ttl", operation, None).await.unwrap();
    f.clock.advance(ChronoDuration::hours(25));
    let rerun = f.coordinator.execute("charge-ttl", operation, None).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!rerun.replayed);
    assert_eq!(rerun.value, Some(1));
}

/// Failures expire sooner than successes
#[tokio::test]
async fn test_failure_ttl_shorter_than_success_ttl() {
    let f = fixture();
    let calls = AtomicUsize::new(0);
    let operation = || {
        let calls = &calls;
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<u32, _>(AppError::validation("declined"))
        }
    };

    f.coordinator.execute("charge-fail-ttl", operation, None).await.unwrap();
    f.clock.advance(ChronoDuration::minutes(61));
    let rerun = f
        .coordinator
        .execute("charge-fail-ttl", operation, None)
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!rerun.replayed);
}

#[tokio::test]
async fn test_empty_key_is_rejected() {
    let f = fixture();

    let result = f
        .coordinator
        .execute("  ", || async { Ok::<_, AppError>(0u8) }, None)
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}

/// An unreachable store is an error, and the operation never runs
#[tokio::test]
async fn test_unavailable_store_propagates() {
    let f = fixture();
    let calls = AtomicUsize::new(0);
    f.store.set_unavailable(true);

    let result = f
        .coordinator
        .execute(
            "charge-offline",
            || {
                let calls = &calls;
                async move { Ok::<_, AppError>(calls.fetch_add(1, Ordering::SeqCst)) }
            },
            None,
        )
        .await;

    assert!(matches!(result, Err(AppError::StoreUnavailable(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_generate_key_is_stable_within_window() {
    let f = fixture();
    let request = json!({"installment_id": "inst-1", "amount": "10.00"});
    let window = Some(Duration::from_secs(600));

    let first = f
        .coordinator
        .generate_key("charge", &request, Some("cust-1"), window)
        .unwrap();
    f.clock.advance(ChronoDuration::minutes(5));
    let second = f
        .coordinator
        .generate_key("charge", &request, Some("cust-1"), window)
        .unwrap();
    f.clock.advance(ChronoDuration::minutes(10));
    let third = f
        .coordinator
        .generate_key("charge", &request, Some("cust-1"), window)
        .unwrap();

    assert_eq!(first, second);
    assert_ne!(first, third);
}

#[tokio::test]
async fn test_purge_removes_expired_records() {
    let f = fixture();

    for key in ["a", "b", "c"] {
        f.coordinator
            .execute(key, || async { Ok::<_, AppError>(true) }, None)
            .await
            .unwrap();
    }
    assert_eq!(f.store.len().await, 3);

    f.clock.advance(ChronoDuration::days(2));
    let purged = f.coordinator.purge_expired().await.unwrap();

    assert_eq!(purged, 3);
    assert!(f.store.is_empty().await);
}
