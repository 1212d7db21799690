// Canonical idempotency keys

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use paylater::idempotency::canonical_key;
use proptest::prelude::*;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Serialize)]
struct ChargeTrigger {
    installment_id: String,
    amount: String,
}

#[test]
fn test_key_is_sha256_hex() {
    let now = Utc.with_ymd_and_hms(2025, 11, 1, 2, 0, 0).unwrap();
    let key = canonical_key("charge", &json!({"id": 1}), None, None, now).unwrap();

    assert_eq!(key.len(), 64);
    assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
}

/// Struct field order and JSON key order hash the same
#[test]
fn test_struct_and_reordered_json_agree() {
    let now = Utc.with_ymd_and_hms(2025, 11, 1, 2, 0, 0).unwrap();
    let from_struct = canonical_key(
        "charge",
        &ChargeTrigger {
            installment_id: "inst-1".to_string(),
            amount: "100.00".to_string(),
        },
        None,
        None,
        now,
    )
    .unwrap();
    let from_json = canonical_key(
        "charge",
        &json!({"amount": "100.00", "installment_id": "inst-1"}),
        None,
        None,
        now,
    )
    .unwrap();

    assert_eq!(from_struct, from_json);
}

#[test]
fn test_operation_and_customer_are_part_of_key() {
    let now = Utc.with_ymd_and_hms(2025, 11, 1, 2, 0, 0).unwrap();
    let request = json!({"id": 1});

    let base = canonical_key("charge", &request, None, None, now).unwrap();
    let other_op = canonical_key("refund", &request, None, None, now).unwrap();
    let cust_a = canonical_key("charge", &request, Some("cust-a"), None, now).unwrap();
    let cust_b = canonical_key("charge", &request, Some("cust-b"), None, now).unwrap();

    assert_ne!(base, other_op);
    assert_ne!(base, cust_a);
    assert_ne!(cust_a, cust_b);
}

/// Same bucket inside the window, new bucket after it
#[test]
fn test_time_window_buckets() {
    let start = Utc.with_ymd_and_hms(2025, 11, 1, 2, 0, 0).unwrap();
    let window = Some(Duration::from_secs(3600));
    let request = json!({"id": 1});

    let first = canonical_key("charge", &request, None, window, start).unwrap();
    let same_hour =
        canonical_key("charge", &request, None, window, start + ChronoDuration::minutes(59))
            .unwrap();
    let next_hour =
        canonical_key("charge", &request, None, window, start + ChronoDuration::minutes(61))
            .unwrap();

    assert_eq!(first, same_hour);
    assert_ne!(first, next_hour);
}

#[test]
fn test_zero_window_is_ignored() {
    let now = Utc.with_ymd_and_hms(2025, 11, 1, 2, 0, 0).unwrap();
    let request = json!({"id": 1});

    assert_eq!(
        canonical_key("charge", &request, None, Some(Duration::ZERO), now).unwrap(),
        canonical_key("charge", &request, None, None, now).unwrap()
    );
}

proptest! {
    #[test]
    fn prop_insertion_order_is_irrelevant(entries in prop::collection::vec(("[a-z]{1,8}", 0i64..1000), 1..10)) {
        let now = Utc.with_ymd_and_hms(2025, 11, 1, 2, 0, 0).unwrap();

        let forward: serde_json::Map<String, serde_json::Value> = entries
            .iter()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect();
        let reversed: BTreeMap<String, i64> = entries.iter().rev().cloned().collect();
        let deduped: BTreeMap<String, i64> = entries.iter().cloned().collect();

        // both maps keep the last value written per key, so compare against
        // the map built in the same order
        let forward_key = canonical_key("op", &forward, None, None, now).unwrap();
        let deduped_key = canonical_key("op", &deduped, None, None, now).unwrap();
        prop_assert_eq!(&forward_key, &deduped_key);

        let unique: std::collections::HashSet<&String> = entries.iter().map(|(k, _)| k).collect();
        if unique.len() == entries.len() {
            let reversed_key = canonical_key("op", &reversed, None, None, now).unwrap();
            prop_assert_eq!(forward_key, reversed_key);
        }
    }
}
