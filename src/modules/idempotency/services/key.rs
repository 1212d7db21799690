use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::core::Result;

/// SHA-256 hex over the operation name, the request as sorted-key JSON, and
/// optionally the customer id and the `window`-sized time bucket holding `now`.
pub fn canonical_key<R: Serialize>(
    operation: &str,
    request: &R,
    customer_id: Option<&str>,
    window: Option<Duration>,
    now: DateTime<Utc>,
) -> Result<String> {
    let canonical = canonicalize(serde_json::to_value(request)?);

    let mut hasher = Sha256::new();
    hasher.update(operation.as_bytes());
    hasher.update(b"|");
    hasher.update(serde_json::to_string(&canonical)?.as_bytes());

    if let Some(customer_id) = customer_id {
        hasher.update(b"|customer:");
        hasher.update(customer_id.as_bytes());
    }

    if let Some(window) = window.filter(|w| w.as_secs() > 0) {
        let bucket = now.timestamp().div_euclid(window.as_secs() as i64);
        hasher.update(b"|bucket:");
        hasher.update(bucket.to_string().as_bytes());
    }

    Ok(hex::encode(hasher.finalize()))
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
