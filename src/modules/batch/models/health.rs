use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    /// Store reachable but failures over the last 24h exceed the threshold
    Degraded,
    /// Store unreachable
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthState,
    pub store_reachable: bool,
    /// None when the store could not be queried
    pub recent_failures: Option<i64>,
    pub failure_threshold: i64,
    pub checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl HealthReport {
    pub fn is_serving(&self) -> bool {
        self.status != HealthState::Unhealthy
    }
}
