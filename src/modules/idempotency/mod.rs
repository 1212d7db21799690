pub mod models;
pub mod repositories;
pub mod services;

pub use models::{ExecuteOptions, ExecutionResult, ExecutionStatus, IdempotencyRecord, RecordStatus};
pub use repositories::{IdempotencyStore, InMemoryIdempotencyStore, MySqlIdempotencyStore};
pub use services::{canonical_key, IdempotencyCoordinator};
