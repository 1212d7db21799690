//! Paylater installment collection engine
//!
//! Charges BNPL installments as they fall due, retries transient failures
//! with backoff, prices late fees and escalates delinquent accounts, with an
//! idempotency coordinator guaranteeing no installment is charged twice.

pub mod config;
pub mod core;
pub mod middleware;
pub mod modules;

// Re-export commonly used types
pub use modules::batch;
pub use modules::collections;
pub use modules::idempotency;
pub use modules::installments;
pub use modules::integrations;
