pub mod batch;
pub mod collections;
pub mod gateways;
pub mod health;
pub mod idempotency;
pub mod installments;
pub mod integrations;
