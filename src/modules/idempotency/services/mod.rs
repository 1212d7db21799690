pub mod coordinator;
pub mod key;

pub use coordinator::IdempotencyCoordinator;
pub use key::canonical_key;
