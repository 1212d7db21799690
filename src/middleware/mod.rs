pub mod correlation_id;

pub use correlation_id::{correlation_id, CorrelationIdMiddleware, CORRELATION_HEADER};
