pub mod idempotency_record;

pub use idempotency_record::{
    ExecuteOptions, ExecutionResult, ExecutionStatus, IdempotencyRecord, RecordStatus,
};
