pub mod batch_result;
pub mod health;
pub mod processing_statistics;

pub use batch_result::{BatchResult, FailedInstallment, OverdueAction, OverdueSweepResult};
pub use health::{HealthReport, HealthState};
pub use processing_statistics::{ProcessingStatistics, RunKind};
