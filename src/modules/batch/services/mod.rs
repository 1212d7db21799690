pub mod batch_orchestrator;
pub mod job_runner;

pub use batch_orchestrator::BatchOrchestrator;
pub use job_runner::BatchJobRunner;
