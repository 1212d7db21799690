pub mod controllers;
pub mod models;
pub mod repositories;
pub mod services;

pub use models::{
    BatchResult, FailedInstallment, HealthReport, HealthState, OverdueSweepResult,
    ProcessingStatistics, RunKind,
};
pub use repositories::{
    InMemoryStatisticsRepository, MySqlStatisticsRepository, StatisticsRepository,
};
pub use services::{BatchJobRunner, BatchOrchestrator};
