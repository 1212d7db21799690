pub mod memory;
pub mod mysql;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::core::Result;
use crate::modules::batch::models::ProcessingStatistics;

pub use memory::InMemoryStatisticsRepository;
pub use mysql::MySqlStatisticsRepository;

#[async_trait]
pub trait StatisticsRepository: Send + Sync {
    async fn insert(&self, statistics: &ProcessingStatistics) -> Result<()>;

    /// Runs for `date`, oldest first
    async fn find_by_date(&self, date: NaiveDate) -> Result<Vec<ProcessingStatistics>>;
}
