use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use super::StatisticsRepository;
use crate::core::Result;
use crate::modules::batch::models::ProcessingStatistics;

#[derive(Default)]
pub struct InMemoryStatisticsRepository {
    rows: RwLock<Vec<ProcessingStatistics>>,
}

impl InMemoryStatisticsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<ProcessingStatistics> {
        self.rows.read().await.clone()
    }
}

#[async_trait]
impl StatisticsRepository for InMemoryStatisticsRepository {
    async fn insert(&self, statistics: &ProcessingStatistics) -> Result<()> {
        self.rows.write().await.push(statistics.clone());
        Ok(())
    }

    async fn find_by_date(&self, date: NaiveDate) -> Result<Vec<ProcessingStatistics>> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|s| s.processing_date == date)
            .cloned()
            .collect())
    }
}
