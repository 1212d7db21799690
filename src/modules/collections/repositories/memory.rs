use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::CollectionsRepository;
use crate::core::{AppError, Result};
use crate::modules::collections::models::CollectionsCase;

/// Cases keyed by installment id, mirroring the unique index
#[derive(Default)]
pub struct InMemoryCollectionsRepository {
    cases: RwLock<HashMap<String, CollectionsCase>>,
}

impl InMemoryCollectionsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<CollectionsCase> {
        self.cases.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl CollectionsRepository for InMemoryCollectionsRepository {
    async fn find_by_installment(&self, installment_id: &str) -> Result<Option<CollectionsCase>> {
        Ok(self.cases.read().await.get(installment_id).cloned())
    }

    async fn insert(&self, case: &CollectionsCase) -> Result<()> {
        let mut cases = self.cases.write().await;
        if cases.contains_key(&case.installment_id) {
            return Err(AppError::conflict(format!(
                "Installment {} already has a collections case",
                case.installment_id
            )));
        }
        cases.insert(case.installment_id.clone(), case.clone());
        Ok(())
    }
}
