pub mod memory;
pub mod mysql;

use async_trait::async_trait;

use crate::core::Result;
use crate::modules::collections::models::CollectionsCase;

pub use memory::InMemoryCollectionsRepository;
pub use mysql::MySqlCollectionsRepository;

#[async_trait]
pub trait CollectionsRepository: Send + Sync {
    async fn find_by_installment(&self, installment_id: &str) -> Result<Option<CollectionsCase>>;

    /// Fails with `AppError::Conflict` when the installment already has a case
    async fn insert(&self, case: &CollectionsCase) -> Result<()>;
}
