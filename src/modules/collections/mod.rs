pub mod models;
pub mod repositories;
pub mod services;

pub use models::{CollectionsCase, CollectionsStatus, EscalationOutcome, LateFee};
pub use repositories::{
    CollectionsRepository, InMemoryCollectionsRepository, MySqlCollectionsRepository,
};
pub use services::RetryScheduler;
