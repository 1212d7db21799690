pub mod models;
pub mod repositories;
pub mod services;

pub use models::{AttemptResult, Installment, InstallmentStatus, Payment, PaymentEvent};
pub use repositories::{
    InMemoryLedger, InstallmentRepository, PaymentEventRepository, PaymentRepository,
};
pub use services::{Collaborators, InstallmentProcessor, LedgerRepositories};
