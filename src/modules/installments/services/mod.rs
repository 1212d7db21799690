pub mod installment_processor;

pub use installment_processor::{Collaborators, InstallmentProcessor, LedgerRepositories};
