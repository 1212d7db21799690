pub mod collections_case;
pub mod late_fee;

pub use collections_case::{CollectionsCase, CollectionsStatus, EscalationOutcome};
pub use late_fee::{LateFee, LATE_FEE_BASE, LATE_FEE_CAP, LATE_FEE_RATE};
