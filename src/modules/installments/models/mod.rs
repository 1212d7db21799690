pub mod attempt_result;
pub mod installment;
pub mod payment;
pub mod payment_event;

pub use attempt_result::{codes, AttemptResult};
pub use installment::{Installment, InstallmentStatus};
pub use payment::{Payment, PaymentStatus};
pub use payment_event::{PaymentEvent, PaymentEventType};
