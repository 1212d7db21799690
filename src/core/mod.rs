pub mod clock;
pub mod correlation;
pub mod currency;
pub mod error;

pub use clock::{Clock, IdGenerator, SystemClock, UuidGenerator};
pub use correlation::CorrelationId;
pub use currency::Currency;
pub use error::{AppError, Result};
