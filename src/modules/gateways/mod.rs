pub mod services;

pub use services::{ChargeOutcome, ChargeRequest, HttpGatewayClient, PaymentGateway};
