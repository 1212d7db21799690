pub mod gateway_trait;
pub mod http_gateway;

pub use gateway_trait::{ChargeOutcome, ChargeRequest, PaymentGateway};
pub use http_gateway::HttpGatewayClient;
