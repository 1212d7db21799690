pub mod message_bus;
pub mod notification_client;
pub mod risk_client;

pub use message_bus::{topics, BusEvent, MessageBus, OutboxMessageBus};
pub use notification_client::{HttpNotificationClient, Notifier, OverdueNotice, PaymentNotice};
pub use risk_client::{
    HttpRiskClient, PaymentHistoryEntry, RiskAssessment, RiskAssessor, RiskLevel, RiskRequest,
};
