// Collaborators the engine calls out to: risk scoring, customer
// notifications and the platform message bus.

pub mod services;

pub use services::{
    topics, BusEvent, HttpNotificationClient, HttpRiskClient, MessageBus, Notifier,
    OutboxMessageBus, OverdueNotice, PaymentHistoryEntry, PaymentNotice, RiskAssessment,
    RiskAssessor, RiskLevel, RiskRequest,
};
