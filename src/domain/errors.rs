use thiserror::Error;
use uuid::Uuid;

use super::order::PaymentStatus;
use crate::gateway::GatewayError;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("No order exists for merchant reference {0}")]
    OrderNotFound(Uuid),
    #[error("Gateway reported merchant reference {reported} for order {expected}")]
    ReferenceMismatch { expected: Uuid, reported: String },
    #[error("Order {order_id} is tracked as {stored}, not {supplied}")]
    TrackingHandleMismatch { order_id: Uuid, stored: String, supplied: String },
    #[error("Order {order_id} was already submitted for payment (payment {payment_status})")]
    AlreadySubmitted { order_id: Uuid, payment_status: PaymentStatus },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for DomainError {
    fn from(e: tokio::task::JoinError) -> Self {
        DomainError::Internal(e.to_string())
    }
}
