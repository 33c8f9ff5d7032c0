//! Outbound payment gateway access.
//!
//! [`PaymentGateway`] is the seam the application services depend on;
//! [`GatewayClient`] is the HTTP implementation.

mod client;
mod error;
mod types;

use async_trait::async_trait;

pub use client::GatewayClient;
pub use error::GatewayError;
pub use types::{OrderSubmission, SessionToken, SubmittedOrder, TransactionStatus};

/// Stateless operations against the payment provider. Every call is
/// independently retryable; callers supply a fresh token each time.
#[async_trait]
pub trait PaymentGateway: Send + Sync + 'static {
    async fn acquire_token(&self) -> Result<SessionToken, GatewayError>;

    /// Register (idempotently) the URL the provider delivers notifications
    /// to. Returns the provider's registration handle.
    async fn register_notification_channel(
        &self,
        token: &SessionToken,
        url: &str,
    ) -> Result<String, GatewayError>;

    async fn submit_order(
        &self,
        token: &SessionToken,
        order: &OrderSubmission,
    ) -> Result<SubmittedOrder, GatewayError>;

    /// `None` means the provider could not be asked right now. It is never a
    /// failed payment.
    async fn query_status(
        &self,
        token: &SessionToken,
        tracking_handle: &str,
    ) -> Option<TransactionStatus>;
}
