use uuid::Uuid;

use super::errors::DomainError;
use super::order::{CreatedOrder, FulfillmentStatus, ListResult, NewOrder, OrderView, PaymentStatus};
use super::payment::AppliedTransition;

pub trait OrderRepository: Send + Sync + 'static {
    /// Insert a Pending/Pending order. An idempotency key that is already
    /// known returns the existing identity with `reused = true`.
    fn create(&self, order: NewOrder) -> Result<CreatedOrder, DomainError>;
    fn find_by_id(&self, id: Uuid) -> Result<Option<OrderView>, DomainError>;
    fn find_by_idempotency_key(&self, key: &str) -> Result<Option<OrderView>, DomainError>;
    fn list(&self, page: i64, limit: i64) -> Result<ListResult, DomainError>;
    fn attach_submission(
        &self,
        id: Uuid,
        tracking_handle: &str,
        redirect_url: &str,
    ) -> Result<(), DomainError>;
    /// Atomic read-modify-write of the payment and fulfillment fields.
    /// Fails with `DomainError::OrderNotFound` and writes nothing for an
    /// unknown id.
    fn apply_payment_status(
        &self,
        id: Uuid,
        tracking_handle: &str,
        reported: PaymentStatus,
    ) -> Result<AppliedTransition, DomainError>;
    fn set_fulfillment_status(
        &self,
        id: Uuid,
        status: FulfillmentStatus,
    ) -> Result<OrderView, DomainError>;
}
