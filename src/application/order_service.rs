use std::sync::Arc;

use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::order::{FulfillmentStatus, ListResult, OrderView};
use crate::domain::ports::OrderRepository;

/// Read/update surface for order administration. Fulfillment changes made
/// here are manual and independent of payment reconciliation.
pub struct OrderService {
    repo: Arc<dyn OrderRepository>,
}

impl OrderService {
    pub fn new(repo: Arc<dyn OrderRepository>) -> Self {
        Self { repo }
    }

    pub fn get_order(&self, id: Uuid) -> Result<Option<OrderView>, DomainError> {
        self.repo.find_by_id(id)
    }

    pub fn list_orders(&self, page: i64, limit: i64) -> Result<ListResult, DomainError> {
        self.repo.list(page, limit)
    }

    pub fn update_status(
        &self,
        id: Uuid,
        status: FulfillmentStatus,
    ) -> Result<OrderView, DomainError> {
        let order = self.repo.set_fulfillment_status(id, status)?;
        log::info!("Order {id} fulfillment status set to {status}");
        Ok(order)
    }
}
