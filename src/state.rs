use std::sync::Arc;

use crate::application::{CheckoutService, OrderService, ReconciliationService};
use crate::config::CallbackUrls;
use crate::domain::ports::OrderRepository;
use crate::gateway::PaymentGateway;

/// Shared handler state. Services hold no mutable state of their own beyond
/// the notification registration cache.
#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderService>,
    pub checkout: Arc<CheckoutService>,
    pub reconciliation: Arc<ReconciliationService>,
    pub urls: CallbackUrls,
}

impl AppState {
    pub fn new(
        repo: Arc<dyn OrderRepository>,
        gateway: Arc<dyn PaymentGateway>,
        urls: CallbackUrls,
    ) -> Self {
        Self::from_services(
            OrderService::new(repo.clone()),
            CheckoutService::new(repo.clone(), gateway.clone(), urls.clone()),
            ReconciliationService::new(repo, gateway),
            urls,
        )
    }

    pub fn from_services(
        orders: OrderService,
        checkout: CheckoutService,
        reconciliation: ReconciliationService,
        urls: CallbackUrls,
    ) -> Self {
        Self {
            orders: Arc::new(orders),
            checkout: Arc::new(checkout),
            reconciliation: Arc::new(reconciliation),
            urls,
        }
    }
}
