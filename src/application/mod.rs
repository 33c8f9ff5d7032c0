pub mod checkout_service;
pub mod order_service;
pub mod reconciliation_service;

use std::sync::Arc;

use crate::domain::errors::DomainError;
use crate::domain::ports::OrderRepository;

pub use checkout_service::{CheckoutOutcome, CheckoutRequest, CheckoutService};
pub use order_service::OrderService;
pub use reconciliation_service::{ReconcileOutcome, ReconcileRequest, ReconciliationService};

/// Run a synchronous repository call on the blocking thread pool.
pub(crate) async fn blocking<T, F>(repo: &Arc<dyn OrderRepository>, f: F) -> Result<T, DomainError>
where
    T: Send + 'static,
    F: FnOnce(&dyn OrderRepository) -> Result<T, DomainError> + Send + 'static,
{
    let repo = Arc::clone(repo);
    tokio::task::spawn_blocking(move || f(repo.as_ref())).await?
}
