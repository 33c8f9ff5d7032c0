//! Reconciliation Handler.
//!
//! Notifications from the gateway and verification requests from browsers
//! both end up in [`ReconciliationService::reconcile`]. The committed status
//! is always re-derived from a direct gateway query; status hints carried in
//! URLs never reach this path.

use std::sync::Arc;
use std::time::Duration;

use log::*;
use uuid::Uuid;

use super::blocking;
use crate::domain::errors::DomainError;
use crate::domain::order::{FulfillmentStatus, OrderView, PaymentStatus};
use crate::domain::payment::PaymentTransition;
use crate::domain::ports::OrderRepository;
use crate::gateway::{PaymentGateway, TransactionStatus};

const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileRequest {
    pub merchant_reference: Uuid,
    /// Falls back to the handle stored on the order when absent. Must match
    /// the stored handle when both are present.
    pub tracking_handle: Option<String>,
}

impl ReconcileRequest {
    pub fn new(merchant_reference: Uuid, tracking_handle: impl Into<String>) -> Self {
        Self { merchant_reference, tracking_handle: Some(tracking_handle.into()) }
    }

    pub fn by_reference(merchant_reference: Uuid) -> Self {
        Self { merchant_reference, tracking_handle: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub order_id: Uuid,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    /// Raw provider status text, when the gateway answered.
    pub provider_status: Option<String>,
    /// False when the gateway could not be asked; the statuses are then the
    /// stored best-known ones.
    pub verified: bool,
    pub change: PaymentTransition,
}

impl ReconcileOutcome {
    fn unverified(order: &OrderView) -> Self {
        Self {
            order_id: order.id,
            payment_status: order.payment_status,
            fulfillment_status: order.status,
            provider_status: None,
            verified: false,
            change: PaymentTransition::Unchanged,
        }
    }
}

pub struct ReconciliationService {
    repo: Arc<dyn OrderRepository>,
    gateway: Arc<dyn PaymentGateway>,
    query_timeout: Duration,
}

impl ReconciliationService {
    pub fn new(repo: Arc<dyn OrderRepository>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { repo, gateway, query_timeout: DEFAULT_QUERY_TIMEOUT }
    }

    /// Upper bound on token acquisition plus the status query.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub async fn reconcile(
        &self,
        request: ReconcileRequest,
    ) -> Result<ReconcileOutcome, DomainError> {
        let id = request.merchant_reference;

        // 1. The order must already exist; this path never creates one.
        let order = blocking(&self.repo, move |repo| repo.find_by_id(id)).await?.ok_or_else(|| {
            error!("Reconciliation requested for unknown merchant reference {id}");
            DomainError::OrderNotFound(id)
        })?;

        // A stored handle is authoritative; a different one is never queried.
        let supplied = request.tracking_handle.filter(|h| !h.is_empty());
        let tracking_handle = match (order.tracking_handle.clone(), supplied) {
            (Some(stored), Some(supplied)) if stored != supplied => {
                error!("Order {id} is tracked as {stored}; not reconciling against {supplied}");
                return Err(DomainError::TrackingHandleMismatch { order_id: id, stored, supplied });
            }
            (Some(handle), _) | (None, Some(handle)) => handle,
            (None, None) => {
                debug!("Order {id} has no tracking handle yet; status unknown");
                return Ok(ReconcileOutcome::unverified(&order));
            }
        };
        let handle_is_stored = order.tracking_handle.is_some();

        // 2. Ask the gateway. Timeouts and provider errors are "unknown".
        let Some(status) = self.fetch_status(&tracking_handle).await else {
            info!(
                "Status of order {id} ({tracking_handle}) is unknown for now; leaving it {}",
                order.payment_status
            );
            return Ok(ReconcileOutcome::unverified(&order));
        };
        match status.merchant_reference.as_deref() {
            Some(reported) if !reported.eq_ignore_ascii_case(&id.to_string()) => {
                error!("Gateway reports {tracking_handle} belongs to {reported}, not order {id}");
                return Err(DomainError::ReferenceMismatch {
                    expected: id,
                    reported: reported.to_string(),
                });
            }
            Some(_) => {}
            // An unrecorded handle only binds to the order through the echo.
            None if !handle_is_stored => {
                warn!("Gateway did not confirm that {tracking_handle} belongs to order {id}");
                return Ok(ReconcileOutcome::unverified(&order));
            }
            None => {}
        }

        // 3. Finite mapping; anything unrecognised stays pending.
        let mapped = status.payment_status().unwrap_or(PaymentStatus::Pending);
        if mapped == PaymentStatus::Pending && handle_is_stored {
            debug!("Gateway reports '{}' for order {id}; still pending", status.description);
            return Ok(ReconcileOutcome {
                provider_status: Some(status.description),
                verified: true,
                ..ReconcileOutcome::unverified(&order)
            });
        }

        // 4-5. Atomic application against the store.
        let handle = tracking_handle.clone();
        let applied =
            blocking(&self.repo, move |repo| repo.apply_payment_status(id, &handle, mapped))
                .await?;
        let order = applied.order;
        match applied.change {
            PaymentTransition::Unchanged => debug!(
                "Order {id} already {}; notification for {tracking_handle} is a no-op",
                order.payment_status
            ),
            PaymentTransition::Settled { to } => {
                let status = order.status;
                info!("Order {id} payment {to} ({tracking_handle}); order status now {status}")
            }
            PaymentTransition::Corrected { from, to } => warn!(
                "Gateway re-query corrected payment of order {id} from {from} to {to} \
                 ({tracking_handle})"
            ),
        }
        if order.payment_status == PaymentStatus::Failed && order.status.has_shipped() {
            warn!(
                "Order {id} is {} but its payment is FAILED; needs manual follow-up",
                order.status
            );
        }

        Ok(ReconcileOutcome {
            order_id: id,
            payment_status: order.payment_status,
            fulfillment_status: order.status,
            provider_status: Some(status.description),
            verified: true,
            change: applied.change,
        })
    }

    async fn fetch_status(&self, tracking_handle: &str) -> Option<TransactionStatus> {
        let query = async {
            let token = match self.gateway.acquire_token().await {
                Ok(token) => token,
                Err(e) => {
                    warn!("Could not acquire gateway token for status query: {e}");
                    return None;
                }
            };
            self.gateway.query_status(&token, tracking_handle).await
        };
        match tokio::time::timeout(self.query_timeout, query).await {
            Ok(status) => status,
            Err(_) => {
                let timeout = self.query_timeout;
                warn!("Status query for {tracking_handle} timed out after {timeout:?}");
                None
            }
        }
    }
}
