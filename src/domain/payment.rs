//! Payment-axis state machine for orders.
//!
//! Everything here is pure: the repositories call [`plan_status_update`]
//! inside their atomic read-modify-write and persist whatever it returns.

use serde_json::{json, Value};
use uuid::Uuid;

use super::order::{FulfillmentStatus, OrderView, PaymentStatus};

/// Provider status vocabulary, matched case-insensitively after trimming.
/// Anything absent from this table means "not settled yet".
const PROVIDER_STATUS_TABLE: &[(&str, PaymentStatus)] = &[
    ("completed", PaymentStatus::Completed),
    ("failed", PaymentStatus::Failed),
    ("cancelled", PaymentStatus::Failed),
    ("reversed", PaymentStatus::Failed),
];

/// Numeric codes the provider uses when the description is blank.
const PROVIDER_CODE_TABLE: &[(i32, &str)] = &[(1, "completed"), (2, "failed"), (3, "reversed")];

/// Map the provider's status descriptor onto the internal payment enum.
///
/// Returns `None` for anything that is not a definitive outcome, which callers
/// must treat as "still pending", never as a failure.
pub fn map_provider_status(description: &str, status_code: Option<i32>) -> Option<PaymentStatus> {
    let description = description.trim();
    let word = if description.is_empty() {
        let code = status_code?;
        PROVIDER_CODE_TABLE.iter().find(|(c, _)| *c == code).map(|(_, w)| *w)?
    } else {
        description
    };
    PROVIDER_STATUS_TABLE
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(word))
        .map(|(_, status)| *status)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentTransition {
    /// Repeat notification, non-terminal report, or same terminal outcome.
    Unchanged,
    /// Pending order reached its first terminal outcome.
    Settled { to: PaymentStatus },
    /// The gateway now reports a different terminal outcome than the one stored.
    Corrected { from: PaymentStatus, to: PaymentStatus },
}

impl PaymentTransition {
    pub fn target(&self) -> Option<PaymentStatus> {
        match self {
            PaymentTransition::Unchanged => None,
            PaymentTransition::Settled { to } | PaymentTransition::Corrected { to, .. } => {
                Some(*to)
            }
        }
    }

    pub fn is_correction(&self) -> bool {
        matches!(self, PaymentTransition::Corrected { .. })
    }

    /// Outbox event type published for this transition.
    pub fn event_type(&self) -> Option<&'static str> {
        match self {
            PaymentTransition::Unchanged => None,
            PaymentTransition::Corrected { .. } => Some("OrderPaymentCorrected"),
            PaymentTransition::Settled { to: PaymentStatus::Completed } => {
                Some("OrderPaymentCompleted")
            }
            PaymentTransition::Settled { to: PaymentStatus::Failed } => Some("OrderPaymentFailed"),
            PaymentTransition::Settled { to: PaymentStatus::Pending } => None,
        }
    }

    pub fn event_payload(
        &self,
        order_id: Uuid,
        tracking_handle: &str,
        status: FulfillmentStatus,
    ) -> Value {
        let (from, to) = match self {
            PaymentTransition::Unchanged => (None, None),
            PaymentTransition::Settled { to } => (Some(PaymentStatus::Pending), Some(*to)),
            PaymentTransition::Corrected { from, to } => (Some(*from), Some(*to)),
        };
        json!({
            "order_id": order_id,
            "tracking_handle": tracking_handle,
            "from": from.map(|s| s.as_str()),
            "payment_status": to.map(|s| s.as_str()),
            "status": status.as_str(),
        })
    }
}

/// Decide the payment transition for a provider-reported outcome.
///
/// A `Pending` report never moves an order, so terminal states cannot be
/// reverted by a stale notification.
pub fn plan_payment_transition(
    current: PaymentStatus,
    reported: PaymentStatus,
) -> PaymentTransition {
    if reported == PaymentStatus::Pending || reported == current {
        return PaymentTransition::Unchanged;
    }
    match current {
        PaymentStatus::Pending => PaymentTransition::Settled { to: reported },
        from => PaymentTransition::Corrected { from, to: reported },
    }
}

/// Fulfillment status implied by a payment outcome.
///
/// Completed opens the order for processing; Failed cancels it. Orders that
/// have already shipped are never moved by payment outcomes.
pub fn fulfillment_for(current: FulfillmentStatus, payment: PaymentStatus) -> FulfillmentStatus {
    match payment {
        PaymentStatus::Pending => current,
        PaymentStatus::Completed => match current {
            FulfillmentStatus::Pending | FulfillmentStatus::Cancelled => {
                FulfillmentStatus::Processing
            }
            other => other,
        },
        PaymentStatus::Failed => match current {
            FulfillmentStatus::Pending | FulfillmentStatus::Processing => {
                FulfillmentStatus::Cancelled
            }
            other => other,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusUpdate {
    pub change: PaymentTransition,
    pub payment_status: PaymentStatus,
    pub status: FulfillmentStatus,
}

impl StatusUpdate {
    pub fn is_noop(&self) -> bool {
        self.change == PaymentTransition::Unchanged
    }
}

pub fn plan_status_update(
    payment_status: PaymentStatus,
    status: FulfillmentStatus,
    reported: PaymentStatus,
) -> StatusUpdate {
    let change = plan_payment_transition(payment_status, reported);
    match change.target() {
        None => StatusUpdate { change, payment_status, status },
        Some(target) => StatusUpdate {
            change,
            payment_status: target,
            status: fulfillment_for(status, target),
        },
    }
}

/// Result of one atomic status application against the order store.
#[derive(Debug, Clone)]
pub struct AppliedTransition {
    pub change: PaymentTransition,
    pub order: OrderView,
}
