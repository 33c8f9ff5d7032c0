use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::order::{
    CreatedOrder, FulfillmentStatus, ListResult, NewOrder, OrderLineView, OrderView, PaymentStatus,
};
use crate::domain::payment::{plan_status_update, AppliedTransition};
use crate::domain::ports::OrderRepository;

/// Event recorded in place of an outbox row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub order_id: Uuid,
    pub event_type: String,
}

#[derive(Default)]
struct State {
    orders: HashMap<Uuid, OrderView>,
    events: Vec<RecordedEvent>,
}

/// A thread-safe in-memory order store.
///
/// Every operation runs inside one mutex-guarded critical section, which gives
/// the same per-order atomicity as the row lock taken by the Postgres store.
/// Used for local development and tests.
#[derive(Default, Clone)]
pub struct InMemoryOrderRepository {
    state: Arc<Mutex<State>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, DomainError> {
        self.state
            .lock()
            .map_err(|e| DomainError::Internal(format!("order store lock poisoned: {e}")))
    }

    pub fn count(&self) -> usize {
        self.lock().map(|s| s.orders.len()).unwrap_or_default()
    }

    /// Events published so far, oldest first.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.lock().map(|s| s.events.clone()).unwrap_or_default()
    }
}

impl State {
    fn record(&mut self, order_id: Uuid, event_type: &str) {
        self.events.push(RecordedEvent { order_id, event_type: event_type.to_string() });
    }
}

impl OrderRepository for InMemoryOrderRepository {
    fn create(&self, order: NewOrder) -> Result<CreatedOrder, DomainError> {
        let mut state = self.lock()?;
        if let Some(key) = order.idempotency_key.as_deref() {
            let existing =
                state.orders.values().find(|o| o.idempotency_key.as_deref() == Some(key));
            if let Some(existing) = existing {
                return Ok(CreatedOrder { id: existing.id, reused: true });
            }
        }
        let now = Utc::now();
        let view = OrderView {
            id: order.id,
            customer: order.customer,
            total_amount: order.total_amount,
            currency: order.currency,
            status: FulfillmentStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: order.payment_method,
            tracking_handle: None,
            redirect_url: None,
            idempotency_key: order.idempotency_key,
            created_at: now,
            updated_at: now,
            lines: order
                .lines
                .into_iter()
                .map(|l| OrderLineView {
                    id: Uuid::new_v4(),
                    product_id: l.product_id,
                    name: l.name,
                    quantity: l.quantity,
                    unit_price: l.unit_price,
                    variant: l.variant,
                })
                .collect(),
        };
        state.orders.insert(order.id, view);
        state.record(order.id, "OrderCreated");
        Ok(CreatedOrder { id: order.id, reused: false })
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<OrderView>, DomainError> {
        Ok(self.lock()?.orders.get(&id).cloned())
    }

    fn find_by_idempotency_key(&self, key: &str) -> Result<Option<OrderView>, DomainError> {
        let state = self.lock()?;
        Ok(state.orders.values().find(|o| o.idempotency_key.as_deref() == Some(key)).cloned())
    }

    fn list(&self, page: i64, limit: i64) -> Result<ListResult, DomainError> {
        let state = self.lock()?;
        let mut items: Vec<OrderView> = state.orders.values().cloned().collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = items.len() as i64;
        let offset = ((page - 1) * limit).max(0) as usize;
        let items = items
            .into_iter()
            .skip(offset)
            .take(limit.max(0) as usize)
            .map(|mut o| {
                o.lines.clear();
                o
            })
            .collect();
        Ok(ListResult { items, total })
    }

    fn attach_submission(
        &self,
        id: Uuid,
        tracking_handle: &str,
        redirect_url: &str,
    ) -> Result<(), DomainError> {
        let mut state = self.lock()?;
        let order = state.orders.get_mut(&id).ok_or(DomainError::OrderNotFound(id))?;
        order.tracking_handle = Some(tracking_handle.to_string());
        order.redirect_url = Some(redirect_url.to_string());
        order.updated_at = Utc::now();
        state.record(id, "OrderPaymentInitiated");
        Ok(())
    }

    fn apply_payment_status(
        &self,
        id: Uuid,
        tracking_handle: &str,
        reported: PaymentStatus,
    ) -> Result<AppliedTransition, DomainError> {
        let mut state = self.lock()?;
        let order = state.orders.get_mut(&id).ok_or(DomainError::OrderNotFound(id))?;
        let update = plan_status_update(order.payment_status, order.status, reported);
        if order.tracking_handle.is_none() {
            order.tracking_handle = Some(tracking_handle.to_string());
        }
        if !update.is_noop() {
            order.payment_status = update.payment_status;
            order.status = update.status;
            order.updated_at = Utc::now();
        }
        let applied = AppliedTransition { change: update.change, order: order.clone() };
        if let Some(event_type) = update.change.event_type() {
            state.record(id, event_type);
        }
        Ok(applied)
    }

    fn set_fulfillment_status(
        &self,
        id: Uuid,
        status: FulfillmentStatus,
    ) -> Result<OrderView, DomainError> {
        let mut state = self.lock()?;
        let order = state.orders.get_mut(&id).ok_or(DomainError::OrderNotFound(id))?;
        order.status = status;
        order.updated_at = Utc::now();
        let view = order.clone();
        state.record(id, "OrderStatusChanged");
        Ok(view)
    }
}
