use chrono::Utc;
use diesel::prelude::*;
use serde_json::json;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::order::{
    CreatedOrder, FulfillmentStatus, ListResult, NewOrder, OrderView, PaymentStatus,
};
use crate::domain::payment::{plan_status_update, AppliedTransition};
use crate::domain::ports::OrderRepository;
use crate::schema::{commerce_order_outbox, order_lines, orders};

use super::models::{NewOrderLineRow, NewOrderRow, NewOutboxEventRow, OrderLineRow, OrderRow};

// ── Error conversions (infrastructure concern only) ──────────────────────────

impl From<diesel::result::Error> for DomainError {
    fn from(e: diesel::result::Error) -> Self {
        DomainError::Internal(e.to_string())
    }
}

impl From<r2d2::Error> for DomainError {
    fn from(e: r2d2::Error) -> Self {
        DomainError::Internal(e.to_string())
    }
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct DieselOrderRepository {
    pool: DbPool,
}

impl DieselOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn load_lines(conn: &mut PgConnection, order_id: Uuid) -> Result<Vec<OrderLineRow>, DomainError> {
    Ok(order_lines::table
        .filter(order_lines::order_id.eq(order_id))
        .select(OrderLineRow::as_select())
        .order(order_lines::created_at.asc())
        .load(conn)?)
}

/// Lock the order row for the rest of the surrounding transaction.
fn lock_order(conn: &mut PgConnection, id: Uuid) -> Result<Option<OrderRow>, DomainError> {
    Ok(orders::table
        .find(id)
        .select(OrderRow::as_select())
        .for_update()
        .first(conn)
        .optional()?)
}

fn publish(conn: &mut PgConnection, event: NewOutboxEventRow) -> Result<(), DomainError> {
    diesel::insert_into(commerce_order_outbox::table)
        .values(&event)
        .execute(conn)?;
    Ok(())
}

impl OrderRepository for DieselOrderRepository {
    fn create(&self, order: NewOrder) -> Result<CreatedOrder, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            // 1. Insert the order. A known idempotency key inserts nothing.
            let inserted = diesel::insert_into(orders::table)
                .values(&NewOrderRow {
                    id: order.id,
                    customer_first_name: order.customer.first_name.clone(),
                    customer_last_name: order.customer.last_name.clone(),
                    customer_email: order.customer.email.clone(),
                    customer_phone: order.customer.phone.clone(),
                    shipping_address: order.customer.address_line.clone(),
                    shipping_city: order.customer.city.clone(),
                    country_code: order.customer.country_code.clone(),
                    total_amount: order.total_amount.clone(),
                    currency: order.currency.clone(),
                    status: FulfillmentStatus::Pending.as_str().to_string(),
                    payment_status: PaymentStatus::Pending.as_str().to_string(),
                    payment_method: order.payment_method.clone(),
                    idempotency_key: order.idempotency_key.clone(),
                })
                .on_conflict(orders::idempotency_key)
                .do_nothing()
                .execute(conn)?;

            if inserted == 0 {
                let key = order.idempotency_key.as_deref().unwrap_or_default();
                let id = orders::table
                    .filter(orders::idempotency_key.eq(key))
                    .select(orders::id)
                    .first::<Uuid>(conn)?;
                return Ok(CreatedOrder { id, reused: true });
            }

            // 2. Insert the line item snapshot
            let new_lines: Vec<NewOrderLineRow> = order
                .lines
                .iter()
                .map(|l| NewOrderLineRow {
                    id: Uuid::new_v4(),
                    order_id: order.id,
                    product_id: l.product_id,
                    name: l.name.clone(),
                    quantity: l.quantity,
                    unit_price: l.unit_price.clone(),
                    variant: l.variant.clone(),
                })
                .collect();
            diesel::insert_into(order_lines::table)
                .values(&new_lines)
                .execute(conn)?;

            // 3. Outbox event in the same transaction.
            publish(
                conn,
                NewOutboxEventRow::for_order(order.id, "OrderCreated", order.created_event()),
            )?;

            Ok(CreatedOrder { id: order.id, reused: false })
        })
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<OrderView>, DomainError> {
        let mut conn = self.pool.get()?;

        let order = orders::table
            .filter(orders::id.eq(id))
            .select(OrderRow::as_select())
            .first(&mut conn)
            .optional()?;

        let Some(order) = order else {
            return Ok(None);
        };

        let lines = load_lines(&mut conn, order.id)?;
        Ok(Some(order.into_view(lines)?))
    }

    fn find_by_idempotency_key(&self, key: &str) -> Result<Option<OrderView>, DomainError> {
        let mut conn = self.pool.get()?;

        let order = orders::table
            .filter(orders::idempotency_key.eq(key))
            .select(OrderRow::as_select())
            .first(&mut conn)
            .optional()?;

        match order {
            Some(order) => {
                let lines = load_lines(&mut conn, order.id)?;
                Ok(Some(order.into_view(lines)?))
            }
            None => Ok(None),
        }
    }

    fn list(&self, page: i64, limit: i64) -> Result<ListResult, DomainError> {
        let mut conn = self.pool.get()?;

        let offset = (page - 1) * limit;
        conn.transaction::<_, DomainError, _>(|conn| {
            let total: i64 = orders::table.count().get_result(conn)?;

            let rows = orders::table
                .select(OrderRow::as_select())
                .order(orders::created_at.desc())
                .limit(limit)
                .offset(offset)
                .load(conn)?;

            Ok(ListResult {
                items: rows
                    .into_iter()
                    .map(|o| o.into_view(vec![]))
                    .collect::<Result<_, _>>()?,
                total,
            })
        })
    }

    fn attach_submission(
        &self,
        id: Uuid,
        tracking_handle: &str,
        redirect_url: &str,
    ) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let updated = diesel::update(orders::table.find(id))
                .set((
                    orders::tracking_handle.eq(tracking_handle),
                    orders::redirect_url.eq(redirect_url),
                    orders::updated_at.eq(Utc::now()),
                ))
                .execute(conn)?;
            if updated == 0 {
                return Err(DomainError::OrderNotFound(id));
            }
            publish(
                conn,
                NewOutboxEventRow::for_order(
                    id,
                    "OrderPaymentInitiated",
                    json!({ "order_id": id, "tracking_handle": tracking_handle }),
                ),
            )
        })
    }

    fn apply_payment_status(
        &self,
        id: Uuid,
        tracking_handle: &str,
        reported: PaymentStatus,
    ) -> Result<AppliedTransition, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let Some(row) = lock_order(conn, id)? else {
                return Err(DomainError::OrderNotFound(id));
            };

            let update =
                plan_status_update(row.payment_status.parse()?, row.status.parse()?, reported);
            let missing_handle = row.tracking_handle.is_none();
            if update.is_noop() && !missing_handle {
                let lines = load_lines(conn, id)?;
                let order = row.into_view(lines)?;
                return Ok(AppliedTransition { change: update.change, order });
            }

            let handle = row
                .tracking_handle
                .clone()
                .unwrap_or_else(|| tracking_handle.to_string());
            let row = diesel::update(orders::table.find(id))
                .set((
                    orders::payment_status.eq(update.payment_status.as_str()),
                    orders::status.eq(update.status.as_str()),
                    orders::tracking_handle.eq(&handle),
                    orders::updated_at.eq(Utc::now()),
                ))
                .returning(OrderRow::as_returning())
                .get_result(conn)?;

            if let Some(event_type) = update.change.event_type() {
                publish(
                    conn,
                    NewOutboxEventRow::for_order(
                        id,
                        event_type,
                        update.change.event_payload(id, &handle, update.status),
                    ),
                )?;
            }

            let lines = load_lines(conn, id)?;
            Ok(AppliedTransition { change: update.change, order: row.into_view(lines)? })
        })
    }

    fn set_fulfillment_status(
        &self,
        id: Uuid,
        status: FulfillmentStatus,
    ) -> Result<OrderView, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let Some(row) = lock_order(conn, id)? else {
                return Err(DomainError::OrderNotFound(id));
            };
            let previous = row.status.clone();

            let row = diesel::update(orders::table.find(id))
                .set((orders::status.eq(status.as_str()), orders::updated_at.eq(Utc::now())))
                .returning(OrderRow::as_returning())
                .get_result(conn)?;

            publish(
                conn,
                NewOutboxEventRow::for_order(
                    id,
                    "OrderStatusChanged",
                    json!({ "order_id": id, "from": previous, "status": status.as_str() }),
                ),
            )?;

            let lines = load_lines(conn, id)?;
            row.into_view(lines)
        })
    }
}
