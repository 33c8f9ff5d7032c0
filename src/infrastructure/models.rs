use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::order::{CustomerInfo, OrderLineView, OrderView};
use crate::schema::{commerce_order_outbox, order_lines, orders};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderRow {
    pub id: Uuid,
    pub customer_first_name: String,
    pub customer_last_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub shipping_address: String,
    pub shipping_city: String,
    pub country_code: String,
    pub total_amount: BigDecimal,
    pub currency: String,
    pub status: String,
    pub payment_status: String,
    pub payment_method: String,
    pub tracking_handle: Option<String>,
    pub redirect_url: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRow {
    pub fn into_view(self, lines: Vec<OrderLineRow>) -> Result<OrderView, DomainError> {
        Ok(OrderView {
            id: self.id,
            customer: CustomerInfo {
                first_name: self.customer_first_name,
                last_name: self.customer_last_name,
                email: self.customer_email,
                phone: self.customer_phone,
                address_line: self.shipping_address,
                city: self.shipping_city,
                country_code: self.country_code,
            },
            total_amount: self.total_amount,
            currency: self.currency,
            status: self.status.parse()?,
            payment_status: self.payment_status.parse()?,
            payment_method: self.payment_method,
            tracking_handle: self.tracking_handle,
            redirect_url: self.redirect_url,
            idempotency_key: self.idempotency_key,
            created_at: self.created_at,
            updated_at: self.updated_at,
            lines: lines
                .into_iter()
                .map(|l| OrderLineView {
                    id: l.id,
                    product_id: l.product_id,
                    name: l.name,
                    quantity: l.quantity,
                    unit_price: l.unit_price,
                    variant: l.variant,
                })
                .collect(),
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = orders)]
pub struct NewOrderRow {
    pub id: Uuid,
    pub customer_first_name: String,
    pub customer_last_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub shipping_address: String,
    pub shipping_city: String,
    pub country_code: String,
    pub total_amount: BigDecimal,
    pub currency: String,
    pub status: String,
    pub payment_status: String,
    pub payment_method: String,
    pub idempotency_key: Option<String>,
}

#[derive(
    Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable, Associations,
)]
#[diesel(table_name = order_lines)]
#[diesel(belongs_to(OrderRow, foreign_key = order_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderLineRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub variant: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = order_lines)]
pub struct NewOrderLineRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub variant: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = commerce_order_outbox)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OutboxEventRow {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = commerce_order_outbox)]
pub struct NewOutboxEventRow {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Value,
}

impl NewOutboxEventRow {
    pub fn for_order(order_id: Uuid, event_type: &str, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_type: "Order".to_string(),
            aggregate_id: order_id.to_string(),
            event_type: event_type.to_string(),
            payload,
        }
    }
}
