use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use super::errors::DomainError;

/// Tag stored on every order submitted through the hosted checkout.
pub const HOSTED_CHECKOUT_METHOD: &str = "HOSTED_GATEWAY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(PaymentStatus::Pending),
            "COMPLETED" => Ok(PaymentStatus::Completed),
            "FAILED" => Ok(PaymentStatus::Failed),
            other => Err(DomainError::InvalidInput(format!("unknown payment status '{other}'"))),
        }
    }
}

/// Fulfillment axis of an order. Variants are declared in lifecycle order;
/// `Cancelled` sits outside the forward chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FulfillmentStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl FulfillmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentStatus::Pending => "PENDING",
            FulfillmentStatus::Processing => "PROCESSING",
            FulfillmentStatus::Shipped => "SHIPPED",
            FulfillmentStatus::Delivered => "DELIVERED",
            FulfillmentStatus::Cancelled => "CANCELLED",
        }
    }

    /// True once goods have left the warehouse; payment outcomes never move
    /// an order back from here.
    pub fn has_shipped(&self) -> bool {
        matches!(self, FulfillmentStatus::Shipped | FulfillmentStatus::Delivered)
    }
}

impl fmt::Display for FulfillmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FulfillmentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(FulfillmentStatus::Pending),
            "PROCESSING" => Ok(FulfillmentStatus::Processing),
            "SHIPPED" => Ok(FulfillmentStatus::Shipped),
            "DELIVERED" => Ok(FulfillmentStatus::Delivered),
            "CANCELLED" => Ok(FulfillmentStatus::Cancelled),
            other => Err(DomainError::InvalidInput(format!("unknown order status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerInfo {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address_line: String,
    pub city: String,
    pub country_code: String,
}

#[derive(Debug, Clone)]
pub struct OrderLineInput {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub variant: Option<String>,
}

/// Everything needed to persist a fresh Pending/Pending order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: Uuid,
    pub customer: CustomerInfo,
    pub lines: Vec<OrderLineInput>,
    pub total_amount: BigDecimal,
    pub currency: String,
    pub payment_method: String,
    pub idempotency_key: Option<String>,
}

impl NewOrder {
    /// Payload of the `OrderCreated` outbox event.
    pub fn created_event(&self) -> Value {
        let lines: Vec<Value> = self
            .lines
            .iter()
            .map(|l| {
                json!({
                    "product_id": l.product_id,
                    "name": l.name,
                    "quantity": l.quantity,
                    "unit_price": l.unit_price.to_string(),
                    "variant": l.variant,
                })
            })
            .collect();
        json!({
            "order_id": self.id,
            "customer_email": self.customer.email,
            "total_amount": self.total_amount.to_string(),
            "currency": self.currency,
            "status": FulfillmentStatus::Pending.as_str(),
            "payment_status": PaymentStatus::Pending.as_str(),
            "lines": lines,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedOrder {
    pub id: Uuid,
    /// The idempotency key matched an existing order; nothing was inserted.
    pub reused: bool,
}

#[derive(Debug, Clone)]
pub struct OrderLineView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub variant: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OrderView {
    pub id: Uuid,
    pub customer: CustomerInfo,
    pub total_amount: BigDecimal,
    pub currency: String,
    pub status: FulfillmentStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: String,
    pub tracking_handle: Option<String>,
    pub redirect_url: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub lines: Vec<OrderLineView>,
}

#[derive(Debug, Clone)]
pub struct ListResult {
    pub items: Vec<OrderView>,
    pub total: i64,
}
