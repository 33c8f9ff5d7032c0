use actix_web::{web, HttpRequest, HttpResponse};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::application::CheckoutRequest;
use crate::domain::order::{CustomerInfo, FulfillmentStatus, OrderLineInput, OrderView};
use crate::errors::AppError;
use crate::state::AppState;

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct CustomerRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address_line: String,
    pub city: String,
    /// ISO 3166-1 alpha-2, e.g. "KE"
    pub country_code: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderLineRequest {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    /// Decimal price as a string to avoid floating-point issues, e.g. "9.99"
    pub unit_price: String,
    pub variant: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub customer: CustomerRequest,
    pub lines: Vec<CreateOrderLineRequest>,
    /// Decimal total as a string, e.g. "1500.00"
    pub total_amount: String,
    pub currency: String,
    pub description: Option<String>,
    /// Reuse the same key when retrying a checkout to avoid duplicate orders.
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateOrderResponse {
    pub order_id: Uuid,
    pub tracking_handle: String,
    pub redirect_url: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderLineResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: String,
    pub variant: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub shipping_address: String,
    pub shipping_city: String,
    pub country_code: String,
    pub total_amount: String,
    pub currency: String,
    pub status: String,
    pub payment_status: String,
    pub payment_method: String,
    pub tracking_handle: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub lines: Vec<OrderLineResponse>,
}

impl From<OrderView> for OrderResponse {
    fn from(o: OrderView) -> Self {
        Self {
            id: o.id,
            customer_name: format!("{} {}", o.customer.first_name, o.customer.last_name),
            customer_email: o.customer.email,
            customer_phone: o.customer.phone,
            shipping_address: o.customer.address_line,
            shipping_city: o.customer.city,
            country_code: o.customer.country_code,
            total_amount: o.total_amount.to_string(),
            currency: o.currency,
            status: o.status.to_string(),
            payment_status: o.payment_status.to_string(),
            payment_method: o.payment_method,
            tracking_handle: o.tracking_handle,
            created_at: o.created_at.to_rfc3339(),
            updated_at: o.updated_at.to_rfc3339(),
            lines: o
                .lines
                .into_iter()
                .map(|l| OrderLineResponse {
                    id: l.id,
                    product_id: l.product_id,
                    name: l.name,
                    quantity: l.quantity,
                    unit_price: l.unit_price.to_string(),
                    variant: l.variant,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    /// One of PENDING, PROCESSING, SHIPPED, DELIVERED, CANCELLED
    pub status: String,
}

// ── Pagination ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListOrdersParams {
    /// Page number (1-based). Defaults to 1.
    #[serde(default = "default_page")]
    pub page: i64,
    /// Number of items per page. Defaults to 20, maximum 100.
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ListOrdersResponse {
    pub items: Vec<OrderResponse>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

fn parse_decimal(field: &str, value: &str) -> Result<BigDecimal, AppError> {
    BigDecimal::from_str(value.trim())
        .map_err(|e| AppError::BadRequest(format!("Invalid {field} '{value}': {e}")))
}

impl CreateOrderRequest {
    fn into_checkout(self, header_key: Option<String>) -> Result<CheckoutRequest, AppError> {
        let lines = self
            .lines
            .into_iter()
            .map(|l| {
                Ok(OrderLineInput {
                    unit_price: parse_decimal("unit_price", &l.unit_price)?,
                    product_id: l.product_id,
                    name: l.name,
                    quantity: l.quantity,
                    variant: l.variant,
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;
        Ok(CheckoutRequest {
            customer: CustomerInfo {
                first_name: self.customer.first_name,
                last_name: self.customer.last_name,
                email: self.customer.email,
                phone: self.customer.phone,
                address_line: self.customer.address_line,
                city: self.customer.city,
                country_code: self.customer.country_code.to_ascii_uppercase(),
            },
            lines,
            total_amount: parse_decimal("total_amount", &self.total_amount)?,
            currency: self.currency,
            description: self.description,
            idempotency_key: header_key.or(self.idempotency_key),
        })
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST /orders
///
/// Checkout. Persists a Pending order, submits it to the payment gateway and
/// returns the gateway redirect the browser must navigate to. An
/// `Idempotency-Key` header takes precedence over the body field.
#[utoipa::path(
    post,
    path = "/orders",
    request_body = CreateOrderRequest,
    params(
        ("Idempotency-Key" = Option<String>, Header, description = "Checkout idempotency key"),
    ),
    responses(
        (status = 201, description = "Order created and submitted", body = CreateOrderResponse),
        (status = 400, description = "Invalid checkout payload"),
        (status = 409, description = "Order already submitted for payment"),
        (status = 502, description = "Payment gateway rejected or could not be reached"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "orders"
)]
pub async fn create_order(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, AppError> {
    let header_key = req
        .headers()
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let checkout = body.into_inner().into_checkout(header_key)?;

    let outcome = state.checkout.submit(checkout).await?;

    Ok(HttpResponse::Created().json(CreateOrderResponse {
        order_id: outcome.order_id,
        tracking_handle: outcome.tracking_handle,
        redirect_url: outcome.redirect_url,
    }))
}

/// GET /orders/{id}
///
/// Returns the order together with its order lines.
#[utoipa::path(
    get,
    path = "/orders/{id}",
    params(
        ("id" = Uuid, Path, description = "Order UUID (the merchant reference)"),
    ),
    responses(
        (status = 200, description = "Order found", body = OrderResponse),
        (status = 404, description = "Order not found"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "orders"
)]
pub async fn get_order(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let orders = state.orders.clone();

    let result = web::block(move || orders.get_order(order_id)).await??;

    match result {
        Some(order) => Ok(HttpResponse::Ok().json(OrderResponse::from(order))),
        None => Err(AppError::NotFound),
    }
}

/// GET /orders
///
/// Returns a paginated list of orders (without their lines).
/// Use `page` (1-based) and `limit` to control pagination.
#[utoipa::path(
    get,
    path = "/orders",
    params(
        ("page" = Option<i64>, Query, description = "Page number (1-based, default 1)"),
        ("limit" = Option<i64>, Query, description = "Items per page (default 20, max 100)"),
    ),
    responses(
        (status = 200, description = "Paginated list of orders", body = ListOrdersResponse),
        (status = 500, description = "Internal server error"),
    ),
    tag = "orders"
)]
pub async fn list_orders(
    state: web::Data<AppState>,
    query: web::Query<ListOrdersParams>,
) -> Result<HttpResponse, AppError> {
    let params = query.into_inner();
    let page = params.page.max(1);
    let limit = params.limit.clamp(1, 100);
    let orders = state.orders.clone();

    let result = web::block(move || orders.list_orders(page, limit)).await??;

    Ok(HttpResponse::Ok().json(ListOrdersResponse {
        items: result.items.into_iter().map(OrderResponse::from).collect(),
        total: result.total,
        page,
        limit,
    }))
}

/// PATCH /orders/{id}/status
///
/// Manually sets the fulfillment status (e.g. mark an order shipped). Payment
/// status is never touched here.
#[utoipa::path(
    patch,
    path = "/orders/{id}/status",
    request_body = UpdateStatusRequest,
    params(
        ("id" = Uuid, Path, description = "Order UUID"),
    ),
    responses(
        (status = 200, description = "Status updated", body = OrderResponse),
        (status = 400, description = "Unknown status value"),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn update_order_status(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<UpdateStatusRequest>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let status: FulfillmentStatus = body.status.parse()?;
    let orders = state.orders.clone();

    let order = web::block(move || orders.update_status(order_id, status)).await??;

    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}
