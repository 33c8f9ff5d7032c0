use actix_web::{http::header, http::StatusCode, web, HttpResponse};
use log::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::application::{ReconcileOutcome, ReconcileRequest};
use crate::domain::errors::DomainError;
use crate::domain::order::PaymentStatus;
use crate::errors::AppError;
use crate::state::AppState;

// ── Request / response DTOs ──────────────────────────────────────────────────

/// Query string the gateway appends when redirecting the browser back.
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    #[serde(rename = "OrderTrackingId")]
    pub order_tracking_id: Option<String>,
    #[serde(rename = "OrderMerchantReference")]
    pub order_merchant_reference: String,
    /// Return a JSON verification result instead of redirecting.
    #[serde(default)]
    pub verify: bool,
    /// Status hint for fast UI feedback. Never used to commit state.
    pub status: Option<String>,
}

/// Server-to-server notification parameters (query string or JSON body).
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct IpnParams {
    #[serde(rename = "OrderTrackingId")]
    pub order_tracking_id: String,
    #[serde(rename = "OrderMerchantReference")]
    pub order_merchant_reference: String,
    #[serde(rename = "OrderNotificationType", default)]
    pub order_notification_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerifyResponse {
    pub success: bool,
    pub order_id: Uuid,
    pub payment_status: String,
    pub fulfillment_status: String,
    /// False when the gateway could not be reached and the stored status is reported.
    pub verified: bool,
}

impl From<ReconcileOutcome> for VerifyResponse {
    fn from(o: ReconcileOutcome) -> Self {
        Self {
            success: true,
            order_id: o.order_id,
            payment_status: o.payment_status.to_string(),
            fulfillment_status: o.fulfillment_status.to_string(),
            verified: o.verified,
        }
    }
}

/// Acknowledgement body the gateway expects from the notification endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IpnAcknowledgement {
    #[serde(rename = "orderNotificationType")]
    pub order_notification_type: String,
    #[serde(rename = "orderTrackingId")]
    pub order_tracking_id: String,
    #[serde(rename = "orderMerchantReference")]
    pub order_merchant_reference: String,
    pub status: u16,
    pub payment_status: Option<String>,
}

pub(crate) fn parse_reference(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::BadRequest(format!("Invalid merchant reference '{raw}'")))
}

/// Lower-case word shown to people for a payment status.
pub(crate) fn human_status(status: PaymentStatus) -> &'static str {
    match status {
        PaymentStatus::Pending => "pending",
        PaymentStatus::Completed => "completed",
        PaymentStatus::Failed => "failed",
    }
}

/// Append query parameters to a configured URL, keeping any query it already has.
pub(crate) fn with_query(base: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return base.to_string();
    }
    match reqwest::Url::parse_with_params(base, params) {
        Ok(url) => url.to_string(),
        Err(e) => {
            warn!("URL '{base}' is not absolute ({e}); appending parameters verbatim");
            let query: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
            let separator = if base.contains('?') { '&' } else { '?' };
            format!("{base}{separator}{}", query.join("&"))
        }
    }
}

fn confirmation_location(confirmation_url: &str, outcome: &ReconcileOutcome) -> String {
    let order_id = outcome.order_id.to_string();
    let status = human_status(outcome.payment_status);
    with_query(confirmation_url, &[("status", status), ("orderId", order_id.as_str())])
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET /payments/callback
///
/// Browser landing point after payment. Re-derives the payment status from the
/// gateway, then redirects to the confirmation page, or returns a JSON
/// verification result when `verify=true`.
#[utoipa::path(
    get,
    path = "/payments/callback",
    params(
        ("OrderTrackingId" = Option<String>, Query, description = "Gateway tracking handle"),
        ("OrderMerchantReference" = String, Query, description = "Order UUID"),
        ("verify" = Option<bool>, Query, description = "Return JSON instead of redirecting"),
        ("status" = Option<String>, Query, description = "Status hint, never committed"),
    ),
    responses(
        (status = 302, description = "Redirect to the confirmation page"),
        (status = 200, description = "Verification result", body = VerifyResponse),
        (status = 400, description = "Malformed merchant reference"),
        (status = 404, description = "Unknown merchant reference"),
        (status = 409, description = "Tracking handle belongs to another order"),
    ),
    tag = "payments"
)]
pub async fn payment_callback(
    state: web::Data<AppState>,
    query: web::Query<CallbackParams>,
) -> Result<HttpResponse, AppError> {
    let params = query.into_inner();
    let order_id = parse_reference(&params.order_merchant_reference)?;
    if let Some(hint) = params.status.as_deref() {
        debug!("Callback for order {order_id} carries status hint '{hint}'; verifying it");
    }

    let request = ReconcileRequest {
        merchant_reference: order_id,
        tracking_handle: params.order_tracking_id,
    };
    let outcome = state.reconciliation.reconcile(request).await?;

    if params.verify {
        return Ok(HttpResponse::Ok().json(VerifyResponse::from(outcome)));
    }
    let location = confirmation_location(&state.urls.confirmation_url, &outcome);
    Ok(HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish())
}

async fn acknowledge(state: &AppState, params: IpnParams) -> HttpResponse {
    let notification_type = params
        .order_notification_type
        .clone()
        .unwrap_or_else(|| "IPNCHANGE".to_string());
    let mut ack = IpnAcknowledgement {
        order_notification_type: notification_type,
        order_tracking_id: params.order_tracking_id.clone(),
        order_merchant_reference: params.order_merchant_reference.clone(),
        status: 200,
        payment_status: None,
    };

    let order_id = match parse_reference(&params.order_merchant_reference) {
        Ok(id) => id,
        Err(e) => {
            error!("Notification with unusable merchant reference: {e}");
            ack.status = 500;
            return HttpResponse::BadRequest().json(ack);
        }
    };

    let request = ReconcileRequest::new(order_id, params.order_tracking_id);
    match state.reconciliation.reconcile(request).await {
        Ok(outcome) => {
            ack.payment_status = Some(outcome.payment_status.to_string());
            HttpResponse::Ok().json(ack)
        }
        Err(e) => {
            error!("Notification for order {order_id} could not be processed: {e}");
            ack.status = 500;
            let status = match e {
                DomainError::OrderNotFound(_) => StatusCode::NOT_FOUND,
                DomainError::ReferenceMismatch { .. }
                | DomainError::TrackingHandleMismatch { .. } => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            HttpResponse::build(status).json(ack)
        }
    }
}

/// GET /payments/ipn
///
/// Server-to-server payment notification. The gateway does not follow
/// redirects, so this always answers with a JSON acknowledgement.
#[utoipa::path(
    get,
    path = "/payments/ipn",
    params(
        ("OrderTrackingId" = String, Query, description = "Gateway tracking handle"),
        ("OrderMerchantReference" = String, Query, description = "Order UUID"),
        ("OrderNotificationType" = Option<String>, Query, description = "e.g. IPNCHANGE"),
    ),
    responses(
        (status = 200, description = "Notification processed", body = IpnAcknowledgement),
        (status = 404, description = "Unknown merchant reference", body = IpnAcknowledgement),
    ),
    tag = "payments"
)]
pub async fn ipn_get(state: web::Data<AppState>, query: web::Query<IpnParams>) -> HttpResponse {
    acknowledge(&state, query.into_inner()).await
}

/// POST /payments/ipn
///
/// Same as the GET variant for gateways configured to POST notifications.
#[utoipa::path(
    post,
    path = "/payments/ipn",
    request_body = IpnParams,
    responses(
        (status = 200, description = "Notification processed", body = IpnAcknowledgement),
        (status = 404, description = "Unknown merchant reference", body = IpnAcknowledgement),
    ),
    tag = "payments"
)]
pub async fn ipn_post(state: web::Data<AppState>, body: web::Json<IpnParams>) -> HttpResponse {
    acknowledge(&state, body.into_inner()).await
}
