//! Client-side status resolver: the page a shopper lands on after paying.
//!
//! It is a display surface only. A definitive status in the query string is
//! shown as-is; otherwise the verification path runs once.

use actix_web::{http::header::ContentType, web, HttpResponse};
use log::*;
use serde::Deserialize;
use uuid::Uuid;

use super::payments::{human_status, with_query};
use crate::application::ReconcileRequest;
use crate::domain::errors::DomainError;
use crate::domain::order::PaymentStatus;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConfirmationParams {
    pub status: Option<String>,
    #[serde(rename = "orderId")]
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationView {
    Paid,
    Declined,
    Processing,
    UnknownOrder,
}

impl ConfirmationView {
    fn from_status(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::Completed => ConfirmationView::Paid,
            PaymentStatus::Failed => ConfirmationView::Declined,
            PaymentStatus::Pending => ConfirmationView::Processing,
        }
    }

    fn title(&self) -> &'static str {
        match self {
            ConfirmationView::Paid => "Payment received",
            ConfirmationView::Declined => "Payment failed",
            ConfirmationView::Processing => "Payment processing",
            ConfirmationView::UnknownOrder => "Order not found",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            ConfirmationView::Paid => "Thank you! Your order is confirmed and is being prepared.",
            ConfirmationView::Declined => {
                "Your payment did not go through. You can try again from your cart."
            }
            ConfirmationView::Processing => {
                "We are still waiting for the payment provider to confirm your payment. \
                 Refresh this page in a moment."
            }
            ConfirmationView::UnknownOrder => "We could not find this order.",
        }
    }
}

/// A status hint that is definitive enough to render without asking anyone.
fn definitive_hint(hint: Option<&str>) -> Option<PaymentStatus> {
    match hint?.trim().to_ascii_lowercase().as_str() {
        "completed" => Some(PaymentStatus::Completed),
        "failed" => Some(PaymentStatus::Failed),
        _ => None,
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

/// Canonical top-level URL for this page. Built only from an enum word and a
/// parsed UUID, so it is safe to embed in a script string.
fn canonical_url(base: &str, status: Option<PaymentStatus>, order_id: Option<Uuid>) -> String {
    let order_id = order_id.map(|id| id.to_string());
    let mut params = Vec::new();
    if let Some(status) = status {
        params.push(("status", human_status(status)));
    }
    if let Some(id) = order_id.as_deref() {
        params.push(("orderId", id));
    }
    with_query(base, &params)
}

pub fn render_page(
    view: ConfirmationView,
    order_id: Option<Uuid>,
    canonical: &str,
    provisional: bool,
) -> String {
    let reference = order_id
        .map(|id| format!("<p class=\"reference\">Order reference: <code>{id}</code></p>"))
        .unwrap_or_default();
    let note = if provisional {
        "<p class=\"note\">This status is provisional until the payment provider confirms it.</p>"
    } else {
        ""
    };
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
<link rel="canonical" href="{canonical_attr}">
<script>
if (window.top !== window.self) {{
  window.top.location.href = "{canonical_js}";
}}
</script>
</head>
<body>
<main>
<h1>{title}</h1>
<p>{message}</p>
{reference}
{note}
</main>
</body>
</html>
"#,
        title = view.title(),
        message = view.message(),
        canonical_attr = escape_html(canonical),
        canonical_js = canonical.replace('\\', "\\\\").replace('"', "\\\""),
    )
}

/// GET /payments/confirmation
///
/// Renders the best-known payment status for an order. Breaks out of any
/// frame the gateway may have loaded it into.
#[utoipa::path(
    get,
    path = "/payments/confirmation",
    params(
        ("status" = Option<String>, Query, description = "Status hint from the redirect"),
        ("orderId" = Option<String>, Query, description = "Order UUID"),
    ),
    responses(
        (status = 200, description = "Page", body = String, content_type = "text/html"),
        (status = 404, description = "Unknown order", body = String, content_type = "text/html"),
    ),
    tag = "payments"
)]
pub async fn confirmation_page(
    state: web::Data<AppState>,
    query: web::Query<ConfirmationParams>,
) -> HttpResponse {
    let params = query.into_inner();
    let order_id = params.order_id.as_deref().and_then(|raw| Uuid::parse_str(raw.trim()).ok());
    let hint = definitive_hint(params.status.as_deref());

    let (view, status, provisional) = match (hint, order_id) {
        (Some(status), _) => (ConfirmationView::from_status(status), Some(status), true),
        (None, Some(id)) => {
            let request = ReconcileRequest::by_reference(id);
            match state.reconciliation.reconcile(request).await {
                Ok(outcome) => {
                    let status = outcome.payment_status;
                    (ConfirmationView::from_status(status), Some(status), false)
                }
                Err(DomainError::OrderNotFound(_)) => (ConfirmationView::UnknownOrder, None, false),
                Err(e) => {
                    warn!("Could not verify order {id} for confirmation page: {e}");
                    (ConfirmationView::Processing, None, false)
                }
            }
        }
        (None, None) => (ConfirmationView::UnknownOrder, None, false),
    };

    let canonical = canonical_url(&state.urls.confirmation_url, status, order_id);
    let body = render_page(view, order_id, &canonical, provisional);
    let mut response = if view == ConfirmationView::UnknownOrder {
        HttpResponse::NotFound()
    } else {
        HttpResponse::Ok()
    };
    response.content_type(ContentType::html()).body(body)
}
