use std::fmt;

use bigdecimal::{BigDecimal, ToPrimitive};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::order::{CustomerInfo, PaymentStatus};
use crate::domain::payment::map_provider_status;

/// Short-lived bearer token for one outbound operation. Never persisted.
#[derive(Clone)]
pub struct SessionToken {
    value: String,
    pub expires_at: Option<String>,
}

impl SessionToken {
    pub fn new(value: impl Into<String>, expires_at: Option<String>) -> Self {
        Self { value: value.into(), expires_at }
    }

    pub fn reveal(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("value", &"****")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Order as handed to the gateway. The merchant reference is the order id.
#[derive(Debug, Clone)]
pub struct OrderSubmission {
    pub merchant_reference: Uuid,
    pub amount: BigDecimal,
    pub currency: String,
    pub description: String,
    pub callback_url: String,
    pub notification_id: String,
    pub billing: CustomerInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedOrder {
    pub tracking_handle: String,
    pub merchant_reference: Option<String>,
    pub redirect_url: String,
}

/// Status descriptor returned by a transaction status query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionStatus {
    pub description: String,
    pub status_code: Option<i32>,
    pub merchant_reference: Option<String>,
    pub confirmation_code: Option<String>,
    pub payment_method: Option<String>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
}

impl TransactionStatus {
    pub fn payment_status(&self) -> Option<PaymentStatus> {
        map_provider_status(&self.description, self.status_code)
    }
}

// ── Wire format ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct TokenRequest<'a> {
    pub consumer_key: &'a str,
    pub consumer_secret: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiErrorBody {
    pub fn describe(&self) -> String {
        let parts: Vec<&str> = [&self.error_type, &self.code, &self.message]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            "no error detail".to_string()
        } else {
            parts.join(": ")
        }
    }

    pub fn is_present(&self) -> bool {
        self.error_type.is_some() || self.code.is_some() || self.message.is_some()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, rename = "expiryDate")]
    pub expiry_date: Option<String>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RegisterIpnRequest<'a> {
    pub url: &'a str,
    pub ipn_notification_type: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterIpnResponse {
    #[serde(default)]
    pub ipn_id: Option<String>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Serialize)]
pub(crate) struct BillingAddress<'a> {
    pub email_address: &'a str,
    pub phone_number: Option<&'a str>,
    pub country_code: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub line_1: &'a str,
    pub city: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitOrderRequest<'a> {
    pub id: String,
    pub currency: &'a str,
    pub amount: f64,
    pub description: &'a str,
    pub callback_url: &'a str,
    pub notification_id: &'a str,
    pub billing_address: BillingAddress<'a>,
}

impl<'a> SubmitOrderRequest<'a> {
    pub fn from_submission(order: &'a OrderSubmission) -> Option<Self> {
        let billing = &order.billing;
        Some(Self {
            id: order.merchant_reference.to_string(),
            currency: &order.currency,
            amount: order.amount.to_f64()?,
            description: &order.description,
            callback_url: &order.callback_url,
            notification_id: &order.notification_id,
            billing_address: BillingAddress {
                email_address: &billing.email,
                phone_number: billing.phone.as_deref(),
                country_code: &billing.country_code,
                first_name: &billing.first_name,
                last_name: &billing.last_name,
                line_1: &billing.address_line,
                city: &billing.city,
            },
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitOrderResponse {
    #[serde(default)]
    pub order_tracking_id: Option<String>,
    #[serde(default)]
    pub merchant_reference: Option<String>,
    #[serde(default)]
    pub redirect_url: Option<String>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransactionStatusResponse {
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub confirmation_code: Option<String>,
    #[serde(default)]
    pub payment_status_description: Option<String>,
    #[serde(default)]
    pub status_code: Option<i32>,
    #[serde(default)]
    pub merchant_reference: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

impl From<TransactionStatusResponse> for TransactionStatus {
    fn from(r: TransactionStatusResponse) -> Self {
        Self {
            description: r.payment_status_description.unwrap_or_default(),
            status_code: r.status_code,
            merchant_reference: r.merchant_reference.filter(|m| !m.is_empty()),
            confirmation_code: r.confirmation_code,
            payment_method: r.payment_method,
            amount: r.amount,
            currency: r.currency,
        }
    }
}
