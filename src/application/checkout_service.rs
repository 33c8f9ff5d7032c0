use std::collections::HashMap;
use std::sync::Arc;

use bigdecimal::{BigDecimal, Zero};
use log::*;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::blocking;
use crate::config::CallbackUrls;
use crate::domain::errors::DomainError;
use crate::domain::order::{
    CustomerInfo, NewOrder, OrderLineInput, OrderView, HOSTED_CHECKOUT_METHOD,
};
use crate::domain::ports::OrderRepository;
use crate::gateway::{GatewayError, OrderSubmission, PaymentGateway, SessionToken};

const MAX_DESCRIPTION_LEN: usize = 100;

/// Validated checkout payload.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub customer: CustomerInfo,
    pub lines: Vec<OrderLineInput>,
    pub total_amount: BigDecimal,
    pub currency: String,
    pub description: Option<String>,
    /// Client-supplied key that makes retried checkouts reuse one order.
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutOutcome {
    pub order_id: Uuid,
    pub tracking_handle: String,
    pub redirect_url: String,
    /// The redirect belongs to an earlier submission of the same checkout.
    pub resumed: bool,
}

/// Order Submission Flow: persist the order, then hand it to the gateway.
pub struct CheckoutService {
    repo: Arc<dyn OrderRepository>,
    gateway: Arc<dyn PaymentGateway>,
    urls: CallbackUrls,
    /// Registration handles keyed by notification URL. Losing this only
    /// costs one extra (idempotent) registration call.
    registrations: RwLock<HashMap<String, String>>,
}

impl CheckoutService {
    pub fn new(
        repo: Arc<dyn OrderRepository>,
        gateway: Arc<dyn PaymentGateway>,
        urls: CallbackUrls,
    ) -> Self {
        Self { repo, gateway, urls, registrations: RwLock::new(HashMap::new()) }
    }

    /// Seed the registration handle for the configured notification URL.
    pub fn with_notification_id(self, ipn_id: impl Into<String>) -> Self {
        let mut map = HashMap::new();
        map.insert(self.urls.ipn_url.clone(), ipn_id.into());
        Self { registrations: RwLock::new(map), ..self }
    }

    /// Register the notification endpoint with the gateway. Run once at
    /// start-up; checkout falls back to registering lazily if this fails.
    pub async fn provision_notification_channel(&self) -> Result<String, DomainError> {
        let token = self.gateway.acquire_token().await?;
        let ipn_id = self.register(&token).await?;
        Ok(ipn_id)
    }

    async fn register(&self, token: &SessionToken) -> Result<String, GatewayError> {
        let url = &self.urls.ipn_url;
        let ipn_id = self.gateway.register_notification_channel(token, url).await?;
        self.registrations.write().await.insert(url.clone(), ipn_id.clone());
        Ok(ipn_id)
    }

    async fn notification_id(&self, token: &SessionToken) -> Result<String, GatewayError> {
        if let Some(ipn_id) = self.registrations.read().await.get(&self.urls.ipn_url) {
            return Ok(ipn_id.clone());
        }
        self.register(token).await
    }

    pub async fn submit(&self, request: CheckoutRequest) -> Result<CheckoutOutcome, DomainError> {
        validate(&request)?;
        let description = request.description;

        // A retried checkout picks up the order its first attempt created.
        let existing = match request.idempotency_key.clone() {
            Some(key) => {
                blocking(&self.repo, move |repo| repo.find_by_idempotency_key(&key)).await?
            }
            None => None,
        };

        let existing = match existing {
            Some(order) => order,
            None => {
                // 1. Persist Pending/Pending before the gateway learns the merchant reference.
                let new_order = NewOrder {
                    id: Uuid::new_v4(),
                    customer: request.customer,
                    lines: request.lines,
                    total_amount: request.total_amount,
                    currency: request.currency.to_ascii_uppercase(),
                    payment_method: HOSTED_CHECKOUT_METHOD.to_string(),
                    idempotency_key: request.idempotency_key,
                };
                let created = blocking(&self.repo, {
                    let new_order = new_order.clone();
                    move |repo| repo.create(new_order)
                })
                .await?;
                if !created.reused {
                    info!(
                        "Created order {} for {} {}",
                        created.id, new_order.total_amount, new_order.currency
                    );
                    let submission = self.submission_for(
                        created.id,
                        new_order.total_amount,
                        new_order.currency,
                        new_order.customer,
                    );
                    return self.initiate(submission, description.as_deref()).await;
                }
                // Lost a race with a concurrent attempt under the same key.
                let id = created.id;
                blocking(&self.repo, move |repo| repo.find_by_id(id)).await?.ok_or_else(|| {
                    DomainError::Internal(format!("order {id} vanished after idempotent create"))
                })?
            }
        };

        if let Some(outcome) = resume(&existing)? {
            info!("Checkout retry for order {} reuses its existing gateway redirect", existing.id);
            return Ok(outcome);
        }
        info!(
            "Checkout retry for order {} resubmits under the same merchant reference",
            existing.id
        );
        let submission = self.submission_for(
            existing.id,
            existing.total_amount,
            existing.currency,
            existing.customer,
        );
        self.initiate(submission, description.as_deref()).await
    }

    fn submission_for(
        &self,
        id: Uuid,
        amount: BigDecimal,
        currency: String,
        billing: CustomerInfo,
    ) -> OrderSubmission {
        OrderSubmission {
            merchant_reference: id,
            amount,
            currency,
            description: String::new(),
            callback_url: self.urls.callback_url.clone(),
            notification_id: String::new(),
            billing,
        }
    }

    /// Hand a persisted order to the gateway and record what it answered.
    async fn initiate(
        &self,
        mut submission: OrderSubmission,
        description: Option<&str>,
    ) -> Result<CheckoutOutcome, DomainError> {
        let id = submission.merchant_reference;
        submission.description = describe(description, id);

        // 2-4. Token, notification channel, submission.
        let submitted = self.submit_to_gateway(&mut submission).await.map_err(|e| {
            error!("Gateway submission for order {id} failed: {e}");
            DomainError::Gateway(e)
        })?;
        if let Some(reference) = submitted.merchant_reference.as_deref() {
            if !reference.eq_ignore_ascii_case(&id.to_string()) {
                warn!("Gateway echoed merchant reference {reference} for order {id}");
            }
        }

        // 5. Record the tracking handle. The order stays reconcilable if this fails.
        let (handle, redirect) =
            (submitted.tracking_handle.clone(), submitted.redirect_url.clone());
        let recorded =
            blocking(&self.repo, move |repo| repo.attach_submission(id, &handle, &redirect)).await;
        if let Err(e) = recorded {
            error!(
                "Could not store tracking handle {} for order {id}: {e}. \
                 The first reconciliation will record it.",
                submitted.tracking_handle
            );
        }

        Ok(CheckoutOutcome {
            order_id: id,
            tracking_handle: submitted.tracking_handle,
            redirect_url: submitted.redirect_url,
            resumed: false,
        })
    }

    async fn submit_to_gateway(
        &self,
        submission: &mut OrderSubmission,
    ) -> Result<crate::gateway::SubmittedOrder, GatewayError> {
        let token = self.gateway.acquire_token().await?;
        submission.notification_id = self.notification_id(&token).await?;
        self.gateway.submit_order(&token, submission).await
    }
}

/// Decide what a retried checkout gets back for an order it already created.
/// `None` means the order never reached the gateway and may be submitted.
fn resume(existing: &OrderView) -> Result<Option<CheckoutOutcome>, DomainError> {
    let already_submitted = || DomainError::AlreadySubmitted {
        order_id: existing.id,
        payment_status: existing.payment_status,
    };
    if existing.payment_status.is_terminal() {
        let (id, status) = (existing.id, existing.payment_status);
        warn!("Checkout retry for order {id} refused; payment is {status}");
        return Err(already_submitted());
    }
    match (&existing.tracking_handle, &existing.redirect_url) {
        (Some(tracking_handle), Some(redirect_url)) => Ok(Some(CheckoutOutcome {
            order_id: existing.id,
            tracking_handle: tracking_handle.clone(),
            redirect_url: redirect_url.clone(),
            resumed: true,
        })),
        (Some(tracking_handle), None) => {
            warn!(
                "Checkout retry for order {} refused; it is tracked as {tracking_handle} \
                 but its redirect was never stored",
                existing.id
            );
            Err(already_submitted())
        }
        (None, _) => Ok(None),
    }
}

fn describe(description: Option<&str>, id: Uuid) -> String {
    let text = description.map(str::trim).filter(|d| !d.is_empty()).map(str::to_string);
    let mut text = text.unwrap_or_else(|| format!("Order {id}"));
    if text.len() > MAX_DESCRIPTION_LEN {
        let mut cut = MAX_DESCRIPTION_LEN;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

fn validate(request: &CheckoutRequest) -> Result<(), DomainError> {
    let invalid = |msg: &str| Err(DomainError::InvalidInput(msg.to_string()));
    if request.lines.is_empty() {
        return invalid("an order needs at least one line item");
    }
    if request.lines.iter().any(|l| l.quantity <= 0) {
        return invalid("line item quantities must be positive");
    }
    if request.lines.iter().any(|l| l.unit_price < BigDecimal::zero()) {
        return invalid("line item prices cannot be negative");
    }
    if request.total_amount <= BigDecimal::zero() {
        return invalid("total amount must be positive");
    }
    if request.currency.len() != 3 || !request.currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return invalid("currency must be a three-letter code");
    }
    if request.customer.email.trim().is_empty() {
        return invalid("customer email is required");
    }
    let country = &request.customer.country_code;
    if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
        return invalid("country code must be a two-letter code");
    }

    // Column widths of the orders and order_lines tables.
    let customer = &request.customer;
    let fields = [
        ("customer first name", customer.first_name.as_str(), 100),
        ("customer last name", customer.last_name.as_str(), 100),
        ("customer email", customer.email.as_str(), 255),
        ("customer phone", customer.phone.as_deref().unwrap_or_default(), 50),
        ("shipping address", customer.address_line.as_str(), 255),
        ("shipping city", customer.city.as_str(), 100),
        ("idempotency key", request.idempotency_key.as_deref().unwrap_or_default(), 255),
    ];
    let lines = request.lines.iter().flat_map(|l| {
        [
            ("line item name", l.name.as_str(), 255),
            ("line item variant", l.variant.as_deref().unwrap_or_default(), 100),
        ]
    });
    for (field, value, max) in fields.into_iter().chain(lines) {
        if value.chars().count() > max {
            return Err(DomainError::InvalidInput(format!("{field} exceeds {max} characters")));
        }
    }
    Ok(())
}
