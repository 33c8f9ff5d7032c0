//! Shared fixtures for the integration tests: a scripted gateway and
//! checkout helpers backed by the in-memory order store.
#![allow(dead_code)]

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use payment_reconciler::application::CheckoutRequest;
use payment_reconciler::config::CallbackUrls;
use payment_reconciler::domain::errors::DomainError;
use payment_reconciler::domain::order::{
    CreatedOrder, CustomerInfo, FulfillmentStatus, ListResult, NewOrder, OrderLineInput, OrderView,
    PaymentStatus,
};
use payment_reconciler::domain::payment::AppliedTransition;
use payment_reconciler::domain::ports::OrderRepository;
use payment_reconciler::gateway::{
    GatewayError, OrderSubmission, PaymentGateway, SessionToken, SubmittedOrder, TransactionStatus,
};
use payment_reconciler::infrastructure::InMemoryOrderRepository;
use uuid::Uuid;

pub const PUBLIC_BASE: &str = "https://shop.example";

pub fn urls() -> CallbackUrls {
    CallbackUrls::from_base(PUBLIC_BASE)
}

/// A gateway whose answers are set by the test. Tracking handles are issued
/// as `TRK-1`, `TRK-2`, ... in submission order.
#[derive(Default)]
pub struct ScriptedGateway {
    status: Mutex<Option<String>>,
    reported_reference: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
    fail_token: AtomicBool,
    fail_submission: AtomicBool,
    status_unavailable: AtomicBool,
    pub token_calls: AtomicUsize,
    pub registrations: AtomicUsize,
    pub submissions: AtomicUsize,
    pub status_queries: AtomicUsize,
    submitted: Mutex<Vec<OrderSubmission>>,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Provider status description returned by status queries.
    pub fn report(&self, description: &str) {
        *self.status.lock().unwrap() = Some(description.to_string());
    }

    /// Merchant reference echoed by status queries, overriding the order's own.
    pub fn report_reference(&self, reference: &str) {
        *self.reported_reference.lock().unwrap() = Some(reference.to_string());
    }

    pub fn delay_queries(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_tokens(&self, fail: bool) {
        self.fail_token.store(fail, Ordering::SeqCst);
    }

    pub fn fail_submissions(&self, fail: bool) {
        self.fail_submission.store(fail, Ordering::SeqCst);
    }

    pub fn make_status_unavailable(&self, unavailable: bool) {
        self.status_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn submitted(&self) -> Vec<OrderSubmission> {
        self.submitted.lock().unwrap().clone()
    }

    fn references_by_handle(&self, handle: &str) -> Option<String> {
        self.submitted
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .find(|(i, _)| format!("TRK-{}", i + 1) == handle)
            .map(|(_, s)| s.merchant_reference.to_string())
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn acquire_token(&self) -> Result<SessionToken, GatewayError> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_token.load(Ordering::SeqCst) {
            return Err(GatewayError::Auth("invalid consumer credentials".to_string()));
        }
        Ok(SessionToken::new("token", None))
    }

    async fn register_notification_channel(
        &self,
        _token: &SessionToken,
        _url: &str,
    ) -> Result<String, GatewayError> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok("ipn-1".to_string())
    }

    async fn submit_order(
        &self,
        _token: &SessionToken,
        order: &OrderSubmission,
    ) -> Result<SubmittedOrder, GatewayError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        if self.fail_submission.load(Ordering::SeqCst) {
            return Err(GatewayError::Submission {
                status: 500,
                message: "provider unavailable".to_string(),
            });
        }
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(order.clone());
        let handle = format!("TRK-{}", submitted.len());
        Ok(SubmittedOrder {
            redirect_url: format!("https://pay.example/iframe?OrderTrackingId={handle}"),
            tracking_handle: handle,
            merchant_reference: Some(order.merchant_reference.to_string()),
        })
    }

    async fn query_status(
        &self,
        _token: &SessionToken,
        tracking_handle: &str,
    ) -> Option<TransactionStatus> {
        self.status_queries.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.status_unavailable.load(Ordering::SeqCst) {
            return None;
        }
        let description = self.status.lock().unwrap().clone()?;
        let merchant_reference = self
            .reported_reference
            .lock()
            .unwrap()
            .clone()
            .or_else(|| self.references_by_handle(tracking_handle));
        Some(TransactionStatus {
            description,
            status_code: None,
            merchant_reference,
            confirmation_code: None,
            payment_method: Some("M-Pesa".to_string()),
            amount: None,
            currency: Some("KES".to_string()),
        })
    }
}

/// Wraps the in-memory store and refuses to record gateway submissions.
pub struct ForgetfulRepository {
    pub inner: InMemoryOrderRepository,
}

impl OrderRepository for ForgetfulRepository {
    fn create(&self, order: NewOrder) -> Result<CreatedOrder, DomainError> {
        self.inner.create(order)
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<OrderView>, DomainError> {
        self.inner.find_by_id(id)
    }

    fn find_by_idempotency_key(&self, key: &str) -> Result<Option<OrderView>, DomainError> {
        self.inner.find_by_idempotency_key(key)
    }

    fn list(&self, page: i64, limit: i64) -> Result<ListResult, DomainError> {
        self.inner.list(page, limit)
    }

    fn attach_submission(
        &self,
        _id: Uuid,
        _tracking_handle: &str,
        _redirect_url: &str,
    ) -> Result<(), DomainError> {
        Err(DomainError::Internal("connection reset".to_string()))
    }

    fn apply_payment_status(
        &self,
        id: Uuid,
        tracking_handle: &str,
        reported: PaymentStatus,
    ) -> Result<AppliedTransition, DomainError> {
        self.inner.apply_payment_status(id, tracking_handle, reported)
    }

    fn set_fulfillment_status(
        &self,
        id: Uuid,
        status: FulfillmentStatus,
    ) -> Result<OrderView, DomainError> {
        self.inner.set_fulfillment_status(id, status)
    }
}

pub fn customer() -> CustomerInfo {
    CustomerInfo {
        first_name: "Amina".to_string(),
        last_name: "Otieno".to_string(),
        email: "amina@example.com".to_string(),
        phone: Some("+254700000001".to_string()),
        address_line: "12 Moi Avenue".to_string(),
        city: "Nairobi".to_string(),
        country_code: "KE".to_string(),
    }
}

/// A single-line KES checkout for the given total.
pub fn checkout(total: &str, idempotency_key: Option<&str>) -> CheckoutRequest {
    let amount = BigDecimal::from_str(total).unwrap();
    CheckoutRequest {
        customer: customer(),
        lines: vec![OrderLineInput {
            product_id: Uuid::new_v4(),
            name: "Kikoy beach towel".to_string(),
            quantity: 1,
            unit_price: amount.clone(),
            variant: Some("Blue".to_string()),
        }],
        total_amount: amount,
        currency: "KES".to_string(),
        description: None,
        idempotency_key: idempotency_key.map(str::to_string),
    }
}

pub fn event_types(repo: &InMemoryOrderRepository, order_id: Uuid) -> Vec<String> {
    repo.events()
        .into_iter()
        .filter(|e| e.order_id == order_id)
        .map(|e| e.event_type)
        .collect()
}
