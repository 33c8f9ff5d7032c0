mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use actix_web::{
    dev::ServiceResponse,
    http::{header, StatusCode},
    test,
    test::TestRequest,
    web,
    App,
};
use common::{urls, ScriptedGateway};
use payment_reconciler::infrastructure::InMemoryOrderRepository;
use payment_reconciler::{configure, AppState};
use serde_json::{json, Value};
use uuid::Uuid;

fn checkout_body(total: &str) -> Value {
    json!({
        "customer": {
            "first_name": "Amina",
            "last_name": "Otieno",
            "email": "amina@example.com",
            "phone": "+254700000001",
            "address_line": "12 Moi Avenue",
            "city": "Nairobi",
            "country_code": "ke"
        },
        "lines": [
            {
                "product_id": Uuid::new_v4(),
                "name": "Kiondo basket",
                "quantity": 2,
                "unit_price": "750.00"
            }
        ],
        "total_amount": total,
        "currency": "KES"
    })
}

/// Builds a fresh service per request over shared store and gateway.
struct TestApp {
    repo: InMemoryOrderRepository,
    gateway: Arc<ScriptedGateway>,
}

impl TestApp {
    fn new() -> Self {
        Self { repo: InMemoryOrderRepository::new(), gateway: ScriptedGateway::new() }
    }

    async fn call(&self, req: TestRequest) -> ServiceResponse {
        let state = AppState::new(Arc::new(self.repo.clone()), self.gateway.clone(), urls());
        let app = App::new().app_data(web::Data::new(state)).configure(configure);
        let service = test::init_service(app).await;
        test::call_service(&service, req.to_request()).await
    }

    async fn json(&self, req: TestRequest) -> Value {
        test::read_body_json(self.call(req).await).await
    }

    async fn text(&self, req: TestRequest) -> String {
        body_text(self.call(req).await).await
    }

    async fn place_order(&self) -> String {
        let res =
            self.call(TestRequest::post().uri("/orders").set_json(checkout_body("1500.00"))).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let created: Value = test::read_body_json(res).await;
        created["order_id"].as_str().unwrap().to_string()
    }
}

async fn body_text(res: ServiceResponse) -> String {
    let bytes = test::read_body(res).await;
    String::from_utf8_lossy(&bytes).into_owned()
}

fn get(uri: &str) -> TestRequest {
    TestRequest::get().uri(uri)
}

fn ipn_uri(tracking_handle: &str, reference: impl std::fmt::Display) -> String {
    format!("/payments/ipn?OrderTrackingId={tracking_handle}&OrderMerchantReference={reference}")
}

fn callback_uri(reference: impl std::fmt::Display, extra: &str) -> String {
    format!("/payments/callback?OrderTrackingId=TRK-1&OrderMerchantReference={reference}&{extra}")
}

fn set_status(id: &str, status: &str) -> TestRequest {
    TestRequest::patch().uri(&format!("/orders/{id}/status")).set_json(json!({ "status": status }))
}

#[actix_web::test]
async fn checkout_returns_redirect_and_tracking_handle() {
    let app = TestApp::new();
    let res = app.call(TestRequest::post().uri("/orders").set_json(checkout_body("1500.00"))).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(res).await;

    assert_eq!(created["tracking_handle"], "TRK-1");
    assert!(created["redirect_url"].as_str().unwrap().starts_with("https://pay.example/"));

    let id = created["order_id"].as_str().unwrap();
    let order = app.json(get(&format!("/orders/{id}"))).await;
    assert_eq!(order["payment_status"], "PENDING");
    assert_eq!(order["status"], "PENDING");
    assert_eq!(order["tracking_handle"], "TRK-1");
    assert_eq!(order["country_code"], "KE");
    assert_eq!(order["lines"].as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn malformed_checkout_is_a_bad_request() {
    let app = TestApp::new();

    let res = app.call(TestRequest::post().uri("/orders").set_json(checkout_body("lots"))).await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.repo.count(), 0);
}

#[actix_web::test]
async fn values_too_long_for_storage_are_bad_requests() {
    let app = TestApp::new();
    let mut body = checkout_body("1500.00");
    body["customer"]["country_code"] = json!("KEN");

    let res = app.call(TestRequest::post().uri("/orders").set_json(body)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let req = TestRequest::post()
        .uri("/orders")
        .insert_header(("Idempotency-Key", "k".repeat(300)))
        .set_json(checkout_body("1500.00"));
    assert_eq!(app.call(req).await.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.repo.count(), 0);
    assert_eq!(app.gateway.token_calls.load(Ordering::SeqCst), 0);
}

#[actix_web::test]
async fn gateway_rejection_is_a_generic_bad_gateway() {
    let app = TestApp::new();
    app.gateway.fail_submissions(true);

    let res = app.call(TestRequest::post().uri("/orders").set_json(checkout_body("1500.00"))).await;

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert!(!body_text(res).await.contains("provider unavailable"));
    assert_eq!(app.repo.count(), 1);
}

#[actix_web::test]
async fn idempotency_header_prevents_duplicate_orders() {
    let app = TestApp::new();

    let mut ids = Vec::new();
    for _ in 0..2 {
        let req = TestRequest::post()
            .uri("/orders")
            .insert_header(("Idempotency-Key", "cart-99"))
            .set_json(checkout_body("1500.00"));
        let created = app.json(req).await;
        ids.push(created["order_id"].clone());
    }

    assert_eq!(ids[0], ids[1]);
    assert_eq!(app.repo.count(), 1);
}

#[actix_web::test]
async fn unknown_order_is_not_found() {
    let app = TestApp::new();

    let res = app.call(get(&format!("/orders/{}", Uuid::new_v4()))).await;

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn orders_are_listed_with_pagination() {
    let app = TestApp::new();
    for _ in 0..3 {
        app.place_order().await;
    }

    let page = app.json(get("/orders?page=1&limit=2")).await;

    assert_eq!(page["total"], 3);
    assert_eq!(page["limit"], 2);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);
}

#[actix_web::test]
async fn fulfillment_status_can_be_set_manually() {
    let app = TestApp::new();
    let id = app.place_order().await;

    let order = app.json(set_status(&id, "shipped")).await;
    assert_eq!(order["status"], "SHIPPED");
    assert_eq!(order["payment_status"], "PENDING");

    let res = app.call(set_status(&id, "teleported")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn status_change_for_unknown_order_is_not_found() {
    let app = TestApp::new();

    let res = app.call(set_status(&Uuid::new_v4().to_string(), "shipped")).await;

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn notification_settles_order_and_acknowledges() {
    let app = TestApp::new();
    let id = app.place_order().await;
    app.gateway.report("Completed");

    let uri = format!("{}&OrderNotificationType=IPNCHANGE", ipn_uri("TRK-1", &id));
    for _ in 0..2 {
        let res = app.call(get(&uri)).await;
        assert_eq!(res.status(), StatusCode::OK);
        let ack: Value = test::read_body_json(res).await;
        assert_eq!(ack["orderNotificationType"], "IPNCHANGE");
        assert_eq!(ack["orderTrackingId"], "TRK-1");
        assert_eq!(ack["orderMerchantReference"], id.as_str());
        assert_eq!(ack["status"], 200);
        assert_eq!(ack["payment_status"], "COMPLETED");
    }

    let order = app.json(get(&format!("/orders/{id}"))).await;
    assert_eq!(order["payment_status"], "COMPLETED");
    assert_eq!(order["status"], "PROCESSING");
}

#[actix_web::test]
async fn posted_notification_is_accepted() {
    let app = TestApp::new();
    let id = app.place_order().await;
    app.gateway.report("Failed");

    let req = TestRequest::post()
        .uri("/payments/ipn")
        .set_json(json!({ "OrderTrackingId": "TRK-1", "OrderMerchantReference": id }));
    let ack = app.json(req).await;

    assert_eq!(ack["orderNotificationType"], "IPNCHANGE");
    assert_eq!(ack["payment_status"], "FAILED");
}

#[actix_web::test]
async fn notification_for_unknown_order_is_a_client_error() {
    let app = TestApp::new();

    let res = app.call(get(&ipn_uri("TRK-1", Uuid::new_v4()))).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let ack: Value = test::read_body_json(res).await;
    assert_eq!(ack["status"], 500);

    let res = app.call(get(&ipn_uri("TRK-1", "nonsense"))).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.repo.count(), 0);
}

#[actix_web::test]
async fn notification_with_a_foreign_tracking_handle_is_a_conflict() {
    let app = TestApp::new();
    let id = app.place_order().await;
    app.gateway.report("Completed");

    let res = app.call(get(&ipn_uri("TRK-PAID", &id))).await;

    assert_eq!(res.status(), StatusCode::CONFLICT);
    let order = app.json(get(&format!("/orders/{id}"))).await;
    assert_eq!(order["payment_status"], "PENDING");
    assert_eq!(order["tracking_handle"], "TRK-1");
}

#[actix_web::test]
async fn browser_callback_redirects_with_verified_status() {
    let app = TestApp::new();
    let id = app.place_order().await;
    app.gateway.report("Completed");

    // Notification lands first; the browser then arrives with a stale hint.
    app.call(get(&ipn_uri("TRK-1", &id))).await;
    let res = app.call(get(&callback_uri(&id, "status=Pending"))).await;

    assert_eq!(res.status(), StatusCode::FOUND);
    let location = res.headers().get(header::LOCATION).unwrap().to_str().unwrap();
    assert_eq!(
        location,
        format!("https://shop.example/payments/confirmation?status=completed&orderId={id}")
    );
}

#[actix_web::test]
async fn verify_mode_returns_json() {
    let app = TestApp::new();
    let id = app.place_order().await;
    app.gateway.report("Completed");

    let result = app.json(get(&callback_uri(&id, "verify=true"))).await;

    assert_eq!(result["success"], true);
    assert_eq!(result["verified"], true);
    assert_eq!(result["payment_status"], "COMPLETED");
    assert_eq!(result["fulfillment_status"], "PROCESSING");
}

#[actix_web::test]
async fn verify_for_unknown_reference_is_not_found() {
    let app = TestApp::new();

    let res = app.call(get(&callback_uri(Uuid::new_v4(), "verify=true"))).await;

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.repo.count(), 0);
}

#[actix_web::test]
async fn confirmation_page_verifies_when_hint_is_not_definitive() {
    let app = TestApp::new();
    let id = app.place_order().await;
    app.gateway.report("Completed");

    let res = app.call(get(&format!("/payments/confirmation?status=pending&orderId={id}"))).await;

    assert_eq!(res.status(), StatusCode::OK);
    let html = body_text(res).await;
    assert!(html.contains("Payment received"));
    assert!(html.contains("window.top !== window.self"));
    assert!(html.contains(&format!("orderId={id}")));
}

#[actix_web::test]
async fn confirmation_page_renders_definitive_hint_without_querying() {
    let app = TestApp::new();
    let id = app.place_order().await;

    let html = app.text(get(&format!("/payments/confirmation?status=FAILED&orderId={id}"))).await;

    assert!(html.contains("Payment failed"));
    assert!(html.contains("provisional"));
    assert_eq!(app.gateway.status_queries.load(Ordering::SeqCst), 0);
}

#[actix_web::test]
async fn confirmation_page_shows_processing_while_pending() {
    let app = TestApp::new();
    let id = app.place_order().await;
    app.gateway.report("PENDING");

    let html = app.text(get(&format!("/payments/confirmation?orderId={id}"))).await;

    assert!(html.contains("Payment processing"));
}

#[actix_web::test]
async fn confirmation_page_for_unknown_order() {
    let app = TestApp::new();

    let res = app.call(get(&format!("/payments/confirmation?orderId={}", Uuid::new_v4()))).await;

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(body_text(res).await.contains("Order not found"));
}

#[actix_web::test]
async fn openapi_document_is_served() {
    let app = TestApp::new();

    let doc = app.json(get("/api-docs/openapi.json")).await;

    assert!(doc["paths"]["/orders"].is_object());
    assert!(doc["paths"]["/payments/ipn"].is_object());
}
