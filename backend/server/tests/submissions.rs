use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use server::{
    build_router,
    config::Config,
    database::{MemoryStore, NewOrder, OrderRecord, RecordStore, StoreError},
    mailer::{Email, NotifyError, Notifier},
    rate_limit::WindowLimiter,
    state::AppState,
};
use tokio::sync::Mutex;
use tower::ServiceExt;

const ADMIN_TOKEN: &str = "test-admin-token";

#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<Email>>,
    down: Mutex<bool>,
}

#[async_trait]
impl Notifier for Outbox {
    async fn send(&self, email: &Email) -> Result<(), NotifyError> {
        if *self.down.lock().await {
            return Err(NotifyError::Rejected {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        self.sent.lock().await.push(email.clone());
        Ok(())
    }
}

/// Refuses every write, the way a store that is down or holds the reference already would.
struct BrokenStore {
    conflict: bool,
}

#[async_trait]
impl RecordStore for BrokenStore {
    async fn create(&self, order: NewOrder) -> Result<OrderRecord, StoreError> {
        if self.conflict {
            Err(StoreError::Conflict(order.reference))
        } else {
            Err(StoreError::Backend("connection refused".to_string()))
        }
    }

    async fn find_by_id(&self, _id: u64) -> Result<Option<OrderRecord>, StoreError> {
        Ok(None)
    }

    async fn find_by_reference(&self, _reference: &str) -> Result<Option<OrderRecord>, StoreError> {
        Ok(None)
    }

    async fn update_emailed(&self, id: u64, _emailed: bool) -> Result<(), StoreError> {
        Err(StoreError::Missing(id))
    }

    async fn list(&self) -> Result<Vec<OrderRecord>, StoreError> {
        Ok(Vec::new())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(0)
    }
}

fn broken_harness(conflict: bool) -> (Router, Arc<Outbox>) {
    let outbox = Arc::new(Outbox::default());
    let mut config = Config::default();
    config.mail.admin_email = Some("staff@rentals.example".to_string());

    let state = AppState::from_parts(
        config,
        Arc::new(BrokenStore { conflict }),
        Arc::new(WindowLimiter::new()),
        Some(outbox.clone()),
    );

    (build_router(state), outbox)
}

struct Harness {
    app: Router,
    store: Arc<MemoryStore>,
    outbox: Arc<Outbox>,
}

fn harness(with_mail: bool) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let outbox = Arc::new(Outbox::default());

    let mut config = Config::default();
    config.allowed_origins = vec!["https://rentals.example".to_string()];
    config.admin_token = Some(ADMIN_TOKEN.to_string());
    config.mail.admin_email = Some("staff@rentals.example".to_string());

    let notifier: Option<Arc<dyn Notifier>> = if with_mail {
        Some(outbox.clone())
    } else {
        None
    };
    let state = AppState::from_parts(
        config,
        store.clone(),
        Arc::new(WindowLimiter::new()),
        notifier,
    );

    Harness {
        app: build_router(state),
        store,
        outbox,
    }
}

fn order_body(slugs: &[&str], months: Value) -> Value {
    json!({
        "appliances": slugs,
        "fullName": "Thandi Mokoena",
        "email": "thandi@example.com",
        "phone": "0821234567",
        "university": "UCT",
        "residence": "Tugwell Hall",
        "months": months,
        "deliveryDate": "2026-02-01",
        "notes": "Third floor",
        "studentCard": { "name": "card.png", "type": "image/png", "content": "iVBORw0KGgo=" },
        "idCopy": { "name": "id.pdf", "type": "application/pdf", "content": "data:application/pdf;base64,JVBERi0x" }
    })
}

fn post_json(uri: &str, client: &str, body: &Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", client)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn admin_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"))
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

    (status, body)
}

#[tokio::test]
async fn order_end_to_end() {
    let h = harness(true);

    let (status, body) = send(
        &h.app,
        post_json("/api/orders", "10.0.0.1", &order_body(&["microwave", "bar-fridge"], json!(6))),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["emailed"], true);
    assert_eq!(body["selected"]["slugs"], json!(["bar-fridge", "microwave"]));
    assert_eq!(body["selected"]["totals"]["monthlyTotal"], 400);
    assert_eq!(body["selected"]["totals"]["depositTotal"], 800);
    assert_eq!(body["selected"]["totals"]["dueNow"], 800);
    assert_eq!(body["selected"]["items"][0]["name"], "Bar Fridge");

    let reference = body["reference"].as_str().unwrap();
    let record = h.store.find_by_reference(reference).await.unwrap().unwrap();
    assert_eq!(record.months, 6);
    assert!(record.emailed);
    assert_eq!(h.store.count().await.unwrap(), 1);

    let sent = h.outbox.sent.lock().await;
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].attachments[1].content, "JVBERi0x");
}

#[tokio::test]
async fn order_minimum_months_boundary() {
    let h = harness(true);

    let (status, body) = send(
        &h.app,
        post_json("/api/orders", "10.0.0.2", &order_body(&["heater"], json!(4))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "The minimum rental period is 5 months.");
    assert_eq!(h.store.count().await.unwrap(), 0);

    let (status, _) = send(
        &h.app,
        post_json("/api/orders", "10.0.0.2", &order_body(&["heater"], json!(5))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn order_without_known_appliance_is_rejected() {
    let h = harness(true);

    let (status, body) = send(
        &h.app,
        post_json("/api/orders", "10.0.0.3", &order_body(&["jacuzzi"], json!(6))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Please select at least one appliance.");
    assert_eq!(h.store.count().await.unwrap(), 0);
    assert!(h.outbox.sent.lock().await.is_empty());
}

#[tokio::test]
async fn malformed_json_keeps_error_shape() {
    let h = harness(true);

    let request = Request::post("/api/orders")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&h.app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn store_failure_aborts_before_any_email() {
    let (app, outbox) = broken_harness(false);

    let response = app
        .oneshot(post_json("/api/orders", "10.0.2.1", &order_body(&["heater"], json!(6))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!response.headers().contains_key(header::RETRY_AFTER));
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "Something went wrong. Please try again later.");
    assert!(!body.to_string().contains("connection refused"));

    assert!(outbox.sent.lock().await.is_empty());
}

#[tokio::test]
async fn reference_conflict_is_retryable() {
    let (app, outbox) = broken_harness(true);

    let response = app
        .oneshot(post_json("/api/orders", "10.0.2.2", &order_body(&["heater"], json!(6))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    assert!(outbox.sent.lock().await.is_empty());
}

#[tokio::test]
async fn seventh_order_in_window_is_rate_limited() {
    let h = harness(false);
    let body = order_body(&["microwave"], json!(6));

    for _ in 0..6 {
        let (status, _) = send(&h.app, post_json("/api/orders", "10.0.0.4", &body)).await;
        assert_eq!(status, StatusCode::OK);
    }

    let response = h
        .app
        .clone()
        .oneshot(post_json("/api/orders", "10.0.0.4", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
    assert_eq!(h.store.count().await.unwrap(), 6);

    let (status, _) = send(&h.app, post_json("/api/orders", "10.0.0.5", &body)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn order_without_mail_transport_still_succeeds() {
    let h = harness(false);

    let (status, body) = send(
        &h.app,
        post_json("/api/orders", "10.0.0.6", &order_body(&["microwave"], json!(6))),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["emailed"], false);

    let record = h
        .store
        .find_by_reference(body["reference"].as_str().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(!record.emailed);
}

#[tokio::test]
async fn resend_recovers_failed_notification() {
    let h = harness(true);
    *h.outbox.down.lock().await = true;

    let (status, body) = send(
        &h.app,
        post_json("/api/orders", "10.0.0.7", &order_body(&["bar-fridge"], json!(8))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["emailed"], false);
    let reference = body["reference"].as_str().unwrap().to_string();

    *h.outbox.down.lock().await = false;
    let response = h
        .app
        .clone()
        .oneshot(admin_request("POST", &format!("/admin/orders/{reference}/resend")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/admin/orders");

    let record = h.store.find_by_reference(&reference).await.unwrap().unwrap();
    assert!(record.emailed);
}

#[tokio::test]
async fn toggle_twice_restores_flag() {
    let h = harness(false);
    send(
        &h.app,
        post_json("/api/orders", "10.0.0.8", &order_body(&["heater"], json!(5))),
    )
    .await;

    for expected in [true, false] {
        let response = h
            .app
            .clone()
            .oneshot(admin_request("POST", "/admin/orders/1/toggle"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(h.store.find_by_id(1).await.unwrap().unwrap().emailed, expected);
    }

    let (status, _) = send(&h.app, admin_request("POST", "/admin/orders/RNT-404/toggle")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_routes_require_token() {
    let h = harness(false);

    let request = Request::get("/admin/orders").body(Body::empty()).unwrap();
    let (status, _) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&h.app, admin_request("GET", "/admin/orders")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn admin_export_and_stats() {
    let h = harness(false);
    let mut body = order_body(&["bar-fridge", "microwave"], json!(6));
    body["fullName"] = json!(r#"Smith, "John""#);
    send(&h.app, post_json("/api/orders", "10.0.0.9", &body)).await;

    let response = h
        .app
        .clone()
        .oneshot(admin_request("GET", "/admin/orders.csv"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );
    let csv = String::from_utf8(
        to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec(),
    )
    .unwrap();
    assert!(csv.starts_with("\"created_at\",\"reference\""));
    assert!(csv.contains(r#""Smith, ""John""""#));

    let (status, stats) = send(&h.app, admin_request("GET", "/admin/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["byAppliance"]["microwave"], 1);
}

fn contact_body(started_at: i64) -> Value {
    json!({
        "fullName": "Sipho Dlamini",
        "email": "sipho@example.com",
        "phone": "0831112222",
        "subject": "Delivery",
        "message": "Do you deliver to Stellenbosch?",
        "website": "",
        "startedAt": started_at
    })
}

fn long_ago() -> i64 {
    chrono::Utc::now().timestamp_millis() - 60_000
}

#[tokio::test]
async fn contact_sends_both_emails() {
    let h = harness(true);

    let (status, body) = send(
        &h.app,
        post_json("/api/contact", "10.0.1.1", &contact_body(long_ago())),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert!(body["reference"].as_str().unwrap().starts_with("RNT-C-"));

    let sent = h.outbox.sent.lock().await;
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].to, "staff@rentals.example");
    assert_eq!(sent[0].reply_to.as_deref(), Some("sipho@example.com"));
    assert_eq!(sent[1].to, "sipho@example.com");
}

#[tokio::test]
async fn contact_rejects_bots_and_foreign_origins() {
    let h = harness(true);

    let mut honeypot = contact_body(long_ago());
    honeypot["website"] = json!("http://spam.example");
    let (status, body) = send(&h.app, post_json("/api/contact", "10.0.1.2", &honeypot)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid submission.");

    let too_fast = contact_body(chrono::Utc::now().timestamp_millis());
    let (status, _) = send(&h.app, post_json("/api/contact", "10.0.1.2", &too_fast)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut request = post_json("/api/contact", "10.0.1.2", &contact_body(long_ago()));
    request.headers_mut().insert(
        header::ORIGIN,
        "https://evil.example".parse().unwrap(),
    );
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["ok"], false);

    assert!(h.outbox.sent.lock().await.is_empty());
}

#[tokio::test]
async fn contact_mail_failure_is_server_error() {
    let h = harness(true);
    *h.outbox.down.lock().await = true;

    let (status, body) = send(
        &h.app,
        post_json("/api/contact", "10.0.1.3", &contact_body(long_ago())),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Something went wrong. Please try again later.");
}
