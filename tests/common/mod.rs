//! Test utilities and fixtures for boxoffice integration tests

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tempfile::TempDir;

pub use axum::body::Body;
pub use axum::http::{Request, StatusCode};
pub use serde_json::{Value, json};
pub use tower::ServiceExt;

pub use boxoffice::clock::{Clock, FixedClock};
pub use boxoffice::config::{CheckoutSettings, OrdersSettings, StripeSettings};
pub use boxoffice::db::{AppState, DbPool, init_db, queries};
pub use boxoffice::handlers;
pub use boxoffice::models::*;
pub use boxoffice::notify::{Notifier, NotifyError};
pub use boxoffice::orders::OrdersApiClient;
pub use boxoffice::payments::{
    CreateSessionParams, CreatedSession, PaymentProcessor, PaymentStatus, ProcessorError,
    ProcessorEvent, SessionDetails, StripeClient,
};

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const BASE_URL: &str = "https://tickets.example";
/// 2023-11-14T22:13:20Z, the start of a 10 second bucket
pub const T0: i64 = 1_700_000_000;

pub fn stripe_settings(api_base: &str) -> StripeSettings {
    StripeSettings {
        secret_key: "sk_test_xxx".to_string(),
        webhook_secret: WEBHOOK_SECRET.to_string(),
        api_base: api_base.to_string(),
        timeout: Duration::from_secs(2),
    }
}

pub fn checkout_settings() -> CheckoutSettings {
    CheckoutSettings {
        base_url: BASE_URL.to_string(),
        currency: "usd".to_string(),
        site_code: "finals".to_string(),
        idempotency_window_secs: 10,
    }
}

// ============ Fake payment processor ============

/// In-memory processor that enforces idempotency keys like Stripe does.
pub struct FakeProcessor {
    signer: StripeClient,
    created: Mutex<Vec<(String, CreateSessionParams)>>,
    keys: Mutex<HashSet<String>>,
    sessions: Mutex<BTreeMap<String, SessionDetails>>,
    create_failure: Mutex<Option<ProcessorError>>,
    retrieve_unreachable: AtomicBool,
}

impl FakeProcessor {
    pub fn new() -> Self {
        Self {
            signer: StripeClient::new(&stripe_settings("http://127.0.0.1:9"))
                .expect("stripe client"),
            created: Mutex::new(Vec::new()),
            keys: Mutex::new(HashSet::new()),
            sessions: Mutex::new(BTreeMap::new()),
            create_failure: Mutex::new(None),
            retrieve_unreachable: AtomicBool::new(false),
        }
    }

    /// Sessions created so far, with the idempotency key each was created under.
    pub fn created(&self) -> Vec<(String, CreateSessionParams)> {
        self.created.lock().unwrap().clone()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn fail_next_create(&self, error: ProcessorError) {
        *self.create_failure.lock().unwrap() = Some(error);
    }

    pub fn set_retrieve_unreachable(&self, unreachable: bool) {
        self.retrieve_unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn insert_session(&self, id: &str, status: &str, amount_total: i64) {
        self.sessions.lock().unwrap().insert(
            id.to_string(),
            SessionDetails {
                id: id.to_string(),
                payment_status: PaymentStatus::from(status.to_string()),
                customer_email: Some("ann@example.com".to_string()),
                amount_total_minor: Some(amount_total),
                currency: Some("usd".to_string()),
                metadata: BTreeMap::from([("customer_name".to_string(), "Ann Lee".to_string())]),
            },
        );
    }
}

#[async_trait]
impl PaymentProcessor for FakeProcessor {
    fn provider(&self) -> &'static str {
        "stripe"
    }

    async fn create_session(
        &self,
        params: &CreateSessionParams,
        idempotency_key: &str,
    ) -> Result<CreatedSession, ProcessorError> {
        if let Some(error) = self.create_failure.lock().unwrap().take() {
            return Err(error);
        }
        if !self.keys.lock().unwrap().insert(idempotency_key.to_string()) {
            return Err(ProcessorError::IdempotencyKeyInUse);
        }

        let mut created = self.created.lock().unwrap();
        created.push((idempotency_key.to_string(), params.clone()));
        let id = format!("cs_test_{}", created.len());
        Ok(CreatedSession {
            url: format!("https://checkout.stripe.test/pay/{}", id),
            id,
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionDetails, ProcessorError> {
        if self.retrieve_unreachable.load(Ordering::SeqCst) {
            return Err(ProcessorError::Timeout);
        }
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or(ProcessorError::InvalidSession)
    }

    fn verify_event(&self, payload: &[u8], signature: &str) -> Result<ProcessorEvent, ProcessorError> {
        self.signer.verify_event(payload, signature)
    }
}

// ============ Recording notifier ============

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
    failures_remaining: AtomicUsize,
}

impl RecordingNotifier {
    pub fn fail_times(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, message: &str) -> Result<(), NotifyError> {
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(NotifyError::Transport("chat unreachable".to_string()));
        }
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

// ============ App state ============

pub struct TestContext {
    pub state: AppState,
    pub processor: Arc<FakeProcessor>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<FixedClock>,
    _dir: TempDir,
}

impl TestContext {
    pub fn app(&self) -> Router {
        app(self.state.clone())
    }

    pub fn conn(&self) -> r2d2::PooledConnection<SqliteConnectionManager> {
        self.state.db.get().expect("db connection")
    }
}

/// File-backed pool in a temp dir, so every pooled connection sees the same database.
pub fn create_test_pool() -> (DbPool, TempDir) {
    let dir = TempDir::new().expect("temp dir");
    let manager = SqliteConnectionManager::file(dir.path().join("test.db"))
        .with_init(|conn| conn.execute_batch("PRAGMA busy_timeout = 5000;"));
    let pool = Pool::builder().max_size(4).build(manager).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }
    (pool, dir)
}

pub fn test_context() -> TestContext {
    test_context_with_orders("http://127.0.0.1:9")
}

pub fn test_context_with_orders(orders_base_url: &str) -> TestContext {
    let (db, dir) = create_test_pool();
    let processor = Arc::new(FakeProcessor::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = Arc::new(FixedClock::at_unix(T0));
    let orders = OrdersApiClient::new(&OrdersSettings {
        base_url: orders_base_url.to_string(),
        timeout: Duration::from_secs(2),
    })
    .unwrap();

    let state = AppState {
        db,
        processor: processor.clone(),
        orders: Arc::new(orders),
        notifier: notifier.clone(),
        clock: clock.clone(),
        checkout: checkout_settings(),
        site_name: "Finals Tickets".to_string(),
    };

    TestContext {
        state,
        processor,
        notifier,
        clock,
        _dir: dir,
    }
}

/// Full router without rate limiting.
pub fn app(state: AppState) -> Router {
    handlers::router(0).with_state(state)
}

// ============ HTTP helpers ============

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Polls `check` until it returns true or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

// ============ Fixtures ============

pub fn cart_item(title: &str, category: &str, quantity: u32, price: f64) -> Value {
    json!({
        "id": "evt-42",
        "eventTitle": title,
        "categoryName": category,
        "quantity": quantity,
        "price": price,
        "eventDate": "12",
        "eventMonth": "Nov",
        "eventTime": "19:00",
        "venue": "Center Court"
    })
}

pub fn customer() -> Value {
    json!({
        "name": "Ann Lee",
        "email": "ann@example.com",
        "phone": "+1 555 0100",
        "comments": "Aisle seats please"
    })
}

pub fn checkout_request(cart: Vec<Value>) -> Value {
    json!({ "cart": cart, "customerInfo": customer() })
}

// ============ Webhook helpers ============

pub fn compute_stripe_signature(payload: &[u8], secret: &str, timestamp: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// A current, valid `stripe-signature` header for `payload`.
pub fn stripe_signature_header(payload: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp().to_string();
    let signature = compute_stripe_signature(payload.as_bytes(), WEBHOOK_SECRET, &timestamp);
    format!("t={},v1={}", timestamp, signature)
}

pub fn webhook_request(payload: &str, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/webhooks/stripe")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("stripe-signature", signature);
    }
    builder.body(Body::from(payload.to_string())).unwrap()
}

pub fn stripe_event(id: &str, event_type: &str, object: Value) -> String {
    json!({
        "id": id,
        "type": event_type,
        "created": chrono::Utc::now().timestamp(),
        "data": { "object": object }
    })
    .to_string()
}

pub fn paid_session_object(amount_total: i64) -> Value {
    json!({
        "id": "cs_test_paid",
        "payment_status": "paid",
        "customer_details": { "email": "ann@example.com" },
        "amount_total": amount_total,
        "currency": "usd",
        "payment_intent": "pi_123",
        "metadata": {
            "customer_name": "Ann Lee",
            "customer_phone": "+1 555 0100",
            "cart_items": "[{\"id\":\"evt-42\",\"qty\":2}]",
            "expected_amount_minor": "50000",
            "expected_currency": "usd"
        }
    })
}
