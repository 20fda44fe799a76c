//! Test utilities and fixtures for auditflow integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::routing::{get, post};
use axum::Router;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tower::ServiceExt;

// Re-export the main library crate
pub use auditflow::config::StripeSettings;
pub use auditflow::db::{init_db, queries, AppState, DbPool};
pub use auditflow::error::{AppError, Result};
pub use auditflow::handlers::public::{initiate_audit_checkout, payment_success};
pub use auditflow::handlers::webhooks::handle_stripe_webhook;
pub use auditflow::models::*;
pub use auditflow::payments::{CheckoutSession, PaymentGateway, StripeClient};

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const TEST_ADMIN_KEY: &str = "admin_test_key";

pub fn test_stripe_settings() -> StripeSettings {
    StripeSettings {
        secret_key: "sk_test_xxx".to_string(),
        webhook_secret: TEST_WEBHOOK_SECRET.to_string(),
    }
}

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Pool over a named shared-cache in-memory database, so every pooled
/// connection sees the same data while parallel tests stay isolated.
fn test_pool() -> DbPool {
    let name = format!(
        "file:testdb_{}?mode=memory&cache=shared",
        uuid::Uuid::new_v4().as_simple()
    );
    let manager = SqliteConnectionManager::file(name);
    let pool = Pool::builder().max_size(4).build(manager).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }
    pool
}

fn build_state(gateway: Arc<dyn PaymentGateway>) -> AppState {
    AppState {
        db: test_pool(),
        gateway,
        base_url: "http://localhost:3000".to_string(),
        home_url: "https://agency.example.com".to_string(),
        audit_price_cents: 19900,
        currency: "usd".to_string(),
        confirm_recheck: Duration::from_millis(25),
        admin_api_key: Some(TEST_ADMIN_KEY.to_string()),
    }
}

/// AppState with the real Stripe client. Signature verification is local
/// crypto, so webhook and confirmation flows run end-to-end against it.
pub fn create_test_app_state() -> AppState {
    build_state(Arc::new(StripeClient::new(&test_stripe_settings())))
}

/// AppState with an injected gateway double (checkout flow tests).
pub fn create_test_app_state_with_gateway(gateway: Arc<dyn PaymentGateway>) -> AppState {
    build_state(gateway)
}

/// Gateway double that returns canned responses without touching the
/// network. Failure toggles simulate the gateway going down at either step
/// of checkout initiation.
#[derive(Debug, Default)]
pub struct FakeGateway {
    pub fail_customer: bool,
    pub fail_session: bool,
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn find_or_create_customer(&self, email: &str, _name: &str) -> Result<String> {
        if self.fail_customer {
            return Err(AppError::Gateway("customer lookup failed".into()));
        }
        Ok(format!("cus_fake_{:x}", email.len()))
    }

    async fn create_audit_checkout_session(
        &self,
        audit_id: &str,
        _customer_id: &str,
        _amount_cents: i64,
        _currency: &str,
        _success_url: &str,
        _cancel_url: &str,
    ) -> Result<CheckoutSession> {
        if self.fail_session {
            return Err(AppError::Gateway("session create failed".into()));
        }
        Ok(CheckoutSession {
            id: format!("cs_fake_{}", audit_id),
            url: format!("https://checkout.stripe.test/pay/cs_fake_{}", audit_id),
        })
    }

    fn verify_webhook_signature(&self, _payload: &[u8], _signature: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Router with the public and webhook endpoints (without rate limiting)
pub fn test_app(state: AppState) -> Router {
    Router::new()
        .route("/audit/checkout", post(initiate_audit_checkout))
        .route("/payment/success", get(payment_success))
        .route("/webhook/stripe", post(handle_stripe_webhook))
        .with_state(state)
}

/// Router with the internal dashboard endpoints (admin auth applied)
pub fn internal_app(state: AppState) -> Router {
    auditflow::handlers::internal::router(state.clone()).with_state(state)
}

/// Create a test audit request in pending state
pub fn create_test_audit_request(conn: &Connection, email: &str, company: &str) -> AuditRequest {
    let input = CreateAuditRequest {
        email: email.to_string(),
        company_name: company.to_string(),
        social_handles: SocialHandles {
            instagram: Some("@acme".to_string()),
            tiktok: Some("@acme_social".to_string()),
            ..Default::default()
        },
    };
    queries::create_audit_request(conn, &input).expect("Failed to create test audit request")
}

/// Get the current timestamp
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

// ============ Stripe signature helpers ============

/// Get current Unix timestamp as a string (for webhook signature tests)
pub fn current_timestamp() -> String {
    chrono::Utc::now().timestamp().to_string()
}

/// Get an old timestamp (for testing timestamp rejection)
pub fn old_timestamp() -> String {
    // 10 minutes ago - beyond the 5-minute tolerance
    (chrono::Utc::now().timestamp() - 600).to_string()
}

pub fn compute_stripe_signature(payload: &[u8], secret: &str, timestamp: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(signed_payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// A valid signature header for `payload` under the test webhook secret.
pub fn stripe_signature_header(payload: &[u8]) -> String {
    let timestamp = current_timestamp();
    let signature = compute_stripe_signature(payload, TEST_WEBHOOK_SECRET, &timestamp);
    format!("t={},v1={}", timestamp, signature)
}

// ============ Webhook payload builders ============

pub fn checkout_completed_event(
    event_id: &str,
    audit_id: &str,
    payment_intent: &str,
) -> serde_json::Value {
    serde_json::json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_test_a1b2c3",
                "payment_status": "paid",
                "payment_intent": payment_intent,
                "customer": "cus_test_1",
                "metadata": { "type": "audit_payment", "audit_id": audit_id }
            }
        }
    })
}

pub fn payment_intent_event(
    event_type: &str,
    event_id: &str,
    audit_id: &str,
    intent_id: &str,
) -> serde_json::Value {
    serde_json::json!({
        "id": event_id,
        "type": event_type,
        "data": {
            "object": {
                "id": intent_id,
                "metadata": { "type": "audit_payment", "audit_id": audit_id }
            }
        }
    })
}

// ============ Request helpers ============

/// POST a webhook payload with a valid signature; returns (status, body).
pub async fn post_webhook(
    app: Router,
    payload: &serde_json::Value,
) -> (axum::http::StatusCode, serde_json::Value) {
    let body = serde_json::to_vec(payload).unwrap();
    let signature = stripe_signature_header(&body);
    post_webhook_with_signature(app, body, &signature).await
}

/// POST raw webhook bytes with an explicit signature header.
pub async fn post_webhook_with_signature(
    app: Router,
    body: Vec<u8>,
    signature: &str,
) -> (axum::http::StatusCode, serde_json::Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/stripe")
                .header("stripe-signature", signature)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}
