//! Tests for the GET /payment/success landing endpoint.
//!
//! The gateway's redirect can race its own webhook, so the endpoint gives
//! an unresolved record one short grace period before reporting a soft
//! "confirmation pending" result. The test state uses a short re-check
//! delay to keep these fast.

use axum::{body::Body, http::Request, http::StatusCode};
use serde_json::Value;
use tower::ServiceExt;

mod common;
use common::*;

async fn get_landing(app: axum::Router, uri: &str) -> (StatusCode, Option<String>, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let location = response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, location, json)
}

#[tokio::test]
async fn test_missing_audit_id_redirects_home() {
    let state = create_test_app_state();
    let home = state.home_url.clone();

    let (status, location, _) = get_landing(test_app(state), "/payment/success").await;
    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location.as_deref(), Some(home.as_str()));
}

#[tokio::test]
async fn test_empty_audit_id_redirects_home() {
    let state = create_test_app_state();
    let home = state.home_url.clone();

    let (status, location, _) =
        get_landing(test_app(state), "/payment/success?audit_id=&session_id=cs_1").await;
    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location.as_deref(), Some(home.as_str()));
}

#[tokio::test]
async fn test_unknown_audit_id_returns_not_found() {
    let state = create_test_app_state();

    let (status, _, _) =
        get_landing(test_app(state), "/payment/success?audit_id=no-such-record").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_paid_record_verifies_immediately() {
    let state = create_test_app_state();
    let record = {
        let conn = state.db.get().unwrap();
        let record = create_test_audit_request(&conn, "a@b.com", "Acme");
        queries::mark_payment_received(&conn, &record.id, "pi_123").unwrap();
        record
    };

    let uri = format!("/payment/success?audit_id={}&session_id=cs_1", record.id);
    let (status, _, json) = get_landing(test_app(state), &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["verified"], true);
    assert_eq!(json["payment_pending"], false);
}

#[tokio::test]
async fn test_unresolved_record_soft_verifies_after_one_recheck() {
    let state = create_test_app_state();
    let record = {
        let conn = state.db.get().unwrap();
        create_test_audit_request(&conn, "a@b.com", "Acme")
    };

    let uri = format!("/payment/success?audit_id={}", record.id);
    let (status, _, json) = get_landing(test_app(state), &uri).await;

    // Never a hard failure for the user, never an unbounded wait.
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["verified"], true);
    assert_eq!(json["payment_pending"], true);
    assert!(json["message"].is_string());
}

#[tokio::test]
async fn test_webhook_landing_during_grace_period_confirms() {
    let state = create_test_app_state();
    let record = {
        let conn = state.db.get().unwrap();
        create_test_audit_request(&conn, "a@b.com", "Acme")
    };

    // Simulate the webhook arriving while the landing request is inside
    // its grace period (the re-check delay is 25ms in tests).
    let race_state = state.clone();
    let race_id = record.id.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let conn = race_state.db.get().unwrap();
        queries::mark_payment_received(&conn, &race_id, "pi_racy").unwrap();
    });

    let uri = format!("/payment/success?audit_id={}", record.id);
    let (status, _, json) = get_landing(test_app(state), &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["verified"], true);
    assert_eq!(json["payment_pending"], false);
}
