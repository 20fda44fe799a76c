//! Tests for the internal dashboard API: admin key gate, listing, and the
//! forward-only staff status advance.

use axum::{body::Body, http::Request, http::StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;
use common::*;

async fn send(
    app: axum::Router,
    method: &str,
    uri: &str,
    auth: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = auth {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_missing_key_rejected() {
    let state = create_test_app_state();
    let (status, _) = send(internal_app(state), "GET", "/internal/audits", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_wrong_key_rejected() {
    let state = create_test_app_state();
    let (status, _) = send(
        internal_app(state),
        "GET",
        "/internal/audits",
        Some("not-the-key"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_list_audits_paginates() {
    let state = create_test_app_state();
    {
        let conn = state.db.get().unwrap();
        for i in 0..3 {
            create_test_audit_request(&conn, &format!("u{}@b.com", i), "Acme");
        }
    }

    let (status, json) = send(
        internal_app(state),
        "GET",
        "/internal/audits?limit=2",
        Some(TEST_ADMIN_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 3);
    assert_eq!(json["limit"], 2);
    assert_eq!(json["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_get_audit_by_id() {
    let state = create_test_app_state();
    let record = {
        let conn = state.db.get().unwrap();
        create_test_audit_request(&conn, "a@b.com", "Acme")
    };

    let uri = format!("/internal/audits/{}", record.id);
    let (status, json) = send(
        internal_app(state.clone()),
        "GET",
        &uri,
        Some(TEST_ADMIN_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], record.id.as_str());
    assert_eq!(json["status"], "pending");

    let (status, _) = send(
        internal_app(state),
        "GET",
        "/internal/audits/no-such-record",
        Some(TEST_ADMIN_KEY),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_advance_status_through_delivery_track() {
    let state = create_test_app_state();
    let record = {
        let conn = state.db.get().unwrap();
        let record = create_test_audit_request(&conn, "a@b.com", "Acme");
        queries::mark_payment_received(&conn, &record.id, "pi_1").unwrap();
        record
    };

    let uri = format!("/internal/audits/{}/status", record.id);
    for next in ["planning", "in_progress", "review", "completed"] {
        let (status, json) = send(
            internal_app(state.clone()),
            "PATCH",
            &uri,
            Some(TEST_ADMIN_KEY),
            Some(json!({ "status": next })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "advancing to {}", next);
        assert_eq!(json["status"], next);
    }
}

#[tokio::test]
async fn test_advance_cannot_skip_steps() {
    let state = create_test_app_state();
    let record = {
        let conn = state.db.get().unwrap();
        let record = create_test_audit_request(&conn, "a@b.com", "Acme");
        queries::mark_payment_received(&conn, &record.id, "pi_1").unwrap();
        record
    };

    let uri = format!("/internal/audits/{}/status", record.id);
    let (status, _) = send(
        internal_app(state),
        "PATCH",
        &uri,
        Some(TEST_ADMIN_KEY),
        Some(json!({ "status": "review" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_advance_requires_payment_first() {
    let state = create_test_app_state();
    let record = {
        let conn = state.db.get().unwrap();
        create_test_audit_request(&conn, "a@b.com", "Acme")
    };

    // Still pending: staff cannot start planning an unpaid audit.
    let uri = format!("/internal/audits/{}/status", record.id);
    let (status, _) = send(
        internal_app(state),
        "PATCH",
        &uri,
        Some(TEST_ADMIN_KEY),
        Some(json!({ "status": "planning" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_staff_cannot_write_payment_outcomes() {
    let state = create_test_app_state();
    let record = {
        let conn = state.db.get().unwrap();
        create_test_audit_request(&conn, "a@b.com", "Acme")
    };

    let uri = format!("/internal/audits/{}/status", record.id);
    for forbidden in ["payment_received", "payment_failed", "pending"] {
        let (status, _) = send(
            internal_app(state.clone()),
            "PATCH",
            &uri,
            Some(TEST_ADMIN_KEY),
            Some(json!({ "status": forbidden })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "status {}", forbidden);
    }
}
