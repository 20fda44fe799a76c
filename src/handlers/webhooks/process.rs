//! Storage-side webhook processing.
//!
//! Each delivery is one short-lived unit of work: replay prevention and the
//! conditional status transition run in a single database transaction, so a
//! failure rolls back the event record too and the gateway's retry can do
//! the whole thing over. The transitions themselves are compare-and-swap
//! UPDATEs, which is what makes concurrent duplicate deliveries for the
//! same record safe.

use axum::http::StatusCode;
use rusqlite::Connection;

use crate::db::queries::{self, TransitionOutcome};

/// Result type for webhook operations.
pub type WebhookResult = (StatusCode, &'static str);

/// Apply `pending → payment_received` for one verified delivery.
///
/// Every outcome except a storage failure acknowledges with 200: duplicate,
/// stale and unroutable events are no-ops, and a no-op must not trigger the
/// gateway's retry policy.
pub fn process_payment_received(
    conn: &mut Connection,
    provider: &str,
    event_id: Option<&str>,
    audit_id: &str,
    payment_ref: &str,
) -> WebhookResult {
    let tx = match conn.transaction() {
        Ok(tx) => tx,
        Err(e) => {
            tracing::error!("Failed to start transaction: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    };

    if let Some(eid) = event_id {
        match queries::try_record_webhook_event(&tx, provider, eid) {
            Ok(true) => {}
            Ok(false) => return (StatusCode::OK, "Already processed"),
            Err(e) => {
                tracing::error!("Failed to record webhook event: {}", e);
                return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
            }
        }
    }

    let outcome = match queries::mark_payment_received(&tx, audit_id, payment_ref) {
        Ok(o) => o,
        Err(e) => {
            // Rolls back on drop; the event is not marked processed and the
            // gateway will retry.
            tracing::error!("Failed to apply payment_received transition: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    };

    if let Err(e) = tx.commit() {
        tracing::error!("Failed to commit webhook transaction: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
    }

    match outcome {
        TransitionOutcome::Applied => {
            tracing::info!(
                "{} payment received: audit_id={}, payment_ref={}",
                provider,
                audit_id,
                payment_ref
            );
            (StatusCode::OK, "OK")
        }
        TransitionOutcome::AlreadyApplied => (StatusCode::OK, "Already processed"),
        TransitionOutcome::Stale => {
            tracing::warn!(
                "{} success event for audit {} after payment_failed; ignored",
                provider,
                audit_id
            );
            (StatusCode::OK, "Stale event ignored")
        }
        TransitionOutcome::NotFound => {
            tracing::warn!("{} webhook for unknown audit request: {}", provider, audit_id);
            (StatusCode::OK, "Audit request not found")
        }
        TransitionOutcome::DuplicateReference => {
            tracing::warn!(
                "{} payment reference {} already belongs to another record (audit_id={}); ignored",
                provider,
                payment_ref,
                audit_id
            );
            (StatusCode::OK, "Payment reference already claimed")
        }
    }
}

/// Apply `pending → payment_failed` for one verified delivery.
///
/// A record that already reached `payment_received` is left untouched; the
/// failure event is stale and success is not revoked.
pub fn process_payment_failed(
    conn: &mut Connection,
    provider: &str,
    event_id: Option<&str>,
    audit_id: &str,
) -> WebhookResult {
    let tx = match conn.transaction() {
        Ok(tx) => tx,
        Err(e) => {
            tracing::error!("Failed to start transaction: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    };

    if let Some(eid) = event_id {
        match queries::try_record_webhook_event(&tx, provider, eid) {
            Ok(true) => {}
            Ok(false) => return (StatusCode::OK, "Already processed"),
            Err(e) => {
                tracing::error!("Failed to record webhook event: {}", e);
                return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
            }
        }
    }

    let outcome = match queries::mark_payment_failed(&tx, audit_id) {
        Ok(o) => o,
        Err(e) => {
            tracing::error!("Failed to apply payment_failed transition: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    };

    if let Err(e) = tx.commit() {
        tracing::error!("Failed to commit webhook transaction: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
    }

    match outcome {
        TransitionOutcome::Applied => {
            tracing::info!("{} payment failed: audit_id={}", provider, audit_id);
            (StatusCode::OK, "OK")
        }
        TransitionOutcome::AlreadyApplied => (StatusCode::OK, "Already processed"),
        TransitionOutcome::Stale => {
            tracing::info!(
                "{} failure event for audit {} after payment_received; ignored",
                provider,
                audit_id
            );
            (StatusCode::OK, "Stale event ignored")
        }
        TransitionOutcome::NotFound => {
            tracing::warn!("{} webhook for unknown audit request: {}", provider, audit_id);
            (StatusCode::OK, "Audit request not found")
        }
        // mark_payment_failed does not touch the reference column.
        TransitionOutcome::DuplicateReference => (StatusCode::OK, "OK"),
    }
}
