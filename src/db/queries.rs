use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{AuditRequest, AuditStatus, CreateAuditRequest};

use super::from_row::{query_all, query_one, AUDIT_REQUEST_COLS};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

// ============ Audit Requests ============

pub fn create_audit_request(conn: &Connection, input: &CreateAuditRequest) -> Result<AuditRequest> {
    let id = gen_id();
    let now = now();
    let handles_json = serde_json::to_string(&input.social_handles)?;

    conn.execute(
        "INSERT INTO audit_requests (id, email, company_name, social_handles, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?5)",
        params![&id, &input.email, &input.company_name, &handles_json, now],
    )?;

    Ok(AuditRequest {
        id,
        email: input.email.clone(),
        company_name: input.company_name.clone(),
        social_handles: input.social_handles.clone(),
        status: AuditStatus::Pending,
        stripe_payment_id: None,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_audit_request(conn: &Connection, id: &str) -> Result<Option<AuditRequest>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM audit_requests WHERE id = ?1",
            AUDIT_REQUEST_COLS
        ),
        &[&id],
    )
}

pub fn list_audit_requests(
    conn: &Connection,
    limit: i64,
    offset: i64,
) -> Result<Vec<AuditRequest>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM audit_requests ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
            AUDIT_REQUEST_COLS
        ),
        &[&limit, &offset],
    )
}

pub fn count_audit_requests(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM audit_requests", [], |row| row.get(0))?;
    Ok(count)
}

// ============ Payment Transitions ============

/// Outcome of a conditional payment transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The update fired; the record changed state.
    Applied,
    /// The record is already at (or past) the target state. Duplicate
    /// delivery; nothing was touched, including `updated_at`.
    AlreadyApplied,
    /// The record went down the other branch first; the event is stale.
    Stale,
    /// No record with this id.
    NotFound,
    /// Another record already holds this payment reference.
    DuplicateReference,
}

/// Transition a record `pending → payment_received` and attach the payment
/// reference, as one compare-and-swap UPDATE.
///
/// The status guard makes redelivery a no-op: once the record leaves
/// `pending` the statement matches zero rows, so neither the reference nor
/// `updated_at` can be rewritten by a retry. COALESCE keeps an existing
/// reference even on the winning write.
pub fn mark_payment_received(
    conn: &Connection,
    id: &str,
    payment_ref: &str,
) -> Result<TransitionOutcome> {
    let result = conn.execute(
        "UPDATE audit_requests
            SET status = 'payment_received',
                stripe_payment_id = COALESCE(stripe_payment_id, ?2),
                updated_at = ?3
          WHERE id = ?1 AND status = 'pending'",
        params![id, payment_ref, now()],
    );

    match result {
        Ok(n) if n > 0 => Ok(TransitionOutcome::Applied),
        Ok(_) => classify_unapplied(conn, id, AuditStatus::PaymentReceived),
        Err(e) if is_constraint_violation(&e) => Ok(TransitionOutcome::DuplicateReference),
        Err(e) => Err(e.into()),
    }
}

/// Transition a record `pending → payment_failed`.
///
/// A record already in `payment_received` is left untouched: success, once
/// observed, is not revoked by a late failure event.
pub fn mark_payment_failed(conn: &Connection, id: &str) -> Result<TransitionOutcome> {
    let affected = conn.execute(
        "UPDATE audit_requests
            SET status = 'payment_failed', updated_at = ?2
          WHERE id = ?1 AND status = 'pending'",
        params![id, now()],
    )?;

    if affected > 0 {
        Ok(TransitionOutcome::Applied)
    } else {
        classify_unapplied(conn, id, AuditStatus::PaymentFailed)
    }
}

/// Figure out why a conditional transition matched zero rows.
fn classify_unapplied(
    conn: &Connection,
    id: &str,
    target: AuditStatus,
) -> Result<TransitionOutcome> {
    let Some(record) = get_audit_request(conn, id)? else {
        return Ok(TransitionOutcome::NotFound);
    };
    if record.status == target || follows(record.status, target) {
        Ok(TransitionOutcome::AlreadyApplied)
    } else {
        Ok(TransitionOutcome::Stale)
    }
}

/// Whether `status` sits at or past `target` on the delivery track.
fn follows(status: AuditStatus, target: AuditStatus) -> bool {
    match (status.track_position(), target.track_position()) {
        (Some(a), Some(b)) => a >= b,
        _ => false,
    }
}

/// Advance a record one step along the staff lifecycle, guarded by the
/// expected current status (compare-and-swap against concurrent writers).
/// Returns whether the update took effect.
pub fn advance_status(
    conn: &Connection,
    id: &str,
    from: AuditStatus,
    to: AuditStatus,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE audit_requests
            SET status = ?2, updated_at = ?3
          WHERE id = ?1 AND status = ?4",
        params![id, to.as_str(), now(), from.as_str()],
    )?;
    Ok(affected > 0)
}

// ============ Webhook Event Deduplication ============

/// Atomically record a webhook event, returning true if this is a new event.
/// Returns false if the event was already processed (replay prevention).
///
/// Uses INSERT OR IGNORE for atomicity - if the (provider, event_id) pair
/// already exists, the insert is silently ignored and we return false.
pub fn try_record_webhook_event(conn: &Connection, provider: &str, event_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO webhook_events (provider, event_id, created_at) VALUES (?1, ?2, ?3)",
        params![provider, event_id, now()],
    )?;
    Ok(affected > 0)
}

/// Purge old webhook events beyond the retention period. These only exist
/// for replay prevention; the gateway retries for days, not forever.
/// Returns the number of deleted records.
pub fn purge_old_webhook_events(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - (retention_days * 86400);
    let deleted = conn.execute(
        "DELETE FROM webhook_events WHERE created_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}
