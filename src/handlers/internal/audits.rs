//! Dashboard endpoints for the agency staff working through purchased
//! audits. Payment outcomes stay webhook-owned; staff only advance the
//! delivery track.

use axum::extract::State;
use serde::Deserialize;

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path, Query};
use crate::models::{AuditRequest, AuditStatus};
use crate::pagination::{Paginated, PaginationQuery};

pub async fn list_audits(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<Paginated<AuditRequest>>> {
    let conn = state.db.get()?;
    let total = queries::count_audit_requests(&conn)?;
    let items = queries::list_audit_requests(&conn, pagination.limit(), pagination.offset())?;
    Ok(Json(Paginated::new(
        items,
        total,
        pagination.limit(),
        pagination.offset(),
    )))
}

pub async fn get_audit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AuditRequest>> {
    let conn = state.db.get()?;
    let record = queries::get_audit_request(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("Audit request not found".into()))?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AuditStatus,
}

/// Advance an audit one step along the delivery track.
pub async fn update_audit_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<AuditRequest>> {
    if request.status.is_payment_outcome() || request.status == AuditStatus::Pending {
        return Err(AppError::BadRequest(
            "payment outcomes are owned by the webhook processor".into(),
        ));
    }

    let conn = state.db.get()?;
    let record = queries::get_audit_request(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("Audit request not found".into()))?;

    if !record.status.can_transition_to(request.status) {
        return Err(AppError::BadRequest(format!(
            "cannot move audit from {} to {}",
            record.status, request.status
        )));
    }

    // Compare-and-swap against the status we just read; a concurrent writer
    // surfaces as a conflict instead of a lost update.
    if !queries::advance_status(&conn, &id, record.status, request.status)? {
        return Err(AppError::Conflict(
            "audit status changed concurrently; re-fetch and retry".into(),
        ));
    }

    tracing::info!(
        "audit {} advanced: {} -> {}",
        id,
        record.status,
        request.status
    );

    let updated = queries::get_audit_request(&conn, &id)?
        .ok_or_else(|| AppError::Internal("Audit request vanished mid-update".into()))?;
    Ok(Json(updated))
}
