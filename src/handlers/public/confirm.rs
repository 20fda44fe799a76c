use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Query};
use crate::models::AuditStatus;

#[derive(Debug, Deserialize)]
pub struct ConfirmQuery {
    #[serde(default)]
    pub audit_id: Option<String>,
    /// Checkout session id from the gateway redirect. Informational only;
    /// the stored record is the source of truth.
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub verified: bool,
    /// True when the webhook hasn't landed yet. The record will still be
    /// updated by the webhook processor regardless of what we report here.
    pub payment_pending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

/// Landing endpoint for the gateway's post-checkout redirect.
///
/// The redirect can outrun the webhook that actually confirms the charge,
/// so an unresolved record gets one bounded grace period and a re-check
/// before we fall back to a soft "confirmation pending" answer. Exactly one
/// retry; this endpoint never blocks the user on an event it can't control,
/// and it never claims a definitive failure either.
pub async fn payment_success(
    State(state): State<AppState>,
    Query(query): Query<ConfirmQuery>,
) -> Result<Response> {
    // Direct access without the correlation id goes back to the site.
    let Some(audit_id) = query.audit_id.as_deref().filter(|id| !id.is_empty()) else {
        return Ok(Redirect::temporary(&state.home_url).into_response());
    };

    let response = if payment_recorded(&state, audit_id)? {
        ConfirmResponse {
            verified: true,
            payment_pending: false,
            message: None,
        }
    } else {
        tokio::time::sleep(state.confirm_recheck).await;
        if payment_recorded(&state, audit_id)? {
            ConfirmResponse {
                verified: true,
                payment_pending: false,
                message: None,
            }
        } else {
            tracing::info!(
                "payment confirmation still pending for audit {} after recheck",
                audit_id
            );
            ConfirmResponse {
                verified: true,
                payment_pending: true,
                message: Some(
                    "Your payment is being processed. You'll receive an email confirmation shortly.",
                ),
            }
        }
    };

    Ok(Json(response).into_response())
}

/// Whether the stored record shows the payment as received.
fn payment_recorded(state: &AppState, audit_id: &str) -> Result<bool> {
    let conn = state.db.get()?;
    let record = queries::get_audit_request(&conn, audit_id)?
        .ok_or_else(|| AppError::NotFound("Audit request not found".into()))?;
    Ok(record.status == AuditStatus::PaymentReceived || record.stripe_payment_id.is_some())
}
