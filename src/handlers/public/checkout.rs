use axum::extract::State;
use serde::Serialize;

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::models::CreateAuditRequest;

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    /// Gateway-hosted checkout page to redirect the user to.
    pub url: String,
    pub audit_id: String,
}

/// Start an audit purchase: persist the request, then create a checkout
/// session at the gateway that carries the record id in its metadata.
pub async fn initiate_audit_checkout(
    State(state): State<AppState>,
    Json(request): Json<CreateAuditRequest>,
) -> Result<Json<CheckoutResponse>> {
    if request.email.trim().is_empty() {
        return Err(AppError::BadRequest("email is required".into()));
    }
    if request.company_name.trim().is_empty() {
        return Err(AppError::BadRequest("company_name is required".into()));
    }

    // The record must exist before any session references it: the webhook
    // for this purchase can arrive before the caller sees our response.
    let record = {
        let conn = state.db.get()?;
        queries::create_audit_request(&conn, &request)?
    };

    let customer_id = state
        .gateway
        .find_or_create_customer(&record.email, &record.company_name)
        .await?;

    // Stripe substitutes {CHECKOUT_SESSION_ID} on redirect.
    let success_url = format!(
        "{}/payment/success?audit_id={}&session_id={{CHECKOUT_SESSION_ID}}",
        state.base_url, record.id
    );
    let cancel_url = format!(
        "{}/?checkout=cancelled&audit_id={}",
        state.home_url, record.id
    );

    // A gateway failure from here on leaves the record pending. That
    // orphan is harmless and queryable; there is no cross-system
    // transaction to roll it back with.
    let session = state
        .gateway
        .create_audit_checkout_session(
            &record.id,
            &customer_id,
            state.audit_price_cents,
            &state.currency,
            &success_url,
            &cancel_url,
        )
        .await?;

    tracing::info!(
        "audit checkout initiated: audit_id={}, session={}",
        record.id,
        session.id
    );

    Ok(Json(CheckoutResponse {
        url: session.url,
        audit_id: record.id,
    }))
}
