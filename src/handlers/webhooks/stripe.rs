use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::db::AppState;
use crate::payments::{
    StripeCheckoutSession, StripePaymentIntent, StripeWebhookEvent, AUDIT_PAYMENT_TYPE,
};

use super::process::{process_payment_failed, process_payment_received, WebhookResult};

const PROVIDER: &str = "stripe";

/// A Stripe event reduced to the transition it asks for.
#[derive(Debug)]
enum AuditEvent {
    PaymentReceived {
        audit_id: String,
        payment_ref: String,
    },
    PaymentFailed {
        audit_id: String,
    },
    /// Not for us: unknown type, unpaid session, or foreign metadata.
    Ignored,
}

fn parse_event(event: &StripeWebhookEvent) -> Result<AuditEvent, WebhookResult> {
    match event.event_type.as_str() {
        "checkout.session.completed" => parse_checkout_completed(event),
        "payment_intent.succeeded" => {
            Ok(match parse_payment_intent(event)? {
                Some((audit_id, intent_id)) => AuditEvent::PaymentReceived {
                    audit_id,
                    payment_ref: intent_id,
                },
                None => AuditEvent::Ignored,
            })
        }
        "payment_intent.payment_failed" => {
            Ok(match parse_payment_intent(event)? {
                Some((audit_id, _)) => AuditEvent::PaymentFailed { audit_id },
                None => AuditEvent::Ignored,
            })
        }
        _ => Ok(AuditEvent::Ignored),
    }
}

fn parse_checkout_completed(event: &StripeWebhookEvent) -> Result<AuditEvent, WebhookResult> {
    let session: StripeCheckoutSession = serde_json::from_value(event.data.object.clone())
        .map_err(|e| {
            tracing::error!("Failed to parse checkout session: {}", e);
            (StatusCode::BAD_REQUEST, "Invalid checkout session")
        })?;

    // Sessions can complete without a settled charge (async payment
    // methods); the payment_intent events cover those.
    if session.payment_status != "paid" {
        return Ok(AuditEvent::Ignored);
    }

    if session.metadata.payment_type.as_deref() != Some(AUDIT_PAYMENT_TYPE) {
        return Ok(AuditEvent::Ignored);
    }
    let Some(audit_id) = session.metadata.audit_id.clone() else {
        tracing::warn!(
            "audit_payment checkout session {} has no audit_id metadata",
            session.id
        );
        return Ok(AuditEvent::Ignored);
    };

    // The payment intent is the durable reference (refund and dispute
    // events cite it); fall back to the session id if it's absent.
    let payment_ref = session.payment_intent.clone().unwrap_or(session.id);

    Ok(AuditEvent::PaymentReceived {
        audit_id,
        payment_ref,
    })
}

/// Extract (audit_id, intent_id) from a payment_intent event, if the intent
/// was created by our checkout flow.
fn parse_payment_intent(
    event: &StripeWebhookEvent,
) -> Result<Option<(String, String)>, WebhookResult> {
    let intent: StripePaymentIntent =
        serde_json::from_value(event.data.object.clone()).map_err(|e| {
            tracing::error!("Failed to parse payment intent: {}", e);
            (StatusCode::BAD_REQUEST, "Invalid payment intent")
        })?;

    if intent.metadata.payment_type.as_deref() != Some(AUDIT_PAYMENT_TYPE) {
        return Ok(None);
    }

    Ok(intent.metadata.audit_id.map(|audit_id| (audit_id, intent.id)))
}

async fn process_request(state: &AppState, headers: &HeaderMap, body: &Bytes) -> WebhookResult {
    let signature = match headers.get("stripe-signature") {
        Some(value) => match value.to_str() {
            Ok(s) => s.to_string(),
            Err(e) => {
                tracing::debug!("Invalid UTF-8 in Stripe signature header: {}", e);
                return (StatusCode::BAD_REQUEST, "Invalid signature header");
            }
        },
        None => return (StatusCode::BAD_REQUEST, "Missing stripe-signature header"),
    };

    // The signature covers the exact raw bytes; verify before parsing and
    // before any state is touched. This is the sole authentication boundary
    // between the gateway and the store.
    match state.gateway.verify_webhook_signature(body, &signature) {
        Ok(true) => {}
        Ok(false) => return (StatusCode::UNAUTHORIZED, "Invalid signature"),
        Err(e) => {
            tracing::warn!("Malformed Stripe signature header: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid signature header");
        }
    }

    let event: StripeWebhookEvent = match serde_json::from_slice(body) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to parse Stripe webhook: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid JSON");
        }
    };

    let parsed = match parse_event(&event) {
        Ok(p) => p,
        Err(result) => return result,
    };

    let mut conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("DB connection error: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    };

    let event_id = event.id.as_deref();
    match parsed {
        AuditEvent::PaymentReceived {
            audit_id,
            payment_ref,
        } => process_payment_received(&mut conn, PROVIDER, event_id, &audit_id, &payment_ref),
        AuditEvent::PaymentFailed { audit_id } => {
            process_payment_failed(&mut conn, PROVIDER, event_id, &audit_id)
        }
        AuditEvent::Ignored => (StatusCode::OK, "Event ignored"),
    }
}

/// Axum handler for Stripe webhooks.
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (status, detail) = process_request(&state, &headers, &body).await;
    if status.is_success() {
        (status, Json(json!({ "received": true }))).into_response()
    } else {
        (status, Json(json!({ "error": detail }))).into_response()
    }
}
