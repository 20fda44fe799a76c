use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::StripeSettings;
use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Metadata tag marking checkout sessions and payment intents created by
/// this service. Events without it belong to some other product and are
/// acknowledged untouched.
pub const AUDIT_PAYMENT_TYPE: &str = "audit_payment";

/// Display name on the gateway-hosted checkout page.
const AUDIT_PRODUCT_NAME: &str = "Social Media Audit";

/// A checkout session created at the gateway.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Payment gateway operations the checkout flow depends on.
///
/// Constructed explicitly and injected through `AppState` so tests can
/// substitute a fake without live network calls. Signature verification is
/// pure local crypto and stays on the trait so the webhook handler has a
/// single collaborator.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Locate a gateway customer by email, creating one if none exists.
    /// Returns the customer id.
    async fn find_or_create_customer(&self, email: &str, name: &str) -> Result<String>;

    /// Create a one-time checkout session for an audit purchase. The audit
    /// record id goes into both the session metadata and the payment
    /// intent metadata, so every downstream event can be correlated back.
    async fn create_audit_checkout_session(
        &self,
        audit_id: &str,
        customer_id: &str,
        amount_cents: i64,
        currency: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession>;

    /// Verify a webhook signature over the exact raw payload bytes.
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool>;
}

#[derive(Debug, Deserialize)]
struct CreateCheckoutSessionResponse {
    id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct StripeCustomer {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CustomerListResponse {
    data: Vec<StripeCustomer>,
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    webhook_secret: String,
}

impl StripeClient {
    pub fn new(config: &StripeSettings) -> Self {
        Self {
            client: Client::new(),
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
        }
    }

    /// Maximum age of a webhook timestamp before it's rejected (in seconds).
    /// Stripe recommends 300 seconds (5 minutes).
    const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!("Stripe API error: {}", error_text)));
        }
        Ok(response)
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn find_or_create_customer(&self, email: &str, name: &str) -> Result<String> {
        // Reuse an existing customer for this email rather than minting a
        // duplicate on every checkout attempt.
        let response = self
            .client
            .get("https://api.stripe.com/v1/customers")
            .basic_auth(&self.secret_key, None::<&str>)
            .query(&[("email", email), ("limit", "1")])
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Stripe API error: {}", e)))?;

        let listing: CustomerListResponse = Self::check_response(response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("Failed to parse Stripe response: {}", e)))?;

        if let Some(existing) = listing.data.into_iter().next() {
            return Ok(existing.id);
        }

        let response = self
            .client
            .post("https://api.stripe.com/v1/customers")
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&[("email", email), ("name", name)])
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Stripe API error: {}", e)))?;

        let customer: StripeCustomer = Self::check_response(response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("Failed to parse Stripe response: {}", e)))?;

        Ok(customer.id)
    }

    async fn create_audit_checkout_session(
        &self,
        audit_id: &str,
        customer_id: &str,
        amount_cents: i64,
        currency: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession> {
        let amount = amount_cents.to_string();
        let response = self
            .client
            .post("https://api.stripe.com/v1/checkout/sessions")
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&[
                ("mode", "payment"),
                ("customer", customer_id),
                ("success_url", success_url),
                ("cancel_url", cancel_url),
                ("line_items[0][quantity]", "1"),
                ("line_items[0][price_data][currency]", currency),
                ("line_items[0][price_data][unit_amount]", amount.as_str()),
                ("line_items[0][price_data][product_data][name]", AUDIT_PRODUCT_NAME),
                ("metadata[type]", AUDIT_PAYMENT_TYPE),
                ("metadata[audit_id]", audit_id),
                // The payment intent carries the same correlation keys so
                // payment_intent.succeeded/payment_failed events can be
                // routed without a session lookup.
                ("payment_intent_data[metadata][type]", AUDIT_PAYMENT_TYPE),
                ("payment_intent_data[metadata][audit_id]", audit_id),
            ])
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Stripe API error: {}", e)))?;

        let session: CreateCheckoutSessionResponse = Self::check_response(response)
            .await?
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("Failed to parse Stripe response: {}", e)))?;

        Ok(CheckoutSession {
            id: session.id,
            url: session.url,
        })
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        // Stripe signature format: t=timestamp,v1=signature
        let parts: Vec<&str> = signature.split(',').collect();

        let mut timestamp = None;
        let mut sig_v1 = None;

        for part in parts {
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = Some(t);
            } else if let Some(s) = part.strip_prefix("v1=") {
                sig_v1 = Some(s);
            }
        }

        let timestamp_str = timestamp
            .ok_or_else(|| AppError::InvalidSignature("missing timestamp".into()))?;
        let sig_v1 =
            sig_v1.ok_or_else(|| AppError::InvalidSignature("missing v1 signature".into()))?;

        // Parse and validate timestamp to prevent replay attacks.
        // Reject webhooks older than WEBHOOK_TIMESTAMP_TOLERANCE_SECS.
        let timestamp: i64 = timestamp_str
            .parse()
            .map_err(|_| AppError::InvalidSignature("invalid timestamp".into()))?;

        let now = chrono::Utc::now().timestamp();
        let age = now - timestamp;

        if age > Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
            tracing::warn!(
                "Stripe webhook rejected: timestamp too old (age={}s, max={}s)",
                age,
                Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS
            );
            return Ok(false);
        }

        // Also reject timestamps from the future (clock skew tolerance: 60 seconds)
        if age < -60 {
            tracing::warn!(
                "Stripe webhook rejected: timestamp in the future (age={}s)",
                age
            );
            return Ok(false);
        }

        // Construct signed payload
        let signed_payload = format!("{}.{}", timestamp_str, String::from_utf8_lossy(payload));

        // Compute expected signature
        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal("invalid webhook secret".into()))?;
        mac.update(signed_payload.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        // Constant-time comparison so response timing leaks nothing about
        // the expected signature.
        let expected_bytes = expected.as_bytes();
        let provided_bytes = sig_v1.as_bytes();

        // Length check is not constant-time, but signature length is not
        // secret (always 64 hex chars for SHA-256).
        if expected_bytes.len() != provided_bytes.len() {
            return Ok(false);
        }

        Ok(expected_bytes.ct_eq(provided_bytes).into())
    }
}

// ============ Webhook payload types ============

/// Generic Stripe webhook event - object is parsed based on event_type
#[derive(Debug, Deserialize)]
pub struct StripeWebhookEvent {
    /// Event id (evt_xxx), used for replay prevention.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

/// Correlation metadata this service attaches at session creation.
#[derive(Debug, Default, Deserialize)]
pub struct StripeMetadata {
    #[serde(rename = "type", default)]
    pub payment_type: Option<String>,
    #[serde(default)]
    pub audit_id: Option<String>,
}

// ============ checkout.session.completed ============

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub payment_status: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub metadata: StripeMetadata,
}

// ============ payment_intent.succeeded / payment_intent.payment_failed ============

#[derive(Debug, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
    #[serde(default)]
    pub metadata: StripeMetadata,
}
