mod checkout;
mod confirm;

pub use checkout::*;
pub use confirm::*;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::config::RateLimitSettings;
use crate::db::AppState;
use crate::rate_limit;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(settings: RateLimitSettings) -> Router<AppState> {
    // Checkout calls out to the payment gateway, so it sits behind the
    // strict tier; the landing endpoint only reads local state.
    let strict = Router::new()
        .route("/audit/checkout", post(initiate_audit_checkout))
        .route_layer(rate_limit::strict_layer(settings.strict_rpm));

    let standard = Router::new()
        .route("/payment/success", get(payment_success))
        .route_layer(rate_limit::standard_layer(settings.standard_rpm));

    Router::new()
        .route("/health", get(health))
        .merge(strict)
        .merge(standard)
}
