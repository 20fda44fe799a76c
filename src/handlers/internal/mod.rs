mod audits;

pub use audits::*;

use axum::{
    middleware,
    routing::{get, patch},
    Router,
};

use crate::db::AppState;
use crate::middleware::admin_auth;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/internal/audits", get(list_audits))
        .route("/internal/audits/{id}", get(get_audit))
        .route("/internal/audits/{id}/status", patch(update_audit_status))
        .route_layer(middleware::from_fn_with_state(state, admin_auth))
}
