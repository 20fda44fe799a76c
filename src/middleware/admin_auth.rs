use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::db::AppState;

fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Require the configured admin API key on internal dashboard routes.
pub async fn admin_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // The internal router isn't mounted without a key, but fail closed in
    // case that ever changes.
    let Some(expected) = state.admin_api_key.as_deref() else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    let token = extract_bearer_token(request.headers()).ok_or(StatusCode::UNAUTHORIZED)?;

    // Length is checked first; only equal-length keys reach the
    // constant-time comparison.
    if token.len() != expected.len()
        || !bool::from(token.as_bytes().ct_eq(expected.as_bytes()))
    {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}
