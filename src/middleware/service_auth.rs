use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::AppState;

pub const SERVICE_KEY_HEADER: &str = "X-Service-Key";

/// Middleware that requires a valid X-Service-Key header (identity bridge only)
pub async fn require_service_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let expected_key = state.config.service_api_key.as_bytes();

    let provided_key = request
        .headers()
        .get(SERVICE_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // Constant-time comparison to prevent timing attacks
    if expected_key.ct_eq(provided_key.as_bytes()).into() {
        Ok(next.run(request).await)
    } else {
        tracing::warn!("Rejected session request with bad service key");
        Err(StatusCode::UNAUTHORIZED)
    }
}
