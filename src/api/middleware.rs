use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

use crate::AppState;

/// Compare the named header against `expected`, logging the path on failure
fn check_key(request: &Request<Body>, header: &str, expected: &str) -> Result<(), StatusCode> {
    let provided = request.headers().get(header).and_then(|v| v.to_str().ok());

    match provided {
        Some(key) if key == expected => Ok(()),
        Some(_) => {
            warn!("Invalid {} for {}", header, request.uri().path());
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            warn!("Missing {} header for {}", header, request.uri().path());
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Gate registry, identity, dev and event routes behind `X-API-Key`.
///
/// Open mode when `API_KEY` is not set.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected_key) = &state.config.api_key else {
        return Ok(next.run(request).await);
    };

    check_key(&request, "X-API-Key", expected_key)?;
    Ok(next.run(request).await)
}

/// Gate proxy administration (upgrades, initialization, ownership) behind `X-Admin-API-Key`.
///
/// Admin routes are disabled entirely when `ADMIN_API_KEY` is not set. The
/// on-chain owner check still applies to every admin call.
pub async fn require_admin_api_key(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected_key) = &state.config.admin_api_key else {
        warn!("Admin endpoint called but ADMIN_API_KEY is not configured");
        return Err(StatusCode::FORBIDDEN);
    };

    check_key(&request, "X-Admin-API-Key", expected_key)?;
    Ok(next.run(request).await)
}
