//! `X-API-Key` header check for the `/api` routes

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::{Error, Result};
use crate::server::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Reject requests whose `X-API-Key` does not match the configured key.
///
/// With no key configured every request is denied.
pub async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Result<Response> {
    let server = &state.config().server;
    if !server.require_api_key {
        return Ok(next.run(request).await);
    }

    let Some(expected) = server.api_key.as_deref() else {
        tracing::error!(
            "CRITICAL: API key security is enforced, but no API_KEY is configured on the server. \
             All API requests requiring this key will be denied."
        );
        return Err(Error::Unauthorized);
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if provided != Some(expected) {
        tracing::warn!("Rejected request to {} with invalid API key", request.uri().path());
        return Err(Error::Unauthorized);
    }

    Ok(next.run(request).await)
}
