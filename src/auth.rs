use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::config::Config;

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": message, "code": 401 }))).into_response()
}

/// Bearer-key check for `/api/v1`. Without a configured `api_key` every
/// request passes.
pub async fn auth_middleware(
    State(config): State<Arc<Config>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    if config.api_key.is_none() {
        return Ok(next.run(request).await);
    }

    let auth_header = headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| unauthorized("Missing Authorization header"))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or_else(|| unauthorized("Invalid Authorization format. Use: Bearer <token>"))?;

    if !config.is_valid_api_key(token) {
        tracing::warn!("Rejected request with an invalid API key");
        return Err(unauthorized("Invalid API key"));
    }

    Ok(next.run(request).await)
}
