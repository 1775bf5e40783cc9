//! Bearer-token authentication middleware.
//!
//! Resolves the `Authorization: Bearer` credential to a
//! [`ClientIdentity`] and stores it in request extensions. Requests
//! without a valid token never reach the handler.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::app::AppState;
use crate::error::ApiError;

/// Middleware that requires a valid bearer token.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) => token,
        None => {
            return ApiError::Unauthorized("Missing or invalid Authorization header".into())
                .into_response();
        }
    };

    match state.identity.resolve(token) {
        Ok(identity) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(err) => {
            tracing::debug!(error = %err, "token resolution failed");
            ApiError::from(err).into_response()
        }
    }
}
