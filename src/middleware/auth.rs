//! API token authentication middleware.
//!
//! This middleware intercepts every protected request to:
//! 1. Extract the token from the Authorization header
//! 2. Hash it and compare with the configured token's hash
//! 3. Reject unauthorized requests with HTTP 401

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};

use crate::{error::AppError, state::AppState};

/// SHA-256 of `token`, hex encoded.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// API token authentication middleware function.
///
/// # Headers
///
/// Expected header format:
/// ```text
/// Authorization: Bearer <API_TOKEN>
/// ```
///
/// # Returns
///
/// - `Ok(Response)` if the token matches (calls next handler)
/// - `Err(AppError::InvalidApiToken)` otherwise (returns 401)
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AppError::InvalidApiToken)?;

    if hash_token(token) != *state.api_token_hash {
        tracing::warn!("Rejected request with invalid API token");
        return Err(AppError::InvalidApiToken);
    }

    Ok(next.run(request).await)
}
