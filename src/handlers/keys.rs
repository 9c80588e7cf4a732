//! Admin key management HTTP handlers.
//!
//! This module implements the issuance, info, revocation and maintenance endpoints:
//! - POST /api/v1/keys - Issue a key
//! - POST /api/v1/keys/batch - Issue several keys
//! - GET /api/v1/keys/{code} - Key details
//! - DELETE /api/v1/keys/{code} - Revoke a key
//! - POST /api/v1/keys/{code}/reset - Unbind a key from its holder
//! - POST /api/v1/keys/prune - Remove expired keys now
//! - GET /api/v1/stats - Key counters

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::Utc;

use crate::{
    error::AppError,
    models::key::{GenerateBatchRequest, GenerateKeyRequest, KeyRecord, KeyStats, PruneResponse},
    services::key_service,
    state::AppState,
};

/// Issue a new key.
///
/// # Request Body
///
/// ```json
/// { "duration": "2h" }
/// ```
///
/// # Response (201)
///
/// ```json
/// {
///   "code": "AB12CD34",
///   "created_at": "2025-06-01T12:00:00.123456Z",
///   "expires_at": "2025-06-01T14:00:00.123456Z",
///   "redeemed_by": null
/// }
/// ```
pub async fn create_key(
    State(state): State<AppState>,
    payload: Result<Json<GenerateKeyRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<KeyRecord>), AppError> {
    let Json(request) = payload?;
    let record = key_service::generate_key(&state.store, &request.duration, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Issue `count` keys at once.
pub async fn create_keys_batch(
    State(state): State<AppState>,
    payload: Result<Json<GenerateBatchRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Vec<KeyRecord>>), AppError> {
    let Json(request) = payload?;
    let records =
        key_service::generate_keys(&state.store, &request.duration, request.count, Utc::now())
            .await?;
    Ok((StatusCode::CREATED, Json(records)))
}

/// Fetch a key's details.
///
/// # Endpoint
///
/// `GET /api/v1/keys/{code}` (code is case-insensitive)
///
/// # Response
///
/// - **Success (200)**: the key record
/// - **Error (404)**: `key_not_found`
pub async fn get_key(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<KeyRecord>, AppError> {
    Ok(Json(key_service::key_info(&state.store, &code)?))
}

/// Revoke (delete) a key. Returns 204 No Content.
pub async fn revoke_key(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<StatusCode, AppError> {
    key_service::revoke_key(&state.store, &code).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Unbind a key regardless of who holds it.
pub async fn reset_key(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<KeyRecord>, AppError> {
    Ok(Json(key_service::reset_key(&state.store, &code).await?))
}

/// Run a prune pass now, with the configured policy.
///
/// # Response (200)
///
/// ```json
/// { "removed": 3 }
/// ```
pub async fn prune_keys(State(state): State<AppState>) -> Result<Json<PruneResponse>, AppError> {
    let removed =
        key_service::prune_expired(&state.store, state.prune_policy, Utc::now()).await?;
    Ok(Json(PruneResponse { removed }))
}

/// Key counters.
///
/// # Response (200)
///
/// ```json
/// { "total": 12, "redeemed": 5, "active": 9 }
/// ```
pub async fn stats(State(state): State<AppState>) -> Json<KeyStats> {
    Json(key_service::key_stats(&state.store, Utc::now()))
}
