//! Holder-facing HTTP handlers, called by the chat front-ends.
//!
//! - POST /api/v1/redeem - Bind a key to a holder
//! - POST /api/v1/reset - Unbind the caller's own key
//! - GET /api/v1/holders/{holder}/key - The key bound to a holder

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use chrono::Utc;

use crate::{
    error::AppError,
    models::key::{KeyRecord, RedeemKeyRequest, ResetKeyRequest},
    services::key_service,
    state::AppState,
};

/// Redeem a key for a holder.
///
/// # Request Body
///
/// ```json
/// { "code": "ab12cd34", "holder": "112233445566778899" }
/// ```
///
/// # Errors
///
/// - 404 `key_not_found`
/// - 409 `key_already_redeemed`
/// - 410 `key_expired`
pub async fn redeem_key(
    State(state): State<AppState>,
    payload: Result<Json<RedeemKeyRequest>, JsonRejection>,
) -> Result<Json<KeyRecord>, AppError> {
    let Json(request) = payload?;
    let record =
        key_service::redeem_key(&state.store, &request.code, &request.holder, Utc::now()).await?;
    Ok(Json(record))
}

/// Self-service reset.
///
/// With a `code`, the key must be bound to `holder` (403 otherwise).
/// Without one, the key bound to `holder` is located first (404 if none).
pub async fn reset_own_key(
    State(state): State<AppState>,
    payload: Result<Json<ResetKeyRequest>, JsonRejection>,
) -> Result<Json<KeyRecord>, AppError> {
    let Json(request) = payload?;
    let record = match request.code {
        Some(code) => key_service::reset_key_for_holder(&state.store, &code, &request.holder).await?,
        None => key_service::reset_holder_key(&state.store, &request.holder).await?,
    };
    Ok(Json(record))
}

/// Look up the key bound to a holder.
///
/// # Endpoint
///
/// `GET /api/v1/holders/{holder}/key`
///
/// # Response
///
/// - **Success (200)**: the key record (the one expiring last if several)
/// - **Error (404)**: `key_not_found` when nothing is bound to `holder`
pub async fn holder_key(
    State(state): State<AppState>,
    Path(holder): Path<String>,
) -> Result<Json<KeyRecord>, AppError> {
    Ok(Json(key_service::find_key_by_holder(&state.store, &holder)?))
}
