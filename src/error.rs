//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::store::StoreError;

/// Application-wide error type.
///
/// Each variant maps to a specific HTTP status code and error message.
///
/// # Error Categories
///
/// - **Storage Errors**: the key file could not be read, parsed or written
/// - **Authentication Errors**: missing or wrong API token
/// - **Lifecycle Errors**: the requested key transition is not allowed
/// - **Gateway Errors**: the delivery endpoint refused a key
/// - **Validation Errors**: invalid request data
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Reading or writing the key store failed, or its contents are corrupt.
    ///
    /// Returns HTTP 500. Details are logged, never sent to the client.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// API token is missing or wrong.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid API token")]
    InvalidApiToken,

    /// Duration string could not be parsed, or is zero or negative.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("Invalid duration")]
    InvalidDuration(String),

    /// No key with the given code exists.
    ///
    /// Returns HTTP 404 Not Found.
    #[error("Key not found")]
    KeyNotFound,

    /// Key is already bound to a different holder.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("Key already redeemed by another user")]
    KeyAlreadyRedeemed,

    /// Key is past its expiry.
    ///
    /// Returns HTTP 410 Gone.
    #[error("Key has expired")]
    KeyExpired,

    /// Caller asked to reset a key bound to someone else.
    ///
    /// Returns HTTP 403 Forbidden.
    #[error("Key is not bound to this holder")]
    NotKeyHolder,

    /// Delivery endpoint: unknown key.
    #[error("Invalid key")]
    InvalidKey,

    /// Delivery endpoint: key exists but nobody redeemed it.
    #[error("Key not redeemed")]
    NotRedeemed,

    /// Delivery endpoint: key is past its expiry.
    #[error("Key expired")]
    Expired,

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    /// The String contains details about what was invalid.
    #[error("Invalid request")]
    InvalidRequest(String),
}

/// Malformed or incomplete JSON bodies become `InvalidRequest` (400).
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// The delivery endpoint answers in plain text instead and does its own
/// mapping (see `handlers::loader`).
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::InvalidApiToken => (
                StatusCode::UNAUTHORIZED,
                "invalid_api_token",
                self.to_string(),
            ),
            AppError::InvalidDuration(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_duration", msg.clone())
            }
            AppError::KeyNotFound | AppError::InvalidKey => {
                (StatusCode::NOT_FOUND, "key_not_found", self.to_string())
            }
            AppError::KeyAlreadyRedeemed => (
                StatusCode::CONFLICT,
                "key_already_redeemed",
                self.to_string(),
            ),
            AppError::KeyExpired | AppError::Expired => {
                (StatusCode::GONE, "key_expired", self.to_string())
            }
            AppError::NotKeyHolder => (StatusCode::FORBIDDEN, "not_key_holder", self.to_string()),
            AppError::NotRedeemed => (StatusCode::FORBIDDEN, "not_redeemed", self.to_string()),
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::Storage(ref err) => {
                tracing::error!(error = %err, "Key store failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
