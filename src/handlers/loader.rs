//! Script delivery endpoint.
//!
//! Unauthenticated: the key itself is the credential. Responses are plain
//! text so the script runtime can print rejections as Lua comments.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;

use crate::{error::AppError, services::access_gateway, state::AppState};

#[derive(Debug, Deserialize)]
pub struct ScriptQuery {
    pub key: Option<String>,
}

/// Liveness text for the script runtime.
///
/// # Endpoint
///
/// `GET /` → `200 text/plain`
pub async fn index() -> &'static str {
    "Script loader is online."
}

/// Serve the protected script.
///
/// # Responses
///
/// - 200: script with the holder identity embedded
/// - 400 `Missing key`: no `key` query parameter
/// - 403 `-- Invalid key` / `-- Key expired` / `-- Key not redeemed`
pub async fn serve_script(
    State(state): State<AppState>,
    Query(query): Query<ScriptQuery>,
) -> Response {
    let Some(key) = query.key.filter(|k| !k.trim().is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing key").into_response();
    };

    match access_gateway::authorize(&state.store, &key, Utc::now()) {
        Ok(holder) => render_script(&holder, &state.script).into_response(),
        Err(err) => rejection(err),
    }
}

fn rejection(err: AppError) -> Response {
    let message = match err {
        AppError::InvalidKey => "-- Invalid key",
        AppError::NotRedeemed => "-- Key not redeemed",
        AppError::Expired => "-- Key expired",
        other => return other.into_response(),
    };
    (StatusCode::FORBIDDEN, message).into_response()
}

fn render_script(holder: &str, script: &str) -> String {
    format!(
        "-- Authorized Lua script\nlocal HOLDER_ID = {}\nprint(\"Welcome user ID: \" .. HOLDER_ID)\n{}",
        lua_string(holder),
        script
    )
}

/// Quote `value` as a Lua string literal.
fn lua_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c if c.is_ascii_control() => out.push_str(&format!("\\{:03}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
