//! Access gateway - read-only key check for the script delivery endpoint.
//!
//! Never mutates the store; works against the current committed snapshot.

use chrono::{DateTime, Utc};

use crate::{error::AppError, models::key::normalize_code, store::KeyStore};

/// Validate a key presented to the delivery endpoint and return its holder.
///
/// # Checks (in this order)
///
/// 1. Unknown code → `InvalidKey`
/// 2. Past expiry → `Expired` (whether or not it was redeemed)
/// 3. Never redeemed → `NotRedeemed`
pub fn authorize(store: &KeyStore, code: &str, now: DateTime<Utc>) -> Result<String, AppError> {
    let keys = store.snapshot();
    let record = keys
        .get(&normalize_code(code))
        .ok_or(AppError::InvalidKey)?;

    if record.is_expired_at(now) {
        return Err(AppError::Expired);
    }

    record.redeemed_by.clone().ok_or(AppError::NotRedeemed)
}
