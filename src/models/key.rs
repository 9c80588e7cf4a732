//! Access key model and API request/response types.
//!
//! This module defines:
//! - `KeyRecord`: a single issued key and its binding state
//! - `KeyDuration`: the lifetime requested when issuing a key (`10m`, `2h`, `1d`)
//! - Code generation and normalisation helpers
//! - Request and response bodies used by the HTTP handlers

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Number of symbols in a key code.
pub const CODE_LEN: usize = 8;

/// Symbols a key code is drawn from (36 symbols, ~4.1e12 codes of length 8).
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Represents one issued access key.
///
/// # Lifecycle
///
/// - Created by `generate_key` with `redeemed_by = None`
/// - Bound to a holder by the first successful `redeem_key`
/// - Unbound again only by an explicit reset
/// - Removed by `revoke_key` or by a prune pass once expired
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyRecord {
    /// 8-character uppercase alphanumeric code, unique within the store
    pub code: String,

    /// When the key was issued
    pub created_at: DateTime<Utc>,

    /// Instant after which the key is unusable (never changes)
    pub expires_at: DateTime<Utc>,

    /// Identity the key is bound to, if it has been redeemed
    pub redeemed_by: Option<String>,
}

impl KeyRecord {
    /// A key is expired once `now` is strictly past `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_redeemed(&self) -> bool {
        self.redeemed_by.is_some()
    }

    pub fn is_held_by(&self, holder: &str) -> bool {
        self.redeemed_by.as_deref() == Some(holder)
    }
}

/// Unit of a `KeyDuration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationUnit {
    Minute,
    Hour,
    Day,
}

impl DurationUnit {
    fn parse(unit: &str) -> Option<Self> {
        match unit.to_ascii_lowercase().as_str() {
            "m" | "min" | "minute" | "minutes" => Some(Self::Minute),
            "h" | "hour" | "hours" => Some(Self::Hour),
            "d" | "day" | "days" => Some(Self::Day),
            _ => None,
        }
    }

    fn suffix(self) -> char {
        match self {
            Self::Minute => 'm',
            Self::Hour => 'h',
            Self::Day => 'd',
        }
    }
}

/// Lifetime of a key: a positive integer magnitude and a unit.
///
/// Parsed from strings such as `10m`, `2h`, `1d`, `3 days` or `45 minutes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDuration {
    magnitude: i64,
    unit: DurationUnit,
}

impl KeyDuration {
    pub fn new(magnitude: i64, unit: DurationUnit) -> Result<Self, AppError> {
        if magnitude <= 0 {
            return Err(AppError::InvalidDuration(
                "Duration must be positive".to_string(),
            ));
        }

        let duration = Self { magnitude, unit };
        // Reject magnitudes chrono cannot represent up front
        duration.as_time_delta()?;
        Ok(duration)
    }

    /// Convert to a `TimeDelta`, failing if the span is not representable.
    pub fn as_time_delta(&self) -> Result<TimeDelta, AppError> {
        let delta = match self.unit {
            DurationUnit::Minute => TimeDelta::try_minutes(self.magnitude),
            DurationUnit::Hour => TimeDelta::try_hours(self.magnitude),
            DurationUnit::Day => TimeDelta::try_days(self.magnitude),
        };

        delta.ok_or_else(|| AppError::InvalidDuration("Duration is too large".to_string()))
    }

    /// Instant at which a key issued at `now` with this lifetime expires.
    pub fn expires_from(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, AppError> {
        now.checked_add_signed(self.as_time_delta()?)
            .ok_or_else(|| AppError::InvalidDuration("Duration is too large".to_string()))
    }
}

impl FromStr for KeyDuration {
    type Err = AppError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        let invalid =
            || AppError::InvalidDuration(format!("Invalid duration '{input}'. Example: 10m, 2h, 1d"));

        let split = input
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(input.len());
        let (digits, unit) = input.split_at(split);

        if digits.is_empty() {
            return Err(invalid());
        }

        let unit = DurationUnit::parse(unit.trim()).ok_or_else(|| {
            AppError::InvalidDuration(format!(
                "Invalid duration unit in '{input}'. Use m, h, or d"
            ))
        })?;

        let magnitude: i64 = digits.parse().map_err(|_| invalid())?;

        Self::new(magnitude, unit)
    }
}

impl fmt::Display for KeyDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.magnitude, self.unit.suffix())
    }
}

/// Draw a fresh random key code.
pub fn random_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Normalise user input to the stored code form (trimmed, uppercase).
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Whether `code` has the exact shape of a stored key code.
pub fn is_valid_code(code: &str) -> bool {
    code.len() == CODE_LEN
        && code
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// Request to issue a new key.
///
/// # JSON Example
///
/// ```json
/// { "duration": "2h" }
/// ```
#[derive(Debug, Deserialize)]
pub struct GenerateKeyRequest {
    pub duration: String,
}

/// Request to issue several keys with the same lifetime.
#[derive(Debug, Deserialize)]
pub struct GenerateBatchRequest {
    pub duration: String,
    pub count: usize,
}

/// Request to redeem a key on behalf of a holder.
///
/// # JSON Example
///
/// ```json
/// { "code": "AB12CD34", "holder": "112233445566778899" }
/// ```
#[derive(Debug, Deserialize)]
pub struct RedeemKeyRequest {
    pub code: String,
    pub holder: String,
}

/// Self-service request to unbind a holder's key.
///
/// When `code` is omitted the key currently bound to `holder` is located.
#[derive(Debug, Deserialize)]
pub struct ResetKeyRequest {
    pub holder: String,
    pub code: Option<String>,
}

/// Result of a prune pass.
#[derive(Debug, Serialize)]
pub struct PruneResponse {
    pub removed: usize,
}

/// Counters shown on the admin stats view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeyStats {
    /// Keys currently in the store
    pub total: usize,

    /// Keys bound to a holder
    pub redeemed: usize,

    /// Keys not yet expired
    pub active: usize,
}
