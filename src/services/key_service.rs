//! Key service - Core business logic for the key lifecycle.
//!
//! This service handles:
//! - Issuing keys with a bounded lifetime
//! - Binding a key to the first holder that redeems it
//! - Unbinding (reset), revoking and pruning keys
//! - Read-only lookups and counters
//!
//! # Atomicity Guarantees
//!
//! Every mutating operation runs inside `KeyStore::mutate`, which holds the
//! store's single writer lock across the read, the change and the file
//! write. Two concurrent redeems of the same code cannot both see it
//! unbound, and a prune cannot drop a key generated while it runs.
//!
//! All operations take the current time as `now` so callers decide the clock.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{
    error::AppError,
    models::key::{KeyDuration, KeyRecord, KeyStats, normalize_code, random_code},
    store::{KeyMap, KeyStore, Mutation},
};

/// Largest number of keys issued by one batch request.
pub const MAX_BATCH_SIZE: usize = 10_000;

/// Which expired keys a prune pass removes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrunePolicy {
    /// Remove every expired key, redeemed or not.
    #[default]
    All,
    /// Keep expired keys that were redeemed, for audit.
    KeepRedeemed,
}

/// Issue a new key valid for `duration` from `now`.
///
/// # Process
///
/// 1. Parse the duration (`10m`, `2h`, `1d`, ...)
/// 2. Draw a code not present in the store (re-draw on collision)
/// 3. Insert and persist the record
///
/// # Errors
///
/// - `InvalidDuration`: unknown unit, non-integer or non-positive magnitude
/// - `Storage`: the store could not be written
pub async fn generate_key(
    store: &KeyStore,
    duration: &str,
    now: DateTime<Utc>,
) -> Result<KeyRecord, AppError> {
    let duration: KeyDuration = duration.parse()?;
    let expires_at = duration.expires_from(now)?;

    let record = store
        .mutate(|keys| {
            let record = issue(keys, now, expires_at);
            Ok::<_, AppError>(Mutation::Changed(record))
        })
        .await?;

    tracing::info!(
        code = %record.code,
        duration = %duration,
        expires_at = %record.expires_at,
        "Key generated"
    );

    Ok(record)
}

/// Issue `count` keys sharing one lifetime, persisted with a single write.
///
/// # Errors
///
/// - `InvalidRequest`: `count` is zero or above `MAX_BATCH_SIZE`
/// - `InvalidDuration`, `Storage`: as for `generate_key`
pub async fn generate_keys(
    store: &KeyStore,
    duration: &str,
    count: usize,
    now: DateTime<Utc>,
) -> Result<Vec<KeyRecord>, AppError> {
    if count == 0 || count > MAX_BATCH_SIZE {
        return Err(AppError::InvalidRequest(format!(
            "Count must be between 1 and {MAX_BATCH_SIZE}"
        )));
    }

    let duration: KeyDuration = duration.parse()?;
    let expires_at = duration.expires_from(now)?;

    let records = store
        .mutate(|keys| {
            let records: Vec<KeyRecord> =
                (0..count).map(|_| issue(keys, now, expires_at)).collect();
            Ok::<_, AppError>(Mutation::Changed(records))
        })
        .await?;

    tracing::info!(count, duration = %duration, "Key batch generated");

    Ok(records)
}

fn issue(keys: &mut KeyMap, now: DateTime<Utc>, expires_at: DateTime<Utc>) -> KeyRecord {
    let code = loop {
        let candidate = random_code();
        if !keys.contains_key(&candidate) {
            break candidate;
        }
    };

    let record = KeyRecord {
        code: code.clone(),
        created_at: now,
        expires_at,
        redeemed_by: None,
    };
    keys.insert(code, record.clone());
    record
}

/// Bind a key to `holder`.
///
/// # Rules (checked in this order)
///
/// 1. Unknown code → `KeyNotFound`
/// 2. Bound to someone else → `KeyAlreadyRedeemed`
/// 3. Past expiry → `KeyExpired` (even for the current holder)
/// 4. Already bound to `holder` → success, nothing written
/// 5. Otherwise bind and persist
pub async fn redeem_key(
    store: &KeyStore,
    code: &str,
    holder: &str,
    now: DateTime<Utc>,
) -> Result<KeyRecord, AppError> {
    let code = normalize_code(code);
    if holder.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "Holder must not be empty".to_string(),
        ));
    }

    let record = store
        .mutate(|keys| {
            let record = keys.get_mut(&code).ok_or(AppError::KeyNotFound)?;

            if record.is_redeemed() && !record.is_held_by(holder) {
                return Err(AppError::KeyAlreadyRedeemed);
            }

            if record.is_expired_at(now) {
                return Err(AppError::KeyExpired);
            }

            if record.is_redeemed() {
                return Ok(Mutation::Unchanged(record.clone()));
            }

            record.redeemed_by = Some(holder.to_string());
            Ok(Mutation::Changed(record.clone()))
        })
        .await?;

    tracing::info!(code = %record.code, holder, "Key redeemed");

    Ok(record)
}

/// Unbind a key from whoever holds it. No ownership or expiry check.
///
/// # Errors
///
/// - `KeyNotFound`: unknown code
pub async fn reset_key(store: &KeyStore, code: &str) -> Result<KeyRecord, AppError> {
    let code = normalize_code(code);

    let record = store
        .mutate(|keys| {
            let record = keys.get_mut(&code).ok_or(AppError::KeyNotFound)?;
            Ok::<_, AppError>(clear_holder(record))
        })
        .await?;

    tracing::info!(code = %record.code, "Key reset");

    Ok(record)
}

/// Unbind a key, but only if it is currently bound to `holder`.
///
/// # Errors
///
/// - `KeyNotFound`: unknown code
/// - `NotKeyHolder`: the key is unbound or bound to someone else
pub async fn reset_key_for_holder(
    store: &KeyStore,
    code: &str,
    holder: &str,
) -> Result<KeyRecord, AppError> {
    let code = normalize_code(code);

    let record = store
        .mutate(|keys| {
            let record = keys.get_mut(&code).ok_or(AppError::KeyNotFound)?;
            if !record.is_held_by(holder) {
                return Err(AppError::NotKeyHolder);
            }
            Ok(clear_holder(record))
        })
        .await?;

    tracing::info!(code = %record.code, holder, "Key reset by holder");

    Ok(record)
}

/// Locate the key bound to `holder` and unbind it, in one locked step.
///
/// # Errors
///
/// - `KeyNotFound`: no key is bound to `holder`
pub async fn reset_holder_key(store: &KeyStore, holder: &str) -> Result<KeyRecord, AppError> {
    let record = store
        .mutate(|keys| {
            let code = held_by(keys, holder)
                .map(|record| record.code.clone())
                .ok_or(AppError::KeyNotFound)?;
            let record = keys.get_mut(&code).ok_or(AppError::KeyNotFound)?;
            Ok::<_, AppError>(clear_holder(record))
        })
        .await?;

    tracing::info!(code = %record.code, holder, "Key reset by holder");

    Ok(record)
}

fn clear_holder(record: &mut KeyRecord) -> Mutation<KeyRecord> {
    match record.redeemed_by.take() {
        Some(_) => Mutation::Changed(record.clone()),
        None => Mutation::Unchanged(record.clone()),
    }
}

/// Delete a key.
///
/// # Errors
///
/// - `KeyNotFound`: unknown code
pub async fn revoke_key(store: &KeyStore, code: &str) -> Result<KeyRecord, AppError> {
    let code = normalize_code(code);

    let record = store
        .mutate(|keys| {
            keys.remove(&code)
                .map(Mutation::Changed)
                .ok_or(AppError::KeyNotFound)
        })
        .await?;

    tracing::info!(code = %record.code, "Key revoked");

    Ok(record)
}

/// Fetch a key without changing it.
pub fn key_info(store: &KeyStore, code: &str) -> Result<KeyRecord, AppError> {
    store
        .snapshot()
        .get(&normalize_code(code))
        .cloned()
        .ok_or(AppError::KeyNotFound)
}

/// Find the key bound to `holder`; the one expiring last if several are.
pub fn find_key_by_holder(store: &KeyStore, holder: &str) -> Result<KeyRecord, AppError> {
    held_by(&store.snapshot(), holder)
        .cloned()
        .ok_or(AppError::KeyNotFound)
}

fn held_by<'a>(keys: &'a KeyMap, holder: &str) -> Option<&'a KeyRecord> {
    keys.values()
        .filter(|record| record.is_held_by(holder))
        .max_by_key(|record| record.expires_at)
}

/// Delete every key with `expires_at < now` (subject to `policy`).
///
/// Returns how many keys were removed; zero is not an error.
pub async fn prune_expired(
    store: &KeyStore,
    policy: PrunePolicy,
    now: DateTime<Utc>,
) -> Result<usize, AppError> {
    let removed = store
        .mutate(|keys| {
            let before = keys.len();
            keys.retain(|_, record| {
                !record.is_expired_at(now)
                    || (policy == PrunePolicy::KeepRedeemed && record.is_redeemed())
            });

            let removed = before - keys.len();
            Ok::<_, AppError>(if removed > 0 {
                Mutation::Changed(removed)
            } else {
                Mutation::Unchanged(0)
            })
        })
        .await?;

    if removed > 0 {
        tracing::info!(removed, "Expired keys pruned");
    }

    Ok(removed)
}

/// Counters over the current snapshot.
pub fn key_stats(store: &KeyStore, now: DateTime<Utc>) -> KeyStats {
    let keys = store.snapshot();
    KeyStats {
        total: keys.len(),
        redeemed: keys.values().filter(|r| r.is_redeemed()).count(),
        active: keys.values().filter(|r| !r.is_expired_at(now)).count(),
    }
}
