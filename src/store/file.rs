//! JSON file persistence for the key store.
//!
//! The file is a single JSON object keyed by code:
//!
//! ```json
//! {
//!   "AB12CD34": {
//!     "created_at": "2025-06-01T12:00:00.123456Z",
//!     "expires_at": "2025-06-01T14:00:00.123456Z",
//!     "redeemed_by": null
//!   }
//! }
//! ```
//!
//! Saves go to a sibling `.tmp` file which is synced and then renamed over
//! the target, so readers of the file only ever see a complete document.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tokio::io::AsyncWriteExt;

use super::{KeyMap, StoreError};
use crate::models::key::{KeyRecord, is_valid_code};

/// On-disk form of a record; the code is the map key.
#[derive(Debug, Serialize, Deserialize)]
struct StoredKey {
    #[serde(deserialize_with = "deserialize_timestamp")]
    created_at: DateTime<Utc>,

    #[serde(deserialize_with = "deserialize_timestamp")]
    expires_at: DateTime<Utc>,

    #[serde(default)]
    redeemed_by: Option<String>,
}

/// Handle to the key file on disk.
#[derive(Debug, Clone)]
pub struct KeyFile {
    path: PathBuf,
}

impl KeyFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole mapping.
    ///
    /// A missing file is an empty store. Anything that does not parse into
    /// valid records is `StoreError::Corrupted`.
    pub async fn load(&self) -> Result<KeyMap, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(KeyMap::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        decode(&bytes).map_err(|reason| StoreError::Corrupted {
            path: self.path.clone(),
            reason,
        })
    }

    /// Overwrite the file with `keys`. Either the new document is fully in
    /// place afterwards or the previous one is untouched.
    pub async fn save(&self, keys: &KeyMap) -> Result<(), StoreError> {
        let bytes = encode(keys)?;
        let tmp_path = self.tmp_path();

        if let Err(e) = write_synced(&tmp_path, &bytes).await {
            tokio::fs::remove_file(&tmp_path).await.ok();
            return Err(self.io_error(e));
        }

        if let Err(e) = tokio::fs::rename(&tmp_path, &self.path).await {
            tokio::fs::remove_file(&tmp_path).await.ok();
            return Err(self.io_error(e));
        }

        // Make the rename itself durable
        sync_dir(self.parent_dir())
            .await
            .map_err(|e| self.io_error(e))
    }

    /// Directory holding the file; `.` for a bare file name.
    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("keys.json"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::File::open(dir).await?.sync_all().await
}

// Directories cannot be opened as files here; rename durability is left to the OS
#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

fn encode(keys: &KeyMap) -> Result<Vec<u8>, StoreError> {
    let stored: BTreeMap<&str, StoredKey> = keys
        .values()
        .map(|record| {
            (
                record.code.as_str(),
                StoredKey {
                    created_at: record.created_at,
                    expires_at: record.expires_at,
                    redeemed_by: record.redeemed_by.clone(),
                },
            )
        })
        .collect();

    Ok(serde_json::to_vec_pretty(&stored)?)
}

fn decode(bytes: &[u8]) -> Result<KeyMap, String> {
    let stored: BTreeMap<String, StoredKey> =
        serde_json::from_slice(bytes).map_err(|e| e.to_string())?;

    let mut keys = KeyMap::new();
    for (code, entry) in stored {
        if !is_valid_code(&code) {
            return Err(format!("invalid key code '{code}'"));
        }
        if entry.expires_at <= entry.created_at {
            return Err(format!("key '{code}' expires before it was created"));
        }

        // Older files store an empty string for "not redeemed"
        let redeemed_by = entry.redeemed_by.filter(|holder| !holder.is_empty());

        keys.insert(
            code.clone(),
            KeyRecord {
                code,
                created_at: entry.created_at,
                expires_at: entry.expires_at,
                redeemed_by,
            },
        );
    }

    Ok(keys)
}

/// Accepts RFC 3339 timestamps, and naive ISO-8601 ones (no offset) as UTC.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    raw.parse::<NaiveDateTime>()
        .map(|naive| naive.and_utc())
        .map_err(|_| format!("invalid timestamp '{raw}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn record(code: &str, redeemed_by: Option<&str>) -> KeyRecord {
        let created_at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
            + TimeDelta::nanoseconds(123_456_789);
        KeyRecord {
            code: code.to_string(),
            created_at,
            expires_at: created_at + TimeDelta::hours(2),
            redeemed_by: redeemed_by.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let file = KeyFile::new(dir.path().join("keys.json"));

        assert!(file.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_then_load_preserves_records() {
        let dir = tempfile::tempdir().unwrap();
        let file = KeyFile::new(dir.path().join("keys.json"));

        let mut keys = KeyMap::new();
        for rec in [record("AB12CD34", None), record("ZZZZ0000", Some("U1"))] {
            keys.insert(rec.code.clone(), rec);
        }

        file.save(&keys).await.unwrap();
        let loaded = file.load().await.unwrap();

        assert_eq!(loaded, keys);
        assert!(!file.tmp_path().exists());
    }

    #[test]
    fn parent_dir_of_bare_name_is_cwd() {
        assert_eq!(KeyFile::new("keys.json").parent_dir(), Path::new("."));
        assert_eq!(
            KeyFile::new("/var/lib/keygate/keys.json").parent_dir(),
            Path::new("/var/lib/keygate")
        );
    }

    #[tokio::test]
    async fn save_into_missing_directory_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let file = KeyFile::new(dir.path().join("gone").join("keys.json"));

        let err = file.save(&KeyMap::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }

    #[tokio::test]
    async fn garbage_is_corruption_not_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let err = KeyFile::new(&path).load().await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupted { .. }));
    }

    #[tokio::test]
    async fn bad_records_are_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");

        let cases = [
            r#"{"lowercase": {"created_at": "2025-06-01T12:00:00Z", "expires_at": "2025-06-01T14:00:00Z", "redeemed_by": null}}"#,
            r#"{"AB12CD34": {"created_at": "2025-06-01T12:00:00Z", "expires_at": "2025-06-01T11:00:00Z", "redeemed_by": null}}"#,
            r#"{"AB12CD34": {"created_at": "yesterday", "expires_at": "2025-06-01T14:00:00Z", "redeemed_by": null}}"#,
        ];

        for case in cases {
            std::fs::write(&path, case).unwrap();
            let err = KeyFile::new(&path).load().await.unwrap_err();
            assert!(matches!(err, StoreError::Corrupted { .. }), "{case}");
        }
    }

    #[tokio::test]
    async fn reads_naive_timestamps_as_utc() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        std::fs::write(
            &path,
            r#"{
                "AB12CD34": {
                    "created_at": "2025-06-01T12:00:00.123456",
                    "expires_at": "2025-06-01T14:00:00",
                    "redeemed_by": ""
                }
            }"#,
        )
        .unwrap();

        let keys = KeyFile::new(&path).load().await.unwrap();
        let rec = &keys["AB12CD34"];

        assert_eq!(
            rec.created_at,
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap() + TimeDelta::microseconds(123_456)
        );
        assert_eq!(
            rec.expires_at,
            Utc.with_ymd_and_hms(2025, 6, 1, 14, 0, 0).unwrap()
        );
        assert_eq!(rec.redeemed_by, None);
    }

    #[tokio::test]
    async fn failed_save_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        let file = KeyFile::new(&path);

        let mut keys = KeyMap::new();
        keys.insert("AB12CD34".to_string(), record("AB12CD34", None));
        file.save(&keys).await.unwrap();

        // A directory squatting on the temp path makes the write fail
        std::fs::create_dir(file.tmp_path()).unwrap();
        keys.insert("ZZZZ0000".to_string(), record("ZZZZ0000", None));
        let err = file.save(&keys).await.unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));

        let loaded = file.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key("AB12CD34"));
    }
}
