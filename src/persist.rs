//! Key-value persistence for UI state across restarts.
//!
//! Backed by one JSON file per key in a state directory. Writes go to a
//! temporary file first and are renamed into place, so a crash mid-write
//! leaves the previous value intact.

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }

    /// Retrieve a value by key, or `None` if not present.
    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Persist(format!("reading {key}: {e}"))),
        }
    }

    /// Insert or replace a value.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::Persist(format!("creating {}: {e}", self.dir.display())))?;
        tokio::fs::write(&tmp, value)
            .await
            .map_err(|e| StoreError::Persist(format!("writing {key}: {e}")))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::Persist(format!("replacing {key}: {e}")))?;
        debug!(key, bytes = value.len(), "state persisted");
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Persist(format!("removing {key}: {e}"))),
        }
    }

    /// Decode a stored JSON value. Corrupt values are logged and treated as absent.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key, error = %e, "discarding unreadable persisted state");
                Ok(None)
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)
            .map_err(|e| StoreError::Persist(format!("encoding {key}: {e}")))?;
        self.set(key, &raw).await
    }

    /// Retrieve a persisted UTC timestamp, or `None` if absent or unparseable.
    pub async fn get_timestamp(&self, key: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let value = self.get(key).await?;
        Ok(value.and_then(|v| DateTime::parse_from_rfc3339(v.trim()).ok().map(|dt| dt.to_utc())))
    }

    /// Persist a UTC timestamp under the given key.
    pub async fn set_timestamp(&self, key: &str, ts: DateTime<Utc>) -> Result<(), StoreError> {
        self.set(key, &ts.to_rfc3339()).await
    }
}
