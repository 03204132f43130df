//! TTL-stamped cache entries.

use super::eviction::Timestamped;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A cached value with the time it was fetched and how long it stays fresh.
///
/// Entries are replaced wholesale on refresh; the only in-place change is
/// [`CacheEntry::refreshed`], which hands back a new entry with a new stamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    data: T,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    timestamp: DateTime<Utc>,
    #[serde(rename = "ttl")]
    ttl_ms: u64,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, timestamp: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            data,
            timestamp,
            ttl_ms: ttl.as_millis() as u64,
        }
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn into_data(self) -> T {
        self.data
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// `now - timestamp < ttl`. A timestamp in the future counts as fresh.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        is_fresh(self.timestamp, self.ttl(), now)
    }

    /// Same TTL, new data, new stamp.
    pub fn refreshed(self, data: T, now: DateTime<Utc>) -> Self {
        Self {
            data,
            timestamp: now,
            ttl_ms: self.ttl_ms,
        }
    }
}

impl<T> Timestamped for CacheEntry<T> {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Shared freshness rule for entries, buffers and page records.
pub(crate) fn is_fresh(stamp: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    let age_ms = (now - stamp).num_milliseconds();
    age_ms < ttl.as_millis() as i64
}
