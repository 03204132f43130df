//! Injectable wall clock for freshness decisions.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Source of "now" for every cache in a store.
///
/// The system clock is the default. A manual clock holds epoch milliseconds
/// in an atomic and only moves when told to, which is what tests use to step
/// past TTLs without sleeping.
#[derive(Debug, Clone, Default)]
pub struct Clock {
    manual: Option<Arc<AtomicI64>>,
}

impl Clock {
    pub fn system() -> Self {
        Self::default()
    }

    /// A clock frozen at `start` until advanced.
    pub fn manual(start: DateTime<Utc>) -> Self {
        Self {
            manual: Some(Arc::new(AtomicI64::new(start.timestamp_millis()))),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        match &self.manual {
            Some(ms) => DateTime::from_timestamp_millis(ms.load(Ordering::Acquire))
                .unwrap_or_else(Utc::now),
            None => Utc::now(),
        }
    }

    /// Move a manual clock forward. No-op on the system clock.
    pub fn advance(&self, by: Duration) {
        if let Some(ms) = &self.manual {
            ms.fetch_add(by.as_millis() as i64, Ordering::AcqRel);
        }
    }
}
