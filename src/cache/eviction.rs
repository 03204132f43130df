//! Size bounding by oldest fetch time.
//!
//! This is LRU by *fetch* time, not access time: an entry fetched long ago
//! and read constantly still goes before one fetched recently and never read.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::hash::Hash;

/// Anything with a last-fetched stamp.
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Remove oldest entries until `cache.len() <= max_entries`.
///
/// Ties on timestamp fall back to map order, so owners that want "most
/// recently written wins" move refreshed keys to the back on write.
/// Returns what was removed so callers can clean secondary indexes.
pub fn prune<K, V>(cache: &mut IndexMap<K, V>, max_entries: usize) -> Vec<(K, V)>
where
    K: Hash + Eq + Clone,
    V: Timestamped,
{
    if cache.len() <= max_entries {
        return Vec::new();
    }
    let excess = cache.len() - max_entries;

    let mut order: Vec<(usize, DateTime<Utc>)> = cache
        .values()
        .enumerate()
        .map(|(idx, v)| (idx, v.timestamp()))
        .collect();
    // Stable: equal stamps keep map order.
    order.sort_by_key(|&(_, ts)| ts);

    let victims: Vec<K> = order
        .iter()
        .take(excess)
        .filter_map(|&(idx, _)| cache.get_index(idx).map(|(k, _)| k.clone()))
        .collect();

    victims
        .into_iter()
        .filter_map(|key| cache.shift_remove_entry(&key))
        .collect()
}
