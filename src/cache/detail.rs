//! Id-keyed TTL cache for single entities.

use super::clock::Clock;
use super::entry::CacheEntry;
use super::eviction;
use indexmap::IndexMap;
use std::time::Duration;
use tracing::debug;

pub struct DetailCache<T> {
    entries: IndexMap<String, CacheEntry<T>>,
    ttl: Duration,
    max_entries: usize,
    clock: Clock,
}

impl<T: Clone> DetailCache<T> {
    pub fn new(ttl: Duration, max_entries: usize, clock: Clock) -> Self {
        Self {
            entries: IndexMap::new(),
            ttl,
            max_entries: max_entries.max(1),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fresh copy of `id`, or `None`.
    pub fn get(&self, id: &str) -> Option<T> {
        let entry = self.entries.get(id)?;
        entry
            .is_fresh_at(self.clock.now())
            .then(|| entry.data().clone())
    }

    /// Copy of `id` regardless of age.
    pub fn get_stale(&self, id: &str) -> Option<T> {
        self.entries.get(id).map(|e| e.data().clone())
    }

    pub fn entry(&self, id: &str) -> Option<&CacheEntry<T>> {
        self.entries.get(id)
    }

    pub fn put(&mut self, id: impl Into<String>, data: T) {
        let id = id.into();
        let entry = CacheEntry::new(data, self.clock.now(), self.ttl);
        self.entries.shift_remove(&id);
        self.entries.insert(id, entry);
        for (evicted, _) in eviction::prune(&mut self.entries, self.max_entries) {
            debug!(id = %evicted, "detail cache entry evicted");
        }
    }

    /// Apply `patch` to a cached entity, producing a new entry with a new stamp.
    pub fn update(&mut self, id: &str, patch: impl FnOnce(&mut T)) -> bool {
        let Some(entry) = self.entries.shift_remove(id) else {
            return false;
        };
        let mut data = entry.data().clone();
        patch(&mut data);
        let entry = entry.refreshed(data, self.clock.now());
        self.entries.insert(id.to_owned(), entry);
        true
    }

    pub fn invalidate(&mut self, id: &str) -> bool {
        self.entries.shift_remove(id).is_some()
    }

    /// Put back a snapshot taken with [`entry`](Self::entry). `None` means the
    /// entity was absent, so any current entry is removed.
    pub fn restore_entry(&mut self, id: &str, saved: Option<CacheEntry<T>>) {
        match saved {
            Some(entry) => {
                self.entries.shift_remove(id);
                self.entries.insert(id.to_owned(), entry);
            }
            None => {
                self.entries.shift_remove(id);
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Every entry, oldest write first.
    pub fn export(&self) -> Vec<(String, CacheEntry<T>)> {
        self.entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect()
    }

    /// Rebuild from exported entries, dropping stale ones.
    pub fn from_export(
        entries: Vec<(String, CacheEntry<T>)>,
        ttl: Duration,
        max_entries: usize,
        clock: Clock,
    ) -> Self {
        let now = clock.now();
        let mut cache = Self::new(ttl, max_entries, clock);
        for (id, entry) in entries {
            if entry.is_fresh_at(now) {
                cache.entries.insert(id, entry);
            }
        }
        eviction::prune(&mut cache.entries, cache.max_entries);
        cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn clock() -> Clock {
        Clock::manual(DateTime::from_timestamp_millis(5_000_000).unwrap())
    }

    #[test]
    fn get_respects_ttl() {
        let clock = clock();
        let mut cache = DetailCache::new(Duration::from_secs(10), 5, clock.clone());
        cache.put("e1", "Ana");
        assert_eq!(cache.get("e1"), Some("Ana"));

        clock.advance(Duration::from_secs(10));
        assert_eq!(cache.get("e1"), None);
        assert_eq!(cache.get_stale("e1"), Some("Ana"));
    }

    #[test]
    fn eviction_keeps_most_recent_writes() {
        let clock = clock();
        let mut cache = DetailCache::new(Duration::from_secs(60), 3, clock.clone());
        for n in 0..6 {
            clock.advance(Duration::from_millis(1));
            cache.put(format!("e{n}"), n);
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.get("e2"), None);
        assert_eq!(cache.get("e3"), Some(3));
        assert_eq!(cache.get("e5"), Some(5));
    }

    #[test]
    fn rewriting_a_key_protects_it_from_eviction() {
        let clock = clock();
        let mut cache = DetailCache::new(Duration::from_secs(60), 2, clock.clone());
        cache.put("a", 1);
        cache.put("b", 2);
        cache.put("a", 10);
        cache.put("c", 3);
        assert_eq!(cache.get("a"), Some(10));
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn update_restamps_and_restore_reverts() {
        let clock = clock();
        let mut cache = DetailCache::new(Duration::from_secs(10), 5, clock.clone());
        cache.put("t1", String::from("pending"));
        let saved = cache.entry("t1").cloned();

        clock.advance(Duration::from_secs(8));
        assert!(cache.update("t1", |s| *s = String::from("approved")));
        clock.advance(Duration::from_secs(8));
        assert_eq!(cache.get("t1").as_deref(), Some("approved"));

        cache.restore_entry("t1", saved);
        assert_eq!(cache.get_stale("t1").as_deref(), Some("pending"));
        assert!(!cache.update("missing", |_| {}));
    }

    #[test]
    fn restoring_absence_removes_entry() {
        let mut cache = DetailCache::new(Duration::from_secs(10), 5, clock());
        cache.put("new", 1);
        cache.restore_entry("new", None);
        assert!(cache.is_empty());
    }

    #[test]
    fn from_export_drops_expired() {
        let clock = clock();
        let mut cache = DetailCache::new(Duration::from_secs(10), 5, clock.clone());
        cache.put("old", 1);
        clock.advance(Duration::from_secs(6));
        cache.put("new", 2);
        let exported = cache.export();
        clock.advance(Duration::from_secs(6));

        let restored = DetailCache::from_export(exported, Duration::from_secs(10), 5, clock);
        assert_eq!(restored.len(), 1);
        assert_eq!(restored.get("new"), Some(2));
    }
}
