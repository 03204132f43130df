//! Detail and list caches for one resource, handled as a unit.
//!
//! An entity can sit in the detail cache and in any number of list buffers
//! at once. Everything that must touch all of those copies together
//! (snapshots, optimistic patches, server commits, rollbacks) lives here.

use super::Identified;
use super::clock::Clock;
use super::detail::DetailCache;
use super::entry::CacheEntry;
use super::paginated::{ItemLocation, PaginatedResourceCache};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Size and freshness settings shared by a store's caches.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub list_ttl: Duration,
    pub detail_ttl: Duration,
    pub max_list_entries: usize,
    pub max_detail_entries: usize,
    pub clock: Clock,
}

pub const DEFAULT_LIST_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_DETAIL_TTL: Duration = Duration::from_secs(10 * 60);
pub const MAX_LIST_CACHE_SIZE: usize = 50;
pub const MAX_DETAIL_CACHE_SIZE: usize = 200;

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            list_ttl: DEFAULT_LIST_TTL,
            detail_ttl: DEFAULT_DETAIL_TTL,
            max_list_entries: MAX_LIST_CACHE_SIZE,
            max_detail_entries: MAX_DETAIL_CACHE_SIZE,
            clock: Clock::system(),
        }
    }
}

/// Local key for an entity the server has not assigned an id to yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TempKey(String);

impl TempKey {
    pub fn generate() -> Self {
        Self(nanoid::nanoid!(12))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TempKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Every cached copy of one entity, taken before an optimistic change.
///
/// `detail == None && list.is_empty()` means the entity was not cached at
/// all; restoring that snapshot removes whatever was inserted since.
#[derive(Debug, Clone)]
pub struct MutationSnapshot<T> {
    id: String,
    detail: Option<CacheEntry<T>>,
    list: Vec<ItemLocation<T>>,
}

impl<T> MutationSnapshot<T> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_cold(&self) -> bool {
        self.detail.is_none() && self.list.is_empty()
    }

    /// The pre-mutation value, preferring the detail copy.
    pub fn value(&self) -> Option<&T> {
        self.detail
            .as_ref()
            .map(|e| e.data())
            .or_else(|| self.list.first().map(|loc| &loc.item))
    }
}

/// Serializable form of a whole resource cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedCache<T> {
    pub list: super::paginated::PersistedListCache<T>,
    pub detail: Vec<(String, CacheEntry<T>)>,
}

pub struct ResourceCache<T> {
    pub list: PaginatedResourceCache<T>,
    pub detail: DetailCache<T>,
    placeholders: IndexMap<TempKey, T>,
}

impl<T: Identified + Clone> ResourceCache<T> {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            list: PaginatedResourceCache::new(
                settings.list_ttl,
                settings.max_list_entries,
                settings.clock.clone(),
            ),
            detail: DetailCache::new(
                settings.detail_ttl,
                settings.max_detail_entries,
                settings.clock.clone(),
            ),
            placeholders: IndexMap::new(),
        }
    }

    pub fn snapshot(&self, id: &str) -> MutationSnapshot<T> {
        MutationSnapshot {
            id: id.to_owned(),
            detail: self.detail.entry(id).cloned(),
            list: self.list.occurrences(id),
        }
    }

    /// Patch every cached copy of `id`. Returns how many copies changed.
    pub fn apply(&mut self, id: &str, patch: &dyn Fn(&mut T)) -> usize {
        let in_detail = usize::from(self.detail.update(id, |item| patch(item)));
        in_detail + self.list.touch_item(id, |item| patch(item))
    }

    /// Replace every copy with the server's version.
    pub fn commit(&mut self, item: T) {
        self.list.replace_item(&item);
        self.detail.put(item.id().to_owned(), item);
    }

    /// Put every copy back the way the snapshot saw it.
    pub fn restore(&mut self, snapshot: MutationSnapshot<T>) {
        self.detail.restore_entry(&snapshot.id, snapshot.detail);
        self.list.restore_occurrences(snapshot.list);
    }

    /// Drop every trace of `id`: the detail entry and every buffer holding it.
    pub fn forget(&mut self, id: &str) -> usize {
        self.detail.invalidate(id);
        let keys = self.list.keys_containing(id);
        self.list.invalidate_where(|key| keys.contains(key))
    }

    pub fn insert_placeholder(&mut self, item: T) -> TempKey {
        let key = TempKey::generate();
        self.placeholders.insert(key.clone(), item);
        key
    }

    /// Swap a placeholder for the server's entity in one step.
    pub fn rekey(&mut self, temp: &TempKey, item: T) {
        self.placeholders.shift_remove(temp);
        self.detail.put(item.id().to_owned(), item);
    }

    pub fn discard_placeholder(&mut self, temp: &TempKey) -> Option<T> {
        self.placeholders.shift_remove(temp)
    }

    /// Entities created locally and still awaiting the server, oldest first.
    pub fn placeholders(&self) -> Vec<T> {
        self.placeholders.values().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.list.clear();
        self.detail.clear();
    }

    pub fn export(&self) -> PersistedCache<T> {
        PersistedCache {
            list: self.list.export(),
            detail: self.detail.export(),
        }
    }

    /// Rebuild from a persisted copy; stale entries are dropped on the way in.
    pub fn from_export(persisted: PersistedCache<T>, settings: &CacheSettings) -> Self {
        Self {
            list: PaginatedResourceCache::from_export(
                persisted.list,
                settings.list_ttl,
                settings.max_list_entries,
                settings.clock.clone(),
            ),
            detail: DetailCache::from_export(
                persisted.detail,
                settings.detail_ttl,
                settings.max_detail_entries,
                settings.clock.clone(),
            ),
            placeholders: IndexMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Page, PaginationParams};
    use chrono::DateTime;

    #[derive(Debug, Clone, PartialEq)]
    struct Employee {
        id: String,
        suspended: bool,
    }

    impl Identified for Employee {
        fn id(&self) -> &str {
            &self.id
        }
    }

    fn emp(id: &str) -> Employee {
        Employee {
            id: id.to_owned(),
            suspended: false,
        }
    }

    fn settings() -> CacheSettings {
        CacheSettings {
            clock: Clock::manual(DateTime::from_timestamp_millis(0).unwrap()),
            ..CacheSettings::default()
        }
    }

    fn seeded() -> ResourceCache<Employee> {
        let mut cache = ResourceCache::new(&settings());
        let page = Page {
            items: vec![emp("e1"), emp("e2")],
            total: 2,
            page: 1,
            limit: 10,
        };
        cache.list.put(&PaginationParams::new(1, 10), page.clone());
        cache
            .list
            .put(&PaginationParams::new(1, 10).with_search("e"), page);
        cache.detail.put("e1", emp("e1"));
        cache
    }

    #[test]
    fn apply_then_restore_reverts_every_copy() {
        let mut cache = seeded();
        let snapshot = cache.snapshot("e1");
        assert!(!snapshot.is_cold());

        assert_eq!(cache.apply("e1", &|e| e.suspended = true), 3);
        assert!(cache.detail.get("e1").unwrap().suspended);

        cache.restore(snapshot);
        assert!(!cache.detail.get("e1").unwrap().suspended);
        for loc in cache.list.occurrences("e1") {
            assert!(!loc.item.suspended);
        }
    }

    #[test]
    fn cold_snapshot_restore_removes_inserted_entry() {
        let mut cache = seeded();
        let snapshot = cache.snapshot("e9");
        assert!(snapshot.is_cold());
        cache.commit(emp("e9"));
        assert!(cache.detail.get("e9").is_some());
        cache.restore(snapshot);
        assert!(cache.detail.get("e9").is_none());
    }

    #[test]
    fn forget_drops_detail_and_containing_views() {
        let mut cache = seeded();
        assert_eq!(cache.forget("e2"), 2);
        assert!(cache.list.is_empty());
        assert!(cache.detail.get("e1").is_some());
    }

    #[test]
    fn placeholder_rekeys_to_server_id() {
        let mut cache = seeded();
        let temp = cache.insert_placeholder(emp(""));
        assert_eq!(cache.placeholders().len(), 1);
        cache.rekey(&temp, emp("e7"));
        assert!(cache.placeholders().is_empty());
        assert_eq!(cache.detail.get("e7"), Some(emp("e7")));
    }
}
