//! Paginated list cache with canonical-buffer reuse.
//!
//! Lookups try, in order: the exact page (same filters, page and limit), a
//! slice of the canonical buffer for the same filters if it has no holes in
//! the requested range, and otherwise report a miss.

use super::Identified;
use super::buffer::CanonicalBuffer;
use super::clock::Clock;
use super::entry::is_fresh;
use super::eviction;
use super::key::{CanonicalKey, PageKey, PaginationParams};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, trace};

/// One page as served to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    /// Number of pages at this limit.
    pub fn pages(&self) -> u32 {
        self.total.div_ceil(self.limit.max(1) as usize) as u32
    }
}

/// Metadata for a page that was materialized at least once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageEntry {
    canonical: CanonicalKey,
    page: u32,
    limit: u32,
    ids: Vec<String>,
    total: usize,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    fetched_at: DateTime<Utc>,
}

/// Where an entity sits inside a buffer, with a copy of what is there.
#[derive(Debug, Clone)]
pub struct ItemLocation<T> {
    pub canonical: CanonicalKey,
    pub position: usize,
    pub item: T,
}

/// Serializable form of the list cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedListCache<T> {
    buffers: Vec<(CanonicalKey, CanonicalBuffer<T>)>,
    pages: Vec<(PageKey, PageEntry)>,
}

impl<T> PersistedListCache<T> {
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

pub struct PaginatedResourceCache<T> {
    buffers: IndexMap<CanonicalKey, CanonicalBuffer<T>>,
    pages: HashMap<PageKey, PageEntry>,
    /// entity id → every (buffer, position) holding it
    locations: HashMap<String, HashSet<(CanonicalKey, usize)>>,
    ttl: Duration,
    max_entries: usize,
    clock: Clock,
}

impl<T: Identified + Clone> PaginatedResourceCache<T> {
    pub fn new(ttl: Duration, max_entries: usize, clock: Clock) -> Self {
        Self {
            buffers: IndexMap::new(),
            pages: HashMap::new(),
            locations: HashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
            clock,
        }
    }

    /// Number of canonical buffers held.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn contains_key(&self, key: &CanonicalKey) -> bool {
        self.buffers.contains_key(key)
    }

    pub fn buffer(&self, key: &CanonicalKey) -> Option<&CanonicalBuffer<T>> {
        self.buffers.get(key)
    }

    /// Fresh page for `params`, or `None` on a miss.
    ///
    /// A hit served from the canonical buffer is recorded as an exact page
    /// too, stamped with the buffer's fetch time so it does not outlive it.
    pub fn get(&mut self, params: &PaginationParams) -> Option<Page<T>> {
        let now = self.clock.now();
        let canonical = params.canonical_key();
        let page_key = PageKey::new(&canonical, params.page, params.limit);

        if let Some(page) = self.exact(&page_key, Some(now)) {
            trace!(key = %page_key, "list cache exact hit");
            return Some(page);
        }

        let buffer = self.buffers.get(&canonical)?;
        if !buffer.is_fresh_at(self.ttl, now) {
            trace!(key = %canonical, "canonical buffer stale");
            return None;
        }
        let range = params.range();
        if !buffer.covers(&range) {
            trace!(key = %canonical, start = range.start, end = range.end, "canonical buffer has holes");
            return None;
        }

        let items = buffer.slice(&range);
        let total = buffer.total();
        let fetched_at = buffer.fetched_at();
        debug!(key = %page_key, items = items.len(), "list page served from canonical buffer");

        self.pages.insert(
            page_key,
            PageEntry {
                canonical,
                page: params.page,
                limit: params.limit,
                ids: items.iter().map(|i| i.id().to_owned()).collect(),
                total,
                fetched_at,
            },
        );
        Some(Page {
            items,
            total,
            page: params.page,
            limit: params.limit,
        })
    }

    /// Page for `params` regardless of age. Used to keep showing old data
    /// when a refresh fails.
    pub fn get_stale(&self, params: &PaginationParams) -> Option<Page<T>> {
        if let Some(page) = self.exact(&params.page_key(), None) {
            return Some(page);
        }
        let buffer = self.buffers.get(&params.canonical_key())?;
        let range = params.range();
        if buffer.is_empty() || !buffer.covers(&range) {
            return None;
        }
        Some(Page {
            items: buffer.slice(&range),
            total: buffer.total(),
            page: params.page,
            limit: params.limit,
        })
    }

    /// Exact page lookup. `now = None` skips the freshness check.
    fn exact(&self, page_key: &PageKey, now: Option<DateTime<Utc>>) -> Option<Page<T>> {
        let entry = self.pages.get(page_key)?;
        if let Some(now) = now
            && !is_fresh(entry.fetched_at, self.ttl, now)
        {
            return None;
        }
        let buffer = self.buffers.get(&entry.canonical)?;
        let start = (entry.page.max(1) as usize - 1) * entry.limit as usize;
        let mut items = Vec::with_capacity(entry.ids.len());
        for (i, id) in entry.ids.iter().enumerate() {
            // A later fetch may have reordered this range; fall through to the buffer path.
            let item = buffer
                .get(start + i)
                .filter(|item| item.id() == id.as_str())?;
            items.push(item.clone());
        }
        Some(Page {
            items,
            total: entry.total,
            page: entry.page,
            limit: entry.limit,
        })
    }

    /// Merge a fetched page into the canonical buffer for its filters.
    ///
    /// Items land at the offset the server says they belong to, which is not
    /// the requested one when the server capped or adjusted the page size.
    /// The page record is filed under the page the server actually returned.
    pub fn put(&mut self, params: &PaginationParams, page: Page<T>) {
        let now = self.clock.now();
        let canonical = params.canonical_key();
        let served_page = page.page.max(1);
        let served_limit = if page.limit == 0 { params.limit } else { page.limit };
        if (served_page, served_limit) != (params.page, params.limit) {
            debug!(
                key = %canonical,
                requested_page = params.page,
                requested_limit = params.limit,
                served_page,
                served_limit,
                "server returned a different page than requested"
            );
        }
        let page_key = PageKey::new(&canonical, served_page, served_limit);
        let offset = (served_page as usize - 1) * served_limit as usize;
        let ids: Vec<String> = page.items.iter().map(|i| i.id().to_owned()).collect();

        // Move to the back so equal-stamp eviction prefers older writers.
        let mut buffer = self
            .buffers
            .shift_remove(&canonical)
            .unwrap_or_else(|| CanonicalBuffer::new(now));
        let count = page.items.len();
        let displaced = buffer.merge(offset, page.items, page.total, page_key.clone(), now);
        self.buffers.insert(canonical.clone(), buffer);

        for (pos, old) in displaced {
            self.unlink(old.id(), &canonical, pos);
        }
        for (i, id) in ids.iter().enumerate() {
            self.locations
                .entry(id.clone())
                .or_default()
                .insert((canonical.clone(), offset + i));
        }

        self.pages.insert(
            page_key,
            PageEntry {
                canonical: canonical.clone(),
                page: served_page,
                limit: served_limit,
                ids,
                total: page.total,
                fetched_at: now,
            },
        );
        trace!(key = %canonical, offset, count, total = page.total, "list page merged");

        self.evict();
    }

    /// Restamp a page the server confirmed unchanged. Returns the page if it
    /// is still materializable.
    pub fn refresh_page(&mut self, params: &PaginationParams) -> Option<Page<T>> {
        let now = self.clock.now();
        let page = self.get_stale(params)?;
        let canonical = params.canonical_key();
        let page_key = PageKey::new(&canonical, params.page, params.limit);
        if let Some(buffer) = self.buffers.get_mut(&canonical) {
            buffer.touch(now);
        }
        self.pages.insert(
            page_key,
            PageEntry {
                canonical,
                page: params.page,
                limit: params.limit,
                ids: page.items.iter().map(|i| i.id().to_owned()).collect(),
                total: page.total,
                fetched_at: now,
            },
        );
        Some(page)
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.buffers.clear();
        self.pages.clear();
        self.locations.clear();
    }

    /// Drop every buffer (and its pages) whose key matches. Returns how many went.
    pub fn invalidate_where(&mut self, predicate: impl Fn(&CanonicalKey) -> bool) -> usize {
        let doomed: Vec<CanonicalKey> = self
            .buffers
            .keys()
            .filter(|key| predicate(key))
            .cloned()
            .collect();
        for key in &doomed {
            if let Some(buffer) = self.buffers.shift_remove(key) {
                self.forget_buffer(key, &buffer);
            }
        }
        if !doomed.is_empty() {
            debug!(count = doomed.len(), "list cache buffers invalidated");
        }
        doomed.len()
    }

    /// Canonical keys of every buffer currently holding `id`.
    pub fn keys_containing(&self, id: &str) -> HashSet<CanonicalKey> {
        self.locations
            .get(id)
            .map(|locs| locs.iter().map(|(key, _)| key.clone()).collect())
            .unwrap_or_default()
    }

    /// Apply `patch` to every cached occurrence of `id`. Returns the number touched.
    pub fn touch_item(&mut self, id: &str, mut patch: impl FnMut(&mut T)) -> usize {
        let Some(locs) = self.locations.get(id) else {
            return 0;
        };
        let mut touched = 0;
        for (key, pos) in locs {
            if let Some(item) = self.buffers.get_mut(key).and_then(|b| b.get_mut(*pos)) {
                patch(item);
                touched += 1;
            }
        }
        touched
    }

    /// Overwrite every occurrence of `item.id()` with `item`.
    pub fn replace_item(&mut self, item: &T) -> usize {
        self.touch_item(item.id(), |slot| *slot = item.clone())
    }

    /// Copies of every occurrence of `id`, for a later [`restore_occurrences`](Self::restore_occurrences).
    pub fn occurrences(&self, id: &str) -> Vec<ItemLocation<T>> {
        let Some(locs) = self.locations.get(id) else {
            return Vec::new();
        };
        locs.iter()
            .filter_map(|(key, pos)| {
                let item = self.buffers.get(key)?.get(*pos)?;
                Some(ItemLocation {
                    canonical: key.clone(),
                    position: *pos,
                    item: item.clone(),
                })
            })
            .collect()
    }

    /// Put saved occurrences back where they were.
    ///
    /// A position is restored only while it still holds the same entity.
    /// Buffers invalidated or evicted since, and positions a refetch has
    /// filled with something else, keep what the server sent.
    pub fn restore_occurrences(&mut self, saved: Vec<ItemLocation<T>>) -> usize {
        let mut restored = 0;
        for loc in saved {
            let Some(buffer) = self.buffers.get_mut(&loc.canonical) else {
                continue;
            };
            let same_entity = buffer
                .get(loc.position)
                .is_some_and(|current| current.id() == loc.item.id());
            if !same_entity {
                trace!(key = %loc.canonical, position = loc.position, "position refetched since snapshot, not restoring");
                continue;
            }
            if buffer.replace(loc.position, loc.item) {
                restored += 1;
            }
        }
        restored
    }

    /// Whether a page record exists for `key`, fresh or not.
    pub fn has_page(&self, key: &PageKey) -> bool {
        self.pages.contains_key(key)
    }

    /// Serializable copy of every buffer and page record.
    pub fn export(&self) -> PersistedListCache<T> {
        PersistedListCache {
            buffers: self
                .buffers
                .iter()
                .map(|(k, b)| (k.clone(), b.clone()))
                .collect(),
            pages: self
                .pages
                .iter()
                .map(|(k, p)| (k.clone(), p.clone()))
                .collect(),
        }
    }

    /// Rebuild from a persisted copy, dropping anything already stale.
    pub fn from_export(
        persisted: PersistedListCache<T>,
        ttl: Duration,
        max_entries: usize,
        clock: Clock,
    ) -> Self {
        let now = clock.now();
        let mut cache = Self::new(ttl, max_entries, clock);

        let mut buffers: Vec<(CanonicalKey, CanonicalBuffer<T>)> = persisted
            .buffers
            .into_iter()
            .filter(|(_, b)| b.is_fresh_at(ttl, now))
            .collect();
        buffers.sort_by_key(|(_, b)| b.fetched_at());

        for (key, buffer) in buffers {
            for (pos, item) in buffer.iter() {
                cache
                    .locations
                    .entry(item.id().to_owned())
                    .or_default()
                    .insert((key.clone(), pos));
            }
            cache.buffers.insert(key, buffer);
        }
        for (page_key, entry) in persisted.pages {
            if cache.buffers.contains_key(&entry.canonical) && is_fresh(entry.fetched_at, ttl, now)
            {
                cache.pages.insert(page_key, entry);
            }
        }
        cache.evict();
        cache
    }

    fn evict(&mut self) {
        for (key, buffer) in eviction::prune(&mut self.buffers, self.max_entries) {
            debug!(key = %key, items = buffer.len(), "list cache buffer evicted");
            self.forget_buffer(&key, &buffer);
        }
    }

    fn forget_buffer(&mut self, key: &CanonicalKey, buffer: &CanonicalBuffer<T>) {
        self.pages.retain(|_, entry| &entry.canonical != key);
        for (pos, item) in buffer.iter() {
            self.unlink(item.id(), key, pos);
        }
    }

    fn unlink(&mut self, id: &str, key: &CanonicalKey, pos: usize) {
        if let Some(locs) = self.locations.get_mut(id) {
            locs.remove(&(key.clone(), pos));
            if locs.is_empty() {
                self.locations.remove(id);
            }
        }
    }
}
