//! Offset-indexed item buffer for one filtered view.

use super::entry::is_fresh;
use super::eviction::Timestamped;
use super::key::PageKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use std::time::Duration;

/// Every item fetched so far for one canonical key, at its absolute rank.
///
/// Sparse: a position is present only if the server returned an item for it.
/// Nothing is ever guessed into a gap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalBuffer<T> {
    items: BTreeMap<usize, T>,
    total: usize,
    pages_fetched: BTreeSet<PageKey>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    fetched_at: DateTime<Utc>,
}

impl<T: Clone> CanonicalBuffer<T> {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            items: BTreeMap::new(),
            total: 0,
            pages_fetched: BTreeSet::new(),
            fetched_at: now,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn is_fresh_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        is_fresh(self.fetched_at, ttl, now)
    }

    pub fn pages_fetched(&self) -> impl Iterator<Item = &PageKey> {
        self.pages_fetched.iter()
    }

    /// Write `items` starting at `offset`, overwriting what was there.
    ///
    /// Returns every displaced `(position, old item)` pair, including items
    /// dropped because the new `total` no longer reaches them.
    pub fn merge(
        &mut self,
        offset: usize,
        items: Vec<T>,
        total: usize,
        page_key: PageKey,
        now: DateTime<Utc>,
    ) -> Vec<(usize, T)> {
        let mut displaced = Vec::new();

        for (i, item) in items.into_iter().enumerate() {
            if let Some(old) = self.items.insert(offset + i, item) {
                displaced.push((offset + i, old));
            }
        }

        self.total = total;
        let beyond = self.items.split_off(&total);
        displaced.extend(beyond);

        self.pages_fetched.insert(page_key);
        if now > self.fetched_at {
            self.fetched_at = now;
        }
        displaced
    }

    /// True when every position of `range` that can exist (below `total`) is populated.
    pub fn covers(&self, range: &Range<usize>) -> bool {
        let end = range.end.min(self.total);
        (range.start..end).all(|pos| self.items.contains_key(&pos))
    }

    /// Items in `range`, clipped to `total`. Only meaningful when [`covers`](Self::covers) holds.
    pub fn slice(&self, range: &Range<usize>) -> Vec<T> {
        let end = range.end.min(self.total);
        if range.start >= end {
            return Vec::new();
        }
        self.items.range(range.start..end).map(|(_, v)| v.clone()).collect()
    }

    pub fn get(&self, pos: usize) -> Option<&T> {
        self.items.get(&pos)
    }

    pub fn get_mut(&mut self, pos: usize) -> Option<&mut T> {
        self.items.get_mut(&pos)
    }

    /// Overwrite an existing position. Never creates a new one.
    pub fn replace(&mut self, pos: usize, item: T) -> bool {
        match self.items.get_mut(&pos) {
            Some(slot) => {
                *slot = item;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.items.iter().map(|(pos, item)| (*pos, item))
    }

    /// Restamp without new data (a `304 Not Modified` confirmation).
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.fetched_at {
            self.fetched_at = now;
        }
    }

    /// Populated positions collapsed into contiguous runs.
    pub fn fetched_ranges(&self) -> Vec<Range<usize>> {
        let mut ranges: Vec<Range<usize>> = Vec::new();
        for &pos in self.items.keys() {
            match ranges.last_mut() {
                Some(last) if last.end == pos => last.end = pos + 1,
                _ => ranges.push(pos..pos + 1),
            }
        }
        ranges
    }
}

impl<T> Timestamped for CanonicalBuffer<T> {
    fn timestamp(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}
