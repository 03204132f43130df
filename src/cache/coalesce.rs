//! Singleflight for network requests.
//!
//! At most one request per key is in flight. Later callers for the same key
//! await the same shared future and get the same result, failures included.
//! The slot is released when the request settles, or when the caller that
//! started it is dropped, whichever comes first.

use crate::error::StoreError;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use tracing::trace;

type SharedRequest<T> = Shared<BoxFuture<'static, Result<T, StoreError>>>;

pub struct RequestCoalescer<K, T>
where
    K: Hash + Eq,
{
    inflight: DashMap<K, SharedRequest<T>>,
}

impl<K, T> Default for RequestCoalescer<K, T>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self {
            inflight: DashMap::new(),
        }
    }
}

impl<K, T> RequestCoalescer<K, T>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inflight.contains_key(key)
    }

    /// Run `factory` unless a request for `key` is already running, in which
    /// case join that one instead.
    pub async fn dedupe<F, Fut>(&self, key: K, factory: F) -> Result<T, StoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
    {
        let (request, leader) = match self.inflight.entry(key.clone()) {
            Entry::Occupied(slot) => {
                trace!(key = ?key, "joining in-flight request");
                (slot.get().clone(), false)
            }
            Entry::Vacant(slot) => {
                let request = factory().boxed().shared();
                slot.insert(request.clone());
                (request, true)
            }
        };

        let _release = Release {
            map: &self.inflight,
            key,
            request: request.clone(),
            leader,
        };
        request.await
    }
}

/// Drop guard standing in for a `finally` block.
struct Release<'a, K, T>
where
    K: Hash + Eq,
    T: Clone,
{
    map: &'a DashMap<K, SharedRequest<T>>,
    key: K,
    request: SharedRequest<T>,
    leader: bool,
}

impl<K, T> Drop for Release<'_, K, T>
where
    K: Hash + Eq,
    T: Clone,
{
    fn drop(&mut self) {
        // Followers that give up early leave the slot to the leader.
        if self.leader || self.request.peek().is_some() {
            self.map
                .remove_if(&self.key, |_, current| current.ptr_eq(&self.request));
        }
    }
}
