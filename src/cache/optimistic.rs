//! Optimistic mutations with all-or-nothing rollback.
//!
//! The local patch lands on every cached copy before the request goes out.
//! On success the server's entity replaces the patch; on failure every copy
//! goes back to its snapshot. One mutation per entity id at a time.

use super::Identified;
use super::resource::{MutationSnapshot, ResourceCache};
use crate::error::StoreError;
use dashmap::DashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct OptimisticMutator {
    busy: Arc<DashSet<String>>,
}

/// Marks an id busy for as long as it lives.
struct BusyGuard {
    busy: Arc<DashSet<String>>,
    id: String,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.busy.remove(&self.id);
    }
}

/// Restores the snapshot when dropped while still armed, so a mutation
/// abandoned mid-request (timeout, lost `select!`) leaves no patch behind.
struct Rollback<T: Identified + Clone + Send + Sync + 'static> {
    cache: Arc<RwLock<ResourceCache<T>>>,
    snapshot: Option<MutationSnapshot<T>>,
}

impl<T: Identified + Clone + Send + Sync + 'static> Rollback<T> {
    fn disarm(&mut self) -> Option<MutationSnapshot<T>> {
        self.snapshot.take()
    }
}

impl<T: Identified + Clone + Send + Sync + 'static> Drop for Rollback<T> {
    fn drop(&mut self) {
        let Some(snapshot) = self.snapshot.take() else {
            return;
        };
        warn!(id = snapshot.id(), "mutation abandoned in flight, rolling back");
        if let Ok(mut cache) = self.cache.try_write() {
            cache.restore(snapshot);
            return;
        }
        match Handle::try_current() {
            Ok(handle) => {
                let cache = self.cache.clone();
                handle.spawn(async move {
                    cache.write().await.restore(snapshot);
                });
            }
            Err(_) => warn!(id = snapshot.id(), "no runtime to finish rollback on"),
        }
    }
}

impl OptimisticMutator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a mutation for `id` is in flight.
    pub fn is_busy(&self, id: &str) -> bool {
        self.busy.contains(id)
    }

    fn claim(&self, id: &str) -> Result<BusyGuard, StoreError> {
        if !self.busy.insert(id.to_owned()) {
            return Err(StoreError::Busy(id.to_owned()));
        }
        Ok(BusyGuard {
            busy: self.busy.clone(),
            id: id.to_owned(),
        })
    }

    /// Patch `id` locally, run `call`, then commit or roll back.
    ///
    /// `call` may return the updated entity (committed everywhere, server
    /// wins) or `None` for endpoints that only acknowledge; the local patch
    /// is then kept. Returns whatever the detail cache holds afterwards.
    /// Dropping the returned future before it settles counts as a failure.
    pub async fn mutate<T, F, Fut>(
        &self,
        cache: &Arc<RwLock<ResourceCache<T>>>,
        id: &str,
        patch: impl Fn(&mut T),
        call: F,
    ) -> Result<Option<T>, StoreError>
    where
        T: Identified + Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, StoreError>>,
    {
        let _guard = self.claim(id)?;

        let mut rollback = {
            let mut cache_w = cache.write().await;
            let snapshot = cache_w.snapshot(id);
            let touched = cache_w.apply(id, &patch);
            debug!(id, touched, cold = snapshot.is_cold(), "optimistic patch applied");
            Rollback {
                cache: cache.clone(),
                snapshot: Some(snapshot),
            }
        };

        let outcome = call().await;
        // The lock is taken before disarming so a drop while waiting still rolls back.
        let mut cache_w = cache.write().await;
        let snapshot = rollback.disarm();
        match outcome {
            Ok(Some(server)) => {
                cache_w.commit(server.clone());
                Ok(Some(server))
            }
            Ok(None) => Ok(cache_w.detail.get_stale(id)),
            Err(e) => {
                warn!(id, error = %e, "mutation failed, rolling back");
                if let Some(snapshot) = snapshot {
                    cache_w.restore(snapshot);
                }
                Err(e)
            }
        }
    }

    /// Delete without an optimistic step: list positions cannot be vacated
    /// without inventing data, so every copy is dropped only once the server
    /// agrees. Returns how many list views were invalidated.
    pub async fn remove<T, F, Fut>(
        &self,
        cache: &RwLock<ResourceCache<T>>,
        id: &str,
        call: F,
    ) -> Result<usize, StoreError>
    where
        T: Identified + Clone,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), StoreError>>,
    {
        let _guard = self.claim(id)?;
        call().await?;
        let views = cache.write().await.forget(id);
        debug!(id, views, "entity removed from cache");
        Ok(views)
    }

    /// Two-phase insert: a placeholder is visible under a temporary key until
    /// the server answers, then it is rekeyed to the real id or discarded.
    pub async fn create<T, F, Fut>(
        &self,
        cache: &RwLock<ResourceCache<T>>,
        placeholder: T,
        call: F,
    ) -> Result<T, StoreError>
    where
        T: Identified + Clone,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let temp = cache.write().await.insert_placeholder(placeholder);
        let _guard = self.claim(temp.as_str())?;
        debug!(temp = %temp, "placeholder inserted");

        match call().await {
            Ok(created) => {
                cache.write().await.rekey(&temp, created.clone());
                debug!(temp = %temp, id = created.id(), "placeholder rekeyed");
                Ok(created)
            }
            Err(e) => {
                warn!(temp = %temp, error = %e, "create failed, discarding placeholder");
                cache.write().await.discard_placeholder(&temp);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheSettings, Page, PaginationParams};
    use std::time::Duration;
    use tokio::sync::Notify;

    #[derive(Debug, Clone, PartialEq)]
    struct Msg {
        id: String,
        is_read: bool,
        body: String,
    }

    impl Identified for Msg {
        fn id(&self) -> &str {
            &self.id
        }
    }

    fn msg(id: &str) -> Msg {
        Msg {
            id: id.to_owned(),
            is_read: false,
            body: "hola".to_owned(),
        }
    }

    fn seeded() -> Arc<RwLock<ResourceCache<Msg>>> {
        let mut cache = ResourceCache::new(&CacheSettings::default());
        cache.list.put(
            &PaginationParams::new(1, 10),
            Page {
                items: vec![msg("m1"), msg("m2")],
                total: 2,
                page: 1,
                limit: 10,
            },
        );
        cache.detail.put("m1", msg("m1"));
        Arc::new(RwLock::new(cache))
    }

    #[tokio::test]
    async fn failure_restores_every_copy() {
        let cache = seeded();
        let mutator = OptimisticMutator::new();
        let result = mutator
            .mutate(&cache, "m1", |m: &mut Msg| m.is_read = true, || async {
                Err(StoreError::network("offline"))
            })
            .await;
        assert_eq!(result, Err(StoreError::network("offline")));

        let cache = cache.read().await;
        assert!(!cache.detail.get("m1").unwrap().is_read);
        assert!(cache.list.occurrences("m1").iter().all(|l| !l.item.is_read));
        assert!(!mutator.is_busy("m1"));
    }

    #[tokio::test]
    async fn server_entity_wins_over_patch() {
        let cache = seeded();
        let mutator = OptimisticMutator::new();
        let server = Msg {
            body: "edited on server".to_owned(),
            is_read: true,
            ..msg("m1")
        };
        let returned = server.clone();
        let result = mutator
            .mutate(&cache, "m1", |m: &mut Msg| m.is_read = true, move || async move {
                Ok(Some(returned))
            })
            .await;
        assert_eq!(result, Ok(Some(server.clone())));

        let cache = cache.read().await;
        assert_eq!(cache.detail.get("m1"), Some(server.clone()));
        assert_eq!(cache.list.occurrences("m1")[0].item, server);
    }

    #[tokio::test]
    async fn acknowledgement_keeps_patch() {
        let cache = seeded();
        let mutator = OptimisticMutator::new();
        let result = mutator
            .mutate(&cache, "m2", |m: &mut Msg| m.is_read = true, || async { Ok(None) })
            .await;
        assert_eq!(result, Ok(None));
        assert!(cache.read().await.list.occurrences("m2")[0].item.is_read);
    }

    #[tokio::test]
    async fn second_mutation_for_same_id_is_rejected() {
        let cache = seeded();
        let mutator = OptimisticMutator::new();
        let gate = Arc::new(Notify::new());
        let waiter = gate.clone();

        let first = mutator.mutate(&cache, "m1", |m: &mut Msg| m.is_read = true, move || async move {
            waiter.notified().await;
            Ok(None)
        });
        let second = async {
            while !mutator.is_busy("m1") {
                tokio::task::yield_now().await;
            }
            let r = mutator
                .mutate(&cache, "m1", |m: &mut Msg| m.is_read = false, || async { Ok(None) })
                .await;
            gate.notify_one();
            r
        };
        let (first, second) = tokio::join!(first, second);
        assert!(first.is_ok());
        assert_eq!(second, Err(StoreError::Busy("m1".to_owned())));
    }

    #[tokio::test]
    async fn abandoned_mutation_rolls_back() {
        let cache = seeded();
        let mutator = OptimisticMutator::new();
        let outcome = tokio::time::timeout(
            Duration::from_millis(20),
            mutator.mutate(&cache, "m1", |m: &mut Msg| m.is_read = true, || {
                std::future::pending::<Result<Option<Msg>, StoreError>>()
            }),
        )
        .await;
        assert!(outcome.is_err());
        assert!(!mutator.is_busy("m1"));

        let cache = cache.read().await;
        assert!(!cache.detail.get("m1").unwrap().is_read);
        assert!(cache.list.occurrences("m1").iter().all(|l| !l.item.is_read));
    }

    #[tokio::test]
    async fn remove_drops_copies_only_after_success() {
        let cache = seeded();
        let mutator = OptimisticMutator::new();

        let failed = mutator
            .remove(&cache, "m1", || async { Err(StoreError::network("offline")) })
            .await;
        assert!(failed.is_err());
        assert!(cache.read().await.detail.get("m1").is_some());

        let views = mutator.remove(&cache, "m1", || async { Ok(()) }).await.unwrap();
        assert_eq!(views, 1);
        let cache = cache.read().await;
        assert!(cache.detail.get("m1").is_none());
        assert!(cache.list.is_empty());
    }

    #[tokio::test]
    async fn failed_create_discards_placeholder() {
        let cache = seeded();
        let mutator = OptimisticMutator::new();
        let result = mutator
            .create(&cache, msg(""), || async { Err(StoreError::Api("rejected".to_owned())) })
            .await;
        assert!(result.is_err());
        assert!(cache.read().await.placeholders().is_empty());
    }

    #[tokio::test]
    async fn successful_create_rekeys() {
        let cache = seeded();
        let mutator = OptimisticMutator::new();
        let created = mutator
            .create(&cache, msg(""), || async { Ok(msg("m3")) })
            .await
            .unwrap();
        assert_eq!(created.id, "m3");
        let cache = cache.read().await;
        assert!(cache.placeholders().is_empty());
        assert_eq!(cache.detail.get("m3"), Some(msg("m3")));
    }
}
