//! What a store persists between sessions.

use super::{Resource, ResourceStore};
use crate::cache::{PaginationParams, PersistedCache, ResourceCache};
use crate::error::StoreError;
use crate::persist::StateStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiPrefs {
    #[serde(default)]
    pub last_query: Option<PaginationParams>,
    /// Preferred page size.
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedStore<T> {
    #[serde(default)]
    pub prefs: UiPrefs,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub cache: Option<PersistedCache<T>>,
}

fn state_key<R: Resource>() -> String {
    format!("store.{}", R::NAME)
}

impl<R: Resource> ResourceStore<R> {
    pub async fn snapshot_state(&self) -> PersistedStore<R> {
        let query = self.inner.view.read().await.query.clone();
        let cache = if R::PERSIST_CACHE {
            Some(self.inner.cache.read().await.export())
        } else {
            None
        };
        PersistedStore {
            prefs: UiPrefs {
                limit: query.as_ref().map(|q| q.limit),
                last_query: query,
            },
            cache,
        }
    }

    /// Adopt a persisted snapshot. Cache entries past their TTL are
    /// dropped on the way in; what survives replaces the current cache.
    pub async fn restore_state(&self, state: PersistedStore<R>) -> UiPrefs {
        if R::PERSIST_CACHE
            && let Some(persisted) = state.cache
        {
            let restored = ResourceCache::from_export(persisted, &self.inner.settings);
            debug!(
                resource = R::NAME,
                lists = restored.list.len(),
                details = restored.detail.len(),
                "cache rehydrated"
            );
            *self.inner.cache.write().await = restored;
        }
        if let Some(query) = &state.prefs.last_query {
            self.inner.view.write().await.restore_query(query.clone());
        }
        state.prefs
    }

    pub async fn persist(&self, store: &StateStore) -> Result<(), StoreError> {
        store.set_json(&state_key::<R>(), &self.snapshot_state().await).await
    }

    /// Load persisted state if there is any. Returns the restored prefs.
    pub async fn rehydrate(&self, store: &StateStore) -> Result<Option<UiPrefs>, StoreError> {
        let Some(state) = store.get_json::<PersistedStore<R>>(&state_key::<R>()).await? else {
            return Ok(None);
        };
        let prefs = self.restore_state(state).await;
        info!(resource = R::NAME, "persisted state restored");
        Ok(Some(prefs))
    }
}
