//! Generic per-resource store.
//!
//! A [`ResourceStore`] owns one resource's caches and in-flight bookkeeping
//! and is the only thing views talk to. Cloning is cheap; clones share state.

pub mod state;
pub mod view;

pub use state::{PersistedStore, UiPrefs};
pub use view::{ListView, StoreEvent};

use crate::cache::{
    CacheSettings, Identified, OptimisticMutator, Page, PageKey, PaginationParams,
    RequestCoalescer, ResourceCache,
};
use crate::error::StoreError;
use crate::transport::envelope::{decode_data, decode_optional, decode_page};
use crate::transport::{ApiRequest, ApiResponse, Transport};
use dashmap::DashMap;
use http::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// An entity type served by the admin API.
pub trait Resource:
    Identified + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Short name for logs and errors.
    const NAME: &'static str;
    /// Collection path, e.g. `/api/admin/tours`.
    const PATH: &'static str;
    /// Send `If-None-Match` on list requests and honor `304`.
    const CONDITIONAL: bool = false;
    /// Include the caches (not just UI prefs) in persisted state.
    const PERSIST_CACHE: bool = false;

    fn detail_path(id: &str) -> String {
        format!("{}/{}", Self::PATH, urlencoding::encode(id))
    }

    fn action_path(id: &str, action: &str) -> String {
        format!("{}/{action}", Self::detail_path(id))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Skip the cache lookup and always go to the network.
    pub force: bool,
    /// Abort whatever list request this store issued before.
    pub abort_previous: bool,
}

impl FetchOptions {
    pub fn force() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }

    pub fn replacing() -> Self {
        Self {
            abort_previous: true,
            ..Self::default()
        }
    }
}

/// Which list views an action makes untrustworthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidate {
    /// Membership cannot change; the optimistic patch is enough.
    Nothing,
    /// Views filtered on any of these dimensions may have gained or lost the entity.
    Dimensions(&'static [&'static str]),
    /// Every list view.
    All,
}

pub struct ResourceStore<R: Resource> {
    inner: Arc<StoreInner<R>>,
}

impl<R: Resource> Clone for ResourceStore<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct StoreInner<R: Resource> {
    transport: Arc<dyn Transport>,
    settings: CacheSettings,
    cache: Arc<RwLock<ResourceCache<R>>>,
    lists: RequestCoalescer<PageKey, Page<R>>,
    details: RequestCoalescer<String, R>,
    mutator: OptimisticMutator,
    view: RwLock<ListView<R>>,
    /// Number of the most recently issued list request.
    seq: AtomicU64,
    /// Parent of the token handed to the latest list request.
    cancel: Mutex<CancellationToken>,
    /// Last failure per list page key or `detail:<id>`, cleared on success.
    errors: DashMap<String, String>,
    etags: DashMap<PageKey, String>,
    events: broadcast::Sender<StoreEvent>,
}

fn detail_error_key(id: &str) -> String {
    format!("detail:{id}")
}

impl<R: Resource> ResourceStore<R> {
    pub fn new(transport: Arc<dyn Transport>, settings: CacheSettings) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(StoreInner {
                transport,
                cache: Arc::new(RwLock::new(ResourceCache::new(&settings))),
                settings,
                lists: RequestCoalescer::new(),
                details: RequestCoalescer::new(),
                mutator: OptimisticMutator::new(),
                view: RwLock::new(ListView::default()),
                seq: AtomicU64::new(0),
                cancel: Mutex::new(CancellationToken::new()),
                errors: DashMap::new(),
                etags: DashMap::new(),
                events,
            }),
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.inner.settings
    }

    /// Notifications about finished mutations, for toasts and the like.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    /// Load one page, from cache when fresh.
    ///
    /// Whatever the outcome, the page is merged into the cache. Only the most
    /// recently issued call updates the visible list view.
    #[instrument(skip_all, fields(resource = R::NAME, page = params.page, limit = params.limit))]
    pub async fn fetch_list(
        &self,
        params: PaginationParams,
        opts: FetchOptions,
    ) -> Result<Page<R>, StoreError> {
        let inner = &self.inner;
        let seq = inner.seq.fetch_add(1, Ordering::AcqRel) + 1;
        let token = inner.begin_list(opts.abort_previous).await;
        inner.view.write().await.issue(params.clone());

        let cached = if opts.force {
            None
        } else {
            inner.cache.write().await.list.get(&params)
        };
        if let Some(page) = cached {
            debug!("list served from cache");
            inner.errors.remove(params.page_key().as_str());
            inner.show_page(seq, &params, page.clone()).await;
            return Ok(page);
        }

        let page_key = params.page_key();
        let loader = inner.clone();
        let request_params = params.clone();
        let work = inner
            .lists
            .dedupe(page_key.clone(), move || load_page(loader, request_params));
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(StoreError::Cancelled),
            result = work => result,
        };

        match &result {
            Ok(page) => {
                inner.errors.remove(page_key.as_str());
                inner.show_page(seq, &params, page.clone()).await;
            }
            Err(StoreError::Cancelled) => debug!("list request aborted"),
            Err(e) => {
                warn!(error = %e, "list request failed");
                inner.errors.insert(page_key.to_string(), e.user_message());
                inner.show_error(seq, &params, e).await;
            }
        }
        result
    }

    /// Load one entity, from cache when fresh.
    #[instrument(skip_all, fields(resource = R::NAME, id = %id))]
    pub async fn fetch_detail(&self, id: &str, opts: FetchOptions) -> Result<R, StoreError> {
        let inner = &self.inner;
        if !opts.force
            && let Some(hit) = inner.cache.read().await.detail.get(id)
        {
            debug!("detail served from cache");
            return Ok(hit);
        }

        let loader = inner.clone();
        let owned = id.to_owned();
        let result = inner
            .details
            .dedupe(id.to_owned(), move || load_detail(loader, owned))
            .await;
        match &result {
            Ok(_) => {
                inner.errors.remove(&detail_error_key(id));
            }
            Err(e) => {
                warn!(error = %e, "detail request failed");
                inner.errors.insert(detail_error_key(id), e.user_message());
            }
        }
        result
    }

    /// Whatever is cached for `id`, fresh or not.
    pub async fn cached_detail(&self, id: &str) -> Option<R> {
        let cache = self.inner.cache.read().await;
        cache.detail.get_stale(id).or_else(|| {
            cache
                .list
                .occurrences(id)
                .into_iter()
                .next()
                .map(|loc| loc.item)
        })
    }

    /// The visible list view. Items come from the cache, so optimistic
    /// patches show up without a refetch.
    pub async fn current_list(&self) -> ListView<R> {
        let mut view = self.inner.view.read().await.clone();
        if let Some(shown) = view.shown_query()
            && let Some(page) = self.inner.cache.read().await.list.get_stale(shown)
        {
            view.page = Some(page);
        }
        view
    }

    /// Last error recorded under a raw key (a page key or `detail:<id>`).
    pub fn error_for(&self, key: &str) -> Option<String> {
        self.inner.errors.get(key).map(|e| e.clone())
    }

    /// Last error for a list page, if its latest attempt failed.
    pub fn list_error(&self, params: &PaginationParams) -> Option<String> {
        self.error_for(params.page_key().as_str())
    }

    pub fn detail_error(&self, id: &str) -> Option<String> {
        self.error_for(&detail_error_key(id))
    }

    /// Whether a request for exactly this page is in flight.
    pub fn is_loading(&self, params: &PaginationParams) -> bool {
        self.inner.lists.contains(&params.page_key())
    }

    /// Whether a mutation for `id` is in flight.
    pub fn is_busy(&self, id: &str) -> bool {
        self.inner.mutator.is_busy(id)
    }

    /// Run an action endpoint with an optimistic local patch.
    #[instrument(skip_all, fields(resource = R::NAME, id = %id, path = %request.path))]
    pub async fn act(
        &self,
        id: &str,
        patch: impl Fn(&mut R) + Send + Sync,
        request: ApiRequest,
        invalidate: Invalidate,
    ) -> Result<Option<R>, StoreError> {
        let inner = &self.inner;
        let transport = inner.transport.clone();
        let result = inner
            .mutator
            .mutate(&inner.cache, id, &patch, move || async move {
                let response = transport.request(request).await?;
                decode_optional::<R>(&response.body)
            })
            .await;

        match &result {
            Ok(updated) => {
                inner.view.write().await.patch_item(id, updated.as_ref(), &patch);
                let dropped = inner.invalidate(invalidate).await;
                debug!(dropped, "action applied");
                inner.emit(StoreEvent::Applied {
                    resource: R::NAME,
                    id: id.to_owned(),
                });
            }
            Err(e) => inner.emit(StoreEvent::Failed {
                resource: R::NAME,
                id: id.to_owned(),
                message: e.user_message(),
            }),
        }
        result
    }

    /// Create an entity. `placeholder` is visible through
    /// [`pending_creates`](Self::pending_creates) until the server answers.
    #[instrument(skip_all, fields(resource = R::NAME))]
    pub async fn create(&self, placeholder: R, body: Value) -> Result<R, StoreError> {
        let inner = &self.inner;
        let transport = inner.transport.clone();
        let result = inner
            .mutator
            .create(&inner.cache, placeholder, move || async move {
                let response = transport
                    .request(ApiRequest::new(Method::POST, R::PATH).json(body))
                    .await?;
                decode_data::<R>(&response.body)
            })
            .await;

        match &result {
            Ok(created) => {
                // A new entity shifts every ranking it could appear in.
                inner.invalidate(Invalidate::All).await;
                inner.emit(StoreEvent::Applied {
                    resource: R::NAME,
                    id: created.id().to_owned(),
                });
            }
            Err(e) => inner.emit(StoreEvent::Failed {
                resource: R::NAME,
                id: String::new(),
                message: e.user_message(),
            }),
        }
        result
    }

    /// Delete an entity once the server confirms.
    #[instrument(skip_all, fields(resource = R::NAME, id = %id))]
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let inner = &self.inner;
        let transport = inner.transport.clone();
        let path = R::detail_path(id);
        let result = inner
            .mutator
            .remove(&inner.cache, id, move || async move {
                transport
                    .request(ApiRequest::new(Method::DELETE, path))
                    .await
                    .map(drop)
            })
            .await;

        match result {
            Ok(views) => {
                debug!(views, "entity deleted");
                inner.view.write().await.remove_item(id);
                inner.emit(StoreEvent::Applied {
                    resource: R::NAME,
                    id: id.to_owned(),
                });
                Ok(())
            }
            Err(e) => {
                inner.emit(StoreEvent::Failed {
                    resource: R::NAME,
                    id: id.to_owned(),
                    message: e.user_message(),
                });
                Err(e)
            }
        }
    }

    /// Entities created locally and still awaiting the server.
    pub async fn pending_creates(&self) -> Vec<R> {
        self.inner.cache.read().await.placeholders()
    }

    /// Drop list views. Returns how many canonical buffers went.
    pub async fn invalidate_lists(&self, which: Invalidate) -> usize {
        self.inner.invalidate(which).await
    }

    /// Forget everything cached. In-flight requests still complete.
    pub async fn clear(&self) {
        self.inner.cache.write().await.clear();
        self.inner.etags.clear();
        self.inner.errors.clear();
    }

    /// Read access to the caches, for inspection.
    pub async fn with_cache<T>(&self, read: impl FnOnce(&ResourceCache<R>) -> T) -> T {
        read(&*self.inner.cache.read().await)
    }
}

impl<R: Resource> StoreInner<R> {
    /// Token for a new list request, aborting earlier ones when asked.
    async fn begin_list(&self, abort_previous: bool) -> CancellationToken {
        let mut parent = self.cancel.lock().await;
        if abort_previous {
            parent.cancel();
            *parent = CancellationToken::new();
        }
        parent.child_token()
    }

    fn is_latest(&self, seq: u64) -> bool {
        self.seq.load(Ordering::Acquire) == seq
    }

    async fn show_page(&self, seq: u64, params: &PaginationParams, page: Page<R>) {
        let mut view = self.view.write().await;
        if !self.is_latest(seq) {
            debug!(seq, "discarding out-of-order list response");
            return;
        }
        view.show(params.clone(), page);
    }

    async fn show_error(&self, seq: u64, params: &PaginationParams, err: &StoreError) {
        let stale = self.cache.read().await.list.get_stale(params);
        let mut view = self.view.write().await;
        if !self.is_latest(seq) {
            return;
        }
        view.fail(params.clone(), err.user_message(), stale);
    }

    async fn invalidate(&self, which: Invalidate) -> usize {
        let mut cache = self.cache.write().await;
        let dropped = match which {
            Invalidate::Nothing => 0,
            Invalidate::Dimensions(dims) => cache
                .list
                .invalidate_where(|key| dims.iter().any(|dim| key.has_filter(dim))),
            Invalidate::All => {
                let n = cache.list.len();
                cache.list.clear();
                n
            }
        };
        if dropped > 0 {
            // Validators for dropped pages would turn a refetch into a 304 with nothing to serve.
            self.etags.clear();
        }
        dropped
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

async fn load_page<R: Resource>(
    inner: Arc<StoreInner<R>>,
    params: PaginationParams,
) -> Result<Page<R>, StoreError> {
    let page_key = params.page_key();
    let etag = if R::CONDITIONAL {
        inner.etags.get(&page_key).map(|e| e.clone())
    } else {
        None
    };
    let request = ApiRequest::get(R::PATH)
        .query(params.to_query_pairs())
        .if_none_match(etag);

    let response = inner.transport.request(request.clone()).await?;
    if response.is_not_modified() {
        if let Some(page) = inner.cache.write().await.list.refresh_page(&params) {
            debug!(key = %page_key, "list page not modified");
            return Ok(page);
        }
        debug!(key = %page_key, "304 for a page no longer cached, refetching");
        inner.etags.remove(&page_key);
        let response = inner.transport.request(request.if_none_match(None)).await?;
        return merge_page(&inner, &params, response).await;
    }
    merge_page(&inner, &params, response).await
}

async fn merge_page<R: Resource>(
    inner: &StoreInner<R>,
    params: &PaginationParams,
    response: ApiResponse,
) -> Result<Page<R>, StoreError> {
    let page: Page<R> = decode_page(&response.body, params.limit)?;
    let mut cache = inner.cache.write().await;
    cache.list.put(params, page.clone());
    if R::CONDITIONAL {
        if let Some(etag) = response.etag {
            inner.etags.insert(params.page_key(), etag);
        }
        // Validators only make sense for pages the cache can still serve on a 304.
        inner.etags.retain(|key, _| cache.list.has_page(key));
    }
    Ok(page)
}

async fn load_detail<R: Resource>(inner: Arc<StoreInner<R>>, id: String) -> Result<R, StoreError> {
    let not_found = || StoreError::NotFound {
        resource: R::NAME,
        id: id.clone(),
    };
    let response = match inner.transport.request(ApiRequest::get(R::detail_path(&id))).await {
        Err(StoreError::Network {
            status: Some(404), ..
        }) => return Err(not_found()),
        other => other?,
    };
    let item: R = decode_optional(&response.body)?.ok_or_else(not_found)?;
    inner.cache.write().await.detail.put(id.clone(), item.clone());
    Ok(item)
}
