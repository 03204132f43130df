use crate::cache::{Identified, Page, PaginationParams};
use serde::Serialize;

/// What a list screen renders: the latest query, the page on display, and
/// the error from the latest attempt if it failed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListView<T> {
    /// Most recently requested query.
    pub query: Option<PaginationParams>,
    /// Page on display. May belong to an older query while a newer one loads.
    pub page: Option<Page<T>>,
    pub error: Option<String>,
    pub loading: bool,
    /// Query `page` was produced for.
    #[serde(skip)]
    shown: Option<PaginationParams>,
}

impl<T> Default for ListView<T> {
    fn default() -> Self {
        Self {
            query: None,
            page: None,
            error: None,
            loading: false,
            shown: None,
        }
    }
}

impl<T: Identified + Clone> ListView<T> {
    pub fn shown_query(&self) -> Option<&PaginationParams> {
        self.shown.as_ref()
    }

    pub(crate) fn issue(&mut self, params: PaginationParams) {
        self.query = Some(params);
        self.loading = true;
    }

    pub(crate) fn show(&mut self, params: PaginationParams, page: Page<T>) {
        self.shown = Some(params);
        self.page = Some(page);
        self.error = None;
        self.loading = false;
    }

    /// Keep the last good page unless the cache has an older copy of the
    /// failed query itself.
    pub(crate) fn fail(&mut self, params: PaginationParams, message: String, stale: Option<Page<T>>) {
        if let Some(stale) = stale {
            self.shown = Some(params);
            self.page = Some(stale);
        }
        self.error = Some(message);
        self.loading = false;
    }

    /// Mirror a committed mutation onto the page on display, for when its
    /// cache entry has already been evicted or invalidated.
    pub(crate) fn patch_item(&mut self, id: &str, server: Option<&T>, patch: &dyn Fn(&mut T)) {
        let Some(page) = self.page.as_mut() else {
            return;
        };
        for item in page.items.iter_mut().filter(|item| item.id() == id) {
            match server {
                Some(server) => *item = server.clone(),
                None => patch(item),
            }
        }
    }

    pub(crate) fn remove_item(&mut self, id: &str) {
        if let Some(page) = self.page.as_mut() {
            let before = page.items.len();
            page.items.retain(|item| item.id() != id);
            page.total = page.total.saturating_sub(before - page.items.len());
        }
    }

    /// Restore the query only; the page comes back from the cache or the next fetch.
    pub(crate) fn restore_query(&mut self, params: PaginationParams) {
        self.shown = Some(params.clone());
        self.query = Some(params);
    }
}

/// Outcome of a mutation, for toast-style notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Applied {
        resource: &'static str,
        id: String,
    },
    Failed {
        resource: &'static str,
        id: String,
        message: String,
    },
}
