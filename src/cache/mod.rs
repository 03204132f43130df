//! Client-side caching primitives shared by every resource store.

pub mod buffer;
pub mod clock;
pub mod coalesce;
pub mod detail;
pub mod entry;
pub mod eviction;
pub mod key;
pub mod optimistic;
pub mod paginated;
pub mod resource;

pub use buffer::CanonicalBuffer;
pub use clock::Clock;
pub use coalesce::RequestCoalescer;
pub use detail::DetailCache;
pub use entry::CacheEntry;
pub use key::{CanonicalKey, PageKey, PaginationParams, SortOrder};
pub use optimistic::OptimisticMutator;
pub use paginated::{ItemLocation, Page, PaginatedResourceCache, PersistedListCache};
pub use resource::{
    CacheSettings, MutationSnapshot, PersistedCache, ResourceCache, TempKey,
};

/// Entities addressable by a server-assigned id.
pub trait Identified {
    fn id(&self) -> &str;
}
