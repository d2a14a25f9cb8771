//! Graphmind filtered-view cache.
//!
//! A filtered view of the edge journal (everything matching one
//! [`Filter`](graphmind_edge::Filter) over one scope) is materialized as a
//! compressed bitmap of journal sequence numbers and cached:
//! - [`EdgeBitmap`]: the roaring-backed index plus its on-disk framing
//! - [`EdgeCache`]: keyed slots with single-owner rebuild and staleness
//!   tracking against the journal tip
//! - [`FileOps`]: the filesystem seam, so tests run against memory
//!
//! Lookups never block behind a slow rebuild forever: a waiter that hits the
//! rebuild deadline is handed the previous generation marked
//! [`Freshness::PossiblyStale`] when one exists.

pub mod bitmap;
pub mod error;
pub mod fsops;
pub mod manager;

pub use bitmap::{EdgeBitmap, CACHE_FORMAT_VERSION, CACHE_MAGIC};
pub use error::CacheError;
pub use fsops::{FileOps, MemFileOps, SystemFileOps};
pub use manager::{
    build_index, is_stale, CacheConfig, CacheEntry, CacheKey, CacheMeta, CacheStats, CachedView,
    CancelToken, EdgeCache, Freshness, Lookup, RebuildGuard,
};
