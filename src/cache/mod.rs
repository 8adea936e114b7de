//! Caching module
//!
//! Explicit, host-owned memoization. Nothing in the pipeline caches on its
//! own; a host opts in by holding a [`MemoCache`] and deciding when to
//! [`invalidate`](MemoCache::invalidate) it.

mod memo;

pub use memo::{CacheEntry, CacheStats, MemoCache};
