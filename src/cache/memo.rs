//! Memoization map with an explicit invalidation generation
//!
//! Entries are tagged with the generation current when they were stored.
//! Bumping the generation makes every existing entry unreachable at once;
//! nothing is ever invalidated implicitly except by the optional TTL and
//! the capacity bound (least recently used first).

use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A cache entry with value and metadata
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub generation: u64,
    pub created_at: Instant,
    pub last_accessed: Instant,
    pub access_count: u64,
}

impl<V> CacheEntry<V> {
    fn new(value: V, generation: u64) -> Self {
        let now = Instant::now();
        Self {
            value,
            generation,
            created_at: now,
            last_accessed: now,
            access_count: 1,
        }
    }

    pub fn is_expired(&self, ttl: Option<Duration>) -> bool {
        ttl.is_some_and(|ttl| self.created_at.elapsed() > ttl)
    }
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub generation: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total > 0 {
            self.hits as f64 / total as f64
        } else {
            0.0
        }
    }
}

struct Inner<K, V> {
    generation: u64,
    entries: HashMap<K, CacheEntry<V>>,
}

/// Thread-safe memoization map keyed by caller-defined identity
pub struct MemoCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    max_entries: usize,
    ttl: Option<Duration>,
    inner: Mutex<Inner<K, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> MemoCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            ttl: None,
            inner: Mutex::new(Inner {
                generation: 0,
                entries: HashMap::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Value stored under `key` in the current generation
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        let generation = inner.generation;

        let stale = inner
            .entries
            .get(key)
            .map(|entry| entry.generation != generation || entry.is_expired(self.ttl));
        match stale {
            None => {
                drop(inner);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Some(true) => {
                inner.entries.remove(key);
                drop(inner);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Some(false) => {}
        }

        let entry = inner.entries.get_mut(key)?;
        entry.last_accessed = Instant::now();
        entry.access_count += 1;
        let value = entry.value.clone();
        drop(inner);
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(value)
    }

    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.lock();
        let generation = inner.generation;
        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.max_entries {
            Self::evict_lru(&mut inner.entries);
        }
        inner.entries.insert(key, CacheEntry::new(value, generation));
    }

    /// Cached value, or compute, store and return it.
    ///
    /// The lock is not held while `compute` runs; concurrent misses on the
    /// same key may each compute.
    pub fn get_or_try_insert_with<E, F>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(v) = self.get(&key) {
            return Ok(v);
        }
        let generation = self.generation();
        let value = compute()?;
        // Drop results computed against a generation that has since ended
        let mut inner = self.inner.lock();
        if inner.generation == generation {
            if !inner.entries.contains_key(&key) && inner.entries.len() >= self.max_entries {
                Self::evict_lru(&mut inner.entries);
            }
            inner
                .entries
                .insert(key, CacheEntry::new(value.clone(), generation));
        }
        Ok(value)
    }

    /// Start a new generation; every existing entry becomes unreachable
    pub fn invalidate(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.entries.clear();
        inner.generation
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.lock().entries.remove(key).map(|e| e.value)
    }

    pub fn contains(&self, key: &K) -> bool {
        let inner = self.inner.lock();
        inner
            .entries
            .get(key)
            .is_some_and(|e| e.generation == inner.generation && !e.is_expired(self.ttl))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: inner.entries.len(),
            generation: inner.generation,
        }
    }

    /// Remove expired entries, returning how many were dropped
    pub fn prune_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        let ttl = self.ttl;
        inner.entries.retain(|_, e| !e.is_expired(ttl));
        before - inner.entries.len()
    }

    fn evict_lru(entries: &mut HashMap<K, CacheEntry<V>>) {
        let oldest = entries
            .iter()
            .min_by_key(|(_, e)| e.last_accessed)
            .map(|(k, _)| k.clone());
        if let Some(key) = oldest {
            entries.remove(&key);
        }
    }
}
