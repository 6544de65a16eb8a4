use crate::prelude::{Arc, Duration, Mutex};
use crate::traits::CacheStats;
use lru::LruCache;
use std::num::NonZeroUsize;
use tokio::time::Instant;

/// A cached value and the time it was stored (or last refreshed)
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at: Instant,
}

#[derive(Debug)]
struct CacheState<V> {
    entries: LruCache<String, CacheEntry<V>>,
    ttl: Duration,
    refresh_on_read: bool,
    stats: CacheStats,
}

impl<V> CacheState<V> {
    fn purge_expired(&mut self, now: Instant) -> usize {
        let ttl = self.ttl;
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.inserted_at) > ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            self.entries.pop(key);
        }
        self.stats.expired += stale.len() as u64;
        stale.len()
    }
}

/// In-memory key/value cache bounded by entry count and age.
///
/// Least-recently-used entries are evicted first once `max_entries` is
/// exceeded, and an entry older than `ttl` reads as a miss and is dropped.
/// With `refresh_on_read` a hit bumps the entry's timestamp as well as its
/// recency. Clones share the same storage.
#[derive(Debug)]
pub struct BoundedCache<V> {
    state: Arc<Mutex<CacheState<V>>>,
}

impl<V: Clone> BoundedCache<V> {
    /// Create a new cache holding at most `max_entries` entries for `ttl`
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Arc::new(Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                ttl,
                refresh_on_read: true,
                stats: CacheStats::default(),
            })),
        }
    }

    /// Keep the original insertion time on reads, making the TTL absolute
    pub fn with_refresh_on_read(self, refresh: bool) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.refresh_on_read = refresh;
        }
        self
    }

    /// Look up a key, treating entries older than the TTL as misses
    pub fn get(&self, key: &str) -> Option<V> {
        let mut guard = self.state.lock().ok()?;
        let state = &mut *guard;
        let now = Instant::now();

        let expired = match state.entries.peek(key) {
            Some(entry) => now.saturating_duration_since(entry.inserted_at) > state.ttl,
            None => {
                state.stats.misses += 1;
                return None;
            }
        };

        if expired {
            state.entries.pop(key);
            state.stats.expired += 1;
            state.stats.misses += 1;
            log::debug!("cache entry {key} expired");
            return None;
        }

        let entry = state.entries.get_mut(key)?;
        if state.refresh_on_read {
            entry.inserted_at = now;
        }
        state.stats.hits += 1;
        Some(entry.value.clone())
    }

    /// Insert or overwrite a key. A full cache first drops its expired
    /// entries, and only then evicts the least recently used live one.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        if let Ok(mut guard) = self.state.lock() {
            let state = &mut *guard;
            let now = Instant::now();
            if state.entries.len() >= state.entries.cap().get() && !state.entries.contains(&key) {
                let purged = state.purge_expired(now);
                if purged > 0 {
                    log::debug!("cache full, dropped {purged} expired entries");
                }
            }

            let entry = CacheEntry {
                value,
                inserted_at: now,
            };
            if let Some((evicted, _)) = state.entries.push(key.clone(), entry) {
                if evicted != key {
                    state.stats.evictions += 1;
                    log::debug!("cache evicted {evicted}");
                }
            }
        }
    }

    /// Check if a live entry exists without touching its recency
    pub fn contains(&self, key: &str) -> bool {
        self.state
            .lock()
            .ok()
            .and_then(|state| {
                state
                    .entries
                    .peek(key)
                    .map(|entry| entry.inserted_at.elapsed() <= state.ttl)
            })
            .unwrap_or(false)
    }

    /// Remove a key from the cache
    pub fn remove(&self, key: &str) -> Option<V> {
        self.state
            .lock()
            .ok()?
            .entries
            .pop(key)
            .map(|entry| entry.value)
    }

    /// Drop every entry that has outlived the TTL, returning how many went
    pub fn purge_expired(&self) -> usize {
        self.state
            .lock()
            .map(|mut state| state.purge_expired(Instant::now()))
            .unwrap_or(0)
    }

    /// Clear all entries from the cache
    pub fn clear(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.entries.clear();
        }
    }

    /// Get the current number of cached entries
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .ok()
            .map(|state| state.entries.len())
            .unwrap_or(0)
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache capacity
    pub fn capacity(&self) -> usize {
        self.state
            .lock()
            .ok()
            .map(|state| state.entries.cap().get())
            .unwrap_or(0)
    }

    pub fn stats(&self) -> CacheStats {
        self.state
            .lock()
            .ok()
            .map(|state| CacheStats {
                size: state.entries.len(),
                ..state.stats.clone()
            })
            .unwrap_or_default()
    }
}

impl<V> Clone for BoundedCache<V> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}
