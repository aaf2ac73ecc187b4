//! Bounded TTL cache for model responses

use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// LRU cache whose entries also expire after a TTL.
///
/// Capacity bounds memory; the TTL bounds staleness. Both evictions are lazy.
pub struct TtlCache<K: Hash + Eq, V: Clone> {
    entries: Mutex<LruCache<K, CacheEntry<V>>>,
    default_ttl: Duration,
}

impl<K: Hash + Eq, V: Clone> TtlCache<K, V> {
    /// Create cache with the given capacity (min 1) and TTL
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            default_ttl: ttl,
        }
    }

    /// Get cached value if present and not expired
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().ok()?;
        let expired = match entries.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    pub fn set(&self, key: K, value: V) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + self.default_ttl,
        };
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(key, entry);
        }
    }

    /// Entry counts; expired entries count until they are next looked up
    pub fn stats(&self) -> TtlCacheStats {
        match self.entries.lock() {
            Ok(entries) => {
                let now = Instant::now();
                let total = entries.len();
                let expired = entries.iter().filter(|(_, e)| now >= e.expires_at).count();
                TtlCacheStats {
                    total_entries: total,
                    expired_entries: expired,
                    active_entries: total - expired,
                    capacity: entries.cap().get(),
                }
            }
            Err(_) => TtlCacheStats::default(),
        }
    }
}

/// Cache statistics
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TtlCacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
    pub capacity: usize,
}

/// Generate cache key for embeddings
pub fn embedding_cache_key(model: &str, text: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::Hasher;

    let mut hasher = DefaultHasher::new();
    model.hash(&mut hasher);
    text.hash(&mut hasher);
    format!("embed:{}:{:x}", model, hasher.finish())
}

/// Classification verdicts are keyed on the normalized query text
pub fn classification_cache_key(query: &str) -> String {
    query.trim().to_lowercase()
}
