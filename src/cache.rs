//! Read-through caching for query results.
//!
//! Cache keys are built from a table-scoped prefix plus a hash of the
//! query options, so any change to filter, sort or pagination yields a
//! distinct entry. Invalidation drops everything under the table's prefix
//! after a write.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::query::QueryOptions;

/// Build a cache key from a prefix and the query options.
///
/// Default options hash to the bare prefix so the common "list everything"
/// call shares one entry.
pub fn cache_key(prefix: &str, options: &QueryOptions) -> String {
    if *options == QueryOptions::default() {
        return prefix.to_string();
    }
    let encoded = serde_json::to_string(options).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(encoded.as_bytes());
    format!("{}{:x}", prefix, hasher.finalize())
}

/// Storage interface for cached query results.
///
/// Values are JSON strings; the repository owns (de)serialization. A store
/// may drop entries at any time.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String, ttl: Option<Duration>);
    /// Remove every entry whose key starts with `prefix`.
    fn remove_prefix(&self, prefix: &str);
}

/// In-process cache store with per-entry expiry.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().map(|map| map.len()).unwrap_or(0)
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some(entry) => {
                if entry
                    .expires_at
                    .is_some_and(|deadline| Instant::now() >= deadline)
                {
                    entries.remove(key);
                    return None;
                }
                Some(entry.value.clone())
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: String, ttl: Option<Duration>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                key.to_string(),
                CacheEntry {
                    value,
                    expires_at: ttl.map(|ttl| Instant::now() + ttl),
                },
            );
        }
    }

    fn remove_prefix(&self, prefix: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            let before = entries.len();
            entries.retain(|key, _| !key.starts_with(prefix));
            let dropped = before - entries.len();
            if dropped > 0 {
                debug!(prefix, dropped, "cache invalidated");
            }
        }
    }
}
