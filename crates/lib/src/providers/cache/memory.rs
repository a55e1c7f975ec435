use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::{CacheBackend, CacheError};
use crate::constants::CACHE_SWEEP_THRESHOLD;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

#[derive(Debug)]
struct Entries {
    map: HashMap<String, Entry>,
    /// Size at which the next `put` sweeps expired entries.
    sweep_at: usize,
}

impl Default for Entries {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            sweep_at: CACHE_SWEEP_THRESHOLD,
        }
    }
}

/// Process-local TTL cache. Clones share entries.
///
/// Expired entries of abandoned namespaces are never read again, so `put`
/// sweeps them whenever the map reaches `sweep_at`. The mark then moves to
/// twice the surviving size, which keeps sweeps amortized.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<Entries>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries, for assertions.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .map
            .values()
            .filter(|e| e.expires_at.map_or(true, |at| at > now))
            .count()
    }

    /// Number of stored entries, expired ones included.
    pub async fn stored(&self) -> usize {
        self.entries.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.map.get(key) {
                None => return Ok(None),
                Some(entry) if entry.expires_at.map_or(true, |at| at > now) => {
                    return Ok(Some(entry.value.clone()))
                }
                Some(_) => {}
            }
        }
        self.entries.write().await.map.remove(key);
        Ok(None)
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        let mut entries = self.entries.write().await;
        if entries.map.len() >= entries.sweep_at {
            let now = Instant::now();
            entries
                .map
                .retain(|_, e| e.expires_at.map_or(true, |at| at > now));
            entries.sweep_at = (entries.map.len() * 2).max(CACHE_SWEEP_THRESHOLD);
        }
        entries.map.insert(key.to_string(), entry);
        Ok(())
    }
}

/// A cache whose backend is down. Every operation fails.
#[derive(Debug, Clone, Default)]
pub struct UnavailableCache;

#[async_trait]
impl CacheBackend for UnavailableCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::Unavailable("cache backend is offline".to_string()))
    }

    async fn put(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("cache backend is offline".to_string()))
    }
}
