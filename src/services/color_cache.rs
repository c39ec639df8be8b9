//! Bounded URL → color memo shared by every session of a service

use lru::LruCache;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::ColorResult;

/// Counters exposed on the health endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Insertion-ordered cache of successful results.
///
/// Lookups use `peek`, so reads never reorder entries and the LRU list
/// degenerates into insertion order: the entry evicted at capacity is always
/// the oldest inserted. Re-adding a URL moves it to the newest position.
#[derive(Clone)]
pub struct ColorCache {
    entries: Arc<RwLock<LruCache<String, ColorResult>>>,
    capacity: usize,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    evictions: Arc<AtomicU64>,
}

impl ColorCache {
    /// A capacity of zero is treated as one
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Arc::new(RwLock::new(LruCache::new(capacity))),
            capacity: capacity.get(),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            evictions: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn get(&self, url: &str) -> Option<ColorResult> {
        let found = self.entries.read().await.peek(url).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Store a result. Failures are ignored.
    pub async fn add(&self, result: ColorResult) {
        if !result.is_success() {
            return;
        }

        let url = result.url.clone();
        let displaced = self.entries.write().await.push(url.clone(), result);

        if let Some((old_url, _)) = displaced
            && old_url != url
        {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!("Evicted {} from color cache", old_url);
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Up to `limit` entries, newest first
    pub async fn snapshot(&self, limit: usize) -> Vec<ColorResult> {
        self.entries
            .read()
            .await
            .iter()
            .take(limit)
            .map(|(_, result)| result.clone())
            .collect()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len().await,
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
