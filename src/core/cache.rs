//! In-memory lyrics cache with negative entries.

use crate::core::text::CacheKey;
use crate::domain::model::CachedLyrics;
use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheConfig {
    /// `None` keeps every entry for the life of the process.
    pub max_entries: Option<usize>,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<CacheKey, CachedLyrics>,
    // 插入順序，容量滿時從最舊的開始淘汰
    order: VecDeque<CacheKey>,
}

/// Shared key/value store. Concurrent writers for the same key are allowed;
/// the last write wins.
#[derive(Debug, Default)]
pub struct ContentCache {
    inner: RwLock<CacheInner>,
    config: CacheConfig,
}

impl ContentCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: RwLock::new(CacheInner::default()),
            config,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(CacheConfig::default())
    }

    pub fn get(&self, key: &CacheKey) -> Option<CachedLyrics> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.entries.get(key).cloned()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.entries.contains_key(key)
    }

    pub fn insert(&self, key: CacheKey, value: CachedLyrics) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        if inner.entries.insert(key.clone(), value).is_some() {
            return;
        }
        inner.order.push_back(key);

        if let Some(max) = self.config.max_entries {
            while inner.entries.len() > max {
                let Some(oldest) = inner.order.pop_front() else {
                    break;
                };
                inner.entries.remove(&oldest);
                tracing::debug!(key = %oldest, "Evicted oldest cache entry");
            }
        }
    }

    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let removed = inner.entries.remove(key).is_some();
        if removed {
            inner.order.retain(|k| k != key);
        }
        removed
    }

    /// Drops negative entries caused by failures, keeping confirmed misses.
    /// Returns how many entries were removed.
    pub fn purge_transient(&self) -> usize {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let before = inner.entries.len();
        inner.entries.retain(|_, value| match value {
            CachedLyrics::Missing(reason) => !reason.is_transient(),
            CachedLyrics::Found(_) => true,
        });

        let CacheInner { entries, order } = &mut *inner;
        order.retain(|k| entries.contains_key(k));
        before - entries.len()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
