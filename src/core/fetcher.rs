//! Cached, rate-limited lyrics lookup.
//!
//! # Data Flow
//! ```text
//! fetch(title, artist)
//!     → cache key (trimmed, case-insensitive)
//!     → cache hit: return stored value (may be a negative entry)
//!     → cache miss:
//!         → normalize title/artist
//!         → rate limiter slot (may wait)
//!         → upstream search (optionally through the circuit breaker)
//!         → clean text
//!         → cache positive or negative result
//! ```
//!
//! Upstream failures and open circuits are never surfaced; they are cached
//! and reported as "no lyrics", with the reason kept on the cache entry.

use crate::core::cache::ContentCache;
use crate::core::circuit_breaker::CircuitBreaker;
use crate::core::rate_limiter::RateLimiter;
use crate::core::text::{clean_lyrics, normalize_artist, normalize_title, CacheKey};
use crate::domain::model::{CacheStats, CachedLyrics, LyricsMatch, MissReason, TrackQuery};
use crate::domain::ports::LyricsSource;
use crate::utils::error::{CircuitBreakerError, ResilienceError};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub struct LyricsFetcher<S: LyricsSource> {
    source: S,
    cache: Arc<ContentCache>,
    rate_limiter: Arc<RateLimiter>,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl<S: LyricsSource> LyricsFetcher<S> {
    pub fn new(source: S, cache: Arc<ContentCache>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            source,
            cache,
            rate_limiter,
            breaker: None,
        }
    }

    /// Routes upstream calls through `breaker`.
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.cache
    }

    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.breaker.as_ref()
    }

    /// Lyrics for `(title, artist)`, or `None` when nothing could be found.
    pub async fn fetch(&self, title: &str, artist: &str) -> Option<String> {
        let key = CacheKey::new(title, artist);

        if let Some(cached) = self.cache.get(&key) {
            tracing::debug!(%title, %artist, hit = cached.lyrics().is_some(), "Lyrics cache hit");
            return cached.into_lyrics();
        }

        let query_title = normalize_title(title);
        let query_artist = normalize_artist(artist);
        tracing::debug!(
            %title,
            %artist,
            %query_title,
            %query_artist,
            "Lyrics cache miss, querying upstream"
        );

        self.rate_limiter.admit().await;

        let entry = match self.search(&query_title, &query_artist).await {
            Ok(Some(found)) => {
                let cleaned = clean_lyrics(&found.lyrics);
                if cleaned.is_empty() {
                    CachedLyrics::Missing(MissReason::NotFound)
                } else {
                    CachedLyrics::Found(cleaned)
                }
            }
            Ok(None) => CachedLyrics::Missing(MissReason::NotFound),
            Err(reason) => CachedLyrics::Missing(reason),
        };

        if let CachedLyrics::Missing(reason) = &entry {
            tracing::info!(%title, %artist, ?reason, "No lyrics found");
        }

        self.cache.insert(key, entry.clone());
        entry.into_lyrics()
    }

    async fn search(&self, title: &str, artist: &str) -> Result<Option<LyricsMatch>, MissReason> {
        let Some(breaker) = &self.breaker else {
            return self.source.search(title, artist).await.map_err(|e| {
                tracing::warn!(%title, %artist, error = %e, "Lyrics search failed");
                miss_reason(&e)
            });
        };

        match breaker.call(|| self.source.search(title, artist)).await {
            Ok(found) => Ok(found),
            Err(CircuitBreakerError::Open { retry_after, .. }) => {
                tracing::warn!(
                    %title,
                    %artist,
                    breaker = breaker.name(),
                    retry_after_secs = retry_after.as_secs(),
                    "Lyrics search skipped, circuit open"
                );
                Err(MissReason::CircuitOpen)
            }
            Err(CircuitBreakerError::Upstream(e)) => {
                tracing::warn!(%title, %artist, error = %e, "Lyrics search failed");
                Err(miss_reason(&e))
            }
            Err(e) => {
                tracing::warn!(%title, %artist, error = %e, "Lyrics search failed");
                Err(MissReason::UpstreamError)
            }
        }
    }

    pub fn get_cache_stats(&self) -> CacheStats {
        CacheStats {
            cache_size: self.cache.len(),
            calls_in_current_window: self.rate_limiter.calls_in_current_window(),
        }
    }

    /// Forgets the cached result for one pair so the next fetch goes upstream.
    pub fn invalidate(&self, title: &str, artist: &str) -> bool {
        self.cache.invalidate(&CacheKey::new(title, artist))
    }

    /// Forgets misses that were caused by failures or an open circuit.
    pub fn purge_transient_misses(&self) -> usize {
        let purged = self.cache.purge_transient();
        if purged > 0 {
            tracing::info!(purged, "Purged transient lyrics misses");
        }
        purged
    }
}

/// Transient failures stay purgeable; a rejection the upstream will keep
/// repeating (4xx other than 429) is as good as "no lyrics".
fn miss_reason(error: &ResilienceError) -> MissReason {
    if error.is_transient() {
        MissReason::UpstreamError
    } else {
        MissReason::NotFound
    }
}

impl<S: LyricsSource + 'static> LyricsFetcher<S> {
    /// Fetches many tracks with at most `concurrency` lookups in flight.
    /// Results come back in input order.
    pub async fn fetch_many(
        self: &Arc<Self>,
        queries: Vec<TrackQuery>,
        concurrency: usize,
    ) -> Vec<Option<String>> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut results = vec![None; queries.len()];
        let mut tasks = JoinSet::new();

        for (index, query) in queries.into_iter().enumerate() {
            let fetcher = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (index, None);
                };
                (index, fetcher.fetch(&query.title, &query.artist).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, lyrics)) => results[index] = lyrics,
                Err(e) => tracing::error!(error = %e, "Lyrics fetch task failed"),
            }
        }

        results
    }
}
