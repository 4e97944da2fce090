use crate::domain::model::LyricsMatch;
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// Time source shared by the breaker and the rate limiter.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic time, used for every elapsed-time decision.
    fn now(&self) -> Instant;

    /// Wall time, only used for reporting.
    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration);
}

/// Upstream lyrics search. `Ok(None)` means the upstream answered with no match.
#[async_trait]
pub trait LyricsSource: Send + Sync {
    async fn search(&self, title: &str, artist: &str) -> Result<Option<LyricsMatch>>;
}

#[async_trait]
impl<T: LyricsSource + ?Sized> LyricsSource for std::sync::Arc<T> {
    async fn search(&self, title: &str, artist: &str) -> Result<Option<LyricsMatch>> {
        (**self).search(title, artist).await
    }
}
