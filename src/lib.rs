pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::LyricsGuardConfig;

pub use adapters::{HttpLyricsSource, ManualClock, SystemClock};
pub use core::{
    cache::{CacheConfig, ContentCache},
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig},
    fetcher::LyricsFetcher,
    rate_limiter::{RateLimiter, RateLimiterConfig},
    registry::BreakerRegistry,
};
pub use domain::model::{
    CacheStats, CachedLyrics, CircuitSnapshot, CircuitState, LyricsMatch, MissReason, TrackQuery,
};
pub use domain::ports::{Clock, LyricsSource};
pub use utils::error::{CircuitBreakerError, ResilienceError, Result};
