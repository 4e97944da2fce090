pub mod cache;
pub mod circuit_breaker;
pub mod fetcher;
pub mod rate_limiter;
pub mod registry;
pub mod text;

pub use crate::domain::model::{CacheStats, CachedLyrics, CircuitSnapshot, CircuitState, MissReason};
pub use crate::domain::ports::{Clock, LyricsSource};
pub use crate::utils::error::Result;
