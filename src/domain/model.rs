use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A (title, artist) pair as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackQuery {
    pub title: String,
    pub artist: String,
}

impl TrackQuery {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
        }
    }
}

/// Raw search hit returned by a [`LyricsSource`](crate::domain::ports::LyricsSource).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricsMatch {
    pub lyrics: String,
    pub title: Option<String>,
    pub artist: Option<String>,
}

impl LyricsMatch {
    pub fn new(lyrics: impl Into<String>) -> Self {
        Self {
            lyrics: lyrics.into(),
            title: None,
            artist: None,
        }
    }
}

/// Why a lookup is cached as a miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissReason {
    /// Upstream answered and had nothing.
    NotFound,
    /// Upstream call failed (transport, status, timeout).
    UpstreamError,
    /// The circuit breaker rejected the call.
    CircuitOpen,
}

impl MissReason {
    /// Misses that may resolve on a later attempt.
    pub fn is_transient(&self) -> bool {
        !matches!(self, MissReason::NotFound)
    }
}

/// A cache value. `Missing` is the negative marker, distinct from "not cached".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CachedLyrics {
    Found(String),
    Missing(MissReason),
}

impl CachedLyrics {
    pub fn lyrics(&self) -> Option<&str> {
        match self {
            CachedLyrics::Found(text) => Some(text),
            CachedLyrics::Missing(_) => None,
        }
    }

    pub fn into_lyrics(self) -> Option<String> {
        match self {
            CachedLyrics::Found(text) => Some(text),
            CachedLyrics::Missing(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        };
        f.write_str(label)
    }
}

/// Read-only view of a circuit breaker, safe to hand to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub cache_size: usize,
    pub calls_in_current_window: u32,
}
