use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResilienceError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Upstream returned status {status}: {message}")]
    UpstreamError { status: u16, message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },
}

impl ResilienceError {
    /// 是否為暫時性錯誤 (稍後重試可能成功)
    pub fn is_transient(&self) -> bool {
        match self {
            ResilienceError::ApiError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ResilienceError::UpstreamError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ResilienceError>;

/// Failure returned by [`CircuitBreaker::call`](crate::core::circuit_breaker::CircuitBreaker::call).
#[derive(Error, Debug)]
pub enum CircuitBreakerError<E> {
    /// The circuit is open; the operation was not invoked.
    #[error("circuit '{name}' is open, retry after {retry_after:?}")]
    Open { name: String, retry_after: Duration },

    /// The per-call deadline fired before the operation finished.
    #[error("call through circuit '{name}' timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    /// The operation's own failure, recorded and passed through unchanged.
    #[error("{0}")]
    Upstream(E),
}

impl<E> CircuitBreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitBreakerError::Open { .. })
    }

    pub fn into_upstream(self) -> Option<E> {
        match self {
            CircuitBreakerError::Upstream(e) => Some(e),
            _ => None,
        }
    }
}
