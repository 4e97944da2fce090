//! Circuit breaker for a single upstream dependency.
//!
//! # States
//! - Closed: normal operation, every call goes through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: calls go through as trials until enough succeed
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= failure_threshold
//! Open → Half-Open: recovery_timeout elapsed since the last failure (checked on call)
//! Half-Open → Closed: success_count >= success_threshold
//! Half-Open → Open: any failure
//! ```
//!
//! Bookkeeping happens under one mutex; the wrapped operation always runs
//! with the mutex released.

use crate::domain::model::{CircuitSnapshot, CircuitState};
use crate::domain::ports::Clock;
use crate::utils::error::CircuitBreakerError;
use crate::utils::validation::{validate_non_empty_string, validate_positive_number, Validate};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the circuit.
    pub failure_threshold: u32,
    /// Time spent open before a trial call is let through.
    pub recovery_timeout: Duration,
    /// Consecutive half-open successes needed to close.
    pub success_threshold: u32,
    /// Optional deadline per call; expiry counts as a failure.
    pub call_timeout: Option<Duration>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
            call_timeout: None,
        }
    }
}

impl Validate for CircuitBreakerConfig {
    fn validate(&self) -> crate::utils::error::Result<()> {
        validate_positive_number("circuit_breaker.failure_threshold", self.failure_threshold, 1)?;
        validate_positive_number("circuit_breaker.success_threshold", self.success_threshold, 1)?;
        validate_positive_number(
            "circuit_breaker.recovery_timeout_seconds",
            self.recovery_timeout.as_secs_f64(),
            0.001,
        )?;
        Ok(())
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
    last_failure_time: Option<DateTime<Utc>>,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure: None,
            last_failure_time: None,
        }
    }
}

pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            inner: Mutex::new(BreakerState::closed()),
        }
    }

    /// Builds a breaker after checking its name and configuration.
    pub fn try_new(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> crate::utils::error::Result<Self> {
        let name = name.into();
        validate_non_empty_string("circuit_breaker.name", &name)?;
        config.validate()?;
        Ok(Self::new(name, config, clock))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> CircuitBreakerConfig {
        self.config
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Runs `operation` under the breaker policy.
    ///
    /// Returns [`CircuitBreakerError::Open`] without invoking `operation` while
    /// the circuit is open and the recovery timeout has not elapsed. Any
    /// failure of the operation is recorded and handed back unchanged inside
    /// [`CircuitBreakerError::Upstream`]; there are no internal retries.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Err(retry_after) = self.acquire_permission() {
            tracing::debug!(
                breaker = %self.name,
                retry_after_ms = retry_after.as_millis() as u64,
                "Circuit open, rejecting call"
            );
            return Err(CircuitBreakerError::Open {
                name: self.name.clone(),
                retry_after,
            });
        }

        let outcome = match self.config.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, operation()).await {
                Ok(result) => result.map_err(CircuitBreakerError::Upstream),
                Err(_) => Err(CircuitBreakerError::Timeout {
                    name: self.name.clone(),
                    timeout: limit,
                }),
            },
            None => operation().await.map_err(CircuitBreakerError::Upstream),
        };

        match outcome {
            Ok(_) => self.on_success(),
            Err(_) => self.on_failure(),
        }
        outcome
    }

    /// Immutable view of the current state. Never triggers a transition.
    pub fn get_state(&self) -> CircuitSnapshot {
        let inner = self.lock();
        CircuitSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            last_failure_time: inner.last_failure_time,
        }
    }

    /// Forces the circuit closed and clears all counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        let previous = inner.state;
        *inner = BreakerState::closed();
        tracing::info!(breaker = %self.name, from = %previous, "Circuit manually reset");
    }

    /// Decides whether a call may proceed. `Err` carries the time left
    /// before a trial is allowed.
    fn acquire_permission(&self) -> Result<(), Duration> {
        let now = self.clock.now();
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|at| now.saturating_duration_since(at))
                    .unwrap_or(self.config.recovery_timeout);

                if elapsed >= self.config.recovery_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.success_count = 0;
                    inner.failure_count = 0;
                    tracing::info!(breaker = %self.name, "Circuit half-open, allowing trial call");
                    Ok(())
                } else {
                    Err(self.config.recovery_timeout - elapsed)
                }
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.success_count = 0;
                    inner.failure_count = 0;
                    tracing::info!(breaker = %self.name, "Circuit closed, dependency recovered");
                }
            }
            // 開路前就已送出的呼叫晚到的成功結果，不影響狀態
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let now = self.clock.now();
        let now_utc = self.clock.utc_now();
        let mut inner = self.lock();

        inner.failure_count += 1;
        inner.last_failure = Some(now);
        inner.last_failure_time = Some(now_utc);

        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    tracing::warn!(
                        breaker = %self.name,
                        failures = inner.failure_count,
                        recovery_timeout_secs = self.config.recovery_timeout.as_secs(),
                        "Circuit opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.success_count = 0;
                tracing::warn!(breaker = %self.name, "Trial call failed, circuit re-opened");
            }
            CircuitState::Open => {}
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        // 臨界區內不會 panic，中毒時狀態仍一致
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    fn breaker(config: CircuitBreakerConfig) -> (Arc<ManualClock>, CircuitBreaker) {
        let clock = Arc::new(ManualClock::new());
        let breaker = CircuitBreaker::new("lyrics", config, clock.clone());
        (clock, breaker)
    }

    async fn fail(breaker: &CircuitBreaker, invocations: &AtomicUsize) {
        let result = breaker
            .call(|| async move {
                invocations.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("upstream down")
            })
            .await;
        assert_err!(result);
    }

    async fn succeed(breaker: &CircuitBreaker, invocations: &AtomicUsize) {
        let result = breaker
            .call(|| async move {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(42)
            })
            .await;
        assert_eq!(assert_ok!(result), 42);
    }

    #[tokio::test]
    async fn test_trips_open_after_threshold_and_rejects_without_invoking() {
        let (_clock, breaker) = breaker(CircuitBreakerConfig {
            failure_threshold: 5,
            ..Default::default()
        });
        let invocations = AtomicUsize::new(0);

        for _ in 0..4 {
            fail(&breaker, &invocations).await;
            assert_eq!(breaker.state(), CircuitState::Closed);
        }
        fail(&breaker, &invocations).await;
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(invocations.load(Ordering::SeqCst), 5);

        let counter = &invocations;
        let sixth = breaker
            .call(|| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(())
            })
            .await;

        assert!(sixth.unwrap_err().is_open());
        assert_eq!(invocations.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count_while_closed() {
        let (_clock, breaker) = breaker(CircuitBreakerConfig {
            failure_threshold: 3,
            ..Default::default()
        });
        let invocations = AtomicUsize::new(0);

        fail(&breaker, &invocations).await;
        fail(&breaker, &invocations).await;
        assert_eq!(breaker.get_state().failure_count, 2);

        succeed(&breaker, &invocations).await;
        assert_eq!(breaker.get_state().failure_count, 0);

        fail(&breaker, &invocations).await;
        fail(&breaker, &invocations).await;
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_open_error_reports_remaining_cooldown() {
        let (clock, breaker) = breaker(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_secs(60),
            ..Default::default()
        });
        let invocations = AtomicUsize::new(0);

        fail(&breaker, &invocations).await;
        clock.advance(Duration::from_secs(15));

        let err = breaker
            .call(|| async { Ok::<_, &str>(()) })
            .await
            .unwrap_err();
        match err {
            CircuitBreakerError::Open { name, retry_after } => {
                assert_eq!(name, "lyrics");
                assert_eq!(retry_after, Duration::from_secs(45));
            }
            other => panic!("expected open circuit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_recovers_after_timeout_and_success_threshold() {
        let (clock, breaker) = breaker(CircuitBreakerConfig {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
            call_timeout: None,
        });
        let invocations = AtomicUsize::new(0);

        for _ in 0..5 {
            fail(&breaker, &invocations).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        clock.advance(Duration::from_secs(61));

        succeed(&breaker, &invocations).await;
        let snapshot = breaker.get_state();
        assert_eq!(snapshot.state, CircuitState::HalfOpen);
        assert_eq!(snapshot.success_count, 1);
        assert_eq!(snapshot.failure_count, 0);

        succeed(&breaker, &invocations).await;
        let snapshot = breaker.get_state();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.failure_count, 0);
        assert_eq!(snapshot.success_count, 0);
    }

    #[tokio::test]
    async fn test_trial_transitions_to_half_open_before_executing() {
        let (clock, breaker) = breaker(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_secs(30),
            ..Default::default()
        });
        let invocations = AtomicUsize::new(0);

        fail(&breaker, &invocations).await;
        clock.advance(Duration::from_secs(30));

        let observed = &breaker;
        let seen = breaker
            .call(|| async move { Ok::<_, &str>(observed.state()) })
            .await
            .unwrap();
        assert_eq!(seen, CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn test_failure_in_half_open_reopens_with_new_timestamp() {
        let (clock, breaker) = breaker(CircuitBreakerConfig {
            failure_threshold: 2,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 3,
            call_timeout: None,
        });
        let invocations = AtomicUsize::new(0);

        fail(&breaker, &invocations).await;
        fail(&breaker, &invocations).await;
        let first_trip = breaker.get_state().last_failure_time.unwrap();

        clock.advance(Duration::from_secs(90));
        succeed(&breaker, &invocations).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        clock.advance(Duration::from_secs(1));
        fail(&breaker, &invocations).await;

        let snapshot = breaker.get_state();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.success_count, 0);
        assert_eq!(snapshot.last_failure_time, Some(clock.utc_now()));
        assert_eq!((snapshot.last_failure_time.unwrap() - first_trip).num_seconds(), 91);

        // cooldown restarts from the half-open failure
        clock.advance(Duration::from_secs(59));
        let before = invocations.load(Ordering::SeqCst);
        let rejected = breaker.call(|| async { Ok::<_, &str>(0) }).await;
        assert!(rejected.unwrap_err().is_open());
        assert_eq!(invocations.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn test_reset_always_closes() {
        let (_clock, breaker) = breaker(CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        });
        let invocations = AtomicUsize::new(0);

        fail(&breaker, &invocations).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();

        let snapshot = breaker.get_state();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.failure_count, 0);
        assert_eq!(snapshot.success_count, 0);
        assert!(snapshot.last_failure_time.is_none());

        succeed(&breaker, &invocations).await;
    }

    #[tokio::test]
    async fn test_get_state_does_not_transition() {
        let (clock, breaker) = breaker(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_secs(5),
            ..Default::default()
        });
        let invocations = AtomicUsize::new(0);

        fail(&breaker, &invocations).await;
        clock.advance(Duration::from_secs(10));

        // 超過恢復時間，但只有 call 會觸發轉換
        assert_eq!(breaker.get_state().state, CircuitState::Open);
        assert_eq!(breaker.get_state().state, CircuitState::Open);
    }

    #[tokio::test]
    async fn test_call_timeout_counts_as_failure() {
        let (_clock, breaker) = breaker(CircuitBreakerConfig {
            failure_threshold: 1,
            call_timeout: Some(Duration::from_millis(20)),
            ..Default::default()
        });

        let result = breaker
            .call(|| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok::<_, &str>(())
            })
            .await;

        assert!(matches!(result, Err(CircuitBreakerError::Timeout { .. })));
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_upstream_error_is_passed_through_unchanged() {
        let (_clock, breaker) = breaker(CircuitBreakerConfig::default());

        let result: Result<(), _> = breaker
            .call(|| async { Err(std::io::Error::new(std::io::ErrorKind::Other, "socket closed")) })
            .await;

        let inner = result.unwrap_err().into_upstream().unwrap();
        assert_eq!(inner.kind(), std::io::ErrorKind::Other);
        assert_eq!(inner.to_string(), "socket closed");
        assert_eq!(breaker.get_state().failure_count, 1);
    }

    #[test]
    fn test_try_new_validates_config() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new());
        let bad = CircuitBreakerConfig {
            failure_threshold: 0,
            ..Default::default()
        };
        assert!(CircuitBreaker::try_new("lyrics", bad, clock.clone()).is_err());
        assert!(CircuitBreaker::try_new(" ", CircuitBreakerConfig::default(), clock.clone()).is_err());
        assert!(CircuitBreaker::try_new("lyrics", CircuitBreakerConfig::default(), clock).is_ok());
    }
}
