//! Per-provider circuit breaker. Textbook closed/open/half-open state
//! machine, in the style of the rest of the gateway (small struct,
//! `tokio::sync::Mutex`-guarded state, no external crate).

use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: State,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Tracks one provider's health. `closed` lets calls through; after
/// `failure_threshold` consecutive failures it `open`s and rejects calls
/// until `reset_timeout` elapses, then allows one probe call
/// (`half_open`) whose outcome closes or reopens the circuit.
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        CircuitBreaker {
            failure_threshold,
            reset_timeout,
            inner: Mutex::new(Inner {
                state: State::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Whether a call should be allowed through right now. Transitions
    /// `Open` → `HalfOpen` if the reset timeout has elapsed.
    pub async fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.state {
            State::Closed | State::HalfOpen => true,
            State::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or(Duration::ZERO);
                if elapsed >= self.reset_timeout {
                    inner.state = State::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        inner.state = State::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    pub async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            State::HalfOpen => {
                inner.state = State::Open;
                inner.opened_at = Some(Instant::now());
            }
            State::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = State::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            State::Open => {}
        }
    }

    /// Read-only health check — does not transition `Open` → `HalfOpen`
    /// even if the reset timeout has elapsed, unlike `allow_request`.
    pub async fn is_healthy(&self) -> bool {
        !matches!(self.inner.lock().await.state, State::Open)
    }

    #[cfg(test)]
    async fn is_open(&self) -> bool {
        matches!(self.inner.lock().await.state, State::Open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closed_allows_requests() {
        let cb = CircuitBreaker::new(5, Duration::from_secs(60));
        assert!(cb.allow_request().await);
    }

    #[tokio::test]
    async fn test_opens_after_threshold_failures() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            cb.record_failure().await;
        }
        assert!(cb.is_open().await);
        assert!(!cb.allow_request().await);
    }

    #[tokio::test]
    async fn test_does_not_open_below_threshold() {
        let cb = CircuitBreaker::new(5, Duration::from_secs(60));
        for _ in 0..4 {
            cb.record_failure().await;
        }
        assert!(!cb.is_open().await);
        assert!(cb.allow_request().await);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let cb = CircuitBreaker::new(3, Duration::from_secs(60));
        cb.record_failure().await;
        cb.record_failure().await;
        cb.record_success().await;
        cb.record_failure().await;
        assert!(!cb.is_open().await);
    }

    #[tokio::test]
    async fn test_half_open_after_reset_timeout() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(10));
        cb.record_failure().await;
        assert!(cb.is_open().await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cb.allow_request().await);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(10));
        cb.record_failure().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cb.allow_request().await);
        cb.record_failure().await;
        assert!(cb.is_open().await);
    }

    #[tokio::test]
    async fn test_half_open_success_closes() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(10));
        cb.record_failure().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cb.allow_request().await);
        cb.record_success().await;
        assert!(!cb.is_open().await);
        assert!(cb.allow_request().await);
    }
}
