//! Per-collaborator circuit breaker
//!
//! Tracks consecutive failures for each collaborator call site and
//! short-circuits calls while a circuit is open. Recovery timing follows the
//! backoff policy: the first trip waits the base delay, and every half-open
//! failure doubles it up to the ceiling.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::coordination::{BackoffPolicy, Clock};
use crate::error::{HelmsmanError, Result};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, calls pass through
    Closed,
    /// Failure threshold exceeded, calls fail fast
    Open,
    /// One trial call permitted; its outcome decides the next state
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Configuration for the circuit breaker
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before a circuit opens
    pub failure_threshold: u32,
    /// Open -> half-open recovery schedule
    pub backoff: BackoffPolicy,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Failure bookkeeping for one collaborator call site
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub collaborator: String,
    pub consecutive_failures: u32,
    pub last_failure: Option<DateTime<Utc>>,
    pub state: CircuitState,
}

impl FailureRecord {
    fn new(collaborator: &str) -> Self {
        Self {
            collaborator: collaborator.to_string(),
            consecutive_failures: 0,
            last_failure: None,
            state: CircuitState::Closed,
        }
    }
}

/// A state change, surfaced so the caller can publish it
#[derive(Debug, Clone)]
pub struct CircuitTransition {
    pub collaborator: String,
    pub from: CircuitState,
    pub to: CircuitState,
}

/// Circuit breaker with one failure record per collaborator call site.
///
/// Owned by the supervisor's single loop; all mutation is local to the
/// record table.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    records: HashMap<String, FailureRecord>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            records: HashMap::new(),
        }
    }

    /// Gate a call to `collaborator`.
    ///
    /// Fails with `CircuitOpen` while the circuit is open and the backoff has
    /// not elapsed since the last failure. Once it has, the circuit moves to
    /// half-open and the call is permitted; the returned transition (if any)
    /// is for the caller to publish.
    pub fn before_call(&mut self, collaborator: &str) -> Result<Option<CircuitTransition>> {
        let now = self.clock.now();
        let delay = self.recovery_delay(collaborator);
        let record = self.entry(collaborator);

        match record.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(None),
            CircuitState::Open => {
                let elapsed = record
                    .last_failure
                    .map(|at| (now - at).to_std().unwrap_or(Duration::ZERO))
                    .unwrap_or(Duration::ZERO);

                if elapsed >= delay {
                    record.state = CircuitState::HalfOpen;
                    info!(collaborator, "circuit half-open, permitting trial call");
                    Ok(Some(CircuitTransition {
                        collaborator: collaborator.to_string(),
                        from: CircuitState::Open,
                        to: CircuitState::HalfOpen,
                    }))
                } else {
                    Err(HelmsmanError::CircuitOpen {
                        collaborator: collaborator.to_string(),
                        retry_in: delay - elapsed,
                    })
                }
            }
        }
    }

    /// Record a successful call: failure count resets, circuit closes.
    /// Idempotent on an already-closed circuit.
    pub fn record_success(&mut self, collaborator: &str) -> Option<CircuitTransition> {
        let record = self.entry(collaborator);
        let from = record.state;
        record.consecutive_failures = 0;
        record.state = CircuitState::Closed;

        if from == CircuitState::Closed {
            None
        } else {
            info!(collaborator, "circuit closed, normal operation resumed");
            Some(CircuitTransition {
                collaborator: collaborator.to_string(),
                from,
                to: CircuitState::Closed,
            })
        }
    }

    /// Record a failed call. Trips to open at the threshold; a half-open
    /// circuit reopens immediately.
    pub fn record_failure(&mut self, collaborator: &str) -> Option<CircuitTransition> {
        let now = self.clock.now();
        let threshold = self.config.failure_threshold;
        let record = self.entry(collaborator);

        record.consecutive_failures += 1;
        record.last_failure = Some(now);
        let from = record.state;

        let reopen = from == CircuitState::HalfOpen;
        let trip = from == CircuitState::Closed && record.consecutive_failures >= threshold;

        if reopen || trip {
            record.state = CircuitState::Open;
            warn!(
                collaborator,
                failures = record.consecutive_failures,
                "circuit opened"
            );
            Some(CircuitTransition {
                collaborator: collaborator.to_string(),
                from,
                to: CircuitState::Open,
            })
        } else {
            None
        }
    }

    /// Current state for a collaborator (closed if never seen)
    pub fn state(&self, collaborator: &str) -> CircuitState {
        self.records
            .get(collaborator)
            .map(|r| r.state)
            .unwrap_or(CircuitState::Closed)
    }

    pub fn record(&self, collaborator: &str) -> Option<&FailureRecord> {
        self.records.get(collaborator)
    }

    /// Delay before an open circuit may half-open: base for the first trip,
    /// doubling with each failure beyond the threshold.
    fn recovery_delay(&self, collaborator: &str) -> Duration {
        let beyond_threshold = self
            .records
            .get(collaborator)
            .map(|r| {
                r.consecutive_failures
                    .saturating_sub(self.config.failure_threshold)
            })
            .unwrap_or(0);
        self.config.backoff.next_delay(beyond_threshold)
    }

    fn entry(&mut self, collaborator: &str) -> &mut FailureRecord {
        self.records
            .entry(collaborator.to_string())
            .or_insert_with(|| FailureRecord::new(collaborator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::ManualClock;
    use chrono::Duration as ChronoDuration;

    fn breaker(threshold: u32, clock: Arc<ManualClock>) -> CircuitBreaker {
        CircuitBreaker::new(
            CircuitBreakerConfig {
                failure_threshold: threshold,
                backoff: BackoffPolicy::new(Duration::from_secs(5), Duration::from_secs(300)),
            },
            clock,
        )
    }

    #[test]
    fn test_trips_at_threshold() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut cb = breaker(3, clock);

        assert!(cb.record_failure("indexer").is_none());
        assert!(cb.record_failure("indexer").is_none());
        assert_eq!(cb.state("indexer"), CircuitState::Closed);

        let transition = cb.record_failure("indexer").expect("should trip");
        assert_eq!(transition.to, CircuitState::Open);
        assert_eq!(cb.state("indexer"), CircuitState::Open);
    }

    #[test]
    fn test_fail_fast_then_half_open_after_backoff() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut cb = breaker(3, clock.clone());

        for _ in 0..3 {
            cb.record_failure("indexer");
        }

        // 4s after the trip: still short of the 5s base delay
        clock.advance(ChronoDuration::seconds(4));
        match cb.before_call("indexer") {
            Err(HelmsmanError::CircuitOpen { retry_in, .. }) => {
                assert_eq!(retry_in, Duration::from_secs(1));
            }
            other => panic!("expected CircuitOpen, got {other:?}"),
        }

        // One more second and the trial call is permitted
        clock.advance(ChronoDuration::seconds(1));
        let transition = cb.before_call("indexer").unwrap().expect("transition");
        assert_eq!(transition.from, CircuitState::Open);
        assert_eq!(transition.to, CircuitState::HalfOpen);
        assert_eq!(cb.state("indexer"), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_success_closes_and_resets() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut cb = breaker(3, clock.clone());

        for _ in 0..3 {
            cb.record_failure("indexer");
        }
        clock.advance(ChronoDuration::seconds(5));
        cb.before_call("indexer").unwrap();

        let transition = cb.record_success("indexer").expect("transition");
        assert_eq!(transition.to, CircuitState::Closed);
        assert_eq!(cb.state("indexer"), CircuitState::Closed);
        assert_eq!(cb.record("indexer").unwrap().consecutive_failures, 0);
    }

    #[test]
    fn test_half_open_failure_reopens_with_doubled_delay() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut cb = breaker(3, clock.clone());

        for _ in 0..3 {
            cb.record_failure("indexer");
        }
        clock.advance(ChronoDuration::seconds(5));
        cb.before_call("indexer").unwrap();

        let transition = cb.record_failure("indexer").expect("reopen");
        assert_eq!(transition.from, CircuitState::HalfOpen);
        assert_eq!(transition.to, CircuitState::Open);

        // Fourth failure doubles the recovery delay to 10s
        clock.advance(ChronoDuration::seconds(9));
        assert!(cb.before_call("indexer").is_err());
        clock.advance(ChronoDuration::seconds(1));
        assert!(cb.before_call("indexer").unwrap().is_some());
    }

    #[test]
    fn test_success_is_idempotent_when_closed() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut cb = breaker(3, clock);

        assert!(cb.record_success("indexer").is_none());
        assert!(cb.record_success("indexer").is_none());
        assert_eq!(cb.record("indexer").unwrap().consecutive_failures, 0);
        assert_eq!(cb.state("indexer"), CircuitState::Closed);
    }

    #[test]
    fn test_collaborators_tracked_independently() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut cb = breaker(2, clock);

        cb.record_failure("indexer");
        cb.record_failure("indexer");
        cb.record_failure("predictor");

        assert_eq!(cb.state("indexer"), CircuitState::Open);
        assert_eq!(cb.state("predictor"), CircuitState::Closed);
        assert!(cb.before_call("predictor").is_ok());
    }
}
