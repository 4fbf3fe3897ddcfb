//! Coordination layer for 24/7 operation
//!
//! Failure-recovery and cancellation infrastructure shared by the runtime:
//! - Clock abstraction so recovery timing is testable without sleeping
//! - Exponential backoff policy
//! - Per-collaborator circuit breaker
//! - Graceful shutdown / cancellation tokens

pub mod backoff;
pub mod circuit_breaker;
pub mod clock;
pub mod shutdown;

pub use backoff::BackoffPolicy;
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, CircuitTransition, FailureRecord,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use shutdown::{install_signal_handlers, CancelToken, ShutdownController};
