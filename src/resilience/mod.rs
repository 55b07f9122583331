//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Health probe outcome:
//!     → circuit_breaker.rs (count failures, open/half-open/close)
//!     → backoff.rs (stretch the open period on repeated reopening)
//!
//! Activation trigger / readiness poll:
//!     → timeouts.rs (per-attempt timeout, overall deadline)
//!     → retries.rs (retry transient failures with backoff.rs delays)
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline; waits are capped by what is left
//! - The breaker is a pure state machine; it never performs I/O
//! - Jitter comes from an injectable RNG so tests are deterministic

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use backoff::BackoffPolicy;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerSettings, CircuitSnapshot, CircuitState, CircuitTransition};
pub use retries::{with_retry, RetryError, RetrySchedule, RetryableError};
pub use timeouts::Deadline;
