//! MediaMTX health monitoring subsystem.
//!
//! # Data Flow
//! ```text
//! monitor.rs probe loop:
//!     breaker admits probe? (Open → HalfOpen once the open period is over)
//!     → probe.rs HealthProbe::probe (bounded by the probe timeout)
//!     → CircuitBreaker::record_outcome
//!     → transition? log + metrics + CircuitTransition event
//!     → sleep: check interval, or the rest of the open period
//!
//! state.rs:
//!     breaker snapshot + probe counters → HealthStatus
//! ```
//!
//! # Design Decisions
//! - Probe errors never reach callers; they only move the breaker
//! - No probing on the interval while Open
//! - The breaker is shared with the stream controller, which only reads it

pub mod monitor;
pub mod probe;
pub mod state;

pub use monitor::HealthMonitor;
pub use probe::{HealthProbe, ProbeError};
pub use state::HealthStatus;
