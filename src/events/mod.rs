//! Event publication subsystem.
//!
//! # Data Flow
//! ```text
//! Producers:
//!     streams controller → Progress (per check-interval tick, Tiers 2/3)
//!     health monitor     → CircuitTransition
//!     config watcher     → ConfigReloaded
//!         → bus.rs (bounded broadcast channel)
//!         → one task per subscriber, handler panics recovered and logged
//! ```
//!
//! # Design Decisions
//! - Publishing never blocks and never fails the producer
//! - Slow subscribers drop old events rather than applying backpressure
//! - A panicking handler only loses the event it panicked on

pub mod bus;
pub mod types;

pub use bus::EventBus;
pub use types::{ProgressEvent, ServiceEvent};
