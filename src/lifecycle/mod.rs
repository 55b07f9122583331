//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → breaker + monitor + controller + event bus
//!     → metrics exporter → health monitor → config watcher → admin API
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → stop monitor (in-flight probe finishes)
//!     → drain background tasks with a grace period
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Trigger config reload
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Shutdown has a timeout: background tasks get a fixed grace period

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{CameraService, StartupError};
