//! Camera stream readiness service library.
//!
//! Keeps track of MediaMTX health behind a circuit breaker and brings camera
//! streams up on demand within classified time budgets.

pub mod admin;
pub mod config;
pub mod events;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod streams;

pub use config::schema::ServiceConfig;
pub use health::{HealthMonitor, HealthStatus};
pub use lifecycle::{CameraService, Shutdown};
pub use streams::{Purpose, ReadinessResult, ReadinessStatus, StreamReadinessController};
