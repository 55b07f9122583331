//! Stream readiness subsystem.
//!
//! # Data Flow
//! ```text
//! ensure_ready(device, purpose)
//!     → inflight.rs (join the device's activation or start one)
//!     → controller.rs activation task:
//!         Tier 1: active.rs cache / StreamLifecycle::direct_capture_ready
//!         circuit open? → Failed (tier 2), no trigger
//!         Tier 2: StreamLifecycle::check_path_ready every check interval
//!         Tier 3: trigger_activation (retried) then check_path_ready
//!     → classify.rs (latency bucket for ready outcomes)
//!     → every waiter receives the same result
//! ```
//!
//! # Design Decisions
//! - One task per device activation, never one per caller
//! - Each caller waits up to its own deadline and can cancel independently
//! - Running out of budget is a degraded success when fallback is enabled
//! - mediamtx.rs is the only code that knows MediaMTX URLs

pub mod active;
pub mod classify;
pub mod controller;
pub mod inflight;
pub mod lifecycle;
pub mod mediamtx;
pub mod types;

pub use classify::ResponseThresholds;
pub use controller::StreamReadinessController;
pub use lifecycle::{ActivationAck, LifecycleError, StreamLifecycle};
pub use mediamtx::{stream_path_name, MediaMtxClient};
pub use types::{Purpose, ReadinessError, ReadinessRequest, ReadinessResult, ReadinessStatus, Tier};
