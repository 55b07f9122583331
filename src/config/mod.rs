//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + CAMERA_SERVICE_* environment overrides
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → live.rs (Arc snapshot shared with all subsystems)
//!
//! On change (watcher.rs ChangeSource) or SIGHUP:
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap of the live snapshot
//!     → ConfigReloaded event; new operations observe the new snapshot
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - One canonical default set lives in schema.rs

pub mod live;
pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use live::LiveConfig;
pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, EventsConfig, LogFormat, MediaMtxConfig, ObservabilityConfig, PerformanceConfig,
    ServiceConfig, SnapshotTiersConfig, StreamReadinessConfig, WatchConfig, WatchMode,
};
pub use validation::{validate_config, ValidationError};
