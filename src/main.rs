//! Camera stream readiness service.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌────────────────────────────────────────────────────┐
//!                      │                  CAMERA SERVICE                    │
//!                      │                                                    │
//!   ensure_ready  ─────┼─▶ streams controller ──┬──▶ Tier 1 active cache   │
//!   (admin API /       │     (single-flight)    ├──▶ Tier 2 ready check ───┼──▶ MediaMTX
//!    library)          │                        └──▶ Tier 3 activation  ───┼──▶ API / HLS
//!                      │            ▲ circuit open? fail fast               │
//!                      │            │                                       │
//!                      │   circuit breaker ◀── health monitor ──probe──────┼──▶ MediaMTX
//!                      │                                                    │
//!                      │  ┌──────────────────────────────────────────────┐  │
//!                      │  │ config (live snapshot, watcher) · events bus │  │
//!                      │  │ observability · lifecycle (signals/shutdown) │  │
//!                      │  └──────────────────────────────────────────────┘  │
//!                      └────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use camera_service::config::loader::{load_or_default, resolve_config_path};
use camera_service::observability::logging;
use camera_service::CameraService;

#[derive(Parser)]
#[command(name = "camera-service")]
#[command(about = "Camera stream readiness and MediaMTX health service", long_about = None)]
struct Args {
    /// Path to the TOML config file (falls back to CAMERA_SERVICE_CONFIG).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config_path = resolve_config_path(args.config);
    let config = load_or_default(config_path.as_deref())?;

    logging::init_logging(&config.observability)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "camera-service starting");
    tracing::info!(
        config = ?config_path,
        mediamtx_host = %config.mediamtx.host,
        failure_threshold = config.mediamtx.health_failure_threshold,
        total_timeout_ms = config.performance.snapshot_tiers.total_operation_timeout_ms,
        "Configuration loaded"
    );

    let service = CameraService::build(config, config_path)?;
    service.run().await?;

    Ok(())
}
