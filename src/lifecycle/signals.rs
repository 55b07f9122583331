//! OS signal handling.
//!
//! SIGINT (Ctrl+C) and SIGTERM request graceful shutdown; SIGHUP reloads
//! the configuration file without restarting.

use crate::config::watcher::ConfigReloader;
use crate::lifecycle::shutdown::Shutdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    Shutdown,
    Reload,
}

#[cfg(unix)]
pub async fn next_signal() -> std::io::Result<SignalEvent> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|_| SignalEvent::Shutdown),
        _ = terminate.recv() => Ok(SignalEvent::Shutdown),
        _ = hangup.recv() => Ok(SignalEvent::Reload),
    }
}

#[cfg(not(unix))]
pub async fn next_signal() -> std::io::Result<SignalEvent> {
    tokio::signal::ctrl_c().await.map(|_| SignalEvent::Shutdown)
}

/// Serve signals until a shutdown signal arrives, then trigger `shutdown`.
pub async fn handle_signals(shutdown: &Shutdown, reloader: Option<&ConfigReloader>) {
    loop {
        match next_signal().await {
            Ok(SignalEvent::Reload) => match reloader {
                Some(reloader) => {
                    tracing::info!("SIGHUP received, reloading configuration");
                    let _ = reloader.reload("sighup");
                }
                None => tracing::warn!("SIGHUP received but no config file is in use"),
            },
            Ok(SignalEvent::Shutdown) => {
                tracing::info!("Shutdown signal received");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for signals, shutting down");
                break;
            }
        }
    }
    shutdown.trigger();
}
