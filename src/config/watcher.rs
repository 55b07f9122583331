//! Configuration file watcher for hot reload.
//!
//! Change detection sits behind [`ChangeSource`]: OS file events
//! ([`NotifyChangeSource`]) or modification-time polling
//! ([`PollingChangeSource`]). A source can be subscribed again after its
//! stream ends, which restarts the underlying watcher.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::live::LiveConfig;
use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::{WatchConfig, WatchMode};
use crate::events::{EventBus, ServiceEvent};

const NOTICE_BUFFER: usize = 16;

/// Error starting a change source.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("file watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// Something changed at `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotice {
    pub path: PathBuf,
    pub detected_at: SystemTime,
}

/// Producer of change notifications for one file.
pub trait ChangeSource: Send {
    /// Start producing notices, replacing any previous subscription.
    fn subscribe(&mut self) -> Result<mpsc::Receiver<ChangeNotice>, WatchError>;

    fn describe(&self) -> &'static str;
}

/// OS file-event source backed by `notify`.
pub struct NotifyChangeSource {
    path: PathBuf,
    watcher: Option<RecommendedWatcher>,
}

impl NotifyChangeSource {
    pub fn new(path: &Path) -> Self {
        Self { path: path.to_path_buf(), watcher: None }
    }
}

impl ChangeSource for NotifyChangeSource {
    fn subscribe(&mut self) -> Result<mpsc::Receiver<ChangeNotice>, WatchError> {
        self.watcher = None;
        let (tx, rx) = mpsc::channel(NOTICE_BUFFER);
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        let _ = tx.try_send(ChangeNotice {
                            path: path.clone(),
                            detected_at: SystemTime::now(),
                        });
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default(),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
        self.watcher = Some(watcher);
        Ok(rx)
    }

    fn describe(&self) -> &'static str {
        "notify"
    }
}

/// Polls the file's modification time.
pub struct PollingChangeSource {
    path: PathBuf,
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl PollingChangeSource {
    pub fn new(path: &Path, interval: Duration) -> Self {
        Self { path: path.to_path_buf(), interval, task: None }
    }
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

impl ChangeSource for PollingChangeSource {
    fn subscribe(&mut self) -> Result<mpsc::Receiver<ChangeNotice>, WatchError> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let (tx, rx) = mpsc::channel(NOTICE_BUFFER);
        let path = self.path.clone();
        let interval = self.interval;

        self.task = Some(tokio::spawn(async move {
            let mut last = modified_at(&path);
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let current = modified_at(&path);
                if current != last {
                    last = current;
                    let notice = ChangeNotice { path: path.clone(), detected_at: SystemTime::now() };
                    if tx.send(notice).await.is_err() {
                        break;
                    }
                }
            }
        }));
        Ok(rx)
    }

    fn describe(&self) -> &'static str {
        "poll"
    }
}

impl Drop for PollingChangeSource {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Build the source selected by `config`.
pub fn change_source_for(path: &Path, config: &WatchConfig) -> Box<dyn ChangeSource> {
    match config.mode {
        WatchMode::Notify => Box::new(NotifyChangeSource::new(path)),
        WatchMode::Poll => Box::new(PollingChangeSource::new(path, config.poll_interval())),
    }
}

/// Loads the file, swaps the live snapshot and announces the reload.
#[derive(Clone)]
pub struct ConfigReloader {
    path: PathBuf,
    live: LiveConfig,
    events: Option<EventBus>,
}

impl ConfigReloader {
    pub fn new(path: &Path, live: LiveConfig, events: Option<EventBus>) -> Self {
        Self { path: path.to_path_buf(), live, events }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reload now. On failure the current snapshot stays in place.
    pub fn reload(&self, source: &str) -> Result<u64, ConfigError> {
        match load_config(&self.path) {
            Ok(config) => {
                let generation = self.live.store(config);
                tracing::info!(path = ?self.path, source, generation, "Configuration reloaded");
                if let Some(events) = &self.events {
                    events.publish(ServiceEvent::ConfigReloaded {
                        generation,
                        source: source.to_string(),
                    });
                }
                Ok(generation)
            }
            Err(e) => {
                tracing::error!(path = ?self.path, source, "Failed to reload config: {}. Keeping current configuration.", e);
                Err(e)
            }
        }
    }
}

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    reloader: ConfigReloader,
    source: Box<dyn ChangeSource>,
}

impl ConfigWatcher {
    pub fn new(reloader: ConfigReloader, source: Box<dyn ChangeSource>) -> Self {
        Self { reloader, source }
    }

    /// Watch until shutdown, resubscribing if the source stream ends.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<(), WatchError> {
        let mut notices = self.source.subscribe()?;
        tracing::info!(path = ?self.reloader.path(), mode = self.source.describe(), "Config watcher started");

        loop {
            tokio::select! {
                notice = notices.recv() => match notice {
                    Some(_) => {
                        // Editors fire several events per save.
                        while notices.try_recv().is_ok() {}
                        let _ = self.reloader.reload(self.source.describe());
                    }
                    None => {
                        tracing::warn!("Config change source ended, restarting");
                        notices = self.source.subscribe()?;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!("Config watcher received shutdown signal, exiting loop");
                    break;
                }
            }
        }
        Ok(())
    }
}
