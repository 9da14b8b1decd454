use crate::config::TradingConfig;
use crate::error::ConfigError;
use crate::traits::ConfigSource;
use anyhow::Result;
use notify::{Event, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

/// Default seconds between polls of the configuration source.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Polls a [`ConfigSource`] and publishes validated snapshots.
///
/// The watcher is the only writer of the snapshot channel. Readers call
/// `borrow()` on their receiver and always see a complete `Arc<TradingConfig>`.
pub struct ConfigWatcher<S> {
    source: S,
    tx: watch::Sender<Arc<TradingConfig>>,
    poll_interval: Duration,
}

impl<S: ConfigSource> ConfigWatcher<S> {
    /// Creates a watcher seeded with `initial_config`.
    ///
    /// Returns a tuple of the watcher and a receiver for configuration updates.
    ///
    /// # Errors
    ///
    /// Returns an error if `initial_config` fails validation; there is no previous
    /// snapshot to fall back on at startup.
    pub fn new(
        source: S,
        initial_config: TradingConfig,
    ) -> Result<(Self, watch::Receiver<Arc<TradingConfig>>), ConfigError> {
        initial_config.validate()?;
        let poll_interval = Duration::from_secs(initial_config.config_poll_secs);
        let (tx, rx) = watch::channel(Arc::new(initial_config));
        Ok((
            Self {
                source,
                tx,
                poll_interval,
            },
            rx,
        ))
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    #[must_use]
    pub fn current(&self) -> Arc<TradingConfig> {
        self.tx.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<TradingConfig>> {
        self.tx.subscribe()
    }

    /// Loads, validates and publishes one snapshot.
    ///
    /// Returns the new snapshot if it was valid and differed from the current one.
    /// Anything unreadable or invalid is logged and dropped; the current snapshot
    /// stays authoritative.
    pub fn poll(&self) -> Option<Arc<TradingConfig>> {
        let candidate = match self.source.load() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Config reload failed, keeping previous config: {}", e);
                return None;
            }
        };

        if let Err(e) = candidate.validate() {
            tracing::warn!("Rejected config update, keeping previous config: {}", e);
            return None;
        }

        let current = self.current();
        if candidate.same_settings(&current) {
            return None;
        }

        let changes = candidate.describe_changes(&current);
        let snapshot = Arc::new(candidate);
        self.tx.send_replace(snapshot.clone());
        tracing::info!(
            last_updated = ?snapshot.last_updated,
            "Config updated: {}",
            changes.join(", ")
        );
        Some(snapshot)
    }

    /// Polls on a fixed interval until `shutdown` flips to `true`.
    ///
    /// When the source names a file, modifications to it trigger an early poll.
    ///
    /// # Errors
    ///
    /// Returns an error if the file watcher cannot be initiated.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let (change_tx, mut change_rx) = mpsc::channel::<()>(16);

        // Held for the lifetime of the loop; dropping it stops notifications
        let _file_watcher = match self.source.watch_path() {
            Some(path) => Some(spawn_file_watcher(&path, change_tx)?),
            None => {
                drop(change_tx);
                None
            }
        };

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; the initial snapshot is already published
        ticker.tick().await;

        tracing::info!(interval = ?self.poll_interval, "Config watcher started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll();
                }
                Some(()) = change_rx.recv() => {
                    tracing::debug!("Config file changed, reloading...");
                    self.poll();
                }
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Config watcher stopped");
        Ok(())
    }
}

/// Watches the parent directory so atomic replace-by-rename is seen too.
fn spawn_file_watcher(
    path: &Path,
    change_tx: mpsc::Sender<()>,
) -> Result<notify::RecommendedWatcher> {
    let file_name = path.file_name().map(ToOwned::to_owned);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        if let Ok(event) = res {
            let relevant = event.kind.is_modify() || event.kind.is_create();
            let ours = file_name
                .as_ref()
                .is_some_and(|name| event.paths.iter().any(|p| p.file_name() == Some(name.as_os_str())));
            if relevant && ours {
                // A full channel already has a poll queued
                let _ = change_tx.try_send(());
            }
        }
    })?;

    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}
