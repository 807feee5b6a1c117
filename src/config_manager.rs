//! File-based configuration with hot-reload.
//!
//! The manager loads a YAML snapshot at startup and, when a path was given,
//! polls the file on a background task. A changed file replaces the whole
//! snapshot atomically and raises a flag the dispatcher checks between
//! accepted connections; the snapshot is never mutated in place.
//!
//! A file that fails to parse or validate at startup is fatal. During a
//! reload the previous snapshot is kept and a warning is logged, so a
//! half-written file cannot take the proxy down.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use floodgate_core::config::{Config, ConfigSource};
use floodgate_core::error::{FloodgateError, Result};

/// Interval between configuration file checks.
const WATCH_INTERVAL: Duration = Duration::from_secs(5);

/// Loads, caches, and watches the configuration file.
///
/// Implements [`ConfigSource`] for the dispatcher: [`ConfigSource::current`]
/// returns the latest snapshot and clears the changed flag,
/// [`ConfigSource::is_changed`] reports whether a newer snapshot arrived
/// since.
pub struct ConfigManager {
    config_path: Option<PathBuf>,
    current: ArcSwap<Config>,
    changed: AtomicBool,
    watch_interval: Duration,
    stop_tx: watch::Sender<bool>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl ConfigManager {
    /// Loads the initial snapshot from `config_path`, or uses the built-in
    /// defaults when no path is given.
    pub fn from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let config = match &config_path {
            Some(path) => Self::load(path)?,
            None => Config::default(),
        };
        config.validate().map_err(FloodgateError::Config)?;
        let (stop_tx, _) = watch::channel(false);
        Ok(Self {
            config_path,
            current: ArcSwap::from_pointee(config),
            changed: AtomicBool::new(false),
            watch_interval: WATCH_INTERVAL,
            stop_tx,
            watcher: Mutex::new(None),
        })
    }

    /// Overrides the poll interval; used by tests to reload quickly.
    pub fn with_watch_interval(mut self, interval: Duration) -> Self {
        self.watch_interval = interval;
        self
    }

    /// Returns the latest snapshot without touching the changed flag.
    pub fn snapshot(&self) -> Arc<Config> {
        self.current.load_full()
    }

    /// Starts the background watcher. Does nothing when the manager was
    /// built without a config path.
    pub async fn start(self: &Arc<Self>) {
        let Some(path) = self.config_path.clone() else {
            debug!("no config file given, hot-reload disabled");
            return;
        };
        let manager = Arc::clone(self);
        let mut stop_rx = self.stop_tx.subscribe();
        let handle = tokio::spawn(async move {
            debug!(path = %path.display(), "config watcher started");
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = tokio::time::sleep(manager.watch_interval) => {
                        manager.watch_and_update(&path);
                    }
                }
            }
            debug!("config watcher completed");
        });
        *self.watcher.lock().await = Some(handle);
    }

    /// Stops the background watcher and waits for it to finish.
    pub async fn stop(&self) {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.watcher.lock().await.take() {
            let _ = handle.await;
        }
    }

    fn watch_and_update(&self, path: &Path) {
        debug!(path = %path.display(), "checking config file");
        let config = match Self::load(path) {
            Ok(config) => config,
            Err(err) => {
                warn!(%err, "failed to reload config file, keeping previous snapshot");
                return;
            }
        };
        if let Err(err) = config.validate() {
            warn!(%err, "reloaded config is invalid, keeping previous snapshot");
            return;
        }
        if *self.current.load().as_ref() == config {
            return;
        }
        info!(path = %path.display(), "caught changed config file, updating snapshot");
        self.current.store(Arc::new(config));
        self.changed.store(true, Ordering::SeqCst);
    }

    fn load(path: &Path) -> Result<Config> {
        let raw = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&raw)
            .map_err(|err| FloodgateError::Config(format!("{}: {err}", path.display())))
    }
}

impl ConfigSource for ConfigManager {
    fn current(&self) -> Arc<Config> {
        self.changed.store(false, Ordering::SeqCst);
        self.current.load_full()
    }

    fn is_changed(&self) -> bool {
        self.changed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_without_path() {
        let manager = ConfigManager::from_path(None).unwrap();
        assert!(!manager.is_changed());
        let config = ConfigSource::current(&manager);
        assert_eq!(*config, Config::default());
    }

    #[test]
    fn test_loads_initial_snapshot() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "common:\n  forward_port: 9100").unwrap();
        let manager = ConfigManager::from_path(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(manager.snapshot().common.forward_port, 9100);
    }

    #[test]
    fn test_invalid_initial_snapshot_is_fatal() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "token_bucket:\n  capacity: 0").unwrap();
        assert!(ConfigManager::from_path(Some(file.path().to_path_buf())).is_err());
    }

    #[test]
    fn test_unparsable_initial_snapshot_is_fatal() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "common: [not, a, mapping]").unwrap();
        assert!(ConfigManager::from_path(Some(file.path().to_path_buf())).is_err());
    }

    #[test]
    fn test_watch_detects_change() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "common:\n  forward_port: 9100").unwrap();
        let manager = ConfigManager::from_path(Some(file.path().to_path_buf())).unwrap();

        // Rewrite the file and run one poll cycle by hand.
        std::fs::write(file.path(), "common:\n  forward_port: 9200\n").unwrap();
        manager.watch_and_update(file.path());
        assert!(manager.is_changed());
        let config = ConfigSource::current(&manager);
        assert_eq!(config.common.forward_port, 9200);
        assert!(!manager.is_changed());
    }

    #[test]
    fn test_watch_ignores_identical_snapshot() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "common:\n  forward_port: 9100").unwrap();
        let manager = ConfigManager::from_path(Some(file.path().to_path_buf())).unwrap();

        manager.watch_and_update(file.path());
        assert!(!manager.is_changed());
    }

    #[test]
    fn test_watch_keeps_previous_on_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "common:\n  forward_port: 9100").unwrap();
        let manager = ConfigManager::from_path(Some(file.path().to_path_buf())).unwrap();

        std::fs::write(file.path(), "common: [broken").unwrap();
        manager.watch_and_update(file.path());
        assert!(!manager.is_changed());
        assert_eq!(manager.snapshot().common.forward_port, 9100);
    }

    #[test]
    fn test_watch_keeps_previous_on_invalid_values() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "common:\n  forward_port: 9100").unwrap();
        let manager = ConfigManager::from_path(Some(file.path().to_path_buf())).unwrap();

        std::fs::write(file.path(), "leaky_bucket:\n  queue_size: 0\n").unwrap();
        manager.watch_and_update(file.path());
        assert!(!manager.is_changed());
    }

    #[tokio::test]
    async fn test_watcher_task_picks_up_change() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "common:\n  forward_port: 9100").unwrap();
        let manager = Arc::new(
            ConfigManager::from_path(Some(file.path().to_path_buf()))
                .unwrap()
                .with_watch_interval(Duration::from_millis(20)),
        );
        manager.start().await;

        std::fs::write(file.path(), "common:\n  forward_port: 9300\n").unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !manager.is_changed() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(manager.is_changed());
        assert_eq!(manager.snapshot().common.forward_port, 9300);

        manager.stop().await;
    }
}
