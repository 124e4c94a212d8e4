//! Config file watching for `vyper-edge --watch`.
//!
//! Editors often emit several events for a single save, so a reload is only
//! published when the parsed configuration actually differs from the last
//! one sent.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ServerConfig;

/// Publishes a configuration only when it differs from the previous one.
#[derive(Debug)]
struct ReloadGate {
    last: Mutex<Option<ServerConfig>>,
    tx: mpsc::UnboundedSender<ServerConfig>,
}

impl ReloadGate {
    fn offer(&self, config: ServerConfig) -> bool {
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if last.as_ref() == Some(&config) {
            return false;
        }
        *last = Some(config.clone());
        self.tx.send(config).is_ok()
    }
}

/// Watches one config file and sends each changed, valid configuration.
pub struct ConfigWatcher {
    path: PathBuf,
    gate: ReloadGate,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end for reloaded configurations.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ServerConfig>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            gate: ReloadGate {
                last: Mutex::new(load_config(path).ok()),
                tx,
            },
        };
        (watcher, rx)
    }

    /// Start watching. Dropping the returned watcher stops it.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self { path, gate } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    match load_config(&watched) {
                        Ok(config) => {
                            if gate.offer(config) {
                                tracing::info!(path = ?watched, "Config changed, reloading");
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Ignoring invalid config change");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&path, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?path, "Watching config file");
        Ok(watcher)
    }
}
