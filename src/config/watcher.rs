//! Configuration file watcher for hot reload.
//!
//! The topology is rebuilt when the configuration file is written or
//! replaced, or when the process receives SIGHUP. A reload that fails to load
//! or to apply leaves the running topology untouched.

use crate::config::{load_config, Config};
use crate::control::ControlError;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Callback applying a freshly loaded configuration.
pub type ReloadCallback = Box<dyn Fn(Config) -> Result<(), ControlError> + Send + Sync>;

/// Editors often emit several events per save; they are coalesced.
const DEBOUNCE: Duration = Duration::from_millis(200);

/// Configuration file watcher.
pub struct ConfigWatcher {
    config_path: PathBuf,
    reload_callback: ReloadCallback,
}

impl ConfigWatcher {
    pub fn new(config_path: PathBuf, reload_callback: ReloadCallback) -> Self {
        Self {
            config_path,
            reload_callback,
        }
    }

    /// Get the path being watched.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Run until shutdown, reloading on file changes and SIGHUP.
    ///
    /// If the file cannot be watched, SIGHUP still triggers reloads.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let (tx, mut events) = mpsc::unbounded_channel();

        // Dropping the watcher stops file notifications.
        let _watcher = match self.watch(tx) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "failed to watch config file, only SIGHUP will reload"
                );
                None
            }
        };

        let mut hangup = Hangup::new();
        info!(path = %self.config_path.display(), "config watcher started");

        loop {
            tokio::select! {
                Some(event) = events.recv() => {
                    if !self.should_reload(&event) {
                        continue;
                    }
                    tokio::time::sleep(DEBOUNCE).await;
                    while events.try_recv().is_ok() {}
                    self.try_reload();
                }

                _ = hangup.recv() => {
                    info!("received SIGHUP, reloading configuration");
                    self.try_reload();
                }

                _ = shutdown.recv() => {
                    info!("config watcher shutting down");
                    break;
                }
            }
        }
    }

    fn watch(&self, tx: mpsc::UnboundedSender<Event>) -> notify::Result<RecommendedWatcher> {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                // The receiver is gone once the watcher shuts down.
                let _ = tx.send(event);
            }
        })?;

        // Watch the directory so atomic replaces (rename over) are seen too.
        let dir = match self.config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        Ok(watcher)
    }

    /// Check if this event should trigger a reload.
    fn should_reload(&self, event: &Event) -> bool {
        let is_our_file = event
            .paths
            .iter()
            .any(|p| p.file_name() == self.config_path.file_name());

        is_our_file && matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
    }

    /// Load the file and hand it to the reload callback.
    ///
    /// # Returns
    ///
    /// Whether the new configuration was applied.
    fn try_reload(&self) -> bool {
        debug!(path = %self.config_path.display(), "attempting config reload");

        let config = match load_config(&self.config_path) {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "failed to load new config, keeping current");
                return false;
            }
        };

        let (nodes, services, instances) = (
            config.nodes.len(),
            config.services.len(),
            config.instances.len(),
        );

        match (self.reload_callback)(config) {
            Ok(()) => {
                info!(nodes, services, instances, "configuration reloaded");
                true
            }
            Err(e) => {
                error!(error = %e, "failed to apply new config, keeping current");
                false
            }
        }
    }
}

/// SIGHUP listener; never fires where the signal is unavailable.
struct Hangup {
    #[cfg(unix)]
    signal: Option<tokio::signal::unix::Signal>,
}

impl Hangup {
    fn new() -> Self {
        Self {
            #[cfg(unix)]
            signal: install_hangup(),
        }
    }

    async fn recv(&mut self) {
        #[cfg(unix)]
        if let Some(signal) = self.signal.as_mut() {
            if signal.recv().await.is_some() {
                return;
            }
            self.signal = None;
        }
        std::future::pending::<()>().await
    }
}

#[cfg(unix)]
fn install_hangup() -> Option<tokio::signal::unix::Signal> {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::hangup()) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!(error = %e, "failed to install SIGHUP handler");
            None
        }
    }
}
