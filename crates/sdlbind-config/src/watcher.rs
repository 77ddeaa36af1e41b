//! SDL file monitor
//!
//! Watches the SDL sources of configured endpoints and reports changes as
//! [`FileChangeEvent`]s carrying the paths exactly as they were configured,
//! so that consumers can derive the same cache tags they used when caching.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::ConfigError;
use crate::events::{FileChangeEvent, SCHEMA_FILE_MONITOR};

/// Configuration for the schema file monitor
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Monitor identifier attached to every emitted event
    pub monitor_id: String,
    /// Files to watch
    pub paths: Vec<PathBuf>,
    /// Debounce duration for rapid changes
    pub debounce: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            monitor_id: SCHEMA_FILE_MONITOR.to_string(),
            paths: Vec::new(),
            debounce: Duration::from_millis(500),
        }
    }
}

impl WatcherConfig {
    /// Create config watching the given files
    pub fn new(paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Set debounce duration
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// Handle for a running watcher
pub struct WatchHandle {
    /// Task handle for the watcher
    handle: tokio::task::JoinHandle<()>,
    /// Shutdown signal
    shutdown: tokio::sync::oneshot::Sender<()>,
}

impl WatchHandle {
    /// Create a new watch handle
    pub fn new(
        handle: tokio::task::JoinHandle<()>,
        shutdown: tokio::sync::oneshot::Sender<()>,
    ) -> Self {
        Self { handle, shutdown }
    }

    /// Stop the watcher
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }
}

/// A watched file: its normalized location plus the path as configured.
#[derive(Debug, Clone)]
struct WatchTarget {
    normalized: PathBuf,
    configured: String,
}

/// Normalizes a file path through its parent directory, so that events for
/// files that were just replaced (and may not exist yet) still match.
fn normalize(path: &Path) -> PathBuf {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let parent = parent.canonicalize().unwrap_or(parent);
    match path.file_name() {
        Some(name) => parent.join(name),
        None => parent,
    }
}

/// Debounced monitor for SDL source files
pub struct SchemaFileWatcher {
    config: WatcherConfig,
}

impl SchemaFileWatcher {
    /// Create a new watcher
    pub fn new(config: WatcherConfig) -> Self {
        Self { config }
    }

    fn targets(&self) -> Vec<WatchTarget> {
        self.config
            .paths
            .iter()
            .map(|path| WatchTarget {
                normalized: normalize(path),
                configured: path.to_string_lossy().into_owned(),
            })
            .collect()
    }

    /// Start watching.
    ///
    /// Parent directories are watched non-recursively; every debounced batch
    /// that touches at least one configured file is sent as a single event.
    pub async fn watch(&self, tx: mpsc::Sender<FileChangeEvent>) -> Result<WatchHandle, ConfigError> {
        let targets = self.targets();
        if targets.is_empty() {
            return Err(ConfigError::Watcher("no schema files to watch".into()));
        }

        let watch_dirs: BTreeSet<PathBuf> = targets
            .iter()
            .filter_map(|t| t.normalized.parent().map(Path::to_path_buf))
            .collect();
        let monitor_id = self.config.monitor_id.clone();
        let debounce = self.config.debounce;

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            // Create channel for debounced events
            let (notify_tx, notify_rx) = std::sync::mpsc::channel();

            let mut debouncer = match new_debouncer(debounce, notify_tx) {
                Ok(d) => d,
                Err(e) => {
                    error!("Failed to create schema file watcher: {e}");
                    return;
                }
            };

            for dir in &watch_dirs {
                if let Err(e) = debouncer.watcher().watch(dir, RecursiveMode::NonRecursive) {
                    error!("Failed to watch directory {:?}: {e}", dir);
                    return;
                }
            }

            info!(
                monitor = %monitor_id,
                files = targets.len(),
                "Started watching schema files"
            );

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!(monitor = %monitor_id, "Schema file watcher shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {
                        while let Ok(events) = notify_rx.try_recv() {
                            let events = match events {
                                Ok(events) => events,
                                Err(e) => {
                                    error!("Schema file watcher error: {:?}", e);
                                    continue;
                                }
                            };

                            let mut changed = BTreeSet::new();
                            for event in events {
                                let path = normalize(&event.path);
                                for target in targets.iter().filter(|t| t.normalized == path) {
                                    changed.insert(target.configured.clone());
                                }
                            }

                            if changed.is_empty() {
                                continue;
                            }

                            debug!(monitor = %monitor_id, paths = ?changed, "Schema files changed");
                            let event = FileChangeEvent::new(monitor_id.clone(), changed.into_iter().collect());
                            if tx.send(event).await.is_err() {
                                warn!("Schema change receiver dropped");
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(WatchHandle::new(handle, shutdown_tx))
    }
}
