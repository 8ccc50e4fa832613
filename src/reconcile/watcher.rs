//! Watching the state file for external edits.
//!
//! The watcher observes the file's parent directory (editors usually replace
//! files rather than write them in place), debounces bursts of events, and
//! triggers [`Reconciler::reload`]. If no native watcher can be created it
//! falls back to polling the file's modification time.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::Reconciler;

/// Timing for a [`DocumentWatcher`].
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Quiet period after the last event before reloading.
    pub debounce: Duration,
    /// Interval of the mtime fallback.
    pub poll_interval: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(250),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Background task reloading the reconciler when its file changes. Stops
/// when dropped.
pub struct DocumentWatcher {
    task: JoinHandle<()>,
    _watcher: Option<RecommendedWatcher>,
    path: PathBuf,
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
    )
}

impl DocumentWatcher {
    /// Start watching `path`. Must be called from within a tokio runtime.
    pub fn spawn(reconciler: Arc<Reconciler>, path: PathBuf, options: WatchOptions) -> Self {
        let (tx, mut rx) = mpsc::channel::<()>(128);
        let native = Self::native_watcher(&path, tx.clone());
        let polling = native.is_none();

        if polling {
            info!(
                path = %path.display(),
                interval_ms = options.poll_interval.as_millis() as u64,
                "Watching state file by polling"
            );
        } else {
            info!(path = %path.display(), "Watching state file");
        }

        let watched = path.clone();
        let task = tokio::spawn(async move {
            // Held so the channel never closes while the task runs.
            let _tx = tx;
            let mut deadline: Option<Instant> = None;
            let mut last_modified = modified(&watched);
            let mut poll = tokio::time::interval(options.poll_interval);
            poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    Some(()) = rx.recv() => {
                        deadline = Some(Instant::now() + options.debounce);
                    }
                    _ = poll.tick(), if polling => {
                        let current = modified(&watched);
                        if current != last_modified {
                            last_modified = current;
                            deadline = Some(Instant::now() + options.debounce);
                        }
                    }
                    _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                        deadline = None;
                        let reconciler = Arc::clone(&reconciler);
                        match tokio::task::spawn_blocking(move || reconciler.reload()).await {
                            Ok(Ok(outcome)) => debug!(
                                changed = outcome.changed.len(),
                                warnings = outcome.warnings.len(),
                                "State file reloaded"
                            ),
                            Ok(Err(e)) => warn!(error = %e, "State file reload failed"),
                            Err(e) => error!(error = %e, "Reload task panicked"),
                        }
                    }
                }
            }
        });

        Self {
            task,
            _watcher: native,
            path,
        }
    }

    fn native_watcher(path: &Path, tx: mpsc::Sender<()>) -> Option<RecommendedWatcher> {
        let file_name = path.file_name()?.to_os_string();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let handler = move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let ours = event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == Some(file_name.as_os_str()));
                if ours && is_relevant(&event.kind) {
                    // A full queue already holds a pending reload.
                    let _ = tx.try_send(());
                }
            }
            Err(e) => warn!(error = %e, "File watcher error"),
        };

        let mut watcher = match notify::recommended_watcher(handler) {
            Ok(watcher) => watcher,
            Err(e) => {
                warn!(error = %e, "Failed to initialize file watcher");
                return None;
            }
        };
        if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
            warn!(dir = %dir.display(), error = %e, "Failed to watch state directory");
            return None;
        }
        Some(watcher)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop watching. Pending debounced reloads are discarded.
    pub fn stop(self) {}
}

impl Drop for DocumentWatcher {
    fn drop(&mut self) {
        self.task.abort();
        debug!(path = %self.path.display(), "State file watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{ReconcilerOptions, WatchFilter};
    use crate::path::SettingPath;
    use crate::schema::{SchemaNode, SchemaRegistry};
    use crate::state::StateValue;
    use crate::storage::StateFile;
    use tempfile::TempDir;

    fn reconciler(path: &Path) -> Arc<Reconciler> {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                "lgc",
                SchemaNode::container().with_child("gyro", SchemaNode::boolean(true)),
            )
            .unwrap();
        let schema = Arc::new(registry.unified());
        registry.shutdown();
        let (reconciler, _) = Reconciler::open(
            schema,
            Box::new(StateFile::new(path)),
            ReconcilerOptions::default(),
        );
        Arc::new(reconciler)
    }

    #[tokio::test]
    async fn test_external_edit_is_reloaded() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.yml");
        let reconciler = reconciler(&path);
        let mut sub = reconciler.subscribe(WatchFilter::Prefix(SettingPath::root()));

        let watcher = DocumentWatcher::spawn(
            Arc::clone(&reconciler),
            path.clone(),
            WatchOptions {
                debounce: Duration::from_millis(50),
                poll_interval: Duration::from_millis(50),
            },
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        std::fs::write(&path, "lgc:\n  gyro: false\n").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .expect("reload within timeout")
            .expect("subscription open");
        assert_eq!(event.path, SettingPath::parse("lgc.gyro"));
        assert_eq!(event.value, StateValue::Bool(false));
        watcher.stop();
    }
}
