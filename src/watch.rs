//! Reloading a log file whenever it changes on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};

use crate::handler::TimelineHandler;
use crate::Result;

/// Keeps `handler` in sync with the file at `path`. Dropping it stops watching.
pub struct LogWatcher {
    path: PathBuf,
    _debouncer: Debouncer<RecommendedWatcher>,
}

impl LogWatcher {
    /// Load `path` once, then reload it on every debounced change.
    ///
    /// The parent directory is watched rather than the file itself, so the
    /// watch survives the file being replaced by a rename.
    ///
    /// # Errors
    ///
    /// - Any error of the initial [`TimelineHandler::load`]
    /// - `Error::Watch`: the watcher could not be started
    pub fn spawn(
        path: impl AsRef<Path>,
        handler: Arc<TimelineHandler>,
        debounce: Duration,
    ) -> Result<Self> {
        let path = match path.as_ref() {
            p if p.is_absolute() => p.to_path_buf(),
            p => std::env::current_dir()?.join(p),
        };
        handler.load(&path)?;

        let watch_path = canonical(&path);
        let target = path.clone();
        let mut debouncer = new_debouncer(debounce, move |res: DebounceEventResult| {
            let events = match res {
                Ok(events) => events,
                Err(err) => {
                    error!("watch error on {}: {err}", target.display());
                    return;
                }
            };
            if !events.iter().any(|event| canonical(&event.path) == watch_path) {
                return;
            }
            info!("modification detected! Updating {}", target.display());
            match handler.load(&target) {
                Ok(report) => debug!(
                    "session {}: {} new records, {} new events, {} new tensors",
                    report.session_id,
                    report.processed,
                    report.new_events.len(),
                    report.new_tensors.len()
                ),
                Err(err) => error!("failed to reload {}: {err}", target.display()),
            }
        })?;

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        debouncer.watcher().watch(dir, RecursiveMode::NonRecursive)?;

        Ok(Self {
            path,
            _debouncer: debouncer,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Resolve symlinks when the file exists; deleted files compare by their plain path.
fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
