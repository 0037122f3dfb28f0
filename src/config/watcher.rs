//! Config file watcher
//!
//! Reloads on every write notification for the file and hands the result to
//! the loop. Notifications are edge-triggered and not debounced.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use notify::{Config as NotifyConfig, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::events::{ConfigOrigin, LoopEvent};

use super::{ConfigError, ConfigReloader};

pub struct ConfigWatcher {
    path: PathBuf,
    watcher: Option<RecommendedWatcher>,
    /// Descriptor of the file that was loaded, opened before the watch was
    /// registered and held until stop
    file: Option<File>,
}

impl ConfigWatcher {
    /// Start watching the reloader's path.
    ///
    /// `file` must already be open on that path; the watcher takes
    /// ownership and closes it when stopped.
    pub fn start(
        file: File,
        reloader: Arc<ConfigReloader>,
        events: mpsc::UnboundedSender<LoopEvent>,
    ) -> Result<Self, ConfigError> {
        let path = reloader.path().to_path_buf();

        let handler_reloader = Arc::clone(&reloader);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) if is_write(&event.kind) => {
                    debug!(kind = ?event.kind, "configuration file changed");
                    handler_reloader.reload_into(&events, ConfigOrigin::Watcher);
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "configuration watch error"),
            },
            NotifyConfig::default(),
        )
        .map_err(|source| ConfigError::Watch {
            path: path.clone(),
            source,
        })?;

        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .map_err(|source| ConfigError::Watch {
                path: path.clone(),
                source,
            })?;

        info!(path = %path.display(), "started watching configuration file");

        Ok(Self {
            path,
            watcher: Some(watcher),
            file: Some(file),
        })
    }

    #[cfg(test)]
    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    /// Stop watching and close the file. Safe to call more than once.
    pub fn stop(&mut self) {
        let watcher = self.watcher.take();
        let file = self.file.take();
        if watcher.is_none() && file.is_none() {
            return;
        }

        drop(watcher);
        drop(file);
        info!(path = %self.path.display(), "stopped watching configuration file");
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn is_write(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}
