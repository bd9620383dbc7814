//! Template file watcher.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Watches one template file and reports each change.
///
/// The parent directory is watched rather than the file, since editors
/// commonly replace files by renaming a new one over them.
pub struct TemplateWatcher {
    path: PathBuf,
}

impl TemplateWatcher {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Start watching. Dropping the returned watcher stops notifications.
    pub fn run(self) -> Result<(RecommendedWatcher, mpsc::UnboundedReceiver<()>), notify::Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        let file_name = self.path.file_name().map(|n| n.to_os_string());
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    let touches_template = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if touches_template {
                        tracing::info!("Template change detected");
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!(error = %e, "Template watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Template watcher started");
        Ok((watcher, rx))
    }
}
