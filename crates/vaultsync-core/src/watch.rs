//! Filesystem watcher adapter.
//!
//! Forwards every path touched by a create, modify or remove event as a raw
//! hint. Coalescing and classification happen downstream.

use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Start watching `root` recursively.
///
/// Watching stops when the returned watcher is dropped.
pub fn watch_tree(
    root: &Path,
    hints: mpsc::UnboundedSender<PathBuf>,
) -> notify::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if !is_relevant(&event.kind) {
                return;
            }
            for path in event.paths {
                debug!("Change: {}", path.display());
                if hints.send(path).is_err() {
                    debug!("Change receiver closed");
                    return;
                }
            }
        }
        Err(e) => {
            error!("Watch error: {e}");
        }
    })?;

    watcher.watch(root, RecursiveMode::Recursive)?;
    info!("Watching {}", root.display());

    Ok(watcher)
}

fn is_relevant(kind: &EventKind) -> bool {
    !matches!(kind, EventKind::Access(_))
}
