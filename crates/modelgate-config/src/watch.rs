//! Configuration-file hot reload (spec §4.2, §8): watches the config file
//! and signals the coordinator to rebuild and swap the catalog.
//!
//! The teacher workspace has no file-watch dependency of its own; `notify`
//! is the crate the broader retrieval pack reaches for here (see
//! `SPEC_FULL.md` "Ambient stack").

use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

pub struct ConfigWatcher {
    rx: mpsc::Receiver<()>,
    // Kept alive for the lifetime of the watcher; dropping it stops watching.
    _inner: notify::RecommendedWatcher,
}

impl ConfigWatcher {
    /// Watches the parent directory of `path` (not the file itself) so
    /// that editors which replace the file via rename-into-place still
    /// trigger a reload.
    pub fn spawn(path: &Path) -> notify::Result<Self> {
        use notify::Watcher;

        let (tx, rx) = mpsc::channel(1);
        let target = path.to_path_buf();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
            let Ok(event) = event else { return };
            if event_touches(&event, &target) {
                let _ = tx.try_send(());
            }
        })?;

        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        watcher.watch(parent, notify::RecursiveMode::NonRecursive)?;

        Ok(Self {
            rx,
            _inner: watcher,
        })
    }

    /// Awaits the next coalesced change notification. Multiple rapid
    /// filesystem events between calls collapse into a single signal,
    /// since the channel has capacity 1 and uses `try_send`.
    pub async fn changed(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }
}

fn event_touches(event: &notify::Event, target: &PathBuf) -> bool {
    matches!(
        event.kind,
        notify::EventKind::Modify(_) | notify::EventKind::Create(_) | notify::EventKind::Remove(_)
    ) && event.paths.iter().any(|p| p == target)
}
