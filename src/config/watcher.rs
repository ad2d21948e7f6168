//! Scene file watching for live configuration updates
//!
//! Uses the `notify` crate to watch the directory holding the scene file
//! (editors often replace files instead of writing in place) and forwards
//! events that touch the scene file over a tokio channel.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Events emitted by the scene watcher
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    /// The scene file was created or modified
    Changed(PathBuf),
    /// The scene file was removed; the current snapshot stays active
    Removed(PathBuf),
    /// Watcher error
    Error(String),
}

/// Receiver side of the watch channel
pub type SceneEventReceiver = mpsc::UnboundedReceiver<SceneEvent>;

/// Quiet period used to coalesce editor write bursts
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(150);

/// Watches a single scene file
pub struct SceneWatcher {
    _watcher: RecommendedWatcher,
    path: PathBuf,
}

impl SceneWatcher {
    /// Start watching `path`; events go to the returned receiver
    pub fn spawn(path: &Path) -> Result<(Self, SceneEventReceiver)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let target = path.to_path_buf();
        let filter_target = target.clone();

        let mut watcher =
            notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if let Some(scene_event) = process_notify_event(&filter_target, event) {
                        let _ = tx.send(scene_event);
                    }
                }
                Err(e) => {
                    let _ = tx.send(SceneEvent::Error(e.to_string()));
                }
            })
            .context("Failed to create scene watcher")?;

        let dir = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;

        tracing::info!("Watching scene file {}", target.display());
        Ok((
            Self {
                _watcher: watcher,
                path: target,
            },
            rx,
        ))
    }
}

impl std::fmt::Debug for SceneWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneWatcher")
            .field("path", &self.path)
            .finish()
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    if a.file_name() != b.file_name() {
        return false;
    }
    let canonical_dir = |p: &Path| p.parent().and_then(|d| d.canonicalize().ok());
    canonical_dir(a).is_some() && canonical_dir(a) == canonical_dir(b)
}

/// Map a notify event onto the scene file, ignoring unrelated paths
fn process_notify_event(target: &Path, event: Event) -> Option<SceneEvent> {
    if !event.paths.iter().any(|p| same_file(p, target)) {
        return None;
    }

    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => {
            Some(SceneEvent::Changed(target.to_path_buf()))
        }
        EventKind::Remove(_) => Some(SceneEvent::Removed(target.to_path_buf())),
        EventKind::Access(_) | EventKind::Other | EventKind::Any => None,
    }
}

/// Wait for the next event, then swallow the burst that follows it
pub async fn next_debounced(
    rx: &mut SceneEventReceiver,
    debounce: Duration,
) -> Option<SceneEvent> {
    let mut latest = rx.recv().await?;
    loop {
        tokio::time::sleep(debounce).await;
        let mut drained = false;
        while let Ok(event) = rx.try_recv() {
            latest = event;
            drained = true;
        }
        if !drained {
            return Some(latest);
        }
    }
}
