//! Application state definitions

use std::path::PathBuf;

use iced::Size;

use crate::config::watcher::SceneWatcher;
use crate::engine::Compositor;
use crate::render::ScaleProbe;

/// Main application state
pub struct App {
    /// Layer stack and active scene snapshot
    pub compositor: Compositor,
    /// Scene file being shown (and watched)
    pub scene_path: PathBuf,
    /// Keeps the file watcher alive; `None` when hot reload is off
    pub watcher: Option<SceneWatcher>,
    /// Scale factor reported back by the renderer
    pub scale_probe: ScaleProbe,
    pub window_id: Option<iced::window::Id>,
    /// Last known window size in logical pixels
    pub window_size: Size,
    pub minimized: bool,
}
