//! Application messages

use std::sync::Arc;

use iced::time::Instant;
use iced::{Point, Size};

use crate::config::watcher::{SceneEvent, SceneEventReceiver};
use crate::config::{ConfigError, SceneConfig};

/// Application messages
#[derive(Debug, Clone)]
pub enum Message {
    /// No-op message
    Noop,

    // ============ Frames ============
    /// Display refresh tick
    Frame(Instant),

    // ============ Window ============
    /// Window resized (logical pixels)
    WindowResized(Size),
    /// Time to query whether the window is minimized
    CheckMinimized,
    /// Minimized state reported by the window
    MinimizedChanged(bool),
    /// Close button pressed
    RequestClose,

    // ============ Pointer ============
    /// Cursor moved inside the window (logical pixels)
    CursorMoved(Point),

    // ============ Scene ============
    /// Scene file watcher is running
    SceneWatchStarted(Arc<tokio::sync::Mutex<SceneEventReceiver>>),
    /// Debounced scene file event
    SceneFileEvent(SceneEvent),
    /// Scene file re-read from disk
    SceneLoaded(Result<SceneConfig, ConfigError>),
}
