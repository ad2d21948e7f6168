//! Main application module

mod message;
mod state;
mod update;
mod view;

use std::path::PathBuf;
use std::sync::Arc;

use iced::{Size, Task, Theme};

use crate::config::SceneConfig;
use crate::config::watcher::SceneWatcher;
use crate::engine::Compositor;
use crate::render::ScaleProbe;
pub use message::Message;
pub use state::App;

/// Startup options resolved by `main`
#[derive(Debug, Clone)]
pub struct Boot {
    pub scene_path: PathBuf,
    pub scene: SceneConfig,
    pub window_size: Size,
    pub watch: bool,
}

impl App {
    /// Create new application instance
    pub fn new(boot: Boot) -> (Self, Task<Message>) {
        let Boot {
            scene_path,
            scene,
            window_size,
            watch,
        } = boot;

        // 1. Build the layer stack for the initial window size
        let compositor = Compositor::new(scene, (window_size.width, window_size.height), 1.0);

        // 2. Open the window
        let (window_id, open_window) = iced::window::open(iced::window::Settings {
            size: window_size,
            exit_on_close_request: false,
            #[cfg(target_os = "linux")]
            platform_specific: iced::window::settings::PlatformSpecific {
                application_id: "backdrop".to_string(),
                ..Default::default()
            },
            ..Default::default()
        });
        tracing::info!("Opening main window with id: {:?}", window_id);

        // 3. Watch the scene file for edits
        let mut watcher = None;
        let mut watch_task = Task::none();
        if watch {
            match SceneWatcher::spawn(&scene_path) {
                Ok((handle, rx)) => {
                    watcher = Some(handle);
                    watch_task = Task::done(Message::SceneWatchStarted(Arc::new(
                        tokio::sync::Mutex::new(rx),
                    )));
                }
                Err(e) => tracing::warn!("Scene hot reload disabled: {:#}", e),
            }
        }

        let app = Self {
            compositor,
            scene_path,
            watcher,
            scale_probe: ScaleProbe::default(),
            window_id: Some(window_id),
            window_size,
            minimized: false,
        };

        (app, Task::batch([open_window.discard(), watch_task]))
    }

    /// Application theme for a specific window
    pub fn theme(&self, _window_id: iced::window::Id) -> Theme {
        Theme::Dark
    }

    /// Window title naming the active scene file
    pub fn title(&self, _window_id: iced::window::Id) -> String {
        match self.scene_path.file_name() {
            Some(name) => format!("Backdrop - {}", name.to_string_lossy()),
            None => "Backdrop".to_string(),
        }
    }

    /// Subscriptions for frames, window changes and pointer motion
    pub fn subscription(&self) -> iced::Subscription<Message> {
        use iced::time::Duration;

        // 1. Display-refresh frames, only while some layer asked for one
        let frame_sub = if subscription_logic::needs_frames(
            self.compositor.is_visible(),
            self.compositor.wants_frame(),
        ) {
            iced::window::frames().map(Message::Frame)
        } else {
            iced::Subscription::none()
        };

        // 2. Window events
        let close_request_sub = iced::window::close_requests().map(|_id| Message::RequestClose);
        let resize_sub =
            iced::window::resize_events().map(|(_id, size)| Message::WindowResized(size));

        // 3. Minimize polling; resize events do not report it on every platform
        let minimized_sub = if self.window_id.is_some() {
            iced::time::every(Duration::from_millis(subscription_logic::MINIMIZED_POLL_MS))
                .map(|_| Message::CheckMinimized)
        } else {
            iced::Subscription::none()
        };

        // 4. Pointer
        let pointer_sub = if self.compositor.is_visible() {
            iced::event::listen().filter_map(|event| match event {
                iced::Event::Mouse(iced::mouse::Event::CursorMoved { position }) => {
                    Some(Message::CursorMoved(position))
                }
                _ => None,
            })
        } else {
            iced::Subscription::none()
        };

        iced::Subscription::batch([
            frame_sub,
            close_request_sub,
            resize_sub,
            minimized_sub,
            pointer_sub,
        ])
    }
}

/// Subscription decision logic for testability
pub mod subscription_logic {
    use iced::Size;

    /// Interval between minimized-state queries
    pub const MINIMIZED_POLL_MS: u64 = 500;

    pub fn needs_frames(visible: bool, wants_frame: bool) -> bool {
        visible && wants_frame
    }

    /// A window renders only when it has area and is not minimized
    pub fn is_window_visible(size: Size, minimized: bool) -> bool {
        !minimized && size.width >= 1.0 && size.height >= 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::subscription_logic::*;
    use iced::Size;

    #[test]
    fn test_frames_only_when_visible_and_requested() {
        assert!(needs_frames(true, true));
        assert!(!needs_frames(true, false));
        assert!(!needs_frames(false, true));
        assert!(!needs_frames(false, false));
    }

    #[test]
    fn test_minimized_window_is_hidden() {
        assert!(is_window_visible(Size::new(800.0, 600.0), false));
        assert!(!is_window_visible(Size::new(800.0, 600.0), true));
    }

    #[test]
    fn test_zero_area_window_is_hidden() {
        assert!(!is_window_visible(Size::new(0.0, 0.0), false));
        assert!(!is_window_visible(Size::new(800.0, 0.0), false));
        assert!(!is_window_visible(Size::new(0.5, 600.0), false));
    }
}
