//! Window message handlers

use iced::Task;

use crate::app::message::Message;
use crate::app::state::App;
use crate::app::subscription_logic;

impl App {
    fn sync_visibility(&mut self) {
        let visible = subscription_logic::is_window_visible(self.window_size, self.minimized);
        self.compositor.set_visible(visible);
    }

    /// Handle window-related messages
    pub fn handle_window(&mut self, message: &Message) -> Option<Task<Message>> {
        match message {
            Message::WindowResized(size) => {
                self.window_size = *size;
                if size.width >= 1.0 && size.height >= 1.0 {
                    self.compositor.resize(size.width, size.height);
                }
                self.sync_visibility();
                Some(Task::none())
            }

            Message::CheckMinimized => {
                let Some(id) = self.window_id else {
                    return Some(Task::none());
                };
                Some(iced::window::is_minimized(id).map(|minimized| match minimized {
                    Some(minimized) => Message::MinimizedChanged(minimized),
                    None => Message::Noop,
                }))
            }

            Message::MinimizedChanged(minimized) => {
                if *minimized != self.minimized {
                    tracing::debug!("Window minimized: {}", minimized);
                    self.minimized = *minimized;
                    self.sync_visibility();
                }
                Some(Task::none())
            }

            Message::RequestClose => {
                tracing::info!("Closing window");
                self.compositor.shutdown();
                self.watcher = None;
                self.window_id = None;
                Some(iced::exit())
            }

            Message::Noop => Some(Task::none()),

            _ => None,
        }
    }
}
