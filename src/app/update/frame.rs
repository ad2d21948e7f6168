//! Frame and pointer message handlers

use iced::Task;

use crate::app::message::Message;
use crate::app::state::App;

impl App {
    /// Handle display refresh ticks and pointer motion
    pub fn handle_frame(&mut self, message: &Message) -> Option<Task<Message>> {
        match message {
            Message::Frame(now) => {
                self.compositor.set_scale(self.scale_probe.get());
                let produced = self.compositor.tick(*now);
                if produced == 0 {
                    tracing::trace!("Frame tick with no pending layers");
                }
                Some(Task::none())
            }

            Message::CursorMoved(position) => {
                self.compositor.set_cursor(position.x, position.y);
                Some(Task::none())
            }

            _ => None,
        }
    }
}
