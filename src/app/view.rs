//! Application view rendering

use iced::Element;

use super::App;
use super::message::Message;

impl App {
    /// Build the view for a specific window
    pub fn view(&self, _window_id: iced::window::Id) -> Element<'_, Message> {
        crate::render::view(self.compositor.outputs(), self.scale_probe.clone())
    }
}
