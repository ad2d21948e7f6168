//! Scene hot reload message handlers

use iced::Task;

use crate::app::message::Message;
use crate::app::state::App;
use crate::config::SceneConfig;
use crate::config::watcher::{DEFAULT_DEBOUNCE, SceneEvent, next_debounced};
use crate::engine::SceneUpdate;

impl App {
    /// Handle scene watcher and reload messages
    pub fn handle_scene(&mut self, message: &Message) -> Option<Task<Message>> {
        match message {
            Message::SceneWatchStarted(rx) => {
                tracing::info!("Scene watcher started");
                let rx = rx.clone();
                Some(Task::run(
                    async_stream::stream! {
                        loop {
                            let event = {
                                let mut rx = rx.lock().await;
                                next_debounced(&mut rx, DEFAULT_DEBOUNCE).await
                            };
                            if let Some(event) = event {
                                yield event;
                            } else {
                                break;
                            }
                        }
                    },
                    Message::SceneFileEvent,
                ))
            }

            Message::SceneFileEvent(event) => match event {
                SceneEvent::Changed(path) => {
                    let path = path.clone();
                    Some(Task::perform(
                        async move { SceneConfig::load_from_file(&path) },
                        Message::SceneLoaded,
                    ))
                }
                SceneEvent::Removed(path) => {
                    tracing::info!(
                        "Scene file {} removed, keeping the current scene",
                        path.display()
                    );
                    Some(Task::none())
                }
                SceneEvent::Error(e) => {
                    tracing::warn!("Scene watcher error: {}", e);
                    Some(Task::none())
                }
            },

            Message::SceneLoaded(result) => {
                match result {
                    Ok(scene) => match self.compositor.apply_scene(scene.clone()) {
                        SceneUpdate::Unchanged => {
                            tracing::debug!("Scene file saved without changes");
                        }
                        SceneUpdate::Updated { applied, reseeded } => {
                            tracing::info!(
                                "Scene reloaded: {} layers updated, {} reseeded",
                                applied,
                                reseeded
                            );
                        }
                        SceneUpdate::Rebuilt => {
                            tracing::info!(
                                "Scene reloaded: rebuilt {} layers",
                                self.compositor.layer_kinds().len()
                            );
                        }
                    },
                    Err(e) => {
                        tracing::warn!("Failed to reload scene, keeping the previous one: {}", e);
                    }
                }
                Some(Task::none())
            }

            _ => None,
        }
    }
}
