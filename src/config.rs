//! Scene configuration persistence
//!
//! A scene is an ordered list of layer configs (bottom first) plus a few
//! scene-wide settings. It is read from a JSON file, kept as an immutable
//! snapshot, and replaced wholesale whenever the file changes on disk.

pub mod layers;
pub mod watcher;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use layers::{AuroraConfig, BlobConfig, GlassConfig, GradientConfig, LayerConfig, WaveConfig};

use crate::engine::scheduler::DEFAULT_MAX_FRAME_DELTA;
use crate::engine::surface::DEFAULT_MAX_PIXEL_RATIO;

/// Top-level scene description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Device pixel ratio cap for every surface
    pub max_pixel_ratio: f32,
    /// Longest simulated step per frame, in seconds
    pub max_frame_delta: f32,
    /// Layers in z-order, bottom first
    pub layers: Vec<LayerConfig>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            max_pixel_ratio: DEFAULT_MAX_PIXEL_RATIO,
            max_frame_delta: DEFAULT_MAX_FRAME_DELTA,
            layers: vec![
                LayerConfig::Gradient(GradientConfig::default()),
                LayerConfig::Wave(WaveConfig::default()),
            ],
        }
    }
}

impl SceneConfig {
    /// Default scene file location
    pub fn file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "backdrop", "Backdrop")
            .map(|dirs| dirs.config_dir().join("scene.json"))
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }

    /// Whether `other` has the same layer kinds in the same order
    pub fn same_structure(&self, other: &SceneConfig) -> bool {
        self.layers.len() == other.layers.len()
            && self
                .layers
                .iter()
                .zip(&other.layers)
                .all(|(a, b)| a.kind() == b.kind())
    }
}

/// Errors that can occur while reading or writing a scene
#[derive(Debug, Clone)]
pub enum ConfigError {
    Io(String),
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}
