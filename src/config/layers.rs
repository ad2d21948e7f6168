//! Per-layer configuration snapshots
//!
//! Every struct uses `#[serde(default)]` so a scene file only needs the
//! fields it wants to change. Values are never validated on load; layers
//! clamp degenerate values when they read them.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

static DEFAULT_PALETTE: Lazy<Vec<String>> = Lazy::new(|| {
    ["#0f0c29", "#302b63", "#7f5af0", "#2cb67d", "#f8c630"]
        .iter()
        .map(|s| s.to_string())
        .collect()
});

fn default_palette() -> Vec<String> {
    DEFAULT_PALETTE.clone()
}

/// One layer of the scene, tagged by `"layer"` in JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "layer", rename_all = "snake_case")]
pub enum LayerConfig {
    Gradient(GradientConfig),
    Blob(BlobConfig),
    Aurora(AuroraConfig),
    Wave(WaveConfig),
}

impl LayerConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            LayerConfig::Gradient(_) => "gradient",
            LayerConfig::Blob(_) => "blob",
            LayerConfig::Aurora(_) => "aurora",
            LayerConfig::Wave(_) => "wave",
        }
    }
}

/// Gradient projection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GradientKind {
    #[default]
    Linear,
    Radial,
    Conic,
}

impl GradientKind {
    /// Value of the `kind` shader uniform
    pub fn as_uniform(&self) -> u32 {
        match self {
            GradientKind::Linear => 0,
            GradientKind::Radial => 1,
            GradientKind::Conic => 2,
        }
    }
}

/// Procedural multi-stop gradient rendered on the GPU
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientConfig {
    /// Up to 8 hex colors
    pub colors: Vec<String>,
    /// Stop positions in percent, index-aligned with `colors`
    pub stops: Vec<f32>,
    #[serde(rename = "type")]
    pub gradient_type: GradientKind,
    /// Start point in percent of the viewport
    pub start: [f32; 2],
    /// End point in percent of the viewport
    pub end: [f32; 2],
    /// Strength of the fbm warp
    pub wave_intensity: f32,
    pub wave1_speed: f32,
    /// Direction of the first noise field, degrees
    pub wave1_direction: f32,
    pub wave2_speed: f32,
    pub wave2_direction: f32,
    pub pointer_influence: f32,
    /// Pointer smoothing decay in `[0, 1)`
    pub pointer_decay: f32,
    /// Vignette strength, ignored while glass is active
    pub vignette: f32,
    pub glass: Option<GlassConfig>,
}

impl Default for GradientConfig {
    fn default() -> Self {
        Self {
            colors: default_palette(),
            stops: vec![0.0, 25.0, 50.0, 75.0, 100.0],
            gradient_type: GradientKind::Linear,
            start: [0.0, 0.0],
            end: [100.0, 100.0],
            wave_intensity: 0.5,
            wave1_speed: 0.08,
            wave1_direction: 30.0,
            wave2_speed: 0.05,
            wave2_direction: 210.0,
            pointer_influence: 0.3,
            pointer_decay: 0.92,
            vignette: 0.35,
            glass: None,
        }
    }
}

/// Metaball field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobConfig {
    pub colors: Vec<String>,
    /// Number of blobs; derived from viewport width and `min_size` when absent
    pub blob_count: Option<u32>,
    /// Blob radius bounds in device pixels
    pub min_size: f32,
    pub max_size: f32,
    /// Orbit radius bounds as a fraction of the shorter viewport side
    pub orbit_min: f32,
    pub orbit_max: f32,
    /// Base angular speed, radians per second
    pub speed: f32,
    /// Orbit radius wobble as a fraction of the orbit
    pub wobble: f32,
    pub wobble_speed: f32,
    /// Blur radius in device pixels
    pub blur: u32,
    /// Alpha at and above which the mask is fully opaque
    pub threshold: u8,
    /// Explicit background; otherwise the first color darkened
    pub background: Option<String>,
    pub background_darken: f32,
    pub pointer_influence: f32,
    pub pointer_decay: f32,
    pub glass: Option<GlassConfig>,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            colors: default_palette(),
            blob_count: None,
            min_size: 40.0,
            max_size: 120.0,
            orbit_min: 0.05,
            orbit_max: 0.35,
            speed: 0.4,
            wobble: 0.15,
            wobble_speed: 1.3,
            blur: 24,
            threshold: 170,
            background: None,
            background_darken: 0.8,
            pointer_influence: 0.2,
            pointer_decay: 0.95,
            glass: None,
        }
    }
}

/// Aurora particle line field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuroraConfig {
    /// Number of streaks; derived from viewport width and `min_width` when absent
    pub line_count: Option<u32>,
    /// Streak width bounds in device pixels
    pub min_width: f32,
    pub max_width: f32,
    /// Streak height bounds as a fraction of viewport height
    pub min_height: f32,
    pub max_height: f32,
    /// Lifetime bounds in seconds
    pub min_ttl: f32,
    pub max_ttl: f32,
    /// Hue range used when `palette` is empty
    pub hue_min: f32,
    pub hue_max: f32,
    /// Hues are drawn from these colors when present
    pub palette: Vec<String>,
    pub saturation: f32,
    pub lightness: f32,
    /// Peak streak opacity
    pub opacity: f32,
    pub blur: u32,
    /// Alpha of the background overdraw each frame; lower keeps longer trails
    pub fade: f32,
    pub background: String,
    pub pointer_influence: f32,
    pub pointer_decay: f32,
    pub glass: Option<GlassConfig>,
}

impl Default for AuroraConfig {
    fn default() -> Self {
        Self {
            line_count: None,
            min_width: 10.0,
            max_width: 30.0,
            min_height: 0.2,
            max_height: 0.6,
            min_ttl: 2.0,
            max_ttl: 6.0,
            hue_min: 120.0,
            hue_max: 200.0,
            palette: Vec::new(),
            saturation: 100.0,
            lightness: 60.0,
            opacity: 0.4,
            blur: 8,
            fade: 0.25,
            background: "#05060f".to_string(),
            pointer_influence: 0.05,
            pointer_decay: 0.9,
            glass: None,
        }
    }
}

/// Stacked sine-wave fills
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveConfig {
    pub colors: Vec<String>,
    pub wave_count: u32,
    /// Amplitude as a fraction of viewport height
    pub amplitude: f32,
    /// Cycles across the viewport width
    pub frequency: f32,
    /// Phase speed, radians per second
    pub speed: f32,
    /// Baseline of the first wave as a fraction of height
    pub baseline: f32,
    /// Baseline offset between consecutive waves
    pub spacing: f32,
    pub opacity: f32,
    /// Explicit background; transparent when absent
    pub background: Option<String>,
    pub pointer_influence: f32,
    pub pointer_decay: f32,
    pub glass: Option<GlassConfig>,
}

impl Default for WaveConfig {
    fn default() -> Self {
        Self {
            colors: default_palette(),
            wave_count: 3,
            amplitude: 0.04,
            frequency: 1.5,
            speed: 0.6,
            baseline: 0.7,
            spacing: 0.08,
            opacity: 0.35,
            background: None,
            pointer_influence: 0.5,
            pointer_decay: 0.93,
            glass: None,
        }
    }
}

/// Fluted glass refraction applied on top of a layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlassConfig {
    /// Number of flutes across the rotated width
    pub segments: f32,
    /// Flute rotation, degrees
    pub angle: f32,
    /// Horizontal sampling offset amplitude in UV units
    pub distortion: f32,
    /// Sine periods per flute
    pub wave_frequency: f32,
    /// Oscillation speed of the flute offset, radians per second
    pub speed: f32,
    /// Strength of the shade and highlight overlays; 0 disables them
    pub overlay_opacity: f32,
}

impl Default for GlassConfig {
    fn default() -> Self {
        Self {
            segments: 12.0,
            angle: 0.0,
            distortion: 0.02,
            wave_frequency: 1.0,
            speed: 0.3,
            overlay_opacity: 1.0,
        }
    }
}
