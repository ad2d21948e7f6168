//! Layer implementations
//!
//! Each layer is a [`RenderTask`] holding its config snapshot, its own
//! pointer smoother and whatever simulation state it needs.

pub mod aurora;
pub mod blob;
pub mod glass;
pub mod gradient;
pub mod wave;

use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

use crate::config::LayerConfig;
use crate::engine::color::ColorCache;
use crate::engine::scheduler::RenderTask;

pub use aurora::AuroraLayer;
pub use blob::BlobLayer;
pub use gradient::GradientLayer;
pub use wave::WaveLayer;

static LAYER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique id used by the GPU pipelines to key per-layer resources
pub(crate) fn next_layer_id() -> u64 {
    LAYER_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Create the render task for one scene entry
pub fn build_task(config: &LayerConfig, colors: &ColorCache) -> Box<dyn RenderTask> {
    match config {
        LayerConfig::Gradient(c) => Box::new(GradientLayer::new(c.clone(), colors)),
        LayerConfig::Blob(c) => Box::new(BlobLayer::new(c.clone(), colors)),
        LayerConfig::Aurora(c) => Box::new(AuroraLayer::new(c.clone(), colors)),
        LayerConfig::Wave(c) => Box::new(WaveLayer::new(c.clone(), colors)),
    }
}

/// Finite, ordered `(min, max)`; a max below min is raised to min
pub(crate) fn span(min: f32, max: f32) -> (f32, f32) {
    let min = if min.is_finite() { min } else { 0.0 };
    let max = if max.is_finite() { max } else { min };
    (min, max.max(min))
}

/// Uniform sample from an ordered span
pub(crate) fn sample(rng: &mut impl Rng, (min, max): (f32, f32)) -> f32 {
    if max > min {
        rng.random_range(min..max)
    } else {
        min
    }
}
