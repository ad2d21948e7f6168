//! Rendering engine: color math, surfaces, scheduling and composition

pub mod blur;
pub mod color;
mod compositor;
pub mod noise;
pub mod pointer;
pub mod scheduler;
pub mod surface;

pub use compositor::{Compositor, SceneUpdate};
