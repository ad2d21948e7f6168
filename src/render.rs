//! GPU presentation of the layer stack
//!
//! The whole scene is one iced `shader` widget. Every frame the compositor's
//! layer outputs are packed into a [`ScenePrimitive`]; the shared
//! [`pipeline::ScenePipeline`] keeps per-layer GPU resources keyed by layer
//! id and draws the layers bottom first:
//!
//! - gradient layers run the gradient shader straight into the frame, or
//!   into an offscreen texture that the refraction pass then samples
//! - surface layers upload their pixmap when its generation changes and are
//!   drawn through the refraction pass (identity when glass is off)

pub mod pipeline;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use iced::widget::shader;
use iced::{Element, Length, Rectangle, mouse};

use crate::engine::surface::SurfaceView;
use crate::layers::glass::GlassUniforms;
use crate::layers::gradient::{FrameUniforms, GradientParams};

/// Latest frame of a gradient layer
#[derive(Debug, Clone)]
pub struct GradientFrame {
    pub layer_id: u64,
    /// Bumped whenever `params` changes
    pub revision: u64,
    pub params: GradientParams,
    pub frame: FrameUniforms,
    /// Refraction applied on top, if any
    pub glass: Option<GlassUniforms>,
}

/// Latest frame of a CPU-rendered layer
#[derive(Debug, Clone)]
pub struct SurfaceFrame {
    pub layer_id: u64,
    pub source: SurfaceView,
    pub glass: GlassUniforms,
}

/// What one layer presents this frame
#[derive(Debug, Clone)]
pub enum LayerOutput {
    Gradient(GradientFrame),
    Surface(SurfaceFrame),
}

impl LayerOutput {
    pub fn layer_id(&self) -> u64 {
        match self {
            LayerOutput::Gradient(g) => g.layer_id,
            LayerOutput::Surface(s) => s.layer_id,
        }
    }
}

/// Display scale factor as last seen by the renderer
///
/// Layers are rasterized on the CPU in device pixels, but only the
/// renderer learns the real scale factor. It writes it here during
/// `prepare`, and the application reads it back on the next frame.
#[derive(Debug, Clone)]
pub struct ScaleProbe(Arc<AtomicU32>);

impl ScaleProbe {
    pub fn new(scale: f32) -> Self {
        Self(Arc::new(AtomicU32::new(scale.to_bits())))
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, scale: f32) {
        self.0.store(scale.to_bits(), Ordering::Relaxed);
    }
}

impl Default for ScaleProbe {
    fn default() -> Self {
        Self::new(1.0)
    }
}

/// Every layer of the scene, bottom first
#[derive(Debug, Clone, Default)]
pub struct ScenePrimitive {
    pub layers: Vec<LayerOutput>,
    pub scale: Option<ScaleProbe>,
}

impl ScenePrimitive {
    pub fn new(layers: Vec<LayerOutput>) -> Self {
        Self {
            layers,
            scale: None,
        }
    }

    pub fn with_scale_probe(mut self, probe: ScaleProbe) -> Self {
        self.scale = Some(probe);
        self
    }

    pub fn active_ids(&self) -> Vec<u64> {
        self.layers.iter().map(LayerOutput::layer_id).collect()
    }
}

/// Shader program presenting a scene
#[derive(Debug, Clone, Default)]
pub struct SceneProgram {
    primitive: ScenePrimitive,
}

impl SceneProgram {
    pub fn new(layers: Vec<LayerOutput>, probe: ScaleProbe) -> Self {
        Self {
            primitive: ScenePrimitive::new(layers).with_scale_probe(probe),
        }
    }
}

impl<Message> shader::Program<Message> for SceneProgram {
    type State = ();
    type Primitive = ScenePrimitive;

    fn draw(
        &self,
        _state: &Self::State,
        _cursor: mouse::Cursor,
        _bounds: Rectangle,
    ) -> Self::Primitive {
        self.primitive.clone()
    }
}

/// Full-size widget for the given layer outputs
pub fn view<'a, Message: 'a>(layers: Vec<LayerOutput>, probe: ScaleProbe) -> Element<'a, Message> {
    shader(SceneProgram::new(layers, probe))
        .width(Length::Fill)
        .height(Length::Fill)
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::surface::{RenderSurface, Viewport};
    use bytemuck::Zeroable;

    #[test]
    fn test_active_ids_follow_layer_order() {
        let surface = RenderSurface::new(Viewport::new(4, 4)).unwrap();
        let primitive = ScenePrimitive::new(vec![
            LayerOutput::Gradient(GradientFrame {
                layer_id: 7,
                revision: 1,
                params: GradientParams::zeroed(),
                frame: FrameUniforms::zeroed(),
                glass: None,
            }),
            LayerOutput::Surface(SurfaceFrame {
                layer_id: 3,
                source: surface.view(),
                glass: GlassUniforms::passthrough(),
            }),
        ]);
        assert_eq!(primitive.active_ids(), vec![7, 3]);
    }

    #[test]
    fn test_scale_probe_is_shared() {
        let probe = ScaleProbe::default();
        assert_eq!(probe.get(), 1.0);

        let primitive = ScenePrimitive::new(Vec::new()).with_scale_probe(probe.clone());
        if let Some(renderer_side) = &primitive.scale {
            renderer_side.set(2.5);
        }
        assert_eq!(probe.get(), 2.5);
    }
}
