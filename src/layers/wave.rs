//! Stacked sine-wave fills
//!
//! Each band is a sine curve filled down to the bottom edge. Bands further
//! down the stack move faster, and the pointer lifts their amplitude as it
//! moves up the screen.

use std::f32::consts::TAU;
use std::sync::Arc;

use tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, Rect, Transform};

use super::glass::GlassUniforms;
use super::next_layer_id;
use crate::config::{LayerConfig, WaveConfig};
use crate::engine::color::{ColorCache, Rgb, sample_gradient};
use crate::engine::pointer::{PointerInput, PointerSmoother};
use crate::engine::scheduler::{ConfigUpdate, FrameContext, RenderTask, TaskControl};
use crate::engine::surface::{RenderSurface, SurfaceError, Viewport};
use crate::render::{LayerOutput, SurfaceFrame};

/// Relative speed gain per band
pub const SPEED_STEP: f32 = 0.3;
/// Phase offset between consecutive bands, radians
pub const PHASE_STEP: f32 = 1.7;
/// Upper bound on the band count
pub const MAX_WAVES: usize = 64;
/// Horizontal distance between curve samples, device pixels
const SAMPLE_STEP: f32 = 6.0;

/// Resolved parameters of one band, in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveBand {
    pub baseline: f32,
    pub amplitude: f32,
    /// Cycles across the width
    pub frequency: f32,
    pub speed: f32,
    pub phase: f32,
    pub color: Rgb,
}

impl WaveBand {
    pub fn y_at(&self, x: f32, width: f32, time: f32) -> f32 {
        let u = if width > 0.0 { x / width } else { 0.0 };
        self.baseline + self.amplitude * (TAU * self.frequency * u + time * self.speed + self.phase).sin()
    }
}

/// Bands for the current pointer position, top band first
pub fn bands(
    config: &WaveConfig,
    palette: &[Rgb],
    pointer: PointerInput,
    (_, height): (f32, f32),
) -> Vec<WaveBand> {
    let count = (config.wave_count as usize).min(MAX_WAVES);
    let lift = 1.0 + config.pointer_influence * (1.0 - pointer.y);
    let shift = config.pointer_influence * pointer.x;

    (0..count)
        .map(|i| {
            let t = if count > 1 {
                i as f32 / (count - 1) as f32
            } else {
                0.0
            };
            WaveBand {
                baseline: (config.baseline + i as f32 * config.spacing) * height,
                amplitude: config.amplitude * height * lift,
                frequency: config.frequency,
                speed: config.speed * (1.0 + SPEED_STEP * i as f32),
                phase: i as f32 * PHASE_STEP + shift,
                color: sample_gradient(palette, t),
            }
        })
        .collect()
}

fn fill_band(pixmap: &mut Pixmap, band: &WaveBand, time: f32, opacity: f32) {
    let (w, h) = (pixmap.width() as f32, pixmap.height() as f32);
    let mut pb = PathBuilder::new();
    pb.move_to(0.0, h);
    let mut x = 0.0;
    while x < w {
        pb.line_to(x, band.y_at(x, w, time));
        x += SAMPLE_STEP;
    }
    pb.line_to(w, band.y_at(w, w, time));
    pb.line_to(w, h);
    pb.close();

    let Some(path) = pb.finish() else {
        return;
    };
    let mut paint = Paint::default();
    paint.set_color(band.color.to_skia(opacity));
    pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
}

/// Wave layer state
#[derive(Debug)]
pub struct WaveLayer {
    id: u64,
    config: Arc<WaveConfig>,
    palette: Vec<Rgb>,
    background: Option<Rgb>,
    pointer: PointerSmoother,
    time: f32,
    visible: Option<RenderSurface>,
}

impl WaveLayer {
    pub fn new(config: WaveConfig, colors: &ColorCache) -> Self {
        Self {
            id: next_layer_id(),
            palette: colors.palette(&config.colors),
            background: config.background.as_deref().map(|hex| colors.rgb(hex)),
            pointer: PointerSmoother::new(config.pointer_decay),
            config: Arc::new(config),
            time: 0.0,
            visible: None,
        }
    }

    #[cfg(test)]
    pub fn surface_size(&self) -> Option<(u32, u32)> {
        self.visible.as_ref().and_then(|s| s.size())
    }

    fn render(&mut self) -> Result<(), SurfaceError> {
        let visible = self.visible.as_mut().ok_or(SurfaceError::Released)?;
        let config = &*self.config;
        let palette = &self.palette;
        let background = self.background;
        let pointer = self.pointer.current();
        let time = self.time;
        let opacity = config.opacity.clamp(0.0, 1.0);

        visible.write(|pixmap| {
            let size = (pixmap.width() as f32, pixmap.height() as f32);
            match background {
                Some(color) => {
                    let mut paint = Paint::default();
                    paint.set_color(color.to_skia(1.0));
                    if let Some(rect) = Rect::from_xywh(0.0, 0.0, size.0, size.1) {
                        pixmap.fill_rect(rect, &paint, Transform::identity(), None);
                    }
                }
                None => pixmap.fill(Color::TRANSPARENT),
            }
            for band in bands(config, palette, pointer, size) {
                fill_band(pixmap, &band, time, opacity);
            }
        })
    }
}

impl RenderTask for WaveLayer {
    fn kind(&self) -> &'static str {
        "wave"
    }

    fn mount(&mut self, viewport: Viewport, _colors: &ColorCache) -> Result<(), SurfaceError> {
        self.time = 0.0;
        self.visible = Some(RenderSurface::new(viewport)?);
        self.render()
    }

    fn resize(&mut self, viewport: Viewport, _colors: &ColorCache) -> Result<(), SurfaceError> {
        match self.visible.as_mut() {
            Some(visible) => visible.reset(viewport)?,
            None => self.visible = Some(RenderSurface::new(viewport)?),
        }
        self.render()
    }

    fn apply_config(&mut self, config: &LayerConfig, colors: &ColorCache) -> ConfigUpdate {
        let LayerConfig::Wave(config) = config else {
            return ConfigUpdate::Incompatible;
        };
        if *self.config == *config {
            return ConfigUpdate::Unchanged;
        }
        self.palette = colors.palette(&config.colors);
        self.background = config.background.as_deref().map(|hex| colors.rgb(hex));
        self.pointer.set_decay(config.pointer_decay);
        self.config = Arc::new(config.clone());
        ConfigUpdate::Applied
    }

    fn frame(&mut self, ctx: &FrameContext) -> TaskControl {
        self.time += ctx.dt;
        self.pointer.update(ctx.pointer);
        match self.render() {
            Ok(()) => TaskControl::Continue,
            Err(_) => TaskControl::Finish,
        }
    }

    fn teardown(&mut self) {
        if let Some(mut visible) = self.visible.take() {
            visible.release();
        }
    }

    fn output(&self) -> Option<LayerOutput> {
        let visible = self.visible.as_ref()?;
        Some(LayerOutput::Surface(SurfaceFrame {
            layer_id: self.id,
            source: visible.view(),
            glass: GlassUniforms::for_layer(self.config.glass.as_ref(), self.time),
        }))
    }
}
