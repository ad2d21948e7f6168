//! Metaball layer
//!
//! Blobs orbit the viewport center and are drawn as plain circles into an
//! offscreen mask. Blurring the mask and then squashing its alpha through
//! a steep threshold makes nearby circles melt into each other. The mask
//! then selects between a diagonal palette gradient and the background.

use std::f32::consts::TAU;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tiny_skia::{
    Color, FillRule, GradientStop, LinearGradient, Paint, PathBuilder, Pixmap, Point, Rect,
    Shader, SpreadMode, Transform,
};
use tracing::debug;

use super::glass::GlassUniforms;
use super::{next_layer_id, sample, span};
use crate::config::{BlobConfig, LayerConfig};
use crate::engine::blur::{BlurScratch, box_blur};
use crate::engine::color::{ColorCache, Rgb, darken, sample_gradient};
use crate::engine::pointer::PointerSmoother;
use crate::engine::scheduler::{ConfigUpdate, FrameContext, RenderTask, TaskControl};
use crate::engine::surface::{RenderSurface, SurfaceError, Viewport, allocate_pixmap};
use crate::render::{LayerOutput, SurfaceFrame};

/// Upper bound on the pool, explicit or derived
pub const MAX_BLOBS: usize = 256;

/// Range of per-blob angular speed multipliers
const SPEED_MULTIPLIER: (f32, f32) = (0.5, 1.5);

/// One orbiting blob
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blob {
    /// Orbit radius as a fraction of the shorter viewport side
    pub orbit: f32,
    pub speed: f32,
    pub phase: f32,
    /// Radius in device pixels
    pub radius: f32,
    pub wobble_phase: f32,
}

impl Blob {
    /// Center in pixels for a `width × height` buffer
    pub fn center(
        &self,
        time: f32,
        config: &BlobConfig,
        (width, height): (f32, f32),
        pointer_offset: [f32; 2],
    ) -> [f32; 2] {
        let wobble = 1.0 + config.wobble * (time * config.wobble_speed + self.wobble_phase).sin();
        let radius = self.orbit * width.min(height) * wobble;
        let angle = self.phase + time * config.speed * self.speed;
        [
            width * 0.5 + angle.cos() * radius + pointer_offset[0] * self.speed,
            height * 0.5 + angle.sin() * radius + pointer_offset[1] * self.speed,
        ]
    }
}

/// Number of blobs for a viewport width
pub fn pool_size(config: &BlobConfig, width: u32) -> usize {
    match config.blob_count {
        Some(count) => (count as usize).min(MAX_BLOBS),
        None => {
            let min_size = if config.min_size.is_finite() && config.min_size > 0.0 {
                config.min_size
            } else {
                1.0
            };
            ((width as f32 / (2.0 * min_size)).floor() as usize).clamp(1, MAX_BLOBS)
        }
    }
}

fn seed_pool(rng: &mut impl Rng, config: &BlobConfig, count: usize) -> Vec<Blob> {
    let radius = span(config.min_size.max(0.0), config.max_size);
    let orbit = span(config.orbit_min, config.orbit_max);

    (0..count)
        .map(|_| Blob {
            orbit: sample(rng, orbit),
            speed: sample(rng, SPEED_MULTIPLIER),
            phase: rng.random_range(0.0..TAU),
            radius: sample(rng, radius),
            wobble_phase: rng.random_range(0.0..TAU),
        })
        .collect()
}

/// Squash a blurred alpha value into a hard-edged mask value
///
/// At or above `threshold` the pixel is opaque; between `threshold / 2`
/// and `threshold` alpha ramps linearly; below that it is cleared.
pub fn remap_alpha(alpha: u8, threshold: u8) -> u8 {
    if alpha >= threshold {
        return 255;
    }
    let low = threshold / 2;
    if alpha <= low {
        return 0;
    }
    ((alpha - low) as u32 * 255 / (threshold - low) as u32) as u8
}

/// Apply [`remap_alpha`] to a premultiplied RGBA buffer, keeping it white
fn threshold_mask(data: &mut [u8], threshold: u8) {
    for px in data.chunks_exact_mut(4) {
        let a = remap_alpha(px[3], threshold);
        px.copy_from_slice(&[a, a, a, a]);
    }
}

/// Where the mask is set take the gradient, elsewhere the background
fn composite(mask: &[u8], gradient: &[u8], background: [u8; 4], out: &mut [u8]) {
    for ((m, g), o) in mask
        .chunks_exact(4)
        .zip(gradient.chunks_exact(4))
        .zip(out.chunks_exact_mut(4))
    {
        if m[3] > 0 {
            o.copy_from_slice(g);
        } else {
            o.copy_from_slice(&background);
        }
    }
}

/// Diagonal top-left to bottom-right palette gradient
fn paint_gradient(pixmap: &mut Pixmap, palette: &[Rgb]) {
    let (w, h) = (pixmap.width() as f32, pixmap.height() as f32);
    let solid = |c: Rgb| Shader::SolidColor(c.to_skia(1.0));

    let shader = match palette {
        [] => Shader::SolidColor(Color::WHITE),
        [only] => solid(*only),
        [first, ..] => {
            let last = (palette.len() - 1) as f32;
            let stops = palette
                .iter()
                .enumerate()
                .map(|(i, c)| GradientStop::new(i as f32 / last, c.to_skia(1.0)))
                .collect();
            LinearGradient::new(
                Point::from_xy(0.0, 0.0),
                Point::from_xy(w, h),
                stops,
                SpreadMode::Pad,
                Transform::identity(),
            )
            .unwrap_or_else(|| solid(*first))
        }
    };

    let mut paint = Paint::default();
    paint.shader = shader;
    paint.anti_alias = false;
    if let Some(rect) = Rect::from_xywh(0.0, 0.0, w, h) {
        pixmap.fill_rect(rect, &paint, Transform::identity(), None);
    }
}

fn resolve_background(config: &BlobConfig, colors: &ColorCache) -> Rgb {
    match &config.background {
        Some(hex) => colors.rgb(hex),
        None => {
            let base = config.colors.first().map(String::as_str).unwrap_or("#000000");
            colors.rgb(&darken(base, config.background_darken.clamp(0.0, 1.0)))
        }
    }
}

/// Metaball layer state
#[derive(Debug)]
pub struct BlobLayer {
    id: u64,
    config: Arc<BlobConfig>,
    rng: StdRng,
    pool: Vec<Blob>,
    palette: Vec<Rgb>,
    background: Rgb,
    pointer: PointerSmoother,
    viewport: Viewport,
    time: f32,
    mask: Option<Pixmap>,
    gradient: Option<Pixmap>,
    visible: Option<RenderSurface>,
    scratch: BlurScratch,
}

impl BlobLayer {
    pub fn new(config: BlobConfig, colors: &ColorCache) -> Self {
        Self::with_rng(config, colors, StdRng::from_os_rng())
    }

    /// Deterministic pool seeding
    #[cfg(test)]
    pub fn with_seed(config: BlobConfig, colors: &ColorCache, seed: u64) -> Self {
        Self::with_rng(config, colors, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: BlobConfig, colors: &ColorCache, rng: StdRng) -> Self {
        Self {
            id: next_layer_id(),
            palette: colors.palette(&config.colors),
            background: resolve_background(&config, colors),
            pointer: PointerSmoother::new(config.pointer_decay),
            config: Arc::new(config),
            rng,
            pool: Vec::new(),
            viewport: Viewport::new(0, 0),
            time: 0.0,
            mask: None,
            gradient: None,
            visible: None,
            scratch: BlurScratch::default(),
        }
    }

    #[cfg(test)]
    pub fn pool(&self) -> &[Blob] {
        &self.pool
    }

    #[cfg(test)]
    pub fn surface_size(&self) -> Option<(u32, u32)> {
        self.visible.as_ref().and_then(|s| s.size())
    }

    fn reseed(&mut self) {
        let count = pool_size(&self.config, self.viewport.width);
        self.pool = seed_pool(&mut self.rng, &self.config, count);
        debug!("Seeded {} blobs", count);
    }

    fn allocate_buffers(&mut self) -> Result<(), SurfaceError> {
        let mut gradient = allocate_pixmap(self.viewport)?;
        paint_gradient(&mut gradient, &self.palette);
        self.gradient = Some(gradient);
        self.mask = Some(allocate_pixmap(self.viewport)?);
        Ok(())
    }

    fn draw(&mut self) -> Result<(), SurfaceError> {
        let (Some(mask), Some(gradient), Some(visible)) =
            (self.mask.as_mut(), self.gradient.as_ref(), self.visible.as_mut())
        else {
            return Err(SurfaceError::Released);
        };

        let config = &*self.config;
        let size = (mask.width() as f32, mask.height() as f32);
        let pointer = self.pointer.current();
        let offset = [
            (pointer.x - 0.5) * size.0 * config.pointer_influence,
            (pointer.y - 0.5) * size.1 * config.pointer_influence,
        ];

        mask.fill(Color::TRANSPARENT);
        let mut paint = Paint::default();
        let count = self.pool.len();
        for (i, blob) in self.pool.iter().enumerate() {
            let [cx, cy] = blob.center(self.time, config, size, offset);
            let Some(path) = PathBuilder::from_circle(cx, cy, blob.radius) else {
                continue;
            };
            let color = sample_gradient(&self.palette, i as f32 / count as f32);
            paint.set_color(color.to_skia(1.0));
            mask.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
        }

        let (w, h) = (mask.width() as usize, mask.height() as usize);
        box_blur(mask.data_mut(), w, h, config.blur as usize, 1, &mut self.scratch);
        threshold_mask(mask.data_mut(), config.threshold);

        let [r, g, b] = self.background.to_u8();
        let mask = &*mask;
        visible.write(|out| composite(mask.data(), gradient.data(), [r, g, b, 255], out.data_mut()))
    }
}

impl RenderTask for BlobLayer {
    fn kind(&self) -> &'static str {
        "blob"
    }

    fn mount(&mut self, viewport: Viewport, _colors: &ColorCache) -> Result<(), SurfaceError> {
        self.viewport = viewport;
        self.time = 0.0;
        self.visible = Some(RenderSurface::new(viewport)?);
        self.allocate_buffers()?;
        self.reseed();
        self.draw()
    }

    fn resize(&mut self, viewport: Viewport, _colors: &ColorCache) -> Result<(), SurfaceError> {
        self.viewport = viewport;
        match self.visible.as_mut() {
            Some(visible) => visible.resize(viewport)?,
            None => self.visible = Some(RenderSurface::new(viewport)?),
        }
        self.allocate_buffers()?;
        if self.config.blob_count.is_none() {
            self.reseed();
        }
        self.draw()
    }

    fn apply_config(&mut self, config: &LayerConfig, colors: &ColorCache) -> ConfigUpdate {
        let LayerConfig::Blob(config) = config else {
            return ConfigUpdate::Incompatible;
        };
        if *self.config == *config {
            return ConfigUpdate::Unchanged;
        }

        let previous = Arc::clone(&self.config);
        self.config = Arc::new(config.clone());
        self.pointer.set_decay(config.pointer_decay);
        self.background = resolve_background(config, colors);

        let palette = colors.palette(&config.colors);
        if palette != self.palette {
            self.palette = palette;
            if let Some(gradient) = self.gradient.as_mut() {
                paint_gradient(gradient, &self.palette);
            }
        }

        let reseed = previous.blob_count != config.blob_count
            || previous.min_size != config.min_size
            || previous.max_size != config.max_size
            || previous.orbit_min != config.orbit_min
            || previous.orbit_max != config.orbit_max;
        if reseed {
            self.reseed();
            ConfigUpdate::Reseeded
        } else {
            ConfigUpdate::Applied
        }
    }

    fn frame(&mut self, ctx: &FrameContext) -> TaskControl {
        self.time += ctx.dt;
        self.pointer.update(ctx.pointer);
        match self.draw() {
            Ok(()) => TaskControl::Continue,
            Err(_) => TaskControl::Finish,
        }
    }

    fn teardown(&mut self) {
        if let Some(mut visible) = self.visible.take() {
            visible.release();
        }
        self.mask = None;
        self.gradient = None;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::pointer::PointerInput;
    use std::collections::VecDeque;

    fn single_blob() -> BlobConfig {
        BlobConfig {
            colors: vec!["#ff0000".into(), "#0000ff".into()],
            blob_count: Some(1),
            min_size: 30.0,
            max_size: 30.0,
            orbit_min: 0.0,
            orbit_max: 0.0,
            wobble: 0.0,
            blur: 8,
            pointer_influence: 0.0,
            background: Some("#000000".into()),
            ..Default::default()
        }
    }

    fn step(layer: &mut BlobLayer) {
        let ctx = FrameContext {
            dt: 1.0 / 60.0,
            pointer: PointerInput::CENTER,
        };
        assert_eq!(layer.frame(&ctx), TaskControl::Continue);
    }

    /// Connected components of set mask pixels, with their centroids
    fn regions(mask: &Pixmap) -> Vec<(usize, f32, f32)> {
        let (w, h) = (mask.width() as usize, mask.height() as usize);
        let data = mask.data();
        let mut seen = vec![false; w * h];
        let mut found = Vec::new();

        for start in 0..w * h {
            if seen[start] || data[start * 4 + 3] == 0 {
                continue;
            }
            let (mut count, mut sx, mut sy) = (0usize, 0.0f32, 0.0f32);
            let mut queue = VecDeque::from([start]);
            seen[start] = true;
            while let Some(i) = queue.pop_front() {
                let (x, y) = (i % w, i / w);
                count += 1;
                sx += x as f32;
                sy += y as f32;
                let neighbors = [
                    (x > 0).then(|| i - 1),
                    (x + 1 < w).then(|| i + 1),
                    (y > 0).then(|| i - w),
                    (y + 1 < h).then(|| i + w),
                ];
                for n in neighbors.into_iter().flatten() {
                    if !seen[n] && data[n * 4 + 3] > 0 {
                        seen[n] = true;
                        queue.push_back(n);
                    }
                }
            }
            found.push((count, sx / count as f32, sy / count as f32));
        }
        found
    }

    #[test]
    fn test_remap_alpha_is_monotonic() {
        for threshold in [0u8, 1, 2, 100, 170, 255] {
            let mut previous = 0;
            for alpha in 0..=255u8 {
                let value = remap_alpha(alpha, threshold);
                assert!(value >= previous, "threshold {} alpha {}", threshold, alpha);
                previous = value;
            }
        }
    }

    #[test]
    fn test_remap_alpha_bands() {
        assert_eq!(remap_alpha(170, 170), 255);
        assert_eq!(remap_alpha(200, 170), 255);
        assert_eq!(remap_alpha(85, 170), 0);
        assert_eq!(remap_alpha(10, 170), 0);
        let mid = remap_alpha(128, 170);
        assert!(mid > 0 && mid < 255);
    }

    #[test]
    fn test_single_blob_forms_one_central_region() {
        let colors = ColorCache::new();
        let viewport = Viewport::new(200, 150);
        let mut layer = BlobLayer::with_seed(single_blob(), &colors, 3);
        layer.mount(viewport, &colors).unwrap();
        step(&mut layer);

        let found = regions(layer.mask.as_ref().unwrap());
        assert_eq!(found.len(), 1);
        let (count, cx, cy) = found[0];
        assert!(count > 0);
        assert!((cx - 100.0).abs() < 2.0, "cx {}", cx);
        assert!((cy - 75.0).abs() < 2.0, "cy {}", cy);

        // Center takes the gradient, corners stay background
        let visible = layer.visible.as_ref().unwrap();
        let gradient = layer.gradient.as_ref().unwrap();
        let center = (75 * 200 + 100) * 4;
        visible
            .read(|p| {
                assert_eq!(&p.data()[center..center + 4], &gradient.data()[center..center + 4]);
                assert_eq!(&p.data()[0..4], &[0, 0, 0, 255]);
            })
            .unwrap();
    }

    #[test]
    fn test_zero_blobs_render_background_only() {
        let colors = ColorCache::new();
        let viewport = Viewport::new(64, 48);
        let config = BlobConfig {
            blob_count: Some(0),
            background: Some("#102030".into()),
            ..single_blob()
        };
        let mut layer = BlobLayer::with_seed(config, &colors, 1);
        layer.mount(viewport, &colors).unwrap();
        step(&mut layer);

        assert!(layer.pool().is_empty());
        layer
            .visible
            .as_ref()
            .unwrap()
            .read(|p| {
                for px in p.data().chunks_exact(4) {
                    assert_eq!(px, &[0x10, 0x20, 0x30, 255]);
                }
            })
            .unwrap();
    }

    #[test]
    fn test_huge_blur_radius_renders() {
        let colors = ColorCache::new();
        let config = BlobConfig {
            blur: 3000,
            ..single_blob()
        };
        let mut layer = BlobLayer::with_seed(config, &colors, 2);
        layer.mount(Viewport::new(64, 48), &colors).unwrap();
        step(&mut layer);
        assert!(layer.output().is_some());
    }

    #[test]
    fn test_auto_pool_size() {
        let config = BlobConfig::default();
        assert_eq!(pool_size(&config, 1000), 12);
        assert_eq!(pool_size(&config, 10), 1);
        assert_eq!(pool_size(&config, 1_000_000), MAX_BLOBS);

        let degenerate = BlobConfig {
            min_size: 0.0,
            ..Default::default()
        };
        assert_eq!(pool_size(&degenerate, 100), 50);

        let explicit = BlobConfig {
            blob_count: Some(5000),
            ..Default::default()
        };
        assert_eq!(pool_size(&explicit, 100), MAX_BLOBS);
    }

    #[test]
    fn test_seeded_sizes_respect_bounds() {
        let mut rng = StdRng::seed_from_u64(11);
        let config = BlobConfig {
            min_size: 50.0,
            max_size: 20.0,
            ..Default::default()
        };
        for blob in seed_pool(&mut rng, &config, 32) {
            assert_eq!(blob.radius, 50.0);
            assert!((SPEED_MULTIPLIER.0..SPEED_MULTIPLIER.1).contains(&blob.speed));
        }
    }

    #[test]
    fn test_resize_matches_viewport() {
        let colors = ColorCache::new();
        let mut layer = BlobLayer::with_seed(BlobConfig::default(), &colors, 5);
        layer.mount(Viewport::new(320, 200), &colors).unwrap();
        let before = layer.pool().len();

        layer.resize(Viewport::new(640, 360), &colors).unwrap();
        assert_eq!(layer.surface_size(), Some((640, 360)));
        assert_eq!(layer.mask.as_ref().map(|m| (m.width(), m.height())), Some((640, 360)));
        assert_eq!(layer.pool().len(), pool_size(&BlobConfig::default(), 640));
        assert_ne!(layer.pool().len(), before);
    }

    #[test]
    fn test_config_update_kinds() {
        let colors = ColorCache::new();
        let mut layer = BlobLayer::with_seed(BlobConfig::default(), &colors, 9);
        layer.mount(Viewport::new(200, 200), &colors).unwrap();

        let same = LayerConfig::Blob(BlobConfig::default());
        assert_eq!(layer.apply_config(&same, &colors), ConfigUpdate::Unchanged);

        let recolored = LayerConfig::Blob(BlobConfig {
            threshold: 200,
            colors: vec!["#ffffff".into()],
            ..Default::default()
        });
        assert_eq!(layer.apply_config(&recolored, &colors), ConfigUpdate::Applied);

        let resized = LayerConfig::Blob(BlobConfig {
            blob_count: Some(3),
            ..Default::default()
        });
        assert_eq!(layer.apply_config(&resized, &colors), ConfigUpdate::Reseeded);
        assert_eq!(layer.pool().len(), 3);

        let wrong = LayerConfig::Wave(Default::default());
        assert_eq!(layer.apply_config(&wrong, &colors), ConfigUpdate::Incompatible);
    }

    #[test]
    fn test_background_defaults_to_darkened_first_color() {
        let colors = ColorCache::new();
        let config = BlobConfig {
            colors: vec!["#ff8000".into()],
            background: None,
            background_darken: 0.5,
            ..Default::default()
        };
        let background = resolve_background(&config, &colors);
        assert_eq!(background.to_u8(), colors.rgb(&darken("#ff8000", 0.5)).to_u8());
    }

    #[test]
    fn test_teardown_releases_surface() {
        let colors = ColorCache::new();
        let mut layer = BlobLayer::with_seed(BlobConfig::default(), &colors, 2);
        layer.mount(Viewport::new(50, 50), &colors).unwrap();
        let view = match layer.output() {
            Some(LayerOutput::Surface(frame)) => frame.source,
            other => panic!("unexpected output {:?}", other),
        };

        layer.teardown();
        layer.teardown();
        assert!(layer.output().is_none());
        assert!(view.size().is_none());
    }
}
