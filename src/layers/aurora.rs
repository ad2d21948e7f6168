//! Aurora particle line field
//!
//! A pool of vertical streaks, each living for its own TTL and fading in
//! and out over that lifetime. Streaks are drawn into a transient surface
//! that is blurred and added onto a persistent visible surface. The visible
//! surface is only partially cleared each frame (an overdraw with the
//! background at `fade` alpha), which leaves soft trails behind.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tiny_skia::{
    BlendMode, Color, GradientStop, LinearGradient, Paint, Pixmap, PixmapPaint, Point, Rect,
    SpreadMode, Transform,
};
use tracing::debug;

use super::glass::GlassUniforms;
use super::{next_layer_id, sample, span};
use crate::config::{AuroraConfig, LayerConfig};
use crate::engine::blur::{BlurScratch, box_blur};
use crate::engine::color::{ColorCache, Hsl, Rgb, hsl_to_rgb};
use crate::engine::pointer::PointerSmoother;
use crate::engine::scheduler::{ConfigUpdate, FrameContext, RenderTask, TaskControl};
use crate::engine::surface::{RenderSurface, SurfaceError, Viewport, allocate_pixmap};
use crate::render::{LayerOutput, SurfaceFrame};

/// Streaks per `min_width` of viewport when the count is derived
pub const DENSITY: f32 = 5.0;
pub const MAX_STREAKS: usize = 4096;
/// Shortest lifetime a streak may get, keeps the fade curve defined
pub const MIN_TTL: f32 = 0.05;
/// Blur passes approximating a Gaussian
pub const BLUR_PASSES: usize = 3;

/// One vertical streak
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Streak {
    /// Horizontal center in device pixels
    pub x: f32,
    /// Top edge in device pixels
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Hue in degrees
    pub hue: f32,
    /// Lifetime in seconds
    pub ttl: f32,
    /// Elapsed life in seconds, always within `[0, ttl]`
    pub life: f32,
}

impl Streak {
    /// Triangular fade: 0 at birth, 1 at mid-life, 0 at death
    pub fn opacity(&self) -> f32 {
        if self.ttl <= 0.0 {
            return 0.0;
        }
        (1.0 - (2.0 * self.life / self.ttl - 1.0).abs()).clamp(0.0, 1.0)
    }
}

/// Sampling ranges resolved from a config
#[derive(Debug, Clone)]
struct SpawnRanges {
    width: (f32, f32),
    height: (f32, f32),
    ttl: (f32, f32),
    hue: (f32, f32),
    /// Hues of the palette colors; empty means use `hue`
    hues: Vec<f32>,
}

impl SpawnRanges {
    fn new(config: &AuroraConfig, colors: &ColorCache) -> Self {
        let (min_ttl, max_ttl) = span(config.min_ttl, config.max_ttl);
        Self {
            width: span(config.min_width.max(0.0), config.max_width),
            height: span(config.min_height.max(0.0), config.max_height),
            ttl: (min_ttl.max(MIN_TTL), max_ttl.max(MIN_TTL)),
            hue: span(config.hue_min, config.hue_max),
            hues: config.palette.iter().map(|hex| colors.hsl(hex).h).collect(),
        }
    }

    fn pick_hue(&self, rng: &mut impl Rng) -> f32 {
        if self.hues.is_empty() {
            sample(rng, self.hue)
        } else {
            self.hues[rng.random_range(0..self.hues.len())]
        }
    }

    fn spawn(&self, rng: &mut impl Rng, (width, height): (f32, f32)) -> Streak {
        Streak {
            x: sample(rng, (0.0, width)),
            y: sample(rng, (0.0, height)),
            width: sample(rng, self.width),
            height: sample(rng, self.height) * height,
            hue: self.pick_hue(rng),
            ttl: sample(rng, self.ttl),
            life: 0.0,
        }
    }

    /// Replace `streak` in place with a fresh one at life 0
    fn respawn(&self, rng: &mut impl Rng, streak: &mut Streak, size: (f32, f32)) {
        *streak = self.spawn(rng, size);
    }
}

/// Number of streaks for a viewport width
pub fn pool_size(config: &AuroraConfig, width: u32) -> usize {
    match config.line_count {
        Some(count) => (count as usize).min(MAX_STREAKS),
        None => {
            let min_width = if config.min_width.is_finite() && config.min_width > 0.0 {
                config.min_width
            } else {
                1.0
            };
            ((width as f32 / min_width * DENSITY).floor() as usize).min(MAX_STREAKS)
        }
    }
}

/// Age every streak by `dt`, respawning those whose life would pass TTL
fn advance(pool: &mut [Streak], dt: f32, ranges: &SpawnRanges, rng: &mut impl Rng, size: (f32, f32)) {
    let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
    for streak in pool.iter_mut() {
        if streak.life + dt > streak.ttl {
            ranges.respawn(rng, streak, size);
        } else {
            streak.life += dt;
        }
    }
}

fn draw_streak(pixmap: &mut Pixmap, streak: &Streak, color: Rgb, alpha: f32, shift: f32) {
    if alpha <= 0.0 || streak.width <= 0.0 || streak.height <= 0.0 {
        return;
    }
    let left = streak.x + shift - streak.width * 0.5;
    let Some(rect) = Rect::from_xywh(left, streak.y, streak.width, streak.height) else {
        return;
    };

    let stops = vec![
        GradientStop::new(0.0, color.to_skia(0.0)),
        GradientStop::new(0.5, color.to_skia(alpha)),
        GradientStop::new(1.0, color.to_skia(0.0)),
    ];
    let Some(shader) = LinearGradient::new(
        Point::from_xy(streak.x, streak.y),
        Point::from_xy(streak.x, streak.y + streak.height),
        stops,
        SpreadMode::Pad,
        Transform::identity(),
    ) else {
        return;
    };

    let mut paint = Paint::default();
    paint.shader = shader;
    pixmap.fill_rect(rect, &paint, Transform::identity(), None);
}

fn fill(pixmap: &mut Pixmap, color: Rgb, alpha: f32) {
    let mut paint = Paint::default();
    paint.set_color(color.to_skia(alpha));
    paint.anti_alias = false;
    if let Some(rect) = Rect::from_xywh(0.0, 0.0, pixmap.width() as f32, pixmap.height() as f32) {
        pixmap.fill_rect(rect, &paint, Transform::identity(), None);
    }
}

/// Aurora layer state
#[derive(Debug)]
pub struct AuroraLayer {
    id: u64,
    config: Arc<AuroraConfig>,
    ranges: SpawnRanges,
    background: Rgb,
    rng: StdRng,
    pool: Vec<Streak>,
    pointer: PointerSmoother,
    viewport: Viewport,
    time: f32,
    draw: Option<Pixmap>,
    visible: Option<RenderSurface>,
    scratch: BlurScratch,
}

impl AuroraLayer {
    pub fn new(config: AuroraConfig, colors: &ColorCache) -> Self {
        Self::with_rng(config, colors, StdRng::from_os_rng())
    }

    #[cfg(test)]
    pub fn with_seed(config: AuroraConfig, colors: &ColorCache, seed: u64) -> Self {
        Self::with_rng(config, colors, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: AuroraConfig, colors: &ColorCache, rng: StdRng) -> Self {
        Self {
            id: next_layer_id(),
            ranges: SpawnRanges::new(&config, colors),
            background: colors.rgb(&config.background),
            pointer: PointerSmoother::new(config.pointer_decay),
            config: Arc::new(config),
            rng,
            pool: Vec::new(),
            viewport: Viewport::new(0, 0),
            time: 0.0,
            draw: None,
            visible: None,
            scratch: BlurScratch::default(),
        }
    }

    #[cfg(test)]
    pub fn pool(&self) -> &[Streak] {
        &self.pool
    }

    #[cfg(test)]
    pub fn surface_size(&self) -> Option<(u32, u32)> {
        self.visible.as_ref().and_then(|s| s.size())
    }

    fn size(&self) -> (f32, f32) {
        (self.viewport.width as f32, self.viewport.height as f32)
    }

    /// Fill the pool with streaks at random points of their lives
    fn reseed(&mut self) {
        let count = pool_size(&self.config, self.viewport.width);
        let size = self.size();
        self.pool = (0..count)
            .map(|_| {
                let mut streak = self.ranges.spawn(&mut self.rng, size);
                streak.life = sample(&mut self.rng, (0.0, streak.ttl));
                streak
            })
            .collect();
        debug!("Seeded {} aurora streaks", count);
    }

    fn render(&mut self) -> Result<(), SurfaceError> {
        let (Some(draw), Some(visible)) = (self.draw.as_mut(), self.visible.as_mut()) else {
            return Err(SurfaceError::Released);
        };
        let config = &*self.config;

        draw.fill(Color::TRANSPARENT);
        let shift = (self.pointer.current().x - 0.5) * draw.width() as f32 * config.pointer_influence;
        for streak in &self.pool {
            let color = hsl_to_rgb(Hsl {
                h: streak.hue,
                s: config.saturation,
                l: config.lightness,
            });
            let alpha = streak.opacity() * config.opacity.clamp(0.0, 1.0);
            draw_streak(draw, streak, color, alpha, shift);
        }

        let (w, h) = (draw.width() as usize, draw.height() as usize);
        box_blur(draw.data_mut(), w, h, config.blur as usize, BLUR_PASSES, &mut self.scratch);

        let background = self.background;
        let fade = config.fade.clamp(0.0, 1.0);
        let draw = &*draw;
        visible.write(|out| {
            fill(out, background, fade);
            out.draw_pixmap(
                0,
                0,
                draw.as_ref(),
                &PixmapPaint {
                    blend_mode: BlendMode::Plus,
                    ..Default::default()
                },
                Transform::identity(),
                None,
            );
        })
    }
}

impl RenderTask for AuroraLayer {
    fn kind(&self) -> &'static str {
        "aurora"
    }

    fn mount(&mut self, viewport: Viewport, _colors: &ColorCache) -> Result<(), SurfaceError> {
        self.viewport = viewport;
        self.time = 0.0;
        let mut visible = RenderSurface::new(viewport)?;
        let background = self.background;
        visible.write(|p| fill(p, background, 1.0))?;
        self.visible = Some(visible);
        self.draw = Some(allocate_pixmap(viewport)?);
        self.reseed();
        Ok(())
    }

    fn resize(&mut self, viewport: Viewport, _colors: &ColorCache) -> Result<(), SurfaceError> {
        self.viewport = viewport;
        match self.visible.as_mut() {
            Some(visible) => visible.resize(viewport)?,
            None => self.visible = Some(RenderSurface::new(viewport)?),
        }
        self.draw = Some(allocate_pixmap(viewport)?);
        if self.config.line_count.is_none() {
            self.reseed();
        }
        Ok(())
    }

    fn apply_config(&mut self, config: &LayerConfig, colors: &ColorCache) -> ConfigUpdate {
        let LayerConfig::Aurora(config) = config else {
            return ConfigUpdate::Incompatible;
        };
        if *self.config == *config {
            return ConfigUpdate::Unchanged;
        }

        let previous = Arc::clone(&self.config);
        self.config = Arc::new(config.clone());
        self.ranges = SpawnRanges::new(config, colors);
        self.background = colors.rgb(&config.background);
        self.pointer.set_decay(config.pointer_decay);

        let reseed = previous.line_count != config.line_count
            || previous.min_width != config.min_width
            || previous.max_width != config.max_width
            || previous.min_height != config.min_height
            || previous.max_height != config.max_height
            || previous.min_ttl != config.min_ttl
            || previous.max_ttl != config.max_ttl;
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
        let size = self.size();
        advance(&mut self.pool, ctx.dt, &self.ranges, &mut self.rng, size);
        match self.render() {
            Ok(()) => TaskControl::Continue,
            Err(_) => TaskControl::Finish,
        }
    }

    fn teardown(&mut self) {
        if let Some(mut visible) = self.visible.take() {
            visible.release();
        }
        self.draw = None;
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

    fn step(layer: &mut AuroraLayer, dt: f32) {
        let ctx = FrameContext {
            dt,
            pointer: PointerInput::CENTER,
        };
        assert_eq!(layer.frame(&ctx), TaskControl::Continue);
    }

    #[test]
    fn test_auto_count_from_width() {
        let config = AuroraConfig {
            line_count: None,
            min_width: 10.0,
            ..Default::default()
        };
        assert_eq!(pool_size(&config, 1000), 500);

        let colors = ColorCache::new();
        let mut layer = AuroraLayer::with_seed(config, &colors, 1);
        layer.mount(Viewport::new(1000, 40), &colors).unwrap();
        assert_eq!(layer.pool().len(), 500);
    }

    #[test]
    fn test_ttl_invariant_holds_every_step() {
        let colors = ColorCache::new();
        let config = AuroraConfig {
            line_count: Some(200),
            min_ttl: 0.2,
            max_ttl: 1.0,
            ..Default::default()
        };
        let ranges = SpawnRanges::new(&config, &colors);
        let mut rng = StdRng::seed_from_u64(42);
        let size = (300.0, 200.0);
        let mut pool: Vec<Streak> = (0..200).map(|_| ranges.spawn(&mut rng, size)).collect();

        for _ in 0..1000 {
            let dt = rng.random_range(0.0..0.5);
            advance(&mut pool, dt, &ranges, &mut rng, size);
            for streak in &pool {
                assert!(streak.life >= 0.0);
                assert!(streak.life <= streak.ttl, "{:?}", streak);
            }
        }
    }

    #[test]
    fn test_respawn_resets_life() {
        let colors = ColorCache::new();
        let ranges = SpawnRanges::new(&AuroraConfig::default(), &colors);
        let mut rng = StdRng::seed_from_u64(3);
        let mut pool = vec![Streak {
            x: 1.0,
            y: 1.0,
            width: 5.0,
            height: 5.0,
            hue: 10.0,
            ttl: 1.0,
            life: 0.9,
        }];
        advance(&mut pool, 0.5, &ranges, &mut rng, (100.0, 100.0));
        assert_eq!(pool[0].life, 0.0);
        assert!(pool[0].ttl >= ranges.ttl.0);
    }

    #[test]
    fn test_min_above_max_is_raised() {
        let colors = ColorCache::new();
        let config = AuroraConfig {
            min_width: 30.0,
            max_width: 10.0,
            min_ttl: 4.0,
            max_ttl: 1.0,
            ..Default::default()
        };
        let ranges = SpawnRanges::new(&config, &colors);
        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..50 {
            let streak = ranges.spawn(&mut rng, (500.0, 500.0));
            assert_eq!(streak.width, 30.0);
            assert_eq!(streak.ttl, 4.0);
        }
    }

    #[test]
    fn test_hues_come_from_palette() {
        let colors = ColorCache::new();
        let config = AuroraConfig {
            palette: vec!["#ff0000".into(), "#00ff00".into()],
            ..Default::default()
        };
        let ranges = SpawnRanges::new(&config, &colors);
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..50 {
            let hue = ranges.spawn(&mut rng, (10.0, 10.0)).hue;
            assert!(hue.abs() < 1e-3 || (hue - 120.0).abs() < 1e-3, "hue {}", hue);
        }
    }

    #[test]
    fn test_hues_fall_in_range_without_palette() {
        let colors = ColorCache::new();
        let ranges = SpawnRanges::new(&AuroraConfig::default(), &colors);
        let mut rng = StdRng::seed_from_u64(6);
        for _ in 0..100 {
            let hue = ranges.spawn(&mut rng, (10.0, 10.0)).hue;
            assert!((120.0..200.0).contains(&hue));
        }
    }

    #[test]
    fn test_opacity_is_triangular() {
        let mut streak = Streak {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
            hue: 0.0,
            ttl: 2.0,
            life: 0.0,
        };
        assert_eq!(streak.opacity(), 0.0);
        streak.life = 1.0;
        assert_eq!(streak.opacity(), 1.0);
        streak.life = 1.5;
        assert!((streak.opacity() - 0.5).abs() < 1e-6);
        streak.life = 2.0;
        assert_eq!(streak.opacity(), 0.0);
    }

    #[test]
    fn test_zero_streaks_keep_background() {
        let colors = ColorCache::new();
        let config = AuroraConfig {
            line_count: Some(0),
            background: "#203040".into(),
            ..Default::default()
        };
        let mut layer = AuroraLayer::with_seed(config, &colors, 4);
        layer.mount(Viewport::new(32, 32), &colors).unwrap();
        for _ in 0..5 {
            step(&mut layer, 0.1);
        }
        layer
            .visible
            .as_ref()
            .unwrap()
            .read(|p| {
                for px in p.data().chunks_exact(4) {
                    for (got, want) in px.iter().zip([0x20u8, 0x30, 0x40, 255]) {
                        assert!(got.abs_diff(want) <= 1, "{:?}", px);
                    }
                }
            })
            .unwrap();
    }

    #[test]
    fn test_streaks_brighten_visible_surface() {
        let colors = ColorCache::new();
        let config = AuroraConfig {
            line_count: Some(40),
            min_width: 20.0,
            max_width: 20.0,
            min_height: 1.0,
            max_height: 1.0,
            opacity: 1.0,
            background: "#000000".into(),
            ..Default::default()
        };
        let mut layer = AuroraLayer::with_seed(config, &colors, 12);
        layer.mount(Viewport::new(100, 100), &colors).unwrap();
        step(&mut layer, 0.1);

        let lit = layer
            .visible
            .as_ref()
            .unwrap()
            .read(|p| p.data().chunks_exact(4).any(|px| px[0] > 0 || px[1] > 0 || px[2] > 0))
            .unwrap();
        assert!(lit);
    }

    #[test]
    fn test_resize_copies_visible_and_clears_draw() {
        let colors = ColorCache::new();
        let config = AuroraConfig {
            background: "#405060".into(),
            ..Default::default()
        };
        let mut layer = AuroraLayer::with_seed(config, &colors, 7);
        layer.mount(Viewport::new(40, 30), &colors).unwrap();

        layer.resize(Viewport::new(80, 60), &colors).unwrap();
        assert_eq!(layer.surface_size(), Some((80, 60)));
        assert_eq!(layer.pool().len(), pool_size(&layer.config, 80));

        let draw = layer.draw.as_ref().unwrap();
        assert_eq!((draw.width(), draw.height()), (80, 60));
        assert!(draw.data().iter().all(|&b| b == 0));

        let (inside, outside) = layer
            .visible
            .as_ref()
            .unwrap()
            .read(|p| {
                let at = |x: usize, y: usize| {
                    let i = (y * 80 + x) * 4;
                    [p.data()[i], p.data()[i + 1], p.data()[i + 2], p.data()[i + 3]]
                };
                (at(5, 5), at(70, 50))
            })
            .unwrap();
        assert_eq!(inside, [0x40, 0x50, 0x60, 255]);
        assert_eq!(outside, [0, 0, 0, 0]);
    }
}
