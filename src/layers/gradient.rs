//! Procedural gradient layer
//!
//! GPU-resident multi-stop gradient (linear, radial or conic) warped by two
//! fbm noise fields and by the smoothed pointer. Config-derived uniforms
//! ([`GradientParams`]) carry a revision and are only re-uploaded when the
//! config snapshot changes; [`FrameUniforms`] change every frame.
//!
//! The test-only `cpu` module evaluates the same per-pixel function on the CPU.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};

use super::glass::GlassUniforms;
use super::next_layer_id;
use crate::config::{GlassConfig, GradientConfig, LayerConfig};
use crate::engine::color::{ColorCache, Rgb};
use crate::engine::pointer::PointerSmoother;
use crate::engine::scheduler::{ConfigUpdate, FrameContext, RenderTask, TaskControl};
use crate::engine::surface::{SurfaceError, Viewport};
use crate::render::{GradientFrame, LayerOutput};

pub const MAX_COLORS: usize = 8;

/// Config-derived uniforms
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct GradientParams {
    /// Stop colors, RGB in `[0, 1]`
    pub colors: [[f32; 4]; MAX_COLORS],
    /// Stop positions in `[0, 1]`, packed four per vector
    pub stops: [[f32; 4]; 2],
    pub start: [f32; 2],
    pub end: [f32; 2],
    /// Velocity of the first noise field (speed × direction)
    pub wave1: [f32; 2],
    pub wave2: [f32; 2],
    pub color_count: u32,
    pub kind: u32,
    pub wave_intensity: f32,
    pub pointer_influence: f32,
    pub vignette: f32,
    /// 1.0 when a refraction pass follows, which disables the vignette
    pub glass_active: f32,
    pub _padding: [f32; 2],
}

impl GradientParams {
    pub fn from_config(config: &GradientConfig, colors: &ColorCache) -> Self {
        let mut params = Self::zeroed();

        let palette: Vec<Rgb> = config
            .colors
            .iter()
            .take(MAX_COLORS)
            .map(|hex| colors.rgb(hex))
            .collect();
        let count = palette.len();
        params.color_count = count as u32;

        for (i, color) in palette.iter().enumerate() {
            params.colors[i] = color.to_unit_rgba(1.0);

            let stop = match config.stops.get(i) {
                Some(s) if s.is_finite() => s / 100.0,
                _ if count > 1 => i as f32 / (count - 1) as f32,
                _ => 0.0,
            };
            params.stops[i / 4][i % 4] = stop.clamp(0.0, 1.0);
        }

        params.start = percent_point(config.start);
        params.end = percent_point(config.end);
        params.wave1 = velocity(config.wave1_speed, config.wave1_direction);
        params.wave2 = velocity(config.wave2_speed, config.wave2_direction);
        params.kind = config.gradient_type.as_uniform();
        params.wave_intensity = finite(config.wave_intensity).max(0.0);
        params.pointer_influence = finite(config.pointer_influence);
        params.vignette = finite(config.vignette).clamp(0.0, 1.0);
        params.glass_active = if config.glass.is_some() { 1.0 } else { 0.0 };
        params
    }
}

fn finite(v: f32) -> f32 {
    if v.is_finite() { v } else { 0.0 }
}

fn percent_point(p: [f32; 2]) -> [f32; 2] {
    [finite(p[0]) / 100.0, finite(p[1]) / 100.0]
}

fn velocity(speed: f32, direction_deg: f32) -> [f32; 2] {
    let (s, c) = finite(direction_deg).to_radians().sin_cos();
    let speed = finite(speed);
    [c * speed, s * speed]
}

/// Per-frame uniforms
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct FrameUniforms {
    /// Surface size in device pixels
    pub resolution: [f32; 2],
    /// Smoothed pointer in `[0, 1]²`
    pub pointer: [f32; 2],
    pub time: f32,
    /// Set by the pipeline when the target stores sRGB-encoded values
    pub output_linear: f32,
    pub _padding: [f32; 2],
}

/// WGSL gradient shader; `NOISE_WGSL` is appended at pipeline creation
pub const GRADIENT_SHADER: &str = r#"
struct Params {
    colors: array<vec4f, 8>,
    stops: array<vec4f, 2>,
    start: vec2f,
    end: vec2f,
    wave1: vec2f,
    wave2: vec2f,
    color_count: u32,
    kind: u32,
    wave_intensity: f32,
    pointer_influence: f32,
    vignette: f32,
    glass_active: f32,
    _padding: vec2f,
}

struct Frame {
    resolution: vec2f,
    pointer: vec2f,
    time: f32,
    output_linear: f32,
    _padding: vec2f,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<uniform> frame: Frame;

struct VertexOut {
    @builtin(position) position: vec4f,
    @location(0) uv: vec2f,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOut {
    let corner = vec2f(
        f32((vertex_index << 1u) & 2u),
        f32(vertex_index & 2u)
    );
    let position = vec4f(corner * 2.0 - 1.0, 0.0, 1.0);
    return VertexOut(position, vec2f(corner.x, 1.0 - corner.y));
}

const TAU: f32 = 6.28318530718;
const POINTER_FALLOFF: f32 = 4.0;
const POINTER_STRENGTH: f32 = 0.15;
const WAVE_SCALE: f32 = 2.0;
const WARP_AMOUNT: f32 = 0.25;
const LIVELINESS_SCALE: f32 = 3.0;
const LIVELINESS: f32 = 0.05;
const SHIMMER_SCALE: f32 = 40.0;
const SHIMMER: f32 = 0.02;
const VIGNETTE_INNER: f32 = 0.5;
const VIGNETTE_OUTER: f32 = 0.75;
const STOP_EPSILON: f32 = 0.00001;

fn stop_at(i: u32) -> f32 {
    return params.stops[i / 4u][i % 4u];
}

fn project(q: vec2f) -> f32 {
    let dir = params.end - params.start;
    let mid = (params.start + params.end) * 0.5;
    var t = 0.0;
    if (params.kind == 1u) {
        let half = length(dir) * 0.5;
        t = distance(q, mid) / max(half, STOP_EPSILON);
    } else if (params.kind == 2u) {
        let d = q - mid;
        t = atan2(d.y, d.x) / TAU + 0.5;
    } else {
        let len2 = dot(dir, dir);
        if (len2 > STOP_EPSILON) {
            t = dot(q - params.start, dir) / len2;
        }
    }
    return clamp(t, 0.0, 1.0);
}

fn ramp(t: f32) -> vec3f {
    let count = params.color_count;
    if (count == 0u) {
        return vec3f(1.0);
    }
    if (count == 1u || t <= stop_at(0u)) {
        return params.colors[0].rgb;
    }
    for (var i = 0u; i + 1u < count; i = i + 1u) {
        let lo = stop_at(i);
        let hi = stop_at(i + 1u);
        if (t <= hi) {
            let span = hi - lo;
            var f = 1.0;
            if (span > STOP_EPSILON) {
                f = smoothstep(0.0, 1.0, (t - lo) / span);
            }
            return mix(params.colors[i].rgb, params.colors[i + 1u].rgb, f);
        }
    }
    return params.colors[count - 1u].rgb;
}

fn srgb_to_linear(c: vec3f) -> vec3f {
    let low = c / 12.92;
    let high = pow((c + 0.055) / 1.055, vec3f(2.4));
    return select(high, low, c <= vec3f(0.04045));
}

@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4f {
    let uv = in.uv;
    var aspect = 1.0;
    if (frame.resolution.y > 0.0) {
        aspect = frame.resolution.x / frame.resolution.y;
    }

    let pa = vec2f(uv.x * aspect, uv.y);
    let ma = vec2f(frame.pointer.x * aspect, frame.pointer.y);

    let to_pixel = pa - ma;
    let push = exp(-length(to_pixel) * POINTER_FALLOFF) * params.pointer_influence * POINTER_STRENGTH;
    let pointer_warp = vec2f(to_pixel.x / aspect, to_pixel.y) * push;

    let n1 = fbm(pa * WAVE_SCALE + params.wave1 * frame.time);
    let n2 = fbm(pa * WAVE_SCALE + params.wave2 * frame.time + vec2f(5.2, 1.3));
    let wave_warp = (vec2f(n1, n2) - 0.5) * params.wave_intensity * WARP_AMOUNT;

    let q = uv + wave_warp + pointer_warp;

    let jitter = (fbm(vec2f(q.x * LIVELINESS_SCALE + frame.time * 0.05, q.y * LIVELINESS_SCALE)) - 0.5)
        * LIVELINESS * params.wave_intensity;
    let t = clamp(project(q) + jitter, 0.0, 1.0);

    var color = ramp(t);
    let shimmer = (value_noise(vec2f(q.x * SHIMMER_SCALE + frame.time, q.y * SHIMMER_SCALE)) - 0.5)
        * SHIMMER * min(params.wave_intensity, 1.0);
    color = color + vec3f(shimmer);

    if (params.glass_active < 0.5) {
        let d = distance(uv, vec2f(0.5));
        color = color * (1.0 - params.vignette * smoothstep(VIGNETTE_INNER, VIGNETTE_OUTER, d));
    }

    color = clamp(color, vec3f(0.0), vec3f(1.0));
    if (frame.output_linear > 0.5) {
        color = srgb_to_linear(color);
    }
    return vec4f(color, 1.0);
}
"#;

/// Gradient layer simulation state
#[derive(Debug)]
pub struct GradientLayer {
    id: u64,
    config: Arc<GradientConfig>,
    params: GradientParams,
    revision: u64,
    pointer: PointerSmoother,
    viewport: Viewport,
    time: f32,
    mounted: bool,
}

impl GradientLayer {
    pub fn new(config: GradientConfig, colors: &ColorCache) -> Self {
        let params = GradientParams::from_config(&config, colors);
        Self {
            id: next_layer_id(),
            pointer: PointerSmoother::new(config.pointer_decay),
            config: Arc::new(config),
            params,
            revision: 1,
            viewport: Viewport::new(0, 0),
            time: 0.0,
            mounted: false,
        }
    }

    pub fn params(&self) -> &GradientParams {
        &self.params
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[cfg(test)]
    pub fn surface_size(&self) -> (u32, u32) {
        (self.viewport.width, self.viewport.height)
    }

    pub fn frame_uniforms(&self) -> FrameUniforms {
        let pointer = self.pointer.current();
        FrameUniforms {
            resolution: [self.viewport.width as f32, self.viewport.height as f32],
            pointer: [pointer.x, pointer.y],
            time: self.time,
            output_linear: 0.0,
            _padding: [0.0; 2],
        }
    }

    fn glass(&self) -> Option<&GlassConfig> {
        self.config.glass.as_ref()
    }
}

impl RenderTask for GradientLayer {
    fn kind(&self) -> &'static str {
        "gradient"
    }

    fn mount(&mut self, viewport: Viewport, _colors: &ColorCache) -> Result<(), SurfaceError> {
        self.viewport = viewport;
        self.time = 0.0;
        self.mounted = true;
        Ok(())
    }

    fn resize(&mut self, viewport: Viewport, _colors: &ColorCache) -> Result<(), SurfaceError> {
        self.viewport = viewport;
        Ok(())
    }

    fn apply_config(&mut self, config: &LayerConfig, colors: &ColorCache) -> ConfigUpdate {
        let LayerConfig::Gradient(config) = config else {
            return ConfigUpdate::Incompatible;
        };
        if *self.config == *config {
            return ConfigUpdate::Unchanged;
        }

        self.pointer.set_decay(config.pointer_decay);
        self.params = GradientParams::from_config(config, colors);
        self.revision += 1;
        self.config = Arc::new(config.clone());
        ConfigUpdate::Applied
    }

    fn frame(&mut self, ctx: &FrameContext) -> TaskControl {
        self.time += ctx.dt;
        self.pointer.update(ctx.pointer);
        TaskControl::Continue
    }

    fn teardown(&mut self) {
        self.mounted = false;
    }

    fn output(&self) -> Option<LayerOutput> {
        if !self.mounted {
            return None;
        }
        Some(LayerOutput::Gradient(GradientFrame {
            layer_id: self.id,
            revision: self.revision,
            params: self.params,
            frame: self.frame_uniforms(),
            glass: self.glass().map(|g| GlassUniforms::from_config(g, self.time)),
        }))
    }
}

#[cfg(test)]
mod cpu {
    use std::f32::consts::TAU;

    use super::{FrameUniforms, GradientParams};
    use crate::engine::noise;

    /// Exponential falloff rate of the pointer distortion
    pub const POINTER_FALLOFF: f32 = 4.0;
    /// Peak UV displacement caused by the pointer at full influence
    pub const POINTER_STRENGTH: f32 = 0.15;
    /// Spatial frequency of the wave noise fields
    pub const WAVE_SCALE: f32 = 2.0;
    /// UV displacement of the wave warp at intensity 1
    pub const WARP_AMOUNT: f32 = 0.25;
    /// Spatial frequency and amplitude of the gradient position jitter
    pub const LIVELINESS_SCALE: f32 = 3.0;
    pub const LIVELINESS: f32 = 0.05;
    /// Spatial frequency and amplitude of the color shimmer
    pub const SHIMMER_SCALE: f32 = 40.0;
    pub const SHIMMER: f32 = 0.02;
    /// Vignette falloff starts and ends at these UV distances from center
    pub const VIGNETTE_INNER: f32 = 0.5;
    pub const VIGNETTE_OUTER: f32 = 0.75;

    const STOP_EPSILON: f32 = 1e-5;

    impl GradientParams {
        fn stop(&self, i: usize) -> f32 {
            self.stops[i / 4][i % 4]
        }

        fn color(&self, i: usize) -> [f32; 3] {
            let c = self.colors[i];
            [c[0], c[1], c[2]]
        }
    }

    pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
        let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
        t * t * (3.0 - 2.0 * t)
    }

    pub fn mix3(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
        [
            a[0] + (b[0] - a[0]) * t,
            a[1] + (b[1] - a[1]) * t,
            a[2] + (b[2] - a[2]) * t,
        ]
    }

    /// CPU evaluation of the gradient shader
    #[derive(Debug, Clone, Copy)]
    pub struct GradientField<'a> {
        params: &'a GradientParams,
    }

    impl<'a> GradientField<'a> {
        pub fn new(params: &'a GradientParams) -> Self {
            Self { params }
        }

        /// Scalar position along the gradient for a (warped) UV, in `[0, 1]`
        pub fn project(&self, q: [f32; 2]) -> f32 {
            let p = self.params;
            let dir = [p.end[0] - p.start[0], p.end[1] - p.start[1]];
            let mid = [
                (p.start[0] + p.end[0]) * 0.5,
                (p.start[1] + p.end[1]) * 0.5,
            ];

            let t = match p.kind {
                1 => {
                    let half = (dir[0] * dir[0] + dir[1] * dir[1]).sqrt() * 0.5;
                    let d = ((q[0] - mid[0]).powi(2) + (q[1] - mid[1]).powi(2)).sqrt();
                    d / half.max(STOP_EPSILON)
                }
                2 => (q[1] - mid[1]).atan2(q[0] - mid[0]) / TAU + 0.5,
                _ => {
                    let len2 = dir[0] * dir[0] + dir[1] * dir[1];
                    if len2 <= STOP_EPSILON {
                        0.0
                    } else {
                        ((q[0] - p.start[0]) * dir[0] + (q[1] - p.start[1]) * dir[1]) / len2
                    }
                }
            };
            t.clamp(0.0, 1.0)
        }

        /// Stepped interpolation across stop intervals with smoothed transitions
        pub fn ramp(&self, t: f32) -> [f32; 3] {
            let p = self.params;
            let count = p.color_count as usize;
            if count == 0 {
                return [1.0, 1.0, 1.0];
            }
            if count == 1 || t <= p.stop(0) {
                return p.color(0);
            }

            for i in 0..count - 1 {
                let (lo, hi) = (p.stop(i), p.stop(i + 1));
                if t <= hi {
                    let span = hi - lo;
                    let f = if span > STOP_EPSILON {
                        smoothstep(0.0, 1.0, (t - lo) / span)
                    } else {
                        1.0
                    };
                    return mix3(p.color(i), p.color(i + 1), f);
                }
            }
            p.color(count - 1)
        }

        /// Color at `uv` (origin top-left) before sRGB linearization
        pub fn shade(&self, uv: [f32; 2], frame: &FrameUniforms) -> [f32; 3] {
            let p = self.params;
            let aspect = if frame.resolution[1] > 0.0 {
                frame.resolution[0] / frame.resolution[1]
            } else {
                1.0
            };
            let time = frame.time;

            // 1. aspect-corrected coordinates
            let pa = [uv[0] * aspect, uv[1]];
            let ma = [frame.pointer[0] * aspect, frame.pointer[1]];

            // 2. pointer push
            let to_pixel = [pa[0] - ma[0], pa[1] - ma[1]];
            let dist = (to_pixel[0] * to_pixel[0] + to_pixel[1] * to_pixel[1]).sqrt();
            let push = (-dist * POINTER_FALLOFF).exp() * p.pointer_influence * POINTER_STRENGTH;
            let pointer_warp = [to_pixel[0] / aspect * push, to_pixel[1] * push];

            // 3. two fbm fields
            let n1 = noise::fbm(
                pa[0] * WAVE_SCALE + p.wave1[0] * time,
                pa[1] * WAVE_SCALE + p.wave1[1] * time,
            );
            let n2 = noise::fbm(
                pa[0] * WAVE_SCALE + p.wave2[0] * time + 5.2,
                pa[1] * WAVE_SCALE + p.wave2[1] * time + 1.3,
            );
            let amount = p.wave_intensity * WARP_AMOUNT;
            let wave_warp = [(n1 - 0.5) * amount, (n2 - 0.5) * amount];

            // 4. warped coordinates
            let q = [
                uv[0] + wave_warp[0] + pointer_warp[0],
                uv[1] + wave_warp[1] + pointer_warp[1],
            ];

            // 5-6. project and jitter
            let t = self.project(q);
            let jitter = (noise::fbm(
                q[0] * LIVELINESS_SCALE + time * 0.05,
                q[1] * LIVELINESS_SCALE,
            ) - 0.5)
                * LIVELINESS
                * p.wave_intensity;
            let t = (t + jitter).clamp(0.0, 1.0);

            // 7-8. color plus shimmer
            let mut color = self.ramp(t);
            let shimmer = (noise::value_noise(q[0] * SHIMMER_SCALE + time, q[1] * SHIMMER_SCALE)
                - 0.5)
                * SHIMMER
                * p.wave_intensity.min(1.0);
            for c in &mut color {
                *c += shimmer;
            }

            // 9. vignette
            if p.glass_active < 0.5 {
                let d = ((uv[0] - 0.5).powi(2) + (uv[1] - 0.5).powi(2)).sqrt();
                let falloff = 1.0 - p.vignette * smoothstep(VIGNETTE_INNER, VIGNETTE_OUTER, d);
                for c in &mut color {
                    *c *= falloff;
                }
            }

            color.map(|c| c.clamp(0.0, 1.0))
        }
    }
}
