//! Fluted glass refraction
//!
//! A post-process that samples another layer's rendered output through a
//! periodic horizontal slice warp:
//!
//! 1. rotate UV about the center by `angle`
//! 2. `slice = fract(u * segments + motion)`, `motion = sin(t * speed) * MOTION_AMPLITUDE`
//! 3. `u += distortion * sin(slice * 2π * wave_frequency) * (1 - SLICE_FALLOFF * |slice - 0.5|)`
//! 4. rotate back and mirror-tile at integer boundaries
//!
//! Optional shade and highlight overlays follow `slice` to fake depth.
//! [`GLASS_SHADER`] is drawn by `render::pipeline`; the `cpu` module below
//! mirrors it for tests.

use bytemuck::{Pod, Zeroable};

use crate::config::GlassConfig;

/// Refraction uniforms, one per presented layer
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct GlassUniforms {
    pub time: f32,
    pub segments: f32,
    /// Rotation in radians
    pub angle: f32,
    pub distortion: f32,
    pub wave_frequency: f32,
    pub speed: f32,
    pub overlay_opacity: f32,
    /// 1.0 when the warp is applied, 0.0 for a straight copy
    pub enabled: f32,
}

impl GlassUniforms {
    /// Identity pass: samples the source unchanged
    pub fn passthrough() -> Self {
        Self {
            segments: 1.0,
            wave_frequency: 1.0,
            ..Zeroable::zeroed()
        }
    }

    pub fn from_config(config: &GlassConfig, time: f32) -> Self {
        Self {
            time,
            segments: finite_or(config.segments, 1.0).max(0.0),
            angle: finite_or(config.angle, 0.0).to_radians(),
            distortion: finite_or(config.distortion, 0.0),
            wave_frequency: finite_or(config.wave_frequency, 1.0),
            speed: finite_or(config.speed, 0.0),
            overlay_opacity: finite_or(config.overlay_opacity, 0.0).clamp(0.0, 1.0),
            enabled: 1.0,
        }
    }

    /// Uniforms for an optional glass block
    pub fn for_layer(config: Option<&GlassConfig>, time: f32) -> Self {
        config
            .map(|c| Self::from_config(c, time))
            .unwrap_or_else(Self::passthrough)
    }

    #[cfg(test)]
    pub fn is_enabled(&self) -> bool {
        self.enabled > 0.5
    }
}

fn finite_or(v: f32, fallback: f32) -> f32 {
    if v.is_finite() { v } else { fallback }
}

/// WGSL refraction pass over a full-screen triangle
pub const GLASS_SHADER: &str = r#"
struct Glass {
    time: f32,
    segments: f32,
    angle: f32,
    distortion: f32,
    wave_frequency: f32,
    speed: f32,
    overlay_opacity: f32,
    enabled: f32,
}

@group(0) @binding(0) var<uniform> glass: Glass;
@group(0) @binding(1) var t_source: texture_2d<f32>;
@group(0) @binding(2) var s_source: sampler;

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
    // Texture space: origin top-left
    return VertexOut(position, vec2f(corner.x, 1.0 - corner.y));
}

const TAU: f32 = 6.28318530718;
const MOTION_AMPLITUDE: f32 = 0.5;
const SLICE_FALLOFF: f32 = 0.5;
const SHADE_ALPHA: f32 = 0.2;
const HIGHLIGHT_ALPHA: f32 = 0.08;
const HIGHLIGHT_START: f32 = 0.7;

fn rotate_uv(uv: vec2f, angle: f32) -> vec2f {
    let s = sin(angle);
    let c = cos(angle);
    let p = uv - vec2f(0.5);
    return vec2f(c * p.x - s * p.y, s * p.x + c * p.y) + vec2f(0.5);
}

fn mirror_tile(x: f32) -> f32 {
    let m = x - 2.0 * floor(x * 0.5);
    return select(m, 2.0 - m, m > 1.0);
}

@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4f {
    if (glass.enabled < 0.5) {
        return textureSample(t_source, s_source, in.uv);
    }

    let rotated = rotate_uv(in.uv, glass.angle);
    let motion = sin(glass.time * glass.speed) * MOTION_AMPLITUDE;
    let slice = fract(rotated.x * glass.segments + motion);
    let offset = glass.distortion * sin(slice * TAU * glass.wave_frequency)
        * (1.0 - SLICE_FALLOFF * abs(slice - 0.5));
    let back = rotate_uv(vec2f(rotated.x + offset, rotated.y), -glass.angle);
    let uv = vec2f(mirror_tile(back.x), mirror_tile(back.y));

    var color = textureSample(t_source, s_source, uv);

    if (glass.overlay_opacity > 0.0) {
        let shade = slice * SHADE_ALPHA * glass.overlay_opacity;
        let highlight = smoothstep(HIGHLIGHT_START, 1.0, 1.0 - slice)
            * HIGHLIGHT_ALPHA * glass.overlay_opacity;
        let darkened = color.rgb * (1.0 - shade);
        color = vec4f(mix(darkened, vec3f(color.a), highlight), color.a);
    }

    return color;
}
"#;
