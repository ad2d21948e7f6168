//! Color and gradient math
//!
//! Hex/RGB/HSL conversion, linear interpolation and multi-stop ramp sampling
//! shared by every layer. Conversions from hex strings go through
//! [`ColorCache`], which memoizes results per exact input string for the
//! lifetime of the session.

use std::collections::HashMap;

use parking_lot::Mutex;

/// RGB color with channels in `[0, 255]`
///
/// Channels are kept as `f32` so that interpolation and HSL round trips do
/// not accumulate rounding error.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::new(255.0, 255.0, 255.0);

    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Channels normalized to `[0, 1]` plus alpha, for GPU uniforms
    pub fn to_unit_rgba(self, alpha: f32) -> [f32; 4] {
        [self.r / 255.0, self.g / 255.0, self.b / 255.0, alpha]
    }

    /// Rounded 8-bit channels
    pub fn to_u8(self) -> [u8; 3] {
        [channel_u8(self.r), channel_u8(self.g), channel_u8(self.b)]
    }

    pub fn to_skia(self, alpha: f32) -> tiny_skia::Color {
        let [r, g, b] = self.to_u8();
        tiny_skia::Color::from_rgba8(r, g, b, (alpha.clamp(0.0, 1.0) * 255.0).round() as u8)
    }
}

fn channel_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// HSL color: hue in `[0, 360)`, saturation and lightness in `[0, 100]`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Hsl {
    pub h: f32,
    pub s: f32,
    pub l: f32,
}

/// Parse `#rrggbb`, `rrggbb` or `#rgb`
///
/// Anything else yields black so a bad palette entry never stops rendering.
pub fn hex_to_rgb(hex: &str) -> Rgb {
    let digits = hex.trim().trim_start_matches('#');
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Rgb::BLACK;
    }

    let parse = |s: &str| u8::from_str_radix(s, 16).ok().map(f32::from);

    let channels = match digits.len() {
        6 => (parse(&digits[0..2]), parse(&digits[2..4]), parse(&digits[4..6])),
        3 => {
            let expand = |i: usize| parse(&digits[i..i + 1]).map(|v| v * 17.0);
            (expand(0), expand(1), expand(2))
        }
        _ => return Rgb::BLACK,
    };

    match channels {
        (Some(r), Some(g), Some(b)) => Rgb::new(r, g, b),
        _ => Rgb::BLACK,
    }
}

pub fn rgb_to_hex(color: Rgb) -> String {
    let [r, g, b] = color.to_u8();
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

pub fn rgb_to_hsl(color: Rgb) -> Hsl {
    let r = color.r / 255.0;
    let g = color.g / 255.0;
    let b = color.b / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;
    let delta = max - min;

    if delta <= f32::EPSILON {
        return Hsl {
            h: 0.0,
            s: 0.0,
            l: l * 100.0,
        };
    }

    let s = if l > 0.5 {
        delta / (2.0 - max - min)
    } else {
        delta / (max + min)
    };

    let h = if max == r {
        (g - b) / delta + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };

    Hsl {
        h: (h * 60.0).rem_euclid(360.0),
        s: s * 100.0,
        l: l * 100.0,
    }
}

pub fn hsl_to_rgb(hsl: Hsl) -> Rgb {
    let h = hsl.h.rem_euclid(360.0) / 360.0;
    let s = (hsl.s / 100.0).clamp(0.0, 1.0);
    let l = (hsl.l / 100.0).clamp(0.0, 1.0);

    if s <= f32::EPSILON {
        let v = l * 255.0;
        return Rgb::new(v, v, v);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    Rgb::new(
        hue_to_channel(p, q, h + 1.0 / 3.0) * 255.0,
        hue_to_channel(p, q, h) * 255.0,
        hue_to_channel(p, q, h - 1.0 / 3.0) * 255.0,
    )
}

fn hue_to_channel(p: f32, q: f32, t: f32) -> f32 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

pub fn hex_to_hsl(hex: &str) -> Hsl {
    rgb_to_hsl(hex_to_rgb(hex))
}

/// Linear per-channel interpolation, `t` clamped to `[0, 1]`
pub fn interpolate_color(c1: Rgb, c2: Rgb, t: f32) -> Rgb {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    Rgb::new(
        c1.r + (c2.r - c1.r) * t,
        c1.g + (c2.g - c1.g) * t,
        c1.b + (c2.b - c1.b) * t,
    )
}

/// Sample an evenly spaced color ramp at `t ∈ [0, 1]`
pub fn sample_gradient(colors: &[Rgb], t: f32) -> Rgb {
    match colors {
        [] => Rgb::WHITE,
        [only] => *only,
        _ => {
            let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
            let last_segment = colors.len() - 2;
            let scaled = t * (colors.len() - 1) as f32;
            let index = (scaled.floor() as usize).min(last_segment);
            let frac = scaled - index as f32;
            interpolate_color(colors[index], colors[index + 1], frac)
        }
    }
}

/// Multiply every channel by `1 - amount`
pub fn darken(hex: &str, amount: f32) -> String {
    let factor = 1.0 - amount.clamp(0.0, 1.0);
    let c = hex_to_rgb(hex);
    rgb_to_hex(Rgb::new(c.r * factor, c.g * factor, c.b * factor))
}

/// Session-scoped memo of hex conversions
///
/// Growth is unbounded: palettes in a session are small and finite, and the
/// cache lives exactly as long as the compositor that owns it.
#[derive(Debug, Default)]
pub struct ColorCache {
    rgb: Mutex<HashMap<String, Rgb>>,
    hsl: Mutex<HashMap<String, Hsl>>,
}

impl ColorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rgb(&self, hex: &str) -> Rgb {
        if let Some(color) = self.rgb.lock().get(hex) {
            return *color;
        }
        let color = hex_to_rgb(hex);
        self.rgb.lock().insert(hex.to_string(), color);
        color
    }

    pub fn hsl(&self, hex: &str) -> Hsl {
        if let Some(hsl) = self.hsl.lock().get(hex) {
            return *hsl;
        }
        let hsl = hex_to_hsl(hex);
        self.hsl.lock().insert(hex.to_string(), hsl);
        hsl
    }

    /// Resolve a whole palette
    pub fn palette(&self, hexes: &[String]) -> Vec<Rgb> {
        hexes.iter().map(|h| self.rgb(h)).collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.rgb.lock().len()
    }
}
