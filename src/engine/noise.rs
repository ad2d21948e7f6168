//! Value noise and fractal Brownian motion
//!
//! [`NOISE_WGSL`] is spliced into the gradient shader. The CPU functions
//! below are its test-only twin: the hash and interpolation match the WGSL
//! line for line so both agree up to float precision.

#[cfg(test)]
pub const FBM_OCTAVES: u32 = 5;
#[cfg(test)]
pub const FBM_LACUNARITY: f32 = 2.0;
#[cfg(test)]
pub const FBM_PERSISTENCE: f32 = 0.5;

/// WGSL source for the same functions, spliced into shaders that need noise
pub const NOISE_WGSL: &str = r#"
fn hash21(p: vec2f) -> f32 {
    return fract(sin(dot(p, vec2f(127.1, 311.7))) * 43758.5453);
}

fn value_noise(p: vec2f) -> f32 {
    let i = floor(p);
    let f = fract(p);
    let u = f * f * (3.0 - 2.0 * f);
    return mix(
        mix(hash21(i), hash21(i + vec2f(1.0, 0.0)), u.x),
        mix(hash21(i + vec2f(0.0, 1.0)), hash21(i + vec2f(1.0, 1.0)), u.x),
        u.y
    );
}

fn fbm(p: vec2f) -> f32 {
    var value = 0.0;
    var amplitude = 0.5;
    var q = p;
    for (var i = 0; i < 5; i = i + 1) {
        value = value + amplitude * value_noise(q);
        q = q * 2.0;
        amplitude = amplitude * 0.5;
    }
    return value;
}
"#;

#[cfg(test)]
fn fract(x: f32) -> f32 {
    x - x.floor()
}

#[cfg(test)]
fn mix(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[cfg(test)]
pub fn hash21(x: f32, y: f32) -> f32 {
    fract((x * 127.1 + y * 311.7).sin() * 43758.547)
}

/// Smoothly interpolated lattice noise in `[0, 1]`
#[cfg(test)]
pub fn value_noise(x: f32, y: f32) -> f32 {
    let (ix, iy) = (x.floor(), y.floor());
    let (fx, fy) = (x - ix, y - iy);
    let ux = fx * fx * (3.0 - 2.0 * fx);
    let uy = fy * fy * (3.0 - 2.0 * fy);

    mix(
        mix(hash21(ix, iy), hash21(ix + 1.0, iy), ux),
        mix(hash21(ix, iy + 1.0), hash21(ix + 1.0, iy + 1.0), ux),
        uy,
    )
}

/// Five-octave fbm; output lies in `[0, 1)`
#[cfg(test)]
pub fn fbm(x: f32, y: f32) -> f32 {
    let mut value = 0.0;
    let mut amplitude = FBM_PERSISTENCE;
    let (mut qx, mut qy) = (x, y);
    for _ in 0..FBM_OCTAVES {
        value += amplitude * value_noise(qx, qy);
        qx *= FBM_LACUNARITY;
        qy *= FBM_LACUNARITY;
        amplitude *= FBM_PERSISTENCE;
    }
    value
}
