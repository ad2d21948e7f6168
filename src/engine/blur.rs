//! Box blur over RGBA8 buffers
//!
//! Sliding-window blur with clamped edges. One pass is a uniform blur;
//! three passes approximate a Gaussian closely enough for glow effects.
//! Cost is O(pixels × passes) and independent of the radius.

/// Scratch buffers reused between frames to avoid per-frame allocation
#[derive(Debug, Default)]
pub struct BlurScratch {
    sums: Vec<[u64; 4]>,
}

/// Blur `data` (RGBA8, `width × height`) in place
pub fn box_blur(
    data: &mut [u8],
    width: usize,
    height: usize,
    radius: usize,
    passes: usize,
    scratch: &mut BlurScratch,
) {
    if radius == 0 || passes == 0 || width == 0 || height == 0 {
        return;
    }
    if data.len() < width * height * 4 {
        return;
    }

    // Beyond the image extent a wider window only repeats edge pixels
    let radius = radius.min(width.max(height));
    let window = (2 * radius + 1) as u64;
    let div = window * window;
    let half = div / 2;

    scratch.sums.clear();
    scratch.sums.resize(width * height, [0; 4]);
    let sums = &mut scratch.sums;

    for _ in 0..passes {
        // Horizontal: running window sums per row
        for y in 0..height {
            let row = y * width;
            let px = |x: usize| (row + x.min(width - 1)) * 4;

            let mut acc = [0u64; 4];
            let first = px(0);
            for c in 0..4 {
                acc[c] = data[first + c] as u64 * (radius as u64 + 1);
            }
            for i in 1..=radius {
                let p = px(i);
                for c in 0..4 {
                    acc[c] += data[p + c] as u64;
                }
            }

            for x in 0..width {
                sums[row + x] = acc;
                let incoming = px(x + radius + 1);
                let outgoing = px(x.saturating_sub(radius));
                for c in 0..4 {
                    acc[c] = acc[c] + data[incoming + c] as u64 - data[outgoing + c] as u64;
                }
            }
        }

        // Vertical: sum the row sums, normalize and write back
        for x in 0..width {
            let at = |y: usize| y.min(height - 1) * width + x;

            let mut acc = [0u64; 4];
            let first = sums[at(0)];
            for c in 0..4 {
                acc[c] = first[c] * (radius as u64 + 1);
            }
            for i in 1..=radius {
                let s = sums[at(i)];
                for c in 0..4 {
                    acc[c] += s[c];
                }
            }

            for y in 0..height {
                let out = (y * width + x) * 4;
                for c in 0..4 {
                    data[out + c] = ((acc[c] + half) / div).min(255) as u8;
                }
                let incoming = sums[at(y + radius + 1)];
                let outgoing = sums[at(y.saturating_sub(radius))];
                for c in 0..4 {
                    acc[c] = acc[c] + incoming[c] - outgoing[c];
                }
            }
        }
    }
}
