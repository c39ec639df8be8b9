//! The xterm 256-color palette
//!
//! Indices 0-15 are the classic system colors, 16-231 a 6x6x6 color cube and
//! 232-255 a 24 step gray ramp. Every index doubles as the terminal escape
//! code for that color.

use super::Color;

/// Channel levels used by the 6x6x6 cube
const CUBE_LEVELS: [u8; 6] = [0, 95, 135, 175, 215, 255];

const SYSTEM_COLORS: [[u8; 3]; 16] = [
    [0, 0, 0],
    [128, 0, 0],
    [0, 128, 0],
    [128, 128, 0],
    [0, 0, 128],
    [128, 0, 128],
    [0, 128, 128],
    [192, 192, 192],
    [128, 128, 128],
    [255, 0, 0],
    [0, 255, 0],
    [255, 255, 0],
    [0, 0, 255],
    [255, 0, 255],
    [0, 255, 255],
    [255, 255, 255],
];

pub const PALETTE_SIZE: usize = 256;

/// RGB value of every xterm-256 index
pub static XTERM256: [[u8; 3]; PALETTE_SIZE] = build_palette();

const fn build_palette() -> [[u8; 3]; PALETTE_SIZE] {
    let mut palette = [[0u8; 3]; PALETTE_SIZE];

    let mut i = 0;
    while i < 16 {
        palette[i] = SYSTEM_COLORS[i];
        i += 1;
    }

    let mut r = 0;
    while r < 6 {
        let mut g = 0;
        while g < 6 {
            let mut b = 0;
            while b < 6 {
                palette[16 + 36 * r + 6 * g + b] = [CUBE_LEVELS[r], CUBE_LEVELS[g], CUBE_LEVELS[b]];
                b += 1;
            }
            g += 1;
        }
        r += 1;
    }

    let mut step = 0;
    while step < 24 {
        let level = (8 + 10 * step) as u8;
        palette[232 + step] = [level, level, level];
        step += 1;
    }

    palette
}

fn distance(a: [u8; 3], b: [u8; 3]) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = i32::from(x) - i32::from(y);
            (d * d) as u32
        })
        .sum()
}

/// Nearest cube level for one channel, preferring the lower level on a tie
fn nearest_cube_level(value: u8) -> usize {
    let mut best = 0;
    let mut best_distance = u8::MAX;
    for (i, &level) in CUBE_LEVELS.iter().enumerate() {
        let d = value.abs_diff(level);
        if d < best_distance {
            best = i;
            best_distance = d;
        }
    }
    best
}

/// Index of the palette entry closest to `rgb` by squared euclidean distance.
///
/// Ties resolve to the lowest index, matching a linear scan of the whole
/// palette. Only the candidates that can win are examined: the system colors,
/// the per-channel nearest cube point and the gray ramp.
pub fn nearest(rgb: [u8; 3]) -> u8 {
    let cube_index = 16
        + 36 * nearest_cube_level(rgb[0])
        + 6 * nearest_cube_level(rgb[1])
        + nearest_cube_level(rgb[2]);

    let candidates = (0..16).chain(std::iter::once(cube_index)).chain(232..PALETTE_SIZE);

    let mut best = 0usize;
    let mut best_distance = u32::MAX;
    for index in candidates {
        let d = distance(rgb, XTERM256[index]);
        if d < best_distance || (d == best_distance && index < best) {
            best = index;
            best_distance = d;
        }
    }

    best as u8
}

/// The palette entry for `index` as a [`Color`]
pub fn color(index: usize) -> Option<Color> {
    let rgb = *XTERM256.get(index)?;
    Some(Color {
        xterm: index as u8,
        rgb,
    })
}
