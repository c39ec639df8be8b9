//! Pixel-to-color reduction strategies

use image::RgbaImage;
use tokio_util::sync::CancellationToken;

use super::{CANCEL_CHECK_INTERVAL, Color, ColorStrategy, palette};
use crate::errors::ColorError;

/// Returns the first pixel, scanning row-major, whose palette color is not a
/// shade of gray. Falls back to the final pixel when the image is grayscale.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstNonGray;

/// Returns the most frequent palette color (histogram mode). Ties resolve to
/// the lowest palette index.
#[derive(Debug, Default, Clone, Copy)]
pub struct Dominant;

/// Returns the palette color nearest to the arithmetic mean of all pixels.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mean;

fn ensure_not_empty(image: &RgbaImage) -> Result<(), ColorError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(ColorError::EmptyImage);
    }
    Ok(())
}

fn check_cancel(scanned: usize, cancel: &CancellationToken) -> Result<(), ColorError> {
    if scanned % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
        return Err(ColorError::Cancelled);
    }
    Ok(())
}

fn palette_color(index: usize) -> Result<Color, ColorError> {
    palette::color(index).ok_or(ColorError::PaletteIndex(index))
}

/// Fully transparent pixels carry no color. They only count when the image
/// has nothing else.
fn has_opaque_pixel(image: &RgbaImage) -> bool {
    image.pixels().any(|p| p.0[3] != 0)
}

impl ColorStrategy for FirstNonGray {
    fn name(&self) -> &'static str {
        "first-non-gray"
    }

    fn compute(&self, image: &RgbaImage, cancel: &CancellationToken) -> Result<Color, ColorError> {
        ensure_not_empty(image)?;

        // `pixels()` walks rows top to bottom, left to right
        let mut last = 0usize;
        for (scanned, pixel) in image.pixels().enumerate() {
            check_cancel(scanned, cancel)?;

            let [r, g, b, _] = pixel.0;
            let index = usize::from(palette::nearest([r, g, b]));
            let color = palette_color(index)?;
            if !color.is_gray() {
                return Ok(color);
            }
            last = index;
        }

        palette_color(last)
    }
}

impl ColorStrategy for Dominant {
    fn name(&self) -> &'static str {
        "dominant"
    }

    fn compute(&self, image: &RgbaImage, cancel: &CancellationToken) -> Result<Color, ColorError> {
        ensure_not_empty(image)?;

        let skip_transparent = has_opaque_pixel(image);
        let mut histogram = [0u64; palette::PALETTE_SIZE];
        for (scanned, pixel) in image.pixels().enumerate() {
            check_cancel(scanned, cancel)?;

            let [r, g, b, a] = pixel.0;
            if skip_transparent && a == 0 {
                continue;
            }
            histogram[usize::from(palette::nearest([r, g, b]))] += 1;
        }

        // max_by_key keeps the last maximum, so walk the histogram in reverse
        let (index, _) = histogram
            .iter()
            .enumerate()
            .rev()
            .max_by_key(|&(_, count)| *count)
            .ok_or(ColorError::EmptyImage)?;

        palette_color(index)
    }
}

impl ColorStrategy for Mean {
    fn name(&self) -> &'static str {
        "mean"
    }

    fn compute(&self, image: &RgbaImage, cancel: &CancellationToken) -> Result<Color, ColorError> {
        ensure_not_empty(image)?;

        let skip_transparent = has_opaque_pixel(image);
        let mut sums = [0u64; 3];
        let mut counted = 0u64;
        for (scanned, pixel) in image.pixels().enumerate() {
            check_cancel(scanned, cancel)?;

            let [r, g, b, a] = pixel.0;
            if skip_transparent && a == 0 {
                continue;
            }
            sums[0] += u64::from(r);
            sums[1] += u64::from(g);
            sums[2] += u64::from(b);
            counted += 1;
        }

        if counted == 0 {
            return Err(ColorError::EmptyImage);
        }

        let mean = sums.map(|sum| ((sum + counted / 2) / counted).min(255) as u8);
        palette_color(usize::from(palette::nearest(mean)))
    }
}
