use image::{GrayImage, RgbImage};

use super::traits::RegionFilter;

/// Sepia tone matrix; row `i` produces output channel `i` from `(R, G, B)`.
/// These are the usual BGR sepia coefficients re-indexed for RGB pixels.
pub const SEPIA_MATRIX: [[f32; 3]; 3] = [
    [0.189, 0.769, 0.393],
    [0.168, 0.686, 0.349],
    [0.131, 0.534, 0.272],
];

/// Rec.601 luma in 14-bit fixed point: 0.299 R + 0.587 G + 0.114 B.
/// The weights sum to exactly `1 << 14`, so white maps to 255.
#[inline]
pub fn luma(rgb: [u8; 3]) -> u8 {
    const R: u32 = 4899;
    const G: u32 = 9617;
    const B: u32 = 1868;
    ((rgb[0] as u32 * R + rgb[1] as u32 * G + rgb[2] as u32 * B + (1 << 13)) >> 14) as u8
}

/// Single-channel intensity image of an RGB region.
pub fn to_luma(region: &RgbImage) -> GrayImage {
    let (w, h) = region.dimensions();
    GrayImage::from_fn(w, h, |x, y| image::Luma([luma(region.get_pixel(x, y).0)]))
}

pub struct Grayscale;

impl RegionFilter for Grayscale {
    fn apply(&self, mut region: RgbImage) -> RgbImage {
        for px in region.pixels_mut() {
            let y = luma(px.0);
            px.0 = [y, y, y];
        }
        region
    }

    fn name(&self) -> &str {
        "grayscale"
    }
}

pub struct Sepia;

impl RegionFilter for Sepia {
    fn apply(&self, mut region: RgbImage) -> RgbImage {
        for px in region.pixels_mut() {
            let [r, g, b] = px.0.map(|c| c as f32);
            px.0 = SEPIA_MATRIX.map(|row| {
                (row[0] * r + row[1] * g + row[2] * b)
                    .round()
                    .clamp(0.0, 255.0) as u8
            });
        }
        region
    }

    fn name(&self) -> &str {
        "sepia"
    }
}

pub struct Invert;

impl RegionFilter for Invert {
    fn apply(&self, mut region: RgbImage) -> RgbImage {
        for v in region.iter_mut() {
            *v = !*v;
        }
        region
    }

    fn name(&self) -> &str {
        "invert"
    }
}
