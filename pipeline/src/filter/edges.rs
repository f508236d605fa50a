//! Double-threshold edge detection.
//!
//! Luminance, a fixed 5x5 Gaussian pre-smoothing pass, 3x3 Sobel gradients
//! with L1 magnitude, non-maximum suppression along the quantized gradient
//! direction, then hysteresis: weak pixels (`> low`) survive only when
//! 8-connected to a strong pixel (`> high`).
//!
//! Thresholds are not reordered. With `low > high` every weak candidate is
//! also strong, which degrades to "all local maxima above `low`".

use image::{GrayImage, Rgb, RgbImage};

use super::color::to_luma;
use super::kernel::{convolve_separable, gaussian_kernel, reflect101};
use super::traits::RegionFilter;

/// Kernel size of the noise-suppression pass that precedes gradient estimation.
pub const SMOOTHING_KERNEL_SIZE: usize = 5;

pub const EDGE: u8 = 255;

const NONE: u8 = 0;
const WEAK: u8 = 1;
const STRONG: u8 = 2;

// tan(22.5deg) in Q15.
const TG22: i32 = 13573;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeDetector {
    low: u8,
    high: u8,
    edge_color: Rgb<u8>,
}

impl EdgeDetector {
    pub fn new(low: u8, high: u8) -> Self {
        Self {
            low,
            high,
            edge_color: Rgb([255, 255, 255]),
        }
    }

    pub fn with_edge_color(mut self, color: Rgb<u8>) -> Self {
        self.edge_color = color;
        self
    }

    pub fn thresholds(&self) -> (u8, u8) {
        (self.low, self.high)
    }

    /// Binary edge map of `region`: [`EDGE`] on edges, 0 elsewhere.
    pub fn detect(&self, region: &RgbImage) -> GrayImage {
        let (w, h) = region.dimensions();
        let (wu, hu) = (w as usize, h as usize);
        if wu == 0 || hu == 0 {
            return GrayImage::new(w, h);
        }

        let gray = to_luma(region);
        let smoothed = convolve_separable(
            gray.as_raw(),
            wu,
            hu,
            1,
            &gaussian_kernel(SMOOTHING_KERNEL_SIZE),
        );
        let (gx, gy) = sobel(&smoothed, wu, hu);
        let mag: Vec<i32> = gx.iter().zip(&gy).map(|(x, y)| x.abs() + y.abs()).collect();

        let classes = suppress_non_maxima(&mag, &gx, &gy, wu, hu, self.low as i32, self.high as i32);
        let edges = hysteresis(&classes, wu, hu);
        GrayImage::from_raw(w, h, edges).unwrap_or_else(|| GrayImage::new(w, h))
    }
}

impl RegionFilter for EdgeDetector {
    fn apply(&self, region: RgbImage) -> RgbImage {
        let edges = self.detect(&region);
        let mut out = region;
        for (dst, src) in out.pixels_mut().zip(edges.pixels()) {
            *dst = if src[0] == EDGE {
                self.edge_color
            } else {
                Rgb([0, 0, 0])
            };
        }
        out
    }

    fn name(&self) -> &str {
        "edges"
    }
}

fn sobel(src: &[u8], w: usize, h: usize) -> (Vec<i32>, Vec<i32>) {
    let mut gx = vec![0i32; w * h];
    let mut gy = vec![0i32; w * h];
    let at = |x: i64, y: i64| src[reflect101(y, h) * w + reflect101(x, w)] as i32;
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let (tl, t, tr) = (at(x - 1, y - 1), at(x, y - 1), at(x + 1, y - 1));
            let (l, r) = (at(x - 1, y), at(x + 1, y));
            let (bl, b, br) = (at(x - 1, y + 1), at(x, y + 1), at(x + 1, y + 1));
            let i = y as usize * w + x as usize;
            gx[i] = (tr + 2 * r + br) - (tl + 2 * l + bl);
            gy[i] = (bl + 2 * b + br) - (tl + 2 * t + tr);
        }
    }
    (gx, gy)
}

fn suppress_non_maxima(
    mag: &[i32],
    gx: &[i32],
    gy: &[i32],
    w: usize,
    h: usize,
    low: i32,
    high: i32,
) -> Vec<u8> {
    // Magnitude outside the region counts as zero.
    let m_at = |x: i64, y: i64| -> i32 {
        if x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
            0
        } else {
            mag[y as usize * w + x as usize]
        }
    };

    let mut classes = vec![NONE; w * h];
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let i = y as usize * w + x as usize;
            let m = mag[i];
            if m <= low {
                continue;
            }
            let (xs, ys) = (gx[i], gy[i]);
            let (ax, ay) = (xs.abs(), ys.abs());
            let tg22x = ax * TG22;
            let y_q15 = ay << 15;

            let is_max = if y_q15 < tg22x {
                m > m_at(x - 1, y) && m >= m_at(x + 1, y)
            } else if y_q15 > tg22x + (ax << 16) {
                m > m_at(x, y - 1) && m >= m_at(x, y + 1)
            } else {
                let s = if (xs ^ ys) < 0 { -1 } else { 1 };
                m > m_at(x - s, y - 1) && m > m_at(x + s, y + 1)
            };

            if is_max {
                classes[i] = if m > high { STRONG } else { WEAK };
            }
        }
    }
    classes
}

fn hysteresis(classes: &[u8], w: usize, h: usize) -> Vec<u8> {
    let mut edges = vec![0u8; w * h];
    let mut stack: Vec<usize> = Vec::new();
    for (i, &c) in classes.iter().enumerate() {
        if c == STRONG {
            edges[i] = EDGE;
            stack.push(i);
        }
    }

    while let Some(i) = stack.pop() {
        let (x, y) = ((i % w) as i64, (i / w) as i64);
        for dy in -1..=1 {
            for dx in -1..=1 {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                    continue;
                }
                let n = ny as usize * w + nx as usize;
                if classes[n] == WEAK && edges[n] == 0 {
                    edges[n] = EDGE;
                    stack.push(n);
                }
            }
        }
    }
    edges
}
