use image::RgbImage;

use super::traits::RegionFilter;

/// Kernel size of the strong blur offered in the filter bank.
pub const BLUR_KERNEL_SIZE: usize = 15;

const SHARPEN_KERNEL: [[i32; 3]; 3] = [[-1, -1, -1], [-1, 9, -1], [-1, -1, -1]];

/// Map an out-of-range index back into `0..n` by mirroring around the edge
/// pixel without repeating it (`gfedcb|abcdefgh|gfedcba`).
pub(crate) fn reflect101(i: i64, n: usize) -> usize {
    if n <= 1 {
        return 0;
    }
    let n = n as i64;
    let period = 2 * (n - 1);
    let m = i.rem_euclid(period);
    (if m >= n { period - m } else { m }) as usize
}

/// Normalized 1-D Gaussian of odd `size`, with sigma derived from the size
/// (`0.3 * ((size - 1) / 2 - 1) + 0.8`).
pub(crate) fn gaussian_kernel(size: usize) -> Vec<f32> {
    let size = size.max(1) | 1;
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let radius = (size / 2) as f32;
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - radius;
            (-(d * d) / two_sigma_sq).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    for w in &mut kernel {
        *w /= sum;
    }
    kernel
}

/// Per-coordinate source indices for every tap of a kernel, with reflect-101
/// borders. Row `i` holds the `kernel_len` source indices for output `i`.
fn tap_table(len: usize, kernel_len: usize) -> Vec<usize> {
    let radius = (kernel_len / 2) as i64;
    let mut table = Vec::with_capacity(len * kernel_len);
    for i in 0..len as i64 {
        for k in 0..kernel_len as i64 {
            table.push(reflect101(i + k - radius, len));
        }
    }
    table
}

/// Convolve an interleaved buffer of `channels` planes with a symmetric 1-D
/// kernel along x, then along y. Output is rounded and saturated to `u8`.
pub(crate) fn convolve_separable(
    src: &[u8],
    width: usize,
    height: usize,
    channels: usize,
    kernel: &[f32],
) -> Vec<u8> {
    if width == 0 || height == 0 {
        return src.to_vec();
    }
    let klen = kernel.len();
    let stride = width * channels;

    let xs = tap_table(width, klen);
    let mut horizontal = vec![0f32; src.len()];
    for y in 0..height {
        let row = &src[y * stride..(y + 1) * stride];
        for x in 0..width {
            let taps = &xs[x * klen..(x + 1) * klen];
            for c in 0..channels {
                let mut acc = 0f32;
                for (w, &sx) in kernel.iter().zip(taps) {
                    acc += w * row[sx * channels + c] as f32;
                }
                horizontal[y * stride + x * channels + c] = acc;
            }
        }
    }

    let ys = tap_table(height, klen);
    let mut out = vec![0u8; src.len()];
    for y in 0..height {
        let taps = &ys[y * klen..(y + 1) * klen];
        for i in 0..stride {
            let mut acc = 0f32;
            for (w, &sy) in kernel.iter().zip(taps) {
                acc += w * horizontal[sy * stride + i];
            }
            out[y * stride + i] = acc.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// 3x3 integer convolution on an RGB image. Results are saturated to `u8`.
pub(crate) fn convolve3x3(image: &RgbImage, kernel: &[[i32; 3]; 3]) -> RgbImage {
    let (w, h) = image.dimensions();
    let (wu, hu) = (w as usize, h as usize);
    if wu == 0 || hu == 0 {
        return image.clone();
    }
    let src = image.as_raw();
    let stride = wu * 3;
    let mut out = vec![0u8; src.len()];
    for y in 0..hu {
        for x in 0..wu {
            let mut acc = [0i32; 3];
            for (ky, row) in kernel.iter().enumerate() {
                let sy = reflect101(y as i64 + ky as i64 - 1, hu);
                for (kx, &weight) in row.iter().enumerate() {
                    let sx = reflect101(x as i64 + kx as i64 - 1, wu);
                    let base = sy * stride + sx * 3;
                    for c in 0..3 {
                        acc[c] += weight * src[base + c] as i32;
                    }
                }
            }
            let base = y * stride + x * 3;
            for c in 0..3 {
                out[base + c] = acc[c].clamp(0, 255) as u8;
            }
        }
    }
    RgbImage::from_raw(w, h, out).unwrap_or_else(|| image.clone())
}

/// Isotropic Gaussian blur with a fixed square kernel.
pub struct Blur {
    pub kernel_size: usize,
}

impl Default for Blur {
    fn default() -> Self {
        Self {
            kernel_size: BLUR_KERNEL_SIZE,
        }
    }
}

impl RegionFilter for Blur {
    fn apply(&self, region: RgbImage) -> RgbImage {
        let (w, h) = region.dimensions();
        let kernel = gaussian_kernel(self.kernel_size);
        let out = convolve_separable(region.as_raw(), w as usize, h as usize, 3, &kernel);
        RgbImage::from_raw(w, h, out).unwrap_or(region)
    }

    fn name(&self) -> &str {
        "blur"
    }
}

/// 3x3 sharpening: center weight 9, every neighbor -1.
pub struct Sharpen;

impl RegionFilter for Sharpen {
    fn apply(&self, region: RgbImage) -> RgbImage {
        convolve3x3(&region, &SHARPEN_KERNEL)
    }

    fn name(&self) -> &str {
        "sharpen"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn reflect101_mirrors_without_repeating_edge() {
        let n = 5;
        let got: Vec<usize> = (-3..8).map(|i| reflect101(i, n)).collect();
        assert_eq!(got, vec![3, 2, 1, 0, 1, 2, 3, 4, 3, 2, 1]);
        assert_eq!(reflect101(-7, 1), 0);
    }

    #[test]
    fn gaussian_kernel_is_normalized_and_symmetric() {
        for size in [5, 15] {
            let k = gaussian_kernel(size);
            assert_eq!(k.len(), size);
            let sum: f32 = k.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
            for i in 0..size / 2 {
                assert!((k[i] - k[size - 1 - i]).abs() < 1e-6);
            }
            assert!(k[size / 2] > k[0]);
        }
    }

    #[test]
    fn blur_keeps_flat_image_flat() {
        let img = RgbImage::from_pixel(20, 9, Rgb([80, 120, 200]));
        let out = Blur::default().apply(img.clone());
        assert_eq!(out, img);
    }

    #[test]
    fn blur_spreads_a_single_bright_pixel() {
        let mut img = RgbImage::new(31, 31);
        img.put_pixel(15, 15, Rgb([255, 255, 255]));
        let out = Blur::default().apply(img);
        let center = out.get_pixel(15, 15)[0];
        let near = out.get_pixel(17, 15)[0];
        assert!(center < 255);
        assert!(near > 0);
        assert!(center >= near);
    }

    #[test]
    fn sharpen_leaves_flat_image_unchanged() {
        let img = RgbImage::from_pixel(6, 6, Rgb([100, 50, 25]));
        assert_eq!(Sharpen.apply(img.clone()), img);
    }

    #[test]
    fn sharpen_saturates_overshoot() {
        // Bright dot on mid gray: center = 9*200 - 8*100 = 1000 -> 255,
        // its neighbors = 9*100 - 7*100 - 200 = 0.
        let mut img = RgbImage::from_pixel(5, 5, Rgb([100, 100, 100]));
        img.put_pixel(2, 2, Rgb([200, 200, 200]));
        let out = Sharpen.apply(img);
        assert_eq!(out.get_pixel(2, 2).0, [255, 255, 255]);
        assert_eq!(out.get_pixel(1, 2).0, [0, 0, 0]);
    }
}
