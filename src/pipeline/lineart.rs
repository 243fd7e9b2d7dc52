//! Line-art transformation: any raster → bold black outlines on white.
//!
//! ## Steps
//!
//! ```text
//! RGB ─▶ luma ─▶ adaptive gaussian threshold (21 px, C = 10) ─▶ invert
//!     ─▶ dilate (k × k ones) ─▶ Otsu threshold ─▶ invert ─▶ RGB
//! ```
//!
//! The adaptive threshold marks every pixel that is noticeably darker than its
//! gaussian-weighted neighbourhood. Flat regions, whatever their colour, end
//! up as background, so photos and flat-shaded provider output both reduce
//! to their outlines. Dilation then thickens those outlines so they survive
//! printing, and the Otsu pass snaps any residual grey to pure black/white.
//!
//! Every step is a pure function over `GrayImage`, so the whole transform is
//! deterministic for identical input pixels.
//!
//! ## Why not `image::imageops`?
//!
//! `imageops::blur` uses a different kernel radius/sigma relationship and
//! zero-extends borders, and `DynamicImage::to_luma8` uses Rec. 709 weights.
//! Line art must match pixel-for-pixel across runs and deployments, so the
//! kernels and border handling are spelled out here.

use image::{DynamicImage, GrayImage, Luma, RgbImage};
use tracing::debug;

/// Neighbourhood size of the adaptive threshold (pixels, odd).
pub const ADAPTIVE_BLOCK_SIZE: usize = 21;

/// Offset subtracted from the local mean before comparing.
pub const ADAPTIVE_OFFSET: i32 = 10;

/// Default side of the square dilation kernel.
pub const DEFAULT_LINE_THICKNESS: u32 = 2;

/// Deterministic raster → line-art filter.
#[derive(Debug, Clone, Copy)]
pub struct LineArtTransformer {
    line_thickness: u32,
}

impl Default for LineArtTransformer {
    fn default() -> Self {
        Self::new(DEFAULT_LINE_THICKNESS)
    }
}

impl LineArtTransformer {
    pub fn new(line_thickness: u32) -> Self {
        Self {
            line_thickness: line_thickness.max(1),
        }
    }

    /// Convert `image` to bold printable line art.
    ///
    /// Takes ownership of the input; the returned image is a fresh RGB raster
    /// of the same dimensions. Never fails: a zero-sized input comes back as a
    /// zero-sized RGB image, and flat input comes back white.
    pub fn to_line_art(&self, image: DynamicImage) -> DynamicImage {
        let gray = to_grayscale(&image);
        drop(image);
        let (w, h) = gray.dimensions();
        if w == 0 || h == 0 {
            return DynamicImage::ImageRgb8(RgbImage::new(w, h));
        }

        let mut edges = adaptive_threshold_gaussian(&gray, ADAPTIVE_BLOCK_SIZE, ADAPTIVE_OFFSET);
        invert(&mut edges);

        let thick = dilate(&edges, self.line_thickness as usize);

        let level = otsu_level(&thick);
        let mut cleaned = threshold_binary(&thick, level);
        invert(&mut cleaned);

        debug!(
            "Line art: {}x{} px, kernel {}, otsu level {}",
            w, h, self.line_thickness, level
        );

        DynamicImage::ImageRgb8(gray_to_rgb(&cleaned))
    }
}

/// ITU-R 601-2 luma, 16-bit fixed point with rounding.
pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    if let DynamicImage::ImageLuma8(g) = image {
        return g.clone();
    }
    let rgb = image.to_rgb8();
    let (w, h) = rgb.dimensions();
    let mut out = GrayImage::new(w, h);
    for (dst, src) in out.pixels_mut().zip(rgb.pixels()) {
        let [r, g, b] = src.0;
        let l = (r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000) >> 16;
        *dst = Luma([l as u8]);
    }
    out
}

/// Normalised 1-D gaussian kernel of `size` taps.
///
/// Sigma follows the usual derivation from kernel size,
/// `0.3 · ((size − 1) / 2 − 1) + 0.8`, which is 3.5 for 21 taps.
pub fn gaussian_kernel(size: usize) -> Vec<f32> {
    let sigma = 0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let center = (size as f64 - 1.0) / 2.0;
    let scale = -0.5 / (sigma * sigma);
    let raw: Vec<f64> = (0..size)
        .map(|i| {
            let x = i as f64 - center;
            (scale * x * x).exp()
        })
        .collect();
    let sum: f64 = raw.iter().sum();
    raw.into_iter().map(|v| (v / sum) as f32).collect()
}

/// Separable gaussian blur with replicated borders, rounded back to `u8`.
fn gaussian_blur_replicate(src: &GrayImage, kernel: &[f32]) -> GrayImage {
    let (w, h) = (src.width() as usize, src.height() as usize);
    let r = kernel.len() as isize / 2;
    let data = src.as_raw();

    let mut horiz = vec![0f32; w * h];
    for y in 0..h {
        let row = &data[y * w..(y + 1) * w];
        let out = &mut horiz[y * w..(y + 1) * w];
        for (x, slot) in out.iter_mut().enumerate() {
            let mut acc = 0f32;
            for (k, &wt) in kernel.iter().enumerate() {
                let sx = (x as isize + k as isize - r).clamp(0, w as isize - 1) as usize;
                acc += wt * row[sx] as f32;
            }
            *slot = acc;
        }
    }

    let mut out = GrayImage::new(w as u32, h as u32);
    let dst = &mut *out;
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0f32;
            for (k, &wt) in kernel.iter().enumerate() {
                let sy = (y as isize + k as isize - r).clamp(0, h as isize - 1) as usize;
                acc += wt * horiz[sy * w + x];
            }
            dst[y * w + x] = (acc + 0.5).clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Binary adaptive threshold against a gaussian-weighted local mean.
///
/// A pixel becomes 255 when `src − mean > −offset`, i.e. when it is not
/// clearly darker than its neighbourhood, and 0 otherwise.
pub fn adaptive_threshold_gaussian(src: &GrayImage, block_size: usize, offset: i32) -> GrayImage {
    let kernel = gaussian_kernel(block_size);
    let mean = gaussian_blur_replicate(src, &kernel);
    let mut out = GrayImage::new(src.width(), src.height());
    for ((dst, s), m) in out.pixels_mut().zip(src.pixels()).zip(mean.pixels()) {
        let diff = s.0[0] as i32 - m.0[0] as i32;
        *dst = Luma([if diff > -offset { 255 } else { 0 }]);
    }
    out
}

/// `255 − v` in place.
pub fn invert(img: &mut GrayImage) {
    for p in img.pixels_mut() {
        p.0[0] = 255 - p.0[0];
    }
}

/// Grey-level dilation with a `k × k` all-ones kernel anchored at `k / 2`.
///
/// Samples outside the image are ignored rather than padded.
pub fn dilate(src: &GrayImage, k: usize) -> GrayImage {
    let k = k.max(1);
    if k == 1 {
        return src.clone();
    }
    let (w, h) = (src.width() as usize, src.height() as usize);
    let anchor = (k / 2) as isize;
    let lo = -anchor;
    let hi = k as isize - 1 - anchor;
    let data = src.as_raw();

    let mut rows = vec![0u8; w * h];
    for y in 0..h {
        for x in 0..w {
            let from = (x as isize + lo).max(0) as usize;
            let to = (x as isize + hi).min(w as isize - 1) as usize;
            rows[y * w + x] = data[y * w + from..=y * w + to]
                .iter()
                .copied()
                .max()
                .unwrap_or(0);
        }
    }

    let mut out = GrayImage::new(w as u32, h as u32);
    let dst = &mut *out;
    for y in 0..h {
        let from = (y as isize + lo).max(0) as usize;
        let to = (y as isize + hi).min(h as isize - 1) as usize;
        for x in 0..w {
            let mut m = 0u8;
            for sy in from..=to {
                m = m.max(rows[sy * w + x]);
            }
            dst[y * w + x] = m;
        }
    }
    out
}

/// Otsu's global threshold: the level maximising between-class variance.
///
/// Single-valued images have no valid split and yield 0.
pub fn otsu_level(img: &GrayImage) -> u8 {
    let mut hist = [0u64; 256];
    for p in img.pixels() {
        hist[p.0[0] as usize] += 1;
    }
    let total = img.width() as f64 * img.height() as f64;
    if total == 0.0 {
        return 0;
    }
    let scale = 1.0 / total;
    let mu: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum::<f64>()
        * scale;

    let eps = f32::EPSILON as f64;
    let (mut mu1, mut q1) = (0.0f64, 0.0f64);
    let (mut max_sigma, mut max_val) = (0.0f64, 0u8);

    for (i, &count) in hist.iter().enumerate() {
        let p_i = count as f64 * scale;
        mu1 *= q1;
        q1 += p_i;
        let q2 = 1.0 - q1;
        if q1.min(q2) < eps || q1.max(q2) > 1.0 - eps {
            continue;
        }
        mu1 = (mu1 + i as f64 * p_i) / q1;
        let mu2 = (mu - q1 * mu1) / q2;
        let sigma = q1 * q2 * (mu1 - mu2) * (mu1 - mu2);
        if sigma > max_sigma {
            max_sigma = sigma;
            max_val = i as u8;
        }
    }
    max_val
}

/// `255` where `v > level`, `0` elsewhere.
pub fn threshold_binary(src: &GrayImage, level: u8) -> GrayImage {
    let mut out = GrayImage::new(src.width(), src.height());
    for (dst, s) in out.pixels_mut().zip(src.pixels()) {
        *dst = Luma([if s.0[0] > level { 255 } else { 0 }]);
    }
    out
}

fn gray_to_rgb(src: &GrayImage) -> RgbImage {
    let mut out = RgbImage::new(src.width(), src.height());
    for (dst, s) in out.pixels_mut().zip(src.pixels()) {
        let v = s.0[0];
        dst.0 = [v, v, v];
    }
    out
}
