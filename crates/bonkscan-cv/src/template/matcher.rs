//! Normalized cross-correlation between pixel blocks

use crate::utils::ImageUtils;
use image::{GrayImage, RgbImage};

/// Every n-th pixel of the compared area contributes to the score.
pub const SAMPLE_STRIDE: usize = 2;

/// Similarity of two RGB blocks in `[0, 1]`.
///
/// Both blocks are reduced to grayscale and compared with the Pearson correlation
/// coefficient, mapped from `[-1, 1]` to `[0, 1]`.
pub fn similarity(a: &RgbImage, b: &RgbImage) -> f64 {
    correlate_gray(&ImageUtils::to_gray(a), &ImageUtils::to_gray(b))
}

/// Grayscale variant of [`similarity`]. Blocks of different size are compared over
/// their common top-left area. Flat samples score 0.
pub fn correlate_gray(a: &GrayImage, b: &GrayImage) -> f64 {
    let width = a.width().min(b.width());
    let height = a.height().min(b.height());
    let total = (width * height) as usize;
    if total == 0 {
        return 0.0;
    }

    let mut n = 0.0f64;
    let (mut sum_a, mut sum_b) = (0.0f64, 0.0f64);
    let (mut sum_aa, mut sum_bb, mut sum_ab) = (0.0f64, 0.0f64, 0.0f64);

    for i in (0..total).step_by(SAMPLE_STRIDE) {
        let x = i as u32 % width;
        let y = i as u32 / width;
        let va = a.get_pixel(x, y).0[0] as f64;
        let vb = b.get_pixel(x, y).0[0] as f64;

        n += 1.0;
        sum_a += va;
        sum_b += vb;
        sum_aa += va * va;
        sum_bb += vb * vb;
        sum_ab += va * vb;
    }

    let cov = sum_ab - sum_a * sum_b / n;
    let var_a = sum_aa - sum_a * sum_a / n;
    let var_b = sum_bb - sum_b * sum_b / n;

    if var_a <= f64::EPSILON || var_b <= f64::EPSILON {
        return 0.0;
    }

    let r = (cov / (var_a * var_b).sqrt()).clamp(-1.0, 1.0);
    (r + 1.0) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    fn gradient(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| Luma([((x * 7 + y * 3) % 256) as u8]))
    }

    #[test]
    fn test_identical_blocks_score_one() {
        let g = gradient(20, 20);
        assert!((correlate_gray(&g, &g) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_inverted_blocks_score_zero() {
        let g = gradient(20, 20);
        let inv = GrayImage::from_fn(20, 20, |x, y| Luma([255 - g.get_pixel(x, y).0[0]]));
        assert!(correlate_gray(&g, &inv) < 1e-9);
    }

    #[test]
    fn test_flat_block_scores_zero() {
        let flat = GrayImage::from_pixel(20, 20, Luma([77]));
        assert_eq!(correlate_gray(&gradient(20, 20), &flat), 0.0);
    }

    #[test]
    fn test_brightness_shift_is_ignored() {
        let a = RgbImage::from_fn(16, 16, |x, y| Rgb([(x * 10) as u8, (y * 10) as u8, 50]));
        let b = RgbImage::from_fn(16, 16, |x, y| Rgb([(x * 10 + 40) as u8, (y * 10 + 40) as u8, 90]));
        assert!(similarity(&a, &b) > 0.99);
    }

    #[test]
    fn test_empty_block_scores_zero() {
        assert_eq!(correlate_gray(&GrayImage::new(0, 0), &gradient(4, 4)), 0.0);
    }
}
