//! Pixel buffer helpers built on the `image` crate

use crate::bbox::Roi;
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageError, RgbImage};

/// Per-channel mean and population variance of an RGB block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelStats {
    pub mean: [f64; 3],
    pub variance: [f64; 3],
}

impl ChannelStats {
    /// Blocks where every channel is this flat hold no icon.
    pub const EMPTY_VARIANCE: f64 = 500.0;
    /// Blocks below this summed variance are too plain to match reliably.
    pub const LOW_DETAIL_VARIANCE: f64 = 800.0;

    pub fn total_variance(&self) -> f64 {
        self.variance.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.variance.iter().all(|&v| v < Self::EMPTY_VARIANCE)
    }

    pub fn is_low_detail(&self) -> bool {
        self.total_variance() < Self::LOW_DETAIL_VARIANCE
    }

    /// Average of the three channel standard deviations
    pub fn mean_std_dev(&self) -> f64 {
        self.variance.iter().map(|v| v.sqrt()).sum::<f64>() / 3.0
    }
}

/// Image utility functions
pub struct ImageUtils;

impl ImageUtils {
    /// Decode an encoded screenshot or icon into an RGB buffer.
    pub fn decode(bytes: &[u8]) -> Result<RgbImage, ImageError> {
        Ok(image::load_from_memory(bytes)?.to_rgb8())
    }

    /// Copy out a region, clipped to the image bounds.
    pub fn crop(image: &RgbImage, roi: &Roi) -> RgbImage {
        let roi = roi.clamp_to(image.width(), image.height());
        imageops::crop_imm(image, roi.x, roi.y, roi.width, roi.height).to_image()
    }

    /// Resize to an exact size. Same-size input is returned untouched.
    pub fn resize_exact(image: &RgbImage, width: u32, height: u32) -> RgbImage {
        if image.dimensions() == (width, height) {
            return image.clone();
        }
        imageops::resize(image, width.max(1), height.max(1), FilterType::Triangle)
    }

    pub fn to_gray(image: &RgbImage) -> GrayImage {
        imageops::grayscale(image)
    }

    /// Channel statistics over every `stride`-th pixel in row-major order.
    pub fn channel_stats(image: &RgbImage, stride: usize) -> ChannelStats {
        let stride = stride.max(1);
        let mut sum = [0.0f64; 3];
        let mut sum_sq = [0.0f64; 3];
        let mut n = 0usize;

        for pixel in image.pixels().step_by(stride) {
            for c in 0..3 {
                let v = pixel.0[c] as f64;
                sum[c] += v;
                sum_sq[c] += v * v;
            }
            n += 1;
        }

        if n == 0 {
            return ChannelStats {
                mean: [0.0; 3],
                variance: [0.0; 3],
            };
        }

        let n = n as f64;
        let mut mean = [0.0; 3];
        let mut variance = [0.0; 3];
        for c in 0..3 {
            mean[c] = sum[c] / n;
            variance[c] = (sum_sq[c] / n - mean[c] * mean[c]).max(0.0);
        }

        ChannelStats { mean, variance }
    }

    /// Average color of the band `width` pixels wide just inside the border of `roi`.
    pub fn border_mean(image: &RgbImage, roi: &Roi, width: u32) -> Option<[f64; 3]> {
        let roi = roi.clamp_to(image.width(), image.height());
        if roi.is_empty() {
            return None;
        }

        let band = width.max(1);
        let mut sum = [0.0f64; 3];
        let mut n = 0usize;

        for y in roi.y..roi.bottom() {
            for x in roi.x..roi.right() {
                let dx = (x - roi.x).min(roi.right() - 1 - x);
                let dy = (y - roi.y).min(roi.bottom() - 1 - y);
                if dx >= band && dy >= band {
                    continue;
                }
                let p = image.get_pixel(x, y).0;
                for c in 0..3 {
                    sum[c] += p[c] as f64;
                }
                n += 1;
            }
        }

        if n == 0 {
            return None;
        }
        Some(sum.map(|s| s / n as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_flat_block_is_empty() {
        let img = RgbImage::from_pixel(16, 16, Rgb([90, 40, 200]));
        let stats = ImageUtils::channel_stats(&img, 4);
        assert!(stats.is_empty());
        assert!(stats.is_low_detail());
        assert_eq!(stats.mean, [90.0, 40.0, 200.0]);
    }

    #[test]
    fn test_striped_block_has_detail() {
        let img = RgbImage::from_fn(16, 16, |x, _| {
            if x % 2 == 0 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) }
        });
        let stats = ImageUtils::channel_stats(&img, 1);
        assert!(!stats.is_empty());
        assert!(!stats.is_low_detail());
    }

    #[test]
    fn test_crop_is_clipped() {
        let img = RgbImage::new(20, 10);
        let cropped = ImageUtils::crop(&img, &Roi::new(15, 5, 10, 10));
        assert_eq!(cropped.dimensions(), (5, 5));
    }

    #[test]
    fn test_border_mean_ignores_interior() {
        let img = RgbImage::from_fn(10, 10, |x, y| {
            if (3..7).contains(&x) && (3..7).contains(&y) {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        });
        let mean = ImageUtils::border_mean(&img, &Roi::new(0, 0, 10, 10), 3).unwrap();
        assert_eq!(mean, [0.0, 0.0, 255.0]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(ImageUtils::decode(b"not an image").is_err());
    }
}
