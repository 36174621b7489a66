//! Sliding-window search over a screenshot region
//!
//! Windows are the primary icon size for the screenshot's resolution and are
//! walked on a fixed stride. Flat or low-detail windows are skipped before any
//! template is compared against them.

#[cfg(feature = "parallel")]
mod parallel;

use crate::bbox::Roi;
use crate::detection::{Detection, MatchMethod};
use crate::template::{Template, TemplateStore, correlate_gray};
use crate::utils::{ColorBucket, ImageUtils};
use bonkscan_core::CatalogEntity;
use image::{GrayImage, RgbImage, imageops};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

/// Share of each window side compared against the template. The rest holds the
/// stack-count overlay in the bottom-right corner.
pub const INNER_FRACTION: f64 = 0.8;

/// Candidates tried when a window's color bucket has no templates.
pub const DEFAULT_FALLBACK_CANDIDATES: usize = 30;

/// Screen class used to pick icon sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionBucket {
    Hd720,
    Hd1080,
    Qhd1440,
    Uhd4k,
    /// 1280x800 handheld screens
    Handheld,
}

impl ResolutionBucket {
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        let aspect = width as f64 / height.max(1) as f64;
        if width <= 1280 && height > 720 && height <= 820 && (aspect - 1.6).abs() < 0.05 {
            ResolutionBucket::Handheld
        } else if height <= 720 {
            ResolutionBucket::Hd720
        } else if height <= 1080 {
            ResolutionBucket::Hd1080
        } else if height <= 1440 {
            ResolutionBucket::Qhd1440
        } else {
            ResolutionBucket::Uhd4k
        }
    }

    /// Smallest, primary and largest expected icon side in pixels
    pub fn icon_sizes(self) -> [u32; 3] {
        match self {
            ResolutionBucket::Hd720 => [32, 38, 44],
            ResolutionBucket::Hd1080 => [40, 48, 56],
            ResolutionBucket::Qhd1440 => [54, 64, 74],
            ResolutionBucket::Uhd4k => [80, 96, 112],
            ResolutionBucket::Handheld => [34, 40, 46],
        }
    }

    pub fn primary_icon_size(self) -> u32 {
        self.icon_sizes()[1]
    }
}

/// Parameters for one region scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOptions {
    pub step: u32,
    pub min_confidence: f64,
    /// Region to walk; the whole image when absent
    pub roi: Option<Roi>,
    pub fallback_candidates: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            step: 10,
            min_confidence: 0.72,
            roi: None,
            fallback_candidates: DEFAULT_FALLBACK_CANDIDATES,
        }
    }
}

/// Progress update pushed while a scan runs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanProgress {
    pub percent: f32,
    pub message: String,
}

/// An entity with a loaded template
#[derive(Debug, Clone)]
pub struct Candidate {
    pub entity: Arc<CatalogEntity>,
    pub template: Arc<Template>,
}

/// Templates available to a scan, indexed by dominant color
#[derive(Debug, Clone, Default)]
pub struct CandidatePool {
    candidates: Vec<Candidate>,
    by_bucket: HashMap<ColorBucket, Vec<usize>>,
}

impl CandidatePool {
    /// Index candidates by each template's own color bucket.
    pub fn new(candidates: Vec<Candidate>) -> Self {
        let mut by_bucket: HashMap<ColorBucket, Vec<usize>> = HashMap::new();
        for (i, candidate) in candidates.iter().enumerate() {
            by_bucket.entry(candidate.template.dominant).or_default().push(i);
        }
        Self {
            candidates,
            by_bucket,
        }
    }

    /// Snapshot the loaded templates of `entities`, keeping catalog order.
    pub fn from_store(store: &TemplateStore, entities: &[Arc<CatalogEntity>]) -> Self {
        let candidates: Vec<Candidate> = entities
            .iter()
            .filter_map(|entity| {
                store.get(&entity.id).map(|template| Candidate {
                    entity: Arc::clone(entity),
                    template,
                })
            })
            .collect();

        let position: HashMap<&str, usize> = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| (c.entity.id.as_str(), i))
            .collect();

        let mut by_bucket = HashMap::new();
        for bucket in ColorBucket::ALL {
            let mut indices: Vec<usize> = store
                .bucket(bucket)
                .iter()
                .filter_map(|id| position.get(id.as_str()).copied())
                .collect();
            if indices.is_empty() {
                continue;
            }
            indices.sort_unstable();
            by_bucket.insert(bucket, indices);
        }

        Self {
            candidates,
            by_bucket,
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn get(&self, index: usize) -> &Candidate {
        &self.candidates[index]
    }

    /// Candidate indices for a window of the given color: that bucket plus the
    /// mixed bucket, or the first `fallback` candidates when both are empty.
    pub fn for_color(&self, bucket: ColorBucket, fallback: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = self.by_bucket.get(&bucket).cloned().unwrap_or_default();
        if bucket != ColorBucket::Mixed {
            if let Some(mixed) = self.by_bucket.get(&ColorBucket::Mixed) {
                indices.extend(mixed);
                indices.sort_unstable();
            }
        }

        if indices.is_empty() {
            indices = (0..self.candidates.len().min(fallback)).collect();
        }
        indices
    }
}

/// Scans screenshot regions against a candidate pool
pub struct RegionScanner<'p> {
    pool: &'p CandidatePool,
}

/// Templates resized and cropped for one window size
pub(crate) struct PreparedScan<'p> {
    pool: &'p CandidatePool,
    window: u32,
    inner: u32,
    templates: Vec<GrayImage>,
}

impl<'p> RegionScanner<'p> {
    pub fn new(pool: &'p CandidatePool) -> Self {
        Self { pool }
    }

    /// Walk the region and return the best match of every window that has one.
    ///
    /// Output is not deduplicated; neighbouring windows may report the same icon.
    pub fn scan(
        &self,
        image: &RgbImage,
        options: &ScanOptions,
        progress: Option<&UnboundedSender<ScanProgress>>,
    ) -> Vec<Detection> {
        let (width, height) = image.dimensions();
        let roi = scan_region(options, width, height);
        let label = roi.label.clone().unwrap_or_else(|| "full".to_string());
        let window = ResolutionBucket::from_dimensions(width, height).primary_icon_size();

        info!(region = %label, window, step = options.step, candidates = self.pool.len(), "scan started");

        let prepared = self.prepare(window);
        let rows = grid_rows(&roi, window, options.step);
        let cols = grid_cols(&roi, window, options.step);

        let mut detections = Vec::new();
        for (row, &y) in rows.iter().enumerate() {
            for &x in &cols {
                if let Some(detection) = prepared.match_window(image, x, y, options) {
                    detections.push(detection);
                }
            }

            if let Some(tx) = progress {
                let percent = (row + 1) as f32 / rows.len() as f32 * 100.0;
                // A dropped receiver only means nobody is watching.
                let _ = tx.send(ScanProgress {
                    percent,
                    message: format!("Scanning {label}: row {}/{}", row + 1, rows.len()),
                });
            }
        }

        info!(region = %label, windows = rows.len() * cols.len(), detections = detections.len(), "scan complete");
        detections
    }

    /// Resize every template to the full window, then keep its top-left inner
    /// square. The template is not resized to the inner square directly, so both
    /// sides of a comparison are cut from images of the same scale.
    pub(crate) fn prepare(&self, window: u32) -> PreparedScan<'p> {
        let inner = ((window as f64 * INNER_FRACTION) as u32).max(1);
        let templates = self
            .pool
            .candidates
            .iter()
            .map(|candidate| {
                let resized = ImageUtils::resize_exact(&candidate.template.image, window, window);
                let cropped = imageops::crop_imm(&resized, 0, 0, inner, inner).to_image();
                ImageUtils::to_gray(&cropped)
            })
            .collect();

        PreparedScan {
            pool: self.pool,
            window,
            inner,
            templates,
        }
    }
}

impl PreparedScan<'_> {
    /// Best candidate for the window at `(x, y)`, if any clears the threshold.
    pub(crate) fn match_window(
        &self,
        image: &RgbImage,
        x: u32,
        y: u32,
        options: &ScanOptions,
    ) -> Option<Detection> {
        let position = Roi::new(x, y, self.window, self.window);
        let block = ImageUtils::crop(image, &position);

        if ImageUtils::channel_stats(&block, 4).is_empty() {
            return None;
        }
        let stats = ImageUtils::channel_stats(&block, 1);
        if stats.is_low_detail() {
            return None;
        }

        let bucket = ColorBucket::from_stats(&stats);
        let inner = ImageUtils::to_gray(
            &imageops::crop_imm(&block, 0, 0, self.inner, self.inner).to_image(),
        );

        let mut best: Option<(usize, f64)> = None;
        for index in self.pool.for_color(bucket, options.fallback_candidates) {
            let score = correlate_gray(&inner, &self.templates[index]);
            if score >= options.min_confidence && best.is_none_or(|(_, s)| score > s) {
                best = Some((index, score));
            }
        }

        best.map(|(index, score)| {
            let entity = Arc::clone(&self.pool.get(index).entity);
            Detection::new(entity, score, MatchMethod::TemplateMatch).at(position)
        })
    }
}

/// The region a scan walks, clipped to the image
pub fn scan_region(options: &ScanOptions, width: u32, height: u32) -> Roi {
    options
        .roi
        .as_ref()
        .map(|roi| roi.clamp_to(width, height))
        .unwrap_or_else(|| Roi::full(width, height))
}

pub(crate) fn grid_rows(roi: &Roi, window: u32, step: u32) -> Vec<u32> {
    axis(roi.y, roi.height, window, step)
}

pub(crate) fn grid_cols(roi: &Roi, window: u32, step: u32) -> Vec<u32> {
    axis(roi.x, roi.width, window, step)
}

fn axis(start: u32, length: u32, window: u32, step: u32) -> Vec<u32> {
    if length < window || window == 0 {
        return Vec::new();
    }
    (start..=start + length - window)
        .step_by(step.max(1) as usize)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bonkscan_core::Rarity;
    use image::Rgb;

    fn checker(size: u32, a: [u8; 3], b: [u8; 3]) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| {
            if (x / 4 + y / 3) % 2 == 0 { Rgb(a) } else { Rgb(b) }
        })
    }

    fn candidate(id: &str, image: RgbImage) -> Candidate {
        Candidate {
            entity: Arc::new(CatalogEntity::new(id, id, Rarity::Common, format!("{id}.png"))),
            template: Arc::new(Template::new(id, image)),
        }
    }

    #[test]
    fn test_resolution_buckets() {
        assert_eq!(ResolutionBucket::from_dimensions(1280, 720), ResolutionBucket::Hd720);
        assert_eq!(ResolutionBucket::from_dimensions(1280, 800), ResolutionBucket::Handheld);
        assert_eq!(ResolutionBucket::from_dimensions(1920, 1080), ResolutionBucket::Hd1080);
        assert_eq!(ResolutionBucket::from_dimensions(2560, 1440), ResolutionBucket::Qhd1440);
        assert_eq!(ResolutionBucket::from_dimensions(3840, 2160), ResolutionBucket::Uhd4k);
        assert_eq!(ResolutionBucket::Hd1080.primary_icon_size(), 48);
    }

    #[test]
    fn test_grid_stays_inside_region() {
        let roi = Roi::new(10, 0, 100, 60);
        let cols = grid_cols(&roi, 48, 10);
        assert_eq!(cols.first(), Some(&10));
        assert!(cols.iter().all(|&x| x + 48 <= 110));
        assert_eq!(grid_rows(&roi, 48, 10), vec![0, 10]);
        assert!(grid_rows(&Roi::new(0, 0, 10, 10), 48, 10).is_empty());
    }

    #[test]
    fn test_for_color_unions_mixed_and_falls_back() {
        let red = candidate("red", RgbImage::from_pixel(8, 8, Rgb([220, 20, 20])));
        let mixed = candidate("mixed", checker(8, [255, 0, 255], [0, 255, 0]));
        let blue = candidate("blue", RgbImage::from_pixel(8, 8, Rgb([20, 20, 220])));
        let pool = CandidatePool::new(vec![red, mixed, blue]);

        assert_eq!(pool.for_color(ColorBucket::Red, 30), vec![0, 1]);
        assert_eq!(pool.for_color(ColorBucket::Mixed, 30), vec![1]);

        let no_mixed = CandidatePool::new(vec![
            candidate("a", RgbImage::from_pixel(8, 8, Rgb([220, 20, 20]))),
            candidate("b", RgbImage::from_pixel(8, 8, Rgb([20, 20, 220]))),
        ]);
        assert_eq!(no_mixed.for_color(ColorBucket::Green, 1), vec![0]);
        assert_eq!(no_mixed.for_color(ColorBucket::Green, 30), vec![0, 1]);
    }

    #[test]
    fn test_scan_finds_planted_icon() {
        let icon = checker(48, [230, 200, 30], [40, 20, 160]);
        let mut screen = RgbImage::new(1920, 1080);
        imageops::replace(&mut screen, &icon, 200, 100);

        let pool = CandidatePool::new(vec![candidate("icon", icon)]);
        let options = ScanOptions {
            roi: Some(Roi::new(0, 0, 400, 300).with_label("test")),
            ..ScanOptions::default()
        };
        let detections = RegionScanner::new(&pool).scan(&screen, &options, None);

        let exact = detections
            .iter()
            .find(|d| d.position == Some(Roi::new(200, 100, 48, 48)))
            .expect("planted icon found");
        assert_eq!(exact.entity_id(), "icon");
        assert_eq!(exact.method, MatchMethod::TemplateMatch);
        assert!(exact.confidence >= 0.98);
    }

    #[test]
    fn test_scan_skips_flat_screens() {
        let pool = CandidatePool::new(vec![candidate("icon", checker(48, [255, 255, 255], [0, 0, 0]))]);
        let screen = RgbImage::from_pixel(640, 360, Rgb([30, 90, 30]));
        assert!(RegionScanner::new(&pool).scan(&screen, &ScanOptions::default(), None).is_empty());
    }

    #[test]
    fn test_scan_reports_progress() {
        let pool = CandidatePool::default();
        let screen = RgbImage::new(200, 120);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        RegionScanner::new(&pool).scan(&screen, &ScanOptions::default(), Some(&tx));

        let mut last = None;
        while let Ok(update) = rx.try_recv() {
            last = Some(update);
        }
        assert_eq!(last.map(|p| p.percent), Some(100.0));
    }
}
