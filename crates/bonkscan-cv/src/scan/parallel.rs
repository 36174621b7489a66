//! Worker-pool scanning
//!
//! The window grid is split into one contiguous slice per worker. Templates are
//! prepared once and shared read-only by every worker; slice results are joined
//! in slice order, so the output matches [`RegionScanner::scan`]. Progress is
//! reported as finished windows over all windows, once per finished slice.

use super::{
    RegionScanner, ResolutionBucket, ScanOptions, ScanProgress, grid_cols, grid_rows, scan_region,
};
use crate::Result;
use crate::detection::Detection;
use anyhow::Context;
use image::RgbImage;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

impl RegionScanner<'_> {
    pub fn scan_parallel(
        &self,
        image: &RgbImage,
        options: &ScanOptions,
        workers: usize,
        progress: Option<&UnboundedSender<ScanProgress>>,
    ) -> Result<Vec<Detection>> {
        let workers = workers.max(1);
        let (width, height) = image.dimensions();
        let roi = scan_region(options, width, height);
        let label = roi.label.clone().unwrap_or_else(|| "full".to_string());
        let window = ResolutionBucket::from_dimensions(width, height).primary_icon_size();

        let prepared = self.prepare(window);
        let cols = grid_cols(&roi, window, options.step);
        let origins: Vec<(u32, u32)> = grid_rows(&roi, window, options.step)
            .into_iter()
            .flat_map(|y| cols.iter().map(move |&x| (x, y)))
            .collect();

        let slice_len = origins.len().div_ceil(workers).max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .context("Failed to start scan workers")?;

        let total = origins.len();
        let finished = AtomicUsize::new(0);
        let slices: Vec<Vec<Detection>> = pool.install(|| {
            origins
                .par_chunks(slice_len)
                .map(|slice| {
                    let found: Vec<Detection> = slice
                        .iter()
                        .filter_map(|&(x, y)| prepared.match_window(image, x, y, options))
                        .collect();

                    let done = finished.fetch_add(slice.len(), Ordering::Relaxed) + slice.len();
                    if let Some(tx) = progress {
                        let _ = tx.send(ScanProgress {
                            percent: done as f32 / total as f32 * 100.0,
                            message: format!("Scanning {label}: {done}/{total} windows"),
                        });
                    }
                    found
                })
                .collect()
        });

        let detections: Vec<Detection> = slices.into_iter().flatten().collect();
        info!(
            region = %label,
            workers,
            windows = total,
            detections = detections.len(),
            "parallel scan complete"
        );
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::Roi;
    use crate::scan::{Candidate, CandidatePool};
    use crate::template::Template;
    use bonkscan_core::{CatalogEntity, Rarity};
    use image::{Rgb, imageops};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[test]
    fn test_parallel_matches_serial() -> Result<()> {
        let icon = RgbImage::from_fn(48, 48, |x, y| {
            if (x / 5 + y / 7) % 2 == 0 { Rgb([250, 240, 220]) } else { Rgb([60, 10, 90]) }
        });
        let mut screen = RgbImage::new(1920, 1080);
        imageops::replace(&mut screen, &icon, 300, 924);
        imageops::replace(&mut screen, &icon, 900, 944);

        let pool = CandidatePool::new(vec![Candidate {
            entity: Arc::new(CatalogEntity::new("icon", "Icon", Rarity::Rare, "icon.png")),
            template: Arc::new(Template::new("icon", icon)),
        }]);
        let options = ScanOptions {
            roi: Some(Roi::new(0, 864, 1920, 216)),
            ..ScanOptions::default()
        };

        let scanner = RegionScanner::new(&pool);
        let serial = scanner.scan(&screen, &options, None);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let parallel = scanner.scan_parallel(&screen, &options, 4, Some(&tx))?;

        assert!(!serial.is_empty());
        assert_eq!(serial, parallel);

        let mut updates = Vec::new();
        while let Ok(update) = rx.try_recv() {
            updates.push(update.percent);
        }
        assert_eq!(updates.len(), 4);
        assert!(updates.iter().any(|p| (*p - 100.0).abs() < 1e-3));
        Ok(())
    }
}
