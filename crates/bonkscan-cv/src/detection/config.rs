//! Detection configuration

use crate::Result;
use crate::bbox::Roi;
use crate::scan::{DEFAULT_FALLBACK_CANDIDATES, ScanOptions};
use crate::utils::nms::DEFAULT_IOU_THRESHOLD;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub template_root: PathBuf,
    pub hotbar: RegionConfig,
    pub equipment: RegionConfig,
    pub nms_iou_threshold: f64,
    pub fallback_candidates: usize,
    pub background_load_delay_ms: u64,
    /// Split each scan across this many worker threads (needs the `parallel` feature)
    pub workers: Option<usize>,
    pub cache: CacheConfig,
}

/// A UI region given as fractions of the screenshot size
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub step: u32,
    pub min_confidence: f64,
}

/// Result cache limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub capacity: usize,
    pub purge_count: usize,
}

impl RegionConfig {
    /// Bottom fifth of the screen, full width
    pub fn hotbar() -> Self {
        Self {
            label: "hotbar".into(),
            x: 0.0,
            y: 0.8,
            width: 1.0,
            height: 0.2,
            step: 10,
            min_confidence: 0.72,
        }
    }

    /// Top-left quarter width, 40% height
    pub fn equipment() -> Self {
        Self {
            label: "equipment".into(),
            x: 0.0,
            y: 0.0,
            width: 0.25,
            height: 0.4,
            step: 8,
            min_confidence: 0.70,
        }
    }

    /// Pixel region for a screenshot of the given size
    pub fn to_roi(&self, width: u32, height: u32) -> Roi {
        let px = |fraction: f64, total: u32| (fraction.clamp(0.0, 1.0) * total as f64).round() as u32;
        let x = px(self.x, width);
        let y = px(self.y, height);
        let right = px(self.x + self.width, width);
        let bottom = px(self.y + self.height, height);

        Roi::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y)).with_label(self.label.clone())
    }

    pub fn scan_options(&self, width: u32, height: u32, fallback_candidates: usize) -> ScanOptions {
        ScanOptions {
            step: self.step,
            min_confidence: self.min_confidence,
            roi: Some(self.to_roi(width, height)),
            fallback_candidates,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 15 * 60,
            capacity: 50,
            purge_count: 10,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            template_root: "assets".into(),
            hotbar: RegionConfig::hotbar(),
            equipment: RegionConfig::equipment(),
            nms_iou_threshold: DEFAULT_IOU_THRESHOLD,
            fallback_candidates: DEFAULT_FALLBACK_CANDIDATES,
            background_load_delay_ms: 100,
            workers: None,
            cache: CacheConfig::default(),
        }
    }
}

impl DetectionConfig {
    /// Read a JSON config. Missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        serde_json::from_str(&text).with_context(|| format!("Failed to parse config: {:?}", path))
    }

    /// Configuration that splits scans across `workers` threads
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers: Some(workers.max(1)),
            ..Default::default()
        }
    }

    pub fn background_load_delay(&self) -> Duration {
        Duration::from_millis(self.background_load_delay_ms)
    }

    /// Regions scanned on every screenshot, hotbar first
    pub fn regions(&self) -> [&RegionConfig; 2] {
        [&self.hotbar, &self.equipment]
    }
}
