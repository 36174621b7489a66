//! Detection pipeline
//!
//! Runs one screenshot through cache lookup, template loading, region scans,
//! suppression, confidence adjustment, stack counting and aggregation. A run
//! either returns the full validated result or an error; partial results are
//! never returned or cached.

use super::boost::{apply_context_boost, validate_border_rarity};
use super::cache::{ResultCache, screenshot_hash};
use super::config::DetectionConfig;
use super::{AggregatedDetection, Detection};
use crate::bbox::Roi;
use crate::error::DetectError;
use crate::scan::{CandidatePool, RegionScanner, ScanOptions, ScanProgress};
use crate::template::TemplateStore;
use crate::traits::{CountRecognizer, NoCountRecognizer};
use crate::utils::{ImageUtils, aggregate, nms};
use bonkscan_core::{Catalog, CatalogEntity};
use image::RgbImage;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Share of each detection's side handed to the stack-count reader, measured
/// from the bottom-right corner.
pub const COUNT_REGION_FRACTION: f64 = 0.35;

/// Phase of the most recent detection run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    CacheCheck,
    TemplatesReady,
    Scanning,
    Aggregating,
    Boosting,
    Validating,
    Caching,
    Done,
    Failed,
}

/// Snapshot published to status subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStatus {
    pub state: PipelineState,
    pub percent: f32,
    pub message: String,
}

/// Screenshot detector owning its template store and result cache
pub struct DetectionPipeline {
    config: DetectionConfig,
    entities: Vec<Arc<CatalogEntity>>,
    templates: Arc<TemplateStore>,
    cache: Mutex<ResultCache>,
    recognizer: Arc<dyn CountRecognizer>,
    status: Arc<watch::Sender<PipelineStatus>>,
}

impl DetectionPipeline {
    pub fn new<C: Catalog + ?Sized>(config: DetectionConfig, catalog: &C) -> Self {
        let entities: Vec<Arc<CatalogEntity>> =
            catalog.list_entities().into_iter().map(Arc::new).collect();

        let templates = Arc::new(
            TemplateStore::new(&config.template_root)
                .with_background_delay(config.background_load_delay()),
        );
        let cache = ResultCache::new(
            config.cache.ttl(),
            config.cache.capacity,
            config.cache.purge_count,
        );

        if config.workers.is_some() && !cfg!(feature = "parallel") {
            warn!("worker count configured but the parallel feature is disabled; scanning serially");
        }

        Self {
            config,
            entities,
            templates,
            cache: Mutex::new(cache),
            recognizer: Arc::new(NoCountRecognizer),
            status: Arc::new(watch::Sender::new(PipelineStatus {
                state: PipelineState::Idle,
                percent: 0.0,
                message: String::new(),
            })),
        }
    }

    /// Use an OCR backend for stack counts
    pub fn with_recognizer(mut self, recognizer: Arc<dyn CountRecognizer>) -> Self {
        self.recognizer = recognizer;
        self
    }

    /// Share a template store between pipelines
    pub fn with_template_store(mut self, templates: Arc<TemplateStore>) -> Self {
        self.templates = templates;
        self
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn templates(&self) -> &Arc<TemplateStore> {
        &self.templates
    }

    /// Status updates for the current or most recent run
    pub fn subscribe(&self) -> watch::Receiver<PipelineStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> PipelineStatus {
        self.status.borrow().clone()
    }

    pub fn clear_cache(&self) {
        self.lock_cache().clear();
    }

    pub fn cached_results(&self) -> usize {
        self.lock_cache().len()
    }

    /// Start loading templates ahead of the first screenshot.
    pub async fn preload(&self) {
        self.templates.load_all(&self.entities).await;
    }

    /// Scanned regions for a screenshot of the given size
    pub fn regions(&self, width: u32, height: u32) -> Vec<Roi> {
        self.config
            .regions()
            .iter()
            .map(|region| region.to_roi(width, height))
            .collect()
    }

    /// Detect catalog icons in an encoded screenshot.
    pub async fn detect(&self, screenshot: &[u8]) -> Result<Vec<AggregatedDetection>, DetectError> {
        self.publish(PipelineState::CacheCheck, 0.0, "Checking cache");
        let hash = screenshot_hash(screenshot);

        if let Some(hit) = self.lock_cache().get(hash) {
            info!(hash, detections = hit.len(), "cache hit");
            self.publish(PipelineState::Done, 100.0, "Loaded cached result");
            return Ok(hit);
        }
        info!(hash, "cache miss");

        self.templates.load_all(&self.entities).await;
        self.publish(PipelineState::TemplatesReady, 0.0, "Templates ready");

        match self.run(hash, screenshot).await {
            Ok(result) => {
                self.publish(PipelineState::Done, 100.0, "Detection complete");
                Ok(result)
            }
            Err(e) => {
                error!(hash, error = %e, "detection failed");
                self.publish(PipelineState::Failed, 0.0, &e.to_string());
                Err(e)
            }
        }
    }

    async fn run(&self, hash: u64, screenshot: &[u8]) -> Result<Vec<AggregatedDetection>, DetectError> {
        let bytes = screenshot.to_vec();
        let image = tokio::task::spawn_blocking(move || ImageUtils::decode(&bytes)).await??;
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(DetectError::EmptyImage { width, height });
        }
        let image = Arc::new(image);

        self.publish(PipelineState::Scanning, 0.0, "Scanning regions");
        let pool = CandidatePool::from_store(&self.templates, &self.entities);
        let options: Vec<ScanOptions> = self
            .config
            .regions()
            .iter()
            .map(|region| region.scan_options(width, height, self.config.fallback_candidates))
            .collect();

        let (tx, mut rx) = mpsc::unbounded_channel::<ScanProgress>();
        let status = Arc::clone(&self.status);
        let forward = tokio::spawn(async move {
            while let Some(progress) = rx.recv().await {
                status.send_replace(PipelineStatus {
                    state: PipelineState::Scanning,
                    percent: progress.percent,
                    message: progress.message,
                });
            }
        });

        let workers = self.config.workers;
        let scan_image = Arc::clone(&image);
        let raw = tokio::task::spawn_blocking(move || {
            scan_regions(&scan_image, &pool, &options, workers, tx)
        })
        .await??;
        // The sender was dropped with the scan closure, so this ends promptly.
        let _ = forward.await;

        self.publish(PipelineState::Aggregating, 0.0, "Merging region results");
        let mut kept = refine(&image, raw, self.config.nms_iou_threshold, |state, message| {
            self.publish(state, 0.0, message)
        });
        self.read_counts(&image, &mut kept);

        let result = aggregate(kept);

        self.publish(PipelineState::Caching, 100.0, "Caching result");
        self.lock_cache().set(hash, result.clone());
        info!(hash, detections = result.len(), "detection stored");

        Ok(result)
    }

    /// Read stack counts; anything unreadable counts once.
    fn read_counts(&self, image: &RgbImage, detections: &mut [Detection]) {
        for detection in detections.iter_mut() {
            let Some(position) = &detection.position else {
                continue;
            };
            let region = ImageUtils::crop(image, &count_region(position));
            if region.width() == 0 || region.height() == 0 {
                continue;
            }

            match self.recognizer.recognize_count(&region) {
                Ok(Some(count)) if count >= 1 => detection.count = Some(count),
                Ok(_) => {}
                Err(e) => {
                    warn!(id = %detection.entity.id, error = %format!("{e:#}"), "stack count unreadable");
                }
            }
        }
    }

    fn publish(&self, state: PipelineState, percent: f32, message: &str) {
        self.status.send_replace(PipelineStatus {
            state,
            percent,
            message: message.to_string(),
        });
    }

    fn lock_cache(&self) -> MutexGuard<'_, ResultCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Bottom-right corner of a detection where the stack count is drawn
pub fn count_region(position: &Roi) -> Roi {
    let width = ((position.width as f64 * COUNT_REGION_FRACTION).ceil() as u32).min(position.width);
    let height = ((position.height as f64 * COUNT_REGION_FRACTION).ceil() as u32).min(position.height);
    Roi::new(
        position.right() - width,
        position.bottom() - height,
        width,
        height,
    )
}

/// Boost and validate the merged raw detections, then suppress overlaps.
///
/// Adjusted confidences decide which of two overlapping windows survives, and
/// synergy partners are looked up before suppression removes any of them.
pub fn refine(
    image: &RgbImage,
    mut detections: Vec<Detection>,
    iou_threshold: f64,
    mut on_phase: impl FnMut(PipelineState, &str),
) -> Vec<Detection> {
    on_phase(PipelineState::Boosting, "Applying context");
    apply_context_boost(&mut detections);

    on_phase(PipelineState::Validating, "Checking rarity borders");
    validate_border_rarity(image, &mut detections);

    let before = detections.len();
    let kept = nms(detections, iou_threshold);
    info!(before, after = kept.len(), "overlaps suppressed");
    kept
}

fn scan_regions(
    image: &RgbImage,
    pool: &CandidatePool,
    options: &[ScanOptions],
    workers: Option<usize>,
    progress: UnboundedSender<ScanProgress>,
) -> Result<Vec<Detection>, DetectError> {
    let scanner = RegionScanner::new(pool);
    let mut detections = Vec::new();

    for region in options {
        let found = match workers {
            #[cfg(feature = "parallel")]
            Some(n) if n > 1 => scanner
                .scan_parallel(image, region, n, Some(&progress))
                .map_err(|e| DetectError::Worker(format!("{e:#}")))?,
            _ => scanner.scan(image, region, Some(&progress)),
        };
        detections.extend(found);
    }

    Ok(detections)
}
