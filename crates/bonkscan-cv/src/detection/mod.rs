//! High-level detection module

pub mod boost;
pub mod cache;
pub mod config;
pub mod detector;

pub use cache::{ResultCache, ScreenshotHash, screenshot_hash};
pub use config::DetectionConfig;
pub use detector::{DetectionPipeline, PipelineState, PipelineStatus};

use crate::bbox::Roi;
use bonkscan_core::{CatalogEntity, EntityKind};
use serde::Serialize;
use std::sync::Arc;

/// Highest confidence a detection can carry after any adjustment.
pub const MAX_CONFIDENCE: f64 = 0.99;

/// How a detection was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    TemplateMatch,
    IconSimilarity,
    Hybrid,
}

/// One identified icon
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub kind: EntityKind,
    pub entity: Arc<CatalogEntity>,
    pub confidence: f64,
    pub position: Option<Roi>,
    pub method: MatchMethod,
    /// Stack count read from the icon overlay, if any
    #[serde(rename = "stack_count", skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

impl Detection {
    pub fn new(entity: Arc<CatalogEntity>, confidence: f64, method: MatchMethod) -> Self {
        Self {
            kind: entity.kind,
            entity,
            confidence: clamp_confidence(confidence),
            position: None,
            method,
            count: None,
        }
    }

    pub fn at(mut self, position: Roi) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    pub fn entity_id(&self) -> &str {
        &self.entity.id
    }

    pub fn set_confidence(&mut self, confidence: f64) {
        self.confidence = clamp_confidence(confidence);
    }
}

/// A detection merged with its duplicates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedDetection {
    #[serde(flatten)]
    pub detection: Detection,
    pub count: u32,
}

impl AggregatedDetection {
    pub fn entity(&self) -> &CatalogEntity {
        &self.detection.entity
    }

    pub fn confidence(&self) -> f64 {
        self.detection.confidence
    }
}

pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        return 0.0;
    }
    confidence.clamp(0.0, MAX_CONFIDENCE)
}
