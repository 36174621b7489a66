//! Bonkscan Computer Vision Library
//!
//! Locates catalogued item and equipment icons in gameplay screenshots using
//! template matching over known UI regions.

pub mod bbox;
pub mod detection;
pub mod error;
pub mod overlay;
pub mod scan;
pub mod template;
pub mod utils;

// Re-export commonly used types
pub use bbox::Roi;
pub use detection::{
    AggregatedDetection, Detection, DetectionConfig, DetectionPipeline, MatchMethod,
    PipelineState, PipelineStatus, ResultCache,
};
pub use error::DetectError;
pub use scan::{RegionScanner, ScanOptions};
pub use template::{Template, TemplateStore};

// Error handling
pub type Result<T> = anyhow::Result<T>;

/// Core traits for the CV system
pub mod traits {
    use image::RgbImage;

    /// Reads the stack count printed in the corner of an inventory icon.
    pub trait CountRecognizer: Send + Sync {
        fn recognize_count(&self, region: &RgbImage) -> crate::Result<Option<u32>>;
    }

    /// Recognizer used when no OCR backend is configured. Every icon counts once.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct NoCountRecognizer;

    impl CountRecognizer for NoCountRecognizer {
        fn recognize_count(&self, _region: &RgbImage) -> crate::Result<Option<u32>> {
            Ok(None)
        }
    }
}
