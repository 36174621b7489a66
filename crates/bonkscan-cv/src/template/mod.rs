//! Reference icons and how they are compared

pub mod loader;
pub mod matcher;

pub use loader::TemplateStore;
pub use matcher::{correlate_gray, similarity};

use crate::utils::{ColorBucket, ImageUtils};
use image::RgbImage;

/// Decoded reference icon for one catalog entity
#[derive(Debug, Clone)]
pub struct Template {
    pub entity_id: String,
    pub image: RgbImage,
    pub width: u32,
    pub height: u32,
    pub dominant: ColorBucket,
}

impl Template {
    pub fn new(entity_id: impl Into<String>, image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        let dominant = ColorBucket::from_stats(&ImageUtils::channel_stats(&image, 1));
        Self {
            entity_id: entity_id.into(),
            image,
            width,
            height,
            dominant,
        }
    }
}
