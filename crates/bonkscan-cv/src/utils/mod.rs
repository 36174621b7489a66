//! Utility modules

pub mod color;
pub mod image;
pub mod nms;

pub use color::ColorBucket;
pub use image::{ChannelStats, ImageUtils};
pub use nms::{aggregate, nms};
