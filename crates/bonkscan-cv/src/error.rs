//! Pipeline-level failures.
//!
//! Per-template and per-detection problems are logged and skipped; only the
//! errors below abort a detection run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("failed to decode screenshot: {0}")]
    Decode(#[from] image::ImageError),

    #[error("screenshot has no drawable area ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("scan worker failed: {0}")]
    Worker(String),
}

impl From<tokio::task::JoinError> for DetectError {
    fn from(err: tokio::task::JoinError) -> Self {
        DetectError::Worker(err.to_string())
    }
}
