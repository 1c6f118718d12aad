//! Error type for the simulator binary and its exports.

use mapview_core::SessionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("Raster buffer does not match {width}x{height}")]
    InvalidRaster { width: usize, height: usize },
}
