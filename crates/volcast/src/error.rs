//! Facade error type.

use thiserror::Error;

use volcast_core::RaycastError;
use volcast_render::RenderError;

/// Errors returned by the headless helpers.
#[derive(Error, Debug)]
pub enum VolcastError {
    /// The raycasting pipeline failed.
    #[error(transparent)]
    Raycast(#[from] RaycastError),

    /// Device creation or a GPU command failed.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Encoding or writing an image failed.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Pixel data does not match the image size.
    #[error("invalid image data: expected {expected} bytes, got {actual}")]
    InvalidImageData { expected: usize, actual: usize },

    /// The file extension names no supported image format.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),
}

/// Result alias for the facade.
pub type Result<T> = std::result::Result<T, VolcastError>;
