//! Image retrieval, compression and storage pipeline

mod compress;
mod fetch;
mod pipeline;

pub use compress::{CompressionResult, Compressor};
pub use fetch::{fetch_image_bytes, FetchStrategy};
pub use pipeline::ImagePipeline;

use thiserror::Error;

/// Errors from the image pipeline
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Invalid data URI: {0}")]
    InvalidDataUri(String),

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
