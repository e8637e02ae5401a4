//! Sitegrab: a politeness-aware, depth-bounded image-harvesting crawler
//!
//! This crate implements a single-domain web crawler that discovers pages up
//! to a maximum depth, respects robots.txt and request delays, rotates over a
//! user-supplied proxy list, and compresses every sufficiently large image it
//! finds to roughly half its original size.

pub mod config;
pub mod engine;
pub mod extract;
pub mod fetcher;
pub mod image;
pub mod limiter;
pub mod proxy;
pub mod queue;
pub mod registry;
pub mod robots;
pub mod session;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for sitegrab operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid proxy address (expected host:port): {0}")]
    InvalidProxy(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for sitegrab operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use proxy::{ProxyInfo, ProxyPool};
pub use registry::SessionRegistry;
pub use session::CrawlSession;
pub use url::{extract_domain, is_same_domain, normalize_url};
