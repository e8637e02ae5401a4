//! Configuration loading, parsing and validation
//!
//! Configuration is optional: every field has a sensible default, and the
//! binary runs without a config file at all. When a TOML file is supplied it
//! is validated before use.

use crate::ConfigError;
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Worker pool and queue sizing
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrawlerConfig {
    /// Number of workers fetching pages
    #[serde(rename = "fetch-workers", default = "default_fetch_workers")]
    pub fetch_workers: usize,

    /// Number of workers extracting links and images from fetched pages
    #[serde(rename = "process-workers", default = "default_process_workers")]
    pub process_workers: usize,

    /// Capacity of each work queue
    #[serde(rename = "queue-capacity", default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Timeout for fetching a single image, in milliseconds
    #[serde(rename = "image-timeout-ms", default = "default_image_timeout_ms")]
    pub image_timeout_ms: u64,
}

/// Image compression settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompressionConfig {
    /// Lowest JPEG quality the size search may pick, in (0, 1]
    #[serde(rename = "min-quality", default = "default_min_quality")]
    pub min_quality: f32,

    /// Directory compressed images are written under, one subdirectory per
    /// domain
    #[serde(rename = "output-directory", default = "default_output_directory")]
    pub output_directory: String,
}

/// Persistence settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path", default = "default_database_path")]
    pub database_path: String,
}

fn default_fetch_workers() -> usize {
    4
}

fn default_process_workers() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    10_000
}

fn default_image_timeout_ms() -> u64 {
    5_000
}

fn default_min_quality() -> f32 {
    0.1
}

fn default_output_directory() -> String {
    "compressed-images".to_string()
}

fn default_database_path() -> String {
    "sitegrab.db".to_string()
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            fetch_workers: default_fetch_workers(),
            process_workers: default_process_workers(),
            queue_capacity: default_queue_capacity(),
            image_timeout_ms: default_image_timeout_ms(),
        }
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            min_quality: default_min_quality(),
            output_directory: default_output_directory(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Loads and validates a configuration file
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Validates a configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.crawler.fetch_workers < 1 {
        return Err(ConfigError::Validation(
            "fetch-workers must be >= 1".to_string(),
        ));
    }
    if config.crawler.process_workers < 1 {
        return Err(ConfigError::Validation(
            "process-workers must be >= 1".to_string(),
        ));
    }
    if config.crawler.queue_capacity < 1 {
        return Err(ConfigError::Validation(
            "queue-capacity must be >= 1".to_string(),
        ));
    }
    if config.crawler.image_timeout_ms < 1 {
        return Err(ConfigError::Validation(
            "image-timeout-ms must be >= 1".to_string(),
        ));
    }
    if !(config.compression.min_quality > 0.0 && config.compression.min_quality <= 1.0) {
        return Err(ConfigError::Validation(format!(
            "min-quality must be in (0, 1], got {}",
            config.compression.min_quality
        )));
    }
    if config.compression.output_directory.is_empty() {
        return Err(ConfigError::Validation(
            "output-directory cannot be empty".to_string(),
        ));
    }
    if config.storage.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }
    Ok(())
}
