//! End-to-end image handling for the crawl
//!
//! The pipeline ties together retrieval, the size gate, compression and the
//! image store. It is shared across all sessions; dedup against the store
//! means the same image URL is never compressed twice even across crawls.

use super::compress::Compressor;
use super::fetch::fetch_image_bytes;
use crate::storage::{ImageRecord, ImageStore};
use dashmap::{DashMap, DashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Images smaller than this are not worth compressing
const MIN_IMAGE_BYTES: usize = 200 * 1024;

/// Fetches, filters, compresses and records images
pub struct ImagePipeline {
    client: reqwest::Client,
    store: Arc<dyn ImageStore>,
    compressor: Compressor,
    output_dir: PathBuf,
    processed: DashSet<String>,
    domain_dirs: DashMap<String, PathBuf>,
}

impl ImagePipeline {
    /// Builds the pipeline
    ///
    /// `fetch_timeout` bounds every image GET; a server that never responds
    /// must not hold the crawl's pending-work accounting open.
    pub fn new(
        store: Arc<dyn ImageStore>,
        min_quality: f32,
        output_dir: PathBuf,
        fetch_timeout: Duration,
    ) -> crate::Result<Self> {
        let client = reqwest::Client::builder().timeout(fetch_timeout).build()?;
        Ok(Self {
            client,
            store,
            compressor: Compressor::new(min_quality),
            output_dir,
            processed: DashSet::new(),
            domain_dirs: DashMap::new(),
        })
    }

    /// Processes one image URL found on a page of the given domain
    ///
    /// Skips images already handled this process or already in the store,
    /// images that cannot be retrieved, and images below the size threshold.
    pub async fn process_image(&self, url: &str, domain: &str) -> crate::Result<()> {
        if !self.processed.insert(url.to_string()) {
            return Ok(());
        }

        let bytes = match fetch_image_bytes(&self.client, url).await? {
            Some(bytes) => bytes,
            None => {
                debug!(url, "Image unavailable, skipping");
                return Ok(());
            }
        };

        if bytes.len() < MIN_IMAGE_BYTES {
            debug!(url, size = bytes.len(), "Image below size threshold, skipping");
            return Ok(());
        }

        if self.store.exists_by_original_url(url)? {
            debug!(url, "Image already stored, skipping");
            return Ok(());
        }

        let dir = self.domain_dir(domain)?;
        let result = self.compressor.compress_and_save(&bytes, &dir)?;

        self.store.save(&ImageRecord {
            original_url: url.to_string(),
            path: result.path.to_string_lossy().into_owned(),
            original_size: bytes.len() as u64,
            compressed_size: result.compressed_size,
        })?;

        info!(
            url,
            original = bytes.len(),
            compressed = result.compressed_size,
            "Image compressed and stored"
        );
        Ok(())
    }

    /// Output directory for a domain, created on first use
    fn domain_dir(&self, domain: &str) -> std::io::Result<PathBuf> {
        if let Some(dir) = self.domain_dirs.get(domain) {
            return Ok(dir.clone());
        }
        let dir = self.output_dir.join(sanitize_domain(domain));
        match std::fs::create_dir_all(&dir) {
            Ok(()) => {
                self.domain_dirs.insert(domain.to_string(), dir.clone());
                Ok(dir)
            }
            Err(e) => {
                warn!(domain, error = %e, "Failed to create image output directory");
                Err(e)
            }
        }
    }
}

/// Makes a domain safe to use as a directory name
fn sanitize_domain(domain: &str) -> String {
    domain
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
