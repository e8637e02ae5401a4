//! Session registry: the public entry point for starting, stopping and
//! inspecting crawls
//!
//! The registry owns the stores and the image pipeline, tracks every running
//! session by id, and detaches a background task per crawl. Stopping a crawl
//! flips the session's cancellation flag; the crawl task notices, persists a
//! final snapshot and deregisters itself.

use crate::config::Config;
use crate::engine::CrawlEngine;
use crate::fetcher::RetryPolicy;
use crate::image::ImagePipeline;
use crate::proxy::{filter_working_proxies, ProxyInfo, ProxyPool};
use crate::robots::fetch_robots;
use crate::session::CrawlSession;
use crate::storage::{ImageRecord, ImageStore, SessionStore};
use crate::url::{extract_domain, is_same_domain, normalize_url};
use crate::CrawlError;
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

struct SessionHandle {
    session: Arc<CrawlSession>,
    task: JoinHandle<()>,
}

pub struct SessionRegistry {
    sessions: Arc<DashMap<String, SessionHandle>>,
    session_store: Arc<dyn SessionStore>,
    image_store: Arc<dyn ImageStore>,
    pipeline: Arc<ImagePipeline>,
    config: Config,
    retry: RetryPolicy,
}

impl SessionRegistry {
    pub fn new(
        session_store: Arc<dyn SessionStore>,
        image_store: Arc<dyn ImageStore>,
        config: Config,
    ) -> crate::Result<Self> {
        let pipeline = Arc::new(ImagePipeline::new(
            Arc::clone(&image_store),
            config.compression.min_quality,
            PathBuf::from(&config.compression.output_directory),
            Duration::from_millis(config.crawler.image_timeout_ms),
        )?);
        Ok(Self {
            sessions: Arc::new(DashMap::new()),
            session_store,
            image_store,
            pipeline,
            config,
            retry: RetryPolicy::default(),
        })
    }

    /// Overrides the fetch retry policy for all crawls started afterwards
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Starts a crawl of the site the URL belongs to and returns the session
    /// id
    ///
    /// Robots rules are fetched once up front, the supplied proxies are
    /// health-checked, and an unfinished previous session for the same domain
    /// is resumed instead of starting fresh. The crawl itself runs in a
    /// detached background task.
    pub async fn start_crawl(
        &self,
        url: &str,
        max_depth: u32,
        delay_ms: u64,
        proxies: Vec<ProxyInfo>,
    ) -> crate::Result<String> {
        let seed = normalize_url(url)?
            .ok_or_else(|| CrawlError::InvalidUrl(url.to_string()))?;
        let domain =
            extract_domain(&seed).ok_or_else(|| CrawlError::InvalidUrl(url.to_string()))?;

        let robots = fetch_robots(&seed).await;
        let working = filter_working_proxies(proxies).await;
        let pool = ProxyPool::new(working);

        let session = match self.session_store.find_active_session(&domain)? {
            Some(state) => Arc::new(CrawlSession::resume(
                state, seed, max_depth, delay_ms, robots, pool,
            )),
            None => Arc::new(CrawlSession::new(
                seed, domain, max_depth, delay_ms, robots, pool,
            )),
        };
        self.session_store.save_session(&session.snapshot())?;

        let id = session.id().to_string();
        info!(
            session = %id,
            domain = session.domain(),
            proxies = session.proxies().len(),
            "Registered crawl session"
        );

        let engine = CrawlEngine::new(
            Arc::clone(&session),
            Arc::clone(&self.pipeline),
            self.retry.clone(),
            &self.config.crawler,
        );

        let sessions = Arc::clone(&self.sessions);
        let session_store = Arc::clone(&self.session_store);
        let task_session = Arc::clone(&session);
        let task_id = id.clone();
        let task = tokio::spawn(async move {
            engine.run().await;

            if let Err(e) = session_store.save_session(&task_session.snapshot()) {
                error!(session = %task_id, error = %e, "Failed to persist session snapshot");
            }
            if !task_session.is_canceled() {
                // Canceled sessions stay unfinished so the next crawl of the
                // domain resumes them.
                if let Err(e) = session_store.mark_finished(task_session.id()) {
                    error!(session = %task_id, error = %e, "Failed to mark session finished");
                }
            }
            sessions.remove(&task_id);
        });

        self.sessions.insert(id.clone(), SessionHandle { session, task });
        Ok(id)
    }

    /// Requests cancellation of a running crawl
    ///
    /// Returns false when no session with that id is running.
    pub fn stop_crawl(&self, id: &str) -> bool {
        match self.sessions.get(id) {
            Some(handle) => {
                handle.session.cancel();
                true
            }
            None => {
                warn!(session = %id, "Stop requested for unknown session");
                false
            }
        }
    }

    /// The running session with the given id, if any
    pub fn session(&self, id: &str) -> Option<Arc<CrawlSession>> {
        self.sessions.get(id).map(|h| Arc::clone(&h.session))
    }

    pub fn running_count(&self) -> usize {
        self.sessions.len()
    }

    /// Waits for a session to finish and deregister itself
    pub async fn wait_for(&self, id: &str) {
        while self.sessions.contains_key(id) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Cancels every running crawl and aborts their tasks
    pub fn shutdown(&self) {
        for entry in self.sessions.iter() {
            entry.session.cancel();
            entry.task.abort();
        }
        self.sessions.clear();
    }

    /// Compressed images recorded for a site
    ///
    /// The site may be given as a URL or a bare domain. Matches records whose
    /// source URL belongs to the domain, falling back to a stored-path match
    /// for inline images that have no source host.
    pub fn list_images(&self, site: &str) -> crate::Result<Vec<ImageRecord>> {
        let domain = match normalize_url(site) {
            Ok(Some(url)) => extract_domain(&url)
                .ok_or_else(|| CrawlError::InvalidUrl(site.to_string()))?,
            _ => site.trim().to_lowercase(),
        };
        if domain.is_empty() {
            return Err(CrawlError::InvalidUrl(site.to_string()));
        }

        let records = self
            .image_store
            .list_all()?
            .into_iter()
            .filter(|r| {
                is_same_domain(&r.original_url, &domain)
                    || r.path.split(std::path::MAIN_SEPARATOR).any(|c| c == domain)
            })
            .collect();
        Ok(records)
    }
}
