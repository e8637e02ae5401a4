//! Crawl session state
//!
//! A session owns everything scoped to one crawl of one site: the visited
//! sets, the robots rules, the proxy rotation, the rate limiter, the
//! cancellation flag and the pending-work counter that signals completion.

use crate::limiter::RateLimiter;
use crate::proxy::ProxyPool;
use crate::robots::{RobotsRules, ROBOTS_USER_AGENT};
use crate::storage::SessionState;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;
use tracing::debug;
use url::Url;
use uuid::Uuid;

/// State for a single crawl of a single site
///
/// Shared across workers behind an `Arc`; all interior state uses lock-free
/// structures so no method takes `&mut self`.
pub struct CrawlSession {
    id: String,
    seed: Url,
    domain: String,
    max_depth: u32,
    delay_ms: u64,
    robots: Option<RobotsRules>,
    proxies: ProxyPool,
    visited_links: dashmap::DashSet<String>,
    visited_images: dashmap::DashSet<String>,
    canceled: AtomicBool,
    limiter: RateLimiter,
    pending: AtomicUsize,
    drained: Notify,
}

/// Picks the delay between requests for a session
///
/// A positive robots.txt crawl-delay overrides the user-requested delay;
/// otherwise the user delay applies.
pub fn effective_delay(robots: Option<&RobotsRules>, user_delay_ms: u64) -> u64 {
    match robots.and_then(|r| r.crawl_delay_ms()) {
        Some(ms) if ms > 0 => ms,
        _ => user_delay_ms,
    }
}

impl CrawlSession {
    /// Creates a fresh session with a new random id
    pub fn new(
        seed: Url,
        domain: String,
        max_depth: u32,
        user_delay_ms: u64,
        robots: Option<RobotsRules>,
        proxies: ProxyPool,
    ) -> Self {
        let id = Uuid::new_v4().to_string();
        Self::with_id(id, seed, domain, max_depth, user_delay_ms, robots, proxies, Vec::new())
    }

    /// Rebuilds a session from persisted state
    ///
    /// The previously visited links seed the dedup set so already-fetched
    /// pages are not fetched again.
    pub fn resume(
        state: SessionState,
        seed: Url,
        max_depth: u32,
        user_delay_ms: u64,
        robots: Option<RobotsRules>,
        proxies: ProxyPool,
    ) -> Self {
        debug!(
            session = %state.id,
            visited = state.visited_links.len(),
            "Resuming crawl session"
        );
        Self::with_id(
            state.id,
            seed,
            state.domain,
            max_depth,
            user_delay_ms,
            robots,
            proxies,
            state.visited_links,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn with_id(
        id: String,
        seed: Url,
        domain: String,
        max_depth: u32,
        user_delay_ms: u64,
        robots: Option<RobotsRules>,
        proxies: ProxyPool,
        visited: Vec<String>,
    ) -> Self {
        let delay_ms = effective_delay(robots.as_ref(), user_delay_ms);
        let visited_links = dashmap::DashSet::new();
        for link in visited {
            visited_links.insert(link);
        }
        Self {
            id,
            seed,
            domain,
            max_depth,
            delay_ms,
            robots,
            proxies,
            visited_links,
            visited_images: dashmap::DashSet::new(),
            canceled: AtomicBool::new(false),
            limiter: RateLimiter::new(delay_ms),
            pending: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn seed(&self) -> &Url {
        &self.seed
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms
    }

    pub fn proxies(&self) -> &ProxyPool {
        &self.proxies
    }

    /// Checks a URL against the cached robots rules
    pub fn robots_allows(&self, url: &str) -> bool {
        crate::robots::is_allowed(self.robots.as_ref(), url, ROBOTS_USER_AGENT)
    }

    /// Waits for the next polite request slot
    pub async fn acquire_permit(&self) {
        self.limiter.acquire().await;
    }

    /// Claims a link for fetching; false if it was already claimed
    pub fn mark_visited_link(&self, url: &str) -> bool {
        self.visited_links.insert(url.to_string())
    }

    /// Claims an image for processing; false if it was already claimed
    pub fn mark_visited_image(&self, url: &str) -> bool {
        self.visited_images.insert(url.to_string())
    }

    pub fn visited_link_count(&self) -> usize {
        self.visited_links.len()
    }

    /// Snapshot of the session for persistence
    pub fn snapshot(&self) -> SessionState {
        SessionState {
            id: self.id.clone(),
            domain: self.domain.clone(),
            visited_links: self.visited_links.iter().map(|e| e.key().clone()).collect(),
        }
    }

    /// Requests cancellation
    ///
    /// Idempotent. Wakes anything waiting for the session to drain.
    pub fn cancel(&self) {
        if !self.canceled.swap(true, Ordering::SeqCst) {
            debug!(session = %self.id, "Session canceled");
        }
        self.drained.notify_waiters();
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Registers a unit of outstanding work
    ///
    /// Must be called before the work is enqueued or spawned, so the counter
    /// can never observe zero while work is still in flight.
    pub fn task_started(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    /// Retires a unit of work; wakes waiters when the last one retires
    pub fn task_finished(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }

    pub fn pending_tasks(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Waits until no work is outstanding or the session is canceled
    pub async fn wait_until_drained(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            // Register before checking, so a wakeup between the check and the
            // await is not lost.
            notified.as_mut().enable();
            if self.pending.load(Ordering::SeqCst) == 0 || self.is_canceled() {
                return;
            }
            notified.await;
        }
    }
}
