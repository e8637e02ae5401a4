//! Proxy parsing, health checking and round-robin rotation
//!
//! User-supplied proxies are probed once at session start; only the ones that
//! can complete a real HTTPS request are kept. The surviving set is rotated
//! round-robin across fetches for the lifetime of the session.

use crate::CrawlError;
use futures::future::join_all;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

const PROBE_URL: &str = "https://www.google.com";
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// A single proxy endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyInfo {
    pub host: String,
    pub port: u16,
}

impl ProxyInfo {
    /// Proxy URL in the form reqwest expects
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ProxyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for ProxyInfo {
    type Err = CrawlError;

    /// Parses `host:port` into a proxy endpoint
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| CrawlError::InvalidProxy(s.to_string()))?;
        if host.is_empty() {
            return Err(CrawlError::InvalidProxy(s.to_string()));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| CrawlError::InvalidProxy(s.to_string()))?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

/// Round-robin rotation over a fixed proxy set
///
/// Selection is a single atomic increment, so any number of fetch workers can
/// share one pool without locking.
#[derive(Debug, Default)]
pub struct ProxyPool {
    proxies: Vec<ProxyInfo>,
    cursor: AtomicUsize,
}

impl ProxyPool {
    pub fn new(proxies: Vec<ProxyInfo>) -> Self {
        Self {
            proxies,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Next proxy in rotation, or None when the pool is empty
    pub fn select(&self) -> Option<&ProxyInfo> {
        if self.proxies.is_empty() {
            return None;
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.proxies.len();
        Some(&self.proxies[idx])
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }
}

/// Probes all proxies concurrently and keeps the working ones
///
/// A proxy is working when a GET through it to a well-known HTTPS endpoint
/// returns a success status within the probe timeout. Certificate validation
/// is relaxed since many rotating proxies re-sign TLS traffic.
pub async fn filter_working_proxies(proxies: Vec<ProxyInfo>) -> Vec<ProxyInfo> {
    if proxies.is_empty() {
        return proxies;
    }

    let total = proxies.len();
    let probes = proxies.into_iter().map(|proxy| async move {
        if probe_proxy(&proxy).await {
            Some(proxy)
        } else {
            None
        }
    });

    let working: Vec<ProxyInfo> = join_all(probes).await.into_iter().flatten().collect();
    info!(working = working.len(), total, "Proxy health check complete");
    working
}

async fn probe_proxy(proxy: &ProxyInfo) -> bool {
    let reqwest_proxy = match reqwest::Proxy::all(proxy.url()) {
        Ok(p) => p,
        Err(e) => {
            warn!(proxy = %proxy, error = %e, "Invalid proxy URL");
            return false;
        }
    };

    let client = match reqwest::Client::builder()
        .proxy(reqwest_proxy)
        .danger_accept_invalid_certs(true)
        .timeout(PROBE_TIMEOUT)
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            warn!(proxy = %proxy, error = %e, "Failed to build probe client");
            return false;
        }
    };

    match client.get(PROBE_URL).send().await {
        Ok(resp) if resp.status().is_success() => {
            debug!(proxy = %proxy, "Proxy is working");
            true
        }
        Ok(resp) => {
            debug!(proxy = %proxy, status = %resp.status(), "Proxy probe rejected");
            false
        }
        Err(e) => {
            debug!(proxy = %proxy, error = %e, "Proxy probe failed");
            false
        }
    }
}
