//! Page fetching with retry, backoff and proxy rotation
//!
//! Every fetch attempt classifies its failure as transient or permanent.
//! Transient failures (timeouts, connection resets, 429, 502) are retried
//! with exponential backoff; permanent ones (404, other HTTP errors, body
//! decode failures) give up immediately. A fetch that exhausts its attempts
//! resolves to nothing rather than an error, so one bad page never stops the
//! crawl.

use crate::proxy::ProxyPool;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Browser user agents rotated randomly across fetches
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/111.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.4 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/112.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:109.0) Gecko/20100101 Firefox/112.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/111.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Safari/537.36 Edg/112.0.1722.39",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 16_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.4 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
];

/// A fetch failure, classified by whether retrying could help
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Transient fetch failure: {0}")]
    Transient(String),

    #[error("Permanent fetch failure: {0}")]
    Permanent(String),
}

/// Retry behavior for page fetches
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(2000),
            multiplier: 2.0,
        }
    }
}

/// A fetched page, ready for extraction
///
/// Carries the raw body rather than a parsed DOM so it can cross thread and
/// queue boundaries; parsing happens in the processing stage.
#[derive(Debug, Clone)]
pub struct PageDocument {
    pub url: Url,
    pub body: String,
}

/// Picks a random user agent from the rotation pool
pub fn random_user_agent() -> &'static str {
    let idx = rand::thread_rng().gen_range(0..USER_AGENTS.len());
    USER_AGENTS[idx]
}

/// Fetches a page, retrying transient failures per the policy
///
/// Returns None when the fetch ultimately fails; the caller moves on to the
/// next URL.
pub async fn fetch_document(
    url: &Url,
    proxies: &ProxyPool,
    policy: &RetryPolicy,
) -> Option<PageDocument> {
    let mut backoff = policy.initial_backoff;

    for attempt in 1..=policy.max_attempts {
        match try_fetch(url, proxies).await {
            Ok(doc) => {
                debug!(url = %url, attempt, bytes = doc.body.len(), "Fetched page");
                return Some(doc);
            }
            Err(FetchError::Permanent(reason)) => {
                warn!(url = %url, attempt, reason, "Giving up on page");
                return None;
            }
            Err(FetchError::Transient(reason)) => {
                if attempt == policy.max_attempts {
                    warn!(url = %url, attempt, reason, "Retries exhausted for page");
                    return None;
                }
                debug!(url = %url, attempt, reason, backoff_ms = backoff.as_millis() as u64, "Retrying fetch");
                tokio::time::sleep(backoff).await;
                backoff = backoff.mul_f64(policy.multiplier);
            }
        }
    }
    None
}

async fn try_fetch(url: &Url, proxies: &ProxyPool) -> Result<PageDocument, FetchError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

    let mut builder = reqwest::Client::builder()
        .user_agent(random_user_agent())
        .default_headers(headers)
        .timeout(REQUEST_TIMEOUT);

    if let Some(proxy) = proxies.select() {
        let reqwest_proxy = reqwest::Proxy::all(proxy.url())
            .map_err(|e| FetchError::Permanent(format!("invalid proxy {}: {}", proxy, e)))?;
        // Rotating proxies commonly re-sign TLS traffic.
        builder = builder
            .proxy(reqwest_proxy)
            .danger_accept_invalid_certs(true);
    }

    let client = builder
        .build()
        .map_err(|e| FetchError::Permanent(format!("client build: {}", e)))?;

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| FetchError::Transient(format!("request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(classify_status(status));
    }

    let body = response
        .text()
        .await
        .map_err(|e| FetchError::Permanent(format!("body decode: {}", e)))?;

    Ok(PageDocument {
        url: url.clone(),
        body,
    })
}

/// Maps an HTTP error status onto retryability
fn classify_status(status: StatusCode) -> FetchError {
    match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::BAD_GATEWAY => {
            FetchError::Transient(format!("status {}", status))
        }
        _ => FetchError::Permanent(format!("status {}", status)),
    }
}
