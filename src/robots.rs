//! Robots.txt fetching and rule evaluation
//!
//! The robots file for a site is fetched once when a crawl session starts and
//! cached on the session. Fetch failures are treated as "no rules": the crawl
//! proceeds unrestricted rather than stalling on an unreachable robots.txt.

use robotstxt::DefaultMatcher;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// User agent sent when fetching robots.txt and evaluating its rules
pub const ROBOTS_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Safari/537.36";

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Parsed robots.txt rules for one site
///
/// Keeps the raw content for the allow/disallow matcher plus the crawl-delay
/// directive, which the matcher does not expose.
#[derive(Debug, Clone)]
pub struct RobotsRules {
    content: String,
    crawl_delay_ms: Option<u64>,
}

impl RobotsRules {
    /// Parses robots.txt content
    pub fn parse(content: &str) -> Self {
        let crawl_delay_ms = parse_crawl_delay(content);
        Self {
            content: content.to_string(),
            crawl_delay_ms,
        }
    }

    /// Checks whether the given URL may be fetched by the given user agent
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Crawl-delay directive in milliseconds, if one was present
    pub fn crawl_delay_ms(&self) -> Option<u64> {
        self.crawl_delay_ms
    }
}

/// Checks a URL against optionally-present rules
///
/// Absent rules (robots.txt missing or unreachable) allow everything.
pub fn is_allowed(rules: Option<&RobotsRules>, url: &str, user_agent: &str) -> bool {
    match rules {
        Some(r) => r.is_allowed(url, user_agent),
        None => true,
    }
}

/// Fetches and parses robots.txt for the given site origin
///
/// The robots URL is derived from the origin's scheme, host and port. Returns
/// None when the file is missing or the request fails; the crawl then runs
/// without robots restrictions.
pub async fn fetch_robots(origin: &Url) -> Option<RobotsRules> {
    let robots_url = match origin.join("/robots.txt") {
        Ok(u) => u,
        Err(e) => {
            warn!(origin = %origin, error = %e, "Could not build robots.txt URL");
            return None;
        }
    };

    let client = match reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .user_agent(ROBOTS_USER_AGENT)
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to build robots.txt client");
            return None;
        }
    };

    match client.get(robots_url.clone()).send().await {
        Ok(resp) if resp.status().is_success() => match resp.text().await {
            Ok(body) => {
                debug!(url = %robots_url, bytes = body.len(), "Fetched robots.txt");
                Some(RobotsRules::parse(&body))
            }
            Err(e) => {
                warn!(url = %robots_url, error = %e, "Failed to read robots.txt body");
                None
            }
        },
        Ok(resp) => {
            debug!(url = %robots_url, status = %resp.status(), "No robots.txt");
            None
        }
        Err(e) => {
            warn!(url = %robots_url, error = %e, "Failed to fetch robots.txt");
            None
        }
    }
}

/// Extracts the first crawl-delay directive from robots.txt content
///
/// The value is specified in seconds (possibly fractional) and converted to
/// milliseconds. Unparseable or non-positive values are ignored.
fn parse_crawl_delay(content: &str) -> Option<u64> {
    for line in content.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if let Some((key, value)) = line.split_once(':') {
            if key.trim().eq_ignore_ascii_case("crawl-delay") {
                if let Ok(seconds) = value.trim().parse::<f64>() {
                    if seconds > 0.0 {
                        return Some((seconds * 1000.0) as u64);
                    }
                }
            }
        }
    }
    None
}
