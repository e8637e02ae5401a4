use url::Url;

/// Extracts the domain from a URL
///
/// Retrieves the host portion of a URL and converts it to lowercase. If the
/// URL has no host (which shouldn't happen for valid HTTP(S) URLs), returns
/// None.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sitegrab::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Checks if the given URL belongs to the specified domain
///
/// A URL matches when its host equals the domain exactly, equals
/// `www.<domain>`, or is any subdomain (`<anything>.<domain>`). The
/// comparison is case-insensitive. Malformed URLs never match.
///
/// # Arguments
///
/// * `url` - The URL to check
/// * `domain` - The domain to compare against
///
/// # Examples
///
/// ```
/// use sitegrab::url::is_same_domain;
///
/// assert!(is_same_domain("http://sub.example.com/x", "example.com"));
/// assert!(!is_same_domain("http://example.org/x", "example.com"));
/// ```
pub fn is_same_domain(url: &str, domain: &str) -> bool {
    let parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(_) => return false,
    };
    let host = match parsed.host_str() {
        Some(h) => h.to_lowercase(),
        None => return false,
    };
    let domain = domain.to_lowercase();

    host == domain || host == format!("www.{}", domain) || host.ends_with(&format!(".{}", domain))
}
