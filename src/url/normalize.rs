use crate::UrlError;
use url::Url;

/// Normalizes a URL for dedup and fetching
///
/// # Normalization Steps
///
/// 1. Trim surrounding whitespace; blank input yields `Ok(None)`
/// 2. Parse the URL; reject if malformed
/// 3. Reject schemes other than HTTP and HTTPS
/// 4. Lowercase scheme and host (the parser already does this)
/// 5. Drop the default port for http (80) / https (443)
/// 6. Resolve dot segments in the path
/// 7. Remove the fragment
///
/// The query string is left untouched: two URLs that differ only in query
/// parameters address different resources as far as the crawl is concerned.
///
/// Idempotent: `normalize_url` of an already-normalized URL returns the same
/// URL.
///
/// # Arguments
///
/// * `raw` - The URL string to normalize
///
/// # Returns
///
/// * `Ok(Some(Url))` - Normalized URL
/// * `Ok(None)` - Input was empty or whitespace-only
/// * `Err(UrlError)` - Malformed URL or unsupported scheme
///
/// # Examples
///
/// ```
/// use sitegrab::url::normalize_url;
///
/// let url = normalize_url("  HTTP://EXAMPLE.COM ").unwrap().unwrap();
/// assert_eq!(url.as_str(), "http://example.com/");
///
/// let url = normalize_url("http://example.com:80/page#top").unwrap().unwrap();
/// assert_eq!(url.as_str(), "http://example.com/page");
/// ```
pub fn normalize_url(raw: &str) -> Result<Option<Url>, UrlError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    // The url crate lowercases scheme and host, strips default ports and
    // resolves dot segments during parsing.
    let mut url = Url::parse(trimmed).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    url.set_fragment(None);

    Ok(Some(url))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalized(raw: &str) -> String {
        normalize_url(raw).unwrap().unwrap().as_str().to_string()
    }

    #[test]
    fn test_lowercase_scheme_and_host() {
        assert_eq!(normalized("HTTP://EXAMPLE.COM"), "http://example.com/");
        assert_eq!(
            normalized("https://WWW.Example.COM/Page"),
            "https://www.example.com/Page"
        );
    }

    #[test]
    fn test_trims_whitespace() {
        assert_eq!(normalized("  http://example.com  "), "http://example.com/");
    }

    #[test]
    fn test_blank_input_is_no_result() {
        assert!(normalize_url("").unwrap().is_none());
        assert!(normalize_url("   ").unwrap().is_none());
    }

    #[test]
    fn test_default_port_dropped() {
        assert_eq!(
            normalized("http://example.com:80/page"),
            "http://example.com/page"
        );
        assert_eq!(
            normalized("https://example.com:443/page"),
            "https://example.com/page"
        );
    }

    #[test]
    fn test_nondefault_port_kept() {
        assert_eq!(
            normalized("http://example.com:8080/page"),
            "http://example.com:8080/page"
        );
    }

    #[test]
    fn test_fragment_removed() {
        assert_eq!(
            normalized("http://example.com/page#section"),
            "http://example.com/page"
        );
    }

    #[test]
    fn test_dot_segments_resolved() {
        assert_eq!(
            normalized("http://example.com/a/../b/./c"),
            "http://example.com/b/c"
        );
    }

    #[test]
    fn test_query_preserved() {
        assert_eq!(
            normalized("http://example.com/page?b=2&a=1"),
            "http://example.com/page?b=2&a=1"
        );
    }

    #[test]
    fn test_idempotent() {
        let once = normalized("  HTTP://EXAMPLE.COM:80/a/../b#frag  ");
        assert_eq!(normalized(&once), once);
    }

    #[test]
    fn test_malformed_url_is_error() {
        assert!(matches!(
            normalize_url("not a url"),
            Err(UrlError::Parse(_))
        ));
    }

    #[test]
    fn test_invalid_scheme_is_error() {
        assert!(matches!(
            normalize_url("ftp://example.com/file"),
            Err(UrlError::InvalidScheme(_))
        ));
    }
}
