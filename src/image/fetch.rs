//! Image byte retrieval
//!
//! Image references come in three shapes: inline data URIs, templated URLs
//! with `{placeholder}` segments left unexpanded by the page, and plain URLs.
//! The first matching strategy handles the reference.

use super::ImageError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// How an image reference is turned into bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// Bytes are embedded in the URL itself
    DataUri,
    /// URL contains `{...}` placeholders that need substitution first
    Template,
    /// Plain URL fetched over HTTP
    Regular,
}

impl FetchStrategy {
    /// Picks the strategy for a reference; first match wins
    pub fn for_url(url: &str) -> Self {
        if url.starts_with("data:") {
            Self::DataUri
        } else if url.contains('{') && url.contains('}') {
            Self::Template
        } else {
            Self::Regular
        }
    }
}

fn template_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"\{[^}]*\}").unwrap())
}

/// Retrieves the raw bytes for an image reference
///
/// Returns `Ok(None)` when the image is unavailable (HTTP failure, template
/// that cannot be resolved); those are logged and skipped, not fatal.
pub async fn fetch_image_bytes(
    client: &reqwest::Client,
    url: &str,
) -> Result<Option<Vec<u8>>, ImageError> {
    match FetchStrategy::for_url(url) {
        FetchStrategy::DataUri => decode_data_uri(url).map(Some),
        FetchStrategy::Template => match substitute_template(url) {
            Some(resolved) => http_get_bytes(client, &resolved).await,
            None => Ok(None),
        },
        FetchStrategy::Regular => {
            let prepared = prepare_image_url(url);
            http_get_bytes(client, &prepared).await
        }
    }
}

/// Decodes an inline `data:` URI into raw bytes
///
/// Base64-encoded payloads are base64-decoded; everything else is treated as
/// percent-encoded text.
fn decode_data_uri(uri: &str) -> Result<Vec<u8>, ImageError> {
    let (header, payload) = uri
        .split_once(',')
        .ok_or_else(|| ImageError::InvalidDataUri("missing comma separator".to_string()))?;

    if header.ends_with(";base64") {
        STANDARD
            .decode(payload)
            .map_err(|e| ImageError::InvalidDataUri(format!("bad base64 payload: {}", e)))
    } else {
        urlencoding::decode(payload)
            .map(|s| s.into_owned().into_bytes())
            .map_err(|e| ImageError::InvalidDataUri(format!("bad percent encoding: {}", e)))
    }
}

/// Fills `{placeholder}` segments with a default value
///
/// Pages sometimes emit lazy-loading templates verbatim; substituting a
/// default occasionally yields a fetchable URL. Returns None when the result
/// still is not a plausible URL.
fn substitute_template(url: &str) -> Option<String> {
    let resolved = template_re().replace_all(url, "default").into_owned();
    if resolved.contains('{') || resolved.contains('}') {
        warn!(url, "Unresolvable template image URL, skipping");
        return None;
    }
    debug!(url, resolved, "Substituted template image URL");
    Some(resolved)
}

/// Normalizes a plain image URL before fetching
///
/// Percent-decodes the URL and drops the query string; CDNs frequently use
/// the query only for resize hints, and dropping it fetches the original.
fn prepare_image_url(url: &str) -> String {
    let decoded = urlencoding::decode(url)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| url.to_string());
    match decoded.split_once('?') {
        Some((base, _)) => base.to_string(),
        None => decoded,
    }
}

async fn http_get_bytes(
    client: &reqwest::Client,
    url: &str,
) -> Result<Option<Vec<u8>>, ImageError> {
    let response = match client.get(url).send().await {
        Ok(r) => r,
        Err(e) => {
            debug!(url, error = %e, "Image request failed");
            return Ok(None);
        }
    };

    if !response.status().is_success() {
        debug!(url, status = %response.status(), "Image request rejected");
        return Ok(None);
    }

    match response.bytes().await {
        Ok(bytes) => Ok(Some(bytes.to_vec())),
        Err(e) => {
            debug!(url, error = %e, "Failed to read image body");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_selection() {
        assert_eq!(
            FetchStrategy::for_url("data:image/png;base64,abcd"),
            FetchStrategy::DataUri
        );
        assert_eq!(
            FetchStrategy::for_url("http://cdn.example.com/{width}/img.jpg"),
            FetchStrategy::Template
        );
        assert_eq!(
            FetchStrategy::for_url("http://example.com/img.jpg"),
            FetchStrategy::Regular
        );
    }

    #[test]
    fn test_decode_base64_data_uri() {
        // "hello" in base64
        let bytes = decode_data_uri("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn test_decode_percent_encoded_data_uri() {
        let bytes = decode_data_uri("data:text/plain,hello%20world").unwrap();
        assert_eq!(bytes, b"hello world");
    }

    #[test]
    fn test_decode_malformed_data_uri() {
        assert!(matches!(
            decode_data_uri("data:image/png;base64"),
            Err(ImageError::InvalidDataUri(_))
        ));
        assert!(matches!(
            decode_data_uri("data:image/png;base64,!!!not-base64!!!"),
            Err(ImageError::InvalidDataUri(_))
        ));
    }

    #[test]
    fn test_substitute_template() {
        assert_eq!(
            substitute_template("http://cdn.example.com/{width}x{height}/img.jpg").as_deref(),
            Some("http://cdn.example.com/defaultxdefault/img.jpg")
        );
    }

    #[test]
    fn test_prepare_image_url_strips_query() {
        assert_eq!(
            prepare_image_url("http://example.com/img.jpg?w=100&h=50"),
            "http://example.com/img.jpg"
        );
    }

    #[test]
    fn test_prepare_image_url_percent_decodes() {
        assert_eq!(
            prepare_image_url("http://example.com/my%20image.jpg"),
            "http://example.com/my image.jpg"
        );
    }
}
