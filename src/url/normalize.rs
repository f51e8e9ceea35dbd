use crate::UrlError;
use url::Url;

/// Normalizes a URL so that equivalent spellings share one visited-set key
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Reject anything but http:// and https://
/// 3. Lowercase the host (the scheme is preserved)
/// 4. Normalize path:
///    - Collapse repeated slashes
///    - Remove dot segments (. and ..)
///    - Keep a trailing slash, which changes how relative links resolve
///    - Empty path becomes /
/// 5. Remove fragment (everything after #)
/// 6. Sort query parameters by key, dropping an empty query string
///
/// # Examples
///
/// ```
/// use site_binder::url::normalize_url;
///
/// let url = normalize_url("https://EXAMPLE.COM/docs/?b=2&a=1#intro").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/docs/?a=1&b=2");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize_parsed(url)
}

/// Normalizes an already-parsed URL
pub fn normalize_parsed(mut url: Url) -> Result<Url, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    let host = url.host_str().ok_or(UrlError::MissingHost)?.to_lowercase();
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Parse(format!("Failed to set host: {}", e)))?;

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if url.query().is_some() {
        let params = sorted_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Normalizes a URL path by removing dot segments and repeated slashes
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    let trailing = if path.ends_with('/') { "/" } else { "" };
    format!("/{}{}", segments.join("/"), trailing)
}

/// Returns query parameters sorted by key (stable for repeated keys)
fn sorted_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    params.sort_by(|a, b| a.0.cmp(&b.0));
    params
}
