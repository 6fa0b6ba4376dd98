use crate::UrlError;
use url::Url;

/// Tracking query parameters that never change the content of a listing page
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid"];

/// Canonicalises a URL so that equivalent links share one frontier key
///
/// # Canonicalisation Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Accept only `http` and `https`
/// 3. Lowercase the host (the `url` crate also drops default ports and resolves dot segments)
/// 4. Remove the fragment
/// 5. Remove tracking query parameters (`utm_*`, `fbclid`, `gclid`)
/// 6. Sort the remaining query parameters by key, keeping the relative order of repeated keys
/// 7. Remove an empty query string
///
/// Unlike a general-purpose normaliser, the scheme, `www.` prefix and trailing slashes are
/// preserved: listing sites route on them, and a canonical URL must still be loadable.
///
/// # Examples
///
/// ```
/// use tile_harvest::url::canonical_url;
///
/// let url = canonical_url("https://Example.COM/s/homes?zoom=16&ne_lat=4.7#map").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/s/homes?ne_lat=4.7&zoom=16");
/// ```
pub fn canonical_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    match url.host_str() {
        Some(host) => {
            let lowered = host.to_lowercase();
            if lowered != host {
                url.set_host(Some(&lowered))
                    .map_err(|e| UrlError::Parse(format!("Failed to set host: {}", e)))?;
            }
        }
        None => return Err(UrlError::MissingHost),
    }

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Filters out tracking parameters and sorts remaining query parameters
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    // Stable sort keeps repeated keys (e.g. refinement_paths[]) in their original order
    params.sort_by(|a, b| a.0.cmp(&b.0));

    params
}

fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}
