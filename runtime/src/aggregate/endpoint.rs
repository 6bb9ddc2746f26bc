//! Beacon endpoint normalization.

use url::Url;

/// Reduce a beacon URL to `scheme://host/path` with one trailing `/` removed.
///
/// Port, query, fragment and credentials are dropped so requests that only
/// differ in parameters collapse onto one endpoint.
pub fn normalize_endpoint(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => {
            let path = url.path();
            let path = path.strip_suffix('/').unwrap_or(path);
            format!("{}://{}{}", url.scheme(), url.host_str().unwrap_or(""), path)
        }
        Err(_) => {
            let end = raw.find(['?', '#']).unwrap_or(raw.len());
            let base = &raw[..end];
            base.strip_suffix('/').unwrap_or(base).to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_is_dropped() {
        assert_eq!(
            normalize_endpoint("https://cdn.example/px?x=1"),
            "https://cdn.example/px"
        );
        assert_eq!(
            normalize_endpoint("https://cdn.example/px?x=2"),
            "https://cdn.example/px"
        );
    }

    #[test]
    fn test_trailing_slash_and_port() {
        assert_eq!(
            normalize_endpoint("https://CDN.example:8443/collect/#frag"),
            "https://cdn.example/collect"
        );
        assert_eq!(normalize_endpoint("https://cdn.example/"), "https://cdn.example");
    }

    #[test]
    fn test_unparseable_falls_back() {
        assert_eq!(normalize_endpoint("/relative/beacon/?a=b"), "/relative/beacon");
    }
}
