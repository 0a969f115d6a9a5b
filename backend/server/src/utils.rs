use axum::http::{HeaderMap, header::ORIGIN};

pub const UNKNOWN_CLIENT: &str = "unknown";

const FORWARDED_HEADERS: [&str; 2] = ["x-forwarded-for", "x-real-ip"];

/// First address of the first forwarding header present. Address-less clients share one key.
pub fn client_key(headers: &HeaderMap) -> String {
    FORWARDED_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(',').next())
        .map(str::trim)
        .find(|address| !address.is_empty())
        .unwrap_or(UNKNOWN_CLIENT)
        .to_string()
}

/// Requests without an `Origin` header pass, as do all requests when no origins are configured.
pub fn origin_allowed(headers: &HeaderMap, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }

    match headers.get(ORIGIN).map(|origin| origin.to_str()) {
        None => true,
        Some(Ok(origin)) => {
            let origin = origin.trim_end_matches('/');
            allowed.iter().any(|allowed| allowed == origin)
        }
        Some(Err(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn test_client_key_prefers_forwarded_for() {
        let map = headers(&[
            ("x-forwarded-for", "203.0.113.9, 10.0.0.1"),
            ("x-real-ip", "10.0.0.1"),
        ]);

        assert_eq!(client_key(&map), "203.0.113.9");
    }

    #[test]
    fn test_client_key_falls_back() {
        assert_eq!(client_key(&headers(&[("x-real-ip", "198.51.100.4")])), "198.51.100.4");
        assert_eq!(client_key(&headers(&[("x-forwarded-for", " ")])), UNKNOWN_CLIENT);
        assert_eq!(client_key(&HeaderMap::new()), UNKNOWN_CLIENT);
    }

    #[test]
    fn test_origin_allowed() {
        let allowed = vec!["https://rentals.example".to_string()];

        assert!(origin_allowed(&HeaderMap::new(), &allowed));
        assert!(origin_allowed(&headers(&[("origin", "https://rentals.example/")]), &allowed));
        assert!(!origin_allowed(&headers(&[("origin", "https://evil.example")]), &allowed));
        assert!(origin_allowed(&headers(&[("origin", "https://evil.example")]), &[]));
    }
}
