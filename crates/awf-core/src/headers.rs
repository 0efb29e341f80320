//! Inbound header scrubbing.
//!
//! A single stateless filter rather than a general-purpose header-list
//! type, since the core only ever needs "strip these, keep the rest".

use http::{HeaderMap, HeaderName};

const STRIPPED_EXACT: [&str; 6] = [
    "host",
    "authorization",
    "proxy-authorization",
    "x-api-key",
    "forwarded",
    "via",
];

const STRIPPED_PREFIX: &str = "x-forwarded-";

/// Drops headers a client must never be allowed to set: anything that could
/// smuggle credentials or confuse the upstream about who the sidecar is.
pub fn filter_inbound(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        let lower = name.as_str().to_ascii_lowercase();
        if STRIPPED_EXACT.contains(&lower.as_str()) || lower.starts_with(STRIPPED_PREFIX) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

pub fn set(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    if let Ok(value) = http::HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn sample() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert("Host", HeaderValue::from_static("evil.example"));
        h.insert("Authorization", HeaderValue::from_static("Bearer stolen"));
        h.insert("X-Api-Key", HeaderValue::from_static("stolen"));
        h.insert("X-Forwarded-For", HeaderValue::from_static("1.2.3.4"));
        h.insert("X-Forwarded-Proto", HeaderValue::from_static("https"));
        h.insert("Via", HeaderValue::from_static("1.1 evil"));
        h.insert("Forwarded", HeaderValue::from_static("for=1.2.3.4"));
        h.insert("Proxy-Authorization", HeaderValue::from_static("Basic x"));
        h.insert("Content-Type", HeaderValue::from_static("application/json"));
        h.insert("X-Custom", HeaderValue::from_static("keep-me"));
        h
    }

    #[test]
    fn strips_exact_and_prefix_matches_case_insensitively() {
        let filtered = filter_inbound(&sample());
        for name in [
            "host",
            "authorization",
            "x-api-key",
            "x-forwarded-for",
            "x-forwarded-proto",
            "via",
            "forwarded",
            "proxy-authorization",
        ] {
            assert!(!filtered.contains_key(name), "expected {name} to be stripped");
        }
    }

    #[test]
    fn keeps_unrelated_headers() {
        let filtered = filter_inbound(&sample());
        assert!(filtered.contains_key("content-type"));
        assert!(filtered.contains_key("x-custom"));
    }
}
