//! Request protection: pattern detection, blacklist checks and rate limiting.
//!
//! Every `/api` request passes through two middleware layers, in order:
//!
//! 1. [`patterns::detect_suspicious_patterns`]: scans the URL and body against
//!    a fixed set of attack signatures, records matches and escalates repeat
//!    offenders to an active block.
//! 2. [`rate_limit::rate_limit`]: rejects requests from blacklisted IPs, then
//!    applies a sliding-window limit per user (or per IP when anonymous) and
//!    escalates sustained violators to the blacklist.
//!
//! Both layers fail open on store errors: a broken database degrades
//! enforcement, it does not take the panel down. Credential validation and
//! approval are the opposite and fail closed; that logic lives in the API
//! handlers, not here.
//!
//! [`escalation::escalate`] is the single entry point through which anything
//! (limiter, detector, admin action) lands on the blacklist.

pub mod escalation;
pub mod patterns;
pub mod rate_limit;

use axum::extract::ConnectInfo;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use std::net::SocketAddr;

/// Source IP of a request.
///
/// With `trusted_proxy_depth` = d > 0, the d-th entry from the end of
/// `X-Forwarded-For` is the address the outermost trusted proxy saw. Depth 0
/// ignores the header entirely since anyone can forge it.
pub fn client_ip_from_headers(headers: &HeaderMap, peer: Option<SocketAddr>, trusted_proxy_depth: usize) -> String {
    if trusted_proxy_depth > 0
        && let Some(value) = headers.get("x-forwarded-for")
        && let Ok(value) = value.to_str()
    {
        let entries: Vec<&str> = value.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()).collect();
        if entries.len() >= trusted_proxy_depth {
            return entries[entries.len() - trusted_proxy_depth].to_string();
        }
        // Fewer hops than trusted proxies: take the first entry
        if let Some(first) = entries.first() {
            return first.to_string();
        }
    }

    peer.map(|addr| addr.ip().to_string()).unwrap_or_else(|| "unknown".to_string())
}

/// Source IP for a request that has been split into parts.
pub fn client_ip(parts: &Parts, trusted_proxy_depth: usize) -> String {
    let peer = parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|ci| ci.0);
    client_ip_from_headers(&parts.headers, peer, trusted_proxy_depth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> Option<SocketAddr> {
        Some("10.0.0.1:443".parse().unwrap())
    }

    #[test]
    fn test_peer_address_without_header() {
        let headers = HeaderMap::new();
        assert_eq!(client_ip_from_headers(&headers, peer(), 1), "10.0.0.1");
    }

    #[test]
    fn test_forwarded_for_depth_one() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 198.51.100.2"));
        // One trusted proxy: the last entry is the address it saw
        assert_eq!(client_ip_from_headers(&headers, peer(), 1), "198.51.100.2");
        // Two trusted proxies: step one entry further back
        assert_eq!(client_ip_from_headers(&headers, peer(), 2), "203.0.113.7");
    }

    #[test]
    fn test_depth_zero_ignores_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));
        assert_eq!(client_ip_from_headers(&headers, peer(), 0), "10.0.0.1");
    }
}
