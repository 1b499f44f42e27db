//! Client identity resolution for rate limiting and request logging.

use axum::extract::ConnectInfo;
use axum::extract::Request;
use axum::http::HeaderMap;
use std::net::SocketAddr;

/// Header set by a trusted reverse proxy with the original client address
pub const REAL_IP_HEADER: &str = "x-real-ip";

/// Comma-separated proxy chain, original client first
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Resolved client key, attached to request extensions by the rate limit
/// middleware so downstream handlers can correlate their logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId(pub String);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive a stable client key from request headers and the socket address.
///
/// Resolution order, first match wins:
/// 1. `X-Real-IP`, verbatim
/// 2. first entry of `X-Forwarded-For`, trimmed
/// 3. the socket address with any trailing `:port` removed
///
/// An empty socket address yields an empty key.
pub fn resolve_client_id(headers: &HeaderMap, remote_addr: &str) -> String {
    if let Some(real_ip) = header_value(headers, REAL_IP_HEADER) {
        return real_ip.to_string();
    }

    if let Some(forwarded) = header_value(headers, FORWARDED_FOR_HEADER) {
        let first = forwarded.split(',').next().unwrap_or_default();
        return first.trim().to_string();
    }

    strip_port(remote_addr).to_string()
}

/// Resolve the client key for an axum request, reading the peer address from
/// [`ConnectInfo`] when the server was started with connect info.
pub fn client_id_from_request(request: &Request) -> String {
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default();

    resolve_client_id(request.headers(), &remote_addr)
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

fn strip_port(addr: &str) -> &str {
    match addr.rfind(':') {
        Some(idx) if idx > 0 => &addr[..idx],
        _ => addr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn header_map(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_static(*value));
        }
        headers
    }

    #[test]
    fn test_real_ip_takes_priority() {
        let headers = header_map(&[
            ("x-real-ip", "192.168.1.1"),
            ("x-forwarded-for", "203.0.113.1"),
        ]);
        assert_eq!(resolve_client_id(&headers, "10.0.0.1:1234"), "192.168.1.1");
    }

    #[test]
    fn test_forwarded_for_uses_first_hop() {
        let headers = header_map(&[("x-forwarded-for", "203.0.113.1, 70.41.3.18, 150.172.238.178")]);
        assert_eq!(resolve_client_id(&headers, "10.0.0.1:1234"), "203.0.113.1");

        let headers = header_map(&[("x-forwarded-for", "  198.51.100.7  ")]);
        assert_eq!(resolve_client_id(&headers, ""), "198.51.100.7");
    }

    #[test]
    fn test_empty_headers_fall_back_to_socket_address() {
        let headers = header_map(&[("x-real-ip", ""), ("x-forwarded-for", "")]);
        assert_eq!(resolve_client_id(&headers, "127.0.0.1:8080"), "127.0.0.1");
    }

    #[test]
    fn test_port_is_stripped_so_connections_share_a_key() {
        let empty = HeaderMap::new();
        let a = resolve_client_id(&empty, "203.0.113.5:1111");
        let b = resolve_client_id(&empty, "203.0.113.5:2222");
        assert_eq!(a, "203.0.113.5");
        assert_eq!(a, b);
    }

    #[test]
    fn test_ipv6_socket_address() {
        let empty = HeaderMap::new();
        assert_eq!(resolve_client_id(&empty, "[::1]:8080"), "[::1]");
    }

    #[test]
    fn test_degenerate_socket_addresses() {
        let empty = HeaderMap::new();
        assert_eq!(resolve_client_id(&empty, ""), "");
        assert_eq!(resolve_client_id(&empty, "localhost"), "localhost");
        assert_eq!(resolve_client_id(&empty, ":9000"), ":9000");
    }

    #[test]
    fn test_client_id_from_request_without_connect_info() {
        let request = Request::new(axum::body::Body::empty());
        assert_eq!(client_id_from_request(&request), "");
    }

    #[test]
    fn test_client_id_from_request_with_connect_info() {
        let mut request = Request::new(axum::body::Body::empty());
        let addr: SocketAddr = "192.168.1.100:1234".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(client_id_from_request(&request), "192.168.1.100");
    }
}
