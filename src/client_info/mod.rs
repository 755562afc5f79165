use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::net::SocketAddr;

/// Socket peer of the request, when the server was started with connect info.
#[derive(Debug, Clone, Copy)]
pub struct PeerAddr(pub Option<SocketAddr>);

impl<S> FromRequestParts<S> for PeerAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr),
        ))
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Client IP as seen by the first proxy hop.
///
/// `X-Forwarded-For` wins (first entry of the list), then `X-Real-IP`,
/// then the socket peer. `"Unknown"` when none are available.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(xff) = header_value(headers, "x-forwarded-for") {
        if let Some(first) = xff.split(',').map(str::trim).find(|ip| !ip.is_empty()) {
            return first.to_string();
        }
    }

    if let Some(real_ip) = header_value(headers, "x-real-ip") {
        return real_ip;
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

pub fn user_agent(headers: &HeaderMap) -> String {
    header_value(headers, "user-agent").unwrap_or_else(|| "Unknown".to_string())
}

/// `Referer` header, used when the payload does not carry its own referrer.
pub fn referrer(headers: &HeaderMap) -> Option<String> {
    header_value(headers, "referer")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_ip_x_forwarded_for_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.195, 70.41.3.18, 150.172.238.178"),
        );
        assert_eq!(client_ip(&headers, None), "203.0.113.195");
    }

    #[test]
    fn test_client_ip_x_forwarded_for_single() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" 198.51.100.4 "));
        assert_eq!(client_ip(&headers, None), "198.51.100.4");
    }

    #[test]
    fn test_client_ip_x_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.7"));
        assert_eq!(client_ip(&headers, None), "198.51.100.7");
    }

    #[test]
    fn test_client_ip_forwarded_for_beats_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.7"));
        assert_eq!(client_ip(&headers, None), "203.0.113.1");
    }

    #[test]
    fn test_client_ip_falls_back_to_peer() {
        let headers = HeaderMap::new();
        let peer: SocketAddr = "192.0.2.10:53211".parse().unwrap();
        assert_eq!(client_ip(&headers, Some(peer)), "192.0.2.10");
    }

    #[test]
    fn test_client_ip_unknown() {
        assert_eq!(client_ip(&HeaderMap::new(), None), "Unknown");
    }

    #[test]
    fn test_client_ip_empty_forwarded_for_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" "));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.7"));
        assert_eq!(client_ip(&headers, None), "198.51.100.7");
    }

    #[test]
    fn test_user_agent() {
        let mut headers = HeaderMap::new();
        assert_eq!(user_agent(&headers), "Unknown");

        headers.insert("user-agent", HeaderValue::from_static("Mozilla/5.0 Test"));
        assert_eq!(user_agent(&headers), "Mozilla/5.0 Test");
    }

    #[tokio::test]
    async fn test_peer_addr_from_extensions() {
        let (mut parts, _) = axum::http::Request::new(()).into_parts();
        assert!(PeerAddr::from_request_parts(&mut parts, &()).await.unwrap().0.is_none());

        let peer: SocketAddr = "198.51.100.20:4000".parse().unwrap();
        parts.extensions.insert(ConnectInfo(peer));
        let PeerAddr(found) = PeerAddr::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(found, Some(peer));
    }

    #[test]
    fn test_referrer() {
        let mut headers = HeaderMap::new();
        assert!(referrer(&headers).is_none());

        headers.insert("referer", HeaderValue::from_static("https://example.com/a"));
        assert_eq!(referrer(&headers), Some("https://example.com/a".to_string()));
    }
}
