//! Request origin extraction.

use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};
use tollgate_types::SourceInfo;

pub const FORWARDED_FOR: &str = "x-forwarded-for";
pub const GEO_COUNTRY: &str = "x-geo-country";
pub const TUNNEL: &str = "x-tunnel";

/// Builds the origin of a request.
///
/// The peer address is used unless `trust_proxy_headers` is set, in which
/// case the first `X-Forwarded-For` hop wins and the country and tunnel flag
/// come from the proxy's headers.
#[must_use]
pub fn source_info(peer: SocketAddr, headers: &HeaderMap, trust_proxy_headers: bool) -> SourceInfo {
    if !trust_proxy_headers {
        return SourceInfo::from_address(peer.ip());
    }

    let address = header(headers, FORWARDED_FOR)
        .and_then(|value| value.split(',').next())
        .and_then(|hop| hop.trim().parse::<IpAddr>().ok())
        .unwrap_or_else(|| peer.ip());
    let mut source = SourceInfo::from_address(address);
    if let Some(country) = header(headers, GEO_COUNTRY).map(str::trim).filter(|c| !c.is_empty()) {
        source = source.with_country(country.to_ascii_uppercase());
    }
    if let Some(tunnel) = header(headers, TUNNEL) {
        source = source.with_tunnel(matches!(tunnel.trim(), "1" | "true" | "yes"));
    }
    source
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    fn proxied() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert(GEO_COUNTRY, HeaderValue::from_static("de"));
        headers.insert(TUNNEL, HeaderValue::from_static("1"));
        headers
    }

    #[test]
    fn proxy_headers_are_ignored_unless_trusted() {
        let source = source_info(peer(), &proxied(), false);
        assert_eq!(source.address, peer().ip());
        assert_eq!(source.country, None);
        assert!(!source.via_tunnel);
    }

    #[test]
    fn trusted_proxy_headers_set_the_origin() {
        let source = source_info(peer(), &proxied(), true);
        assert_eq!(source.address, "203.0.113.7".parse::<IpAddr>().unwrap());
        assert_eq!(source.country.as_deref(), Some("DE"));
        assert!(source.via_tunnel);
    }

    #[test]
    fn malformed_forwarded_for_falls_back_to_peer() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static("not-an-ip"));
        let source = source_info(peer(), &headers, true);
        assert_eq!(source.address, peer().ip());
    }
}
