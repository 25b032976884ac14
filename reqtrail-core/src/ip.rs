//! Client address resolution and canonicalisation.

use http::HeaderMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Returned when no source yields a client address.
pub const UNKNOWN_IP: &str = "unknown";

/// Canonical form of every loopback variant.
pub const LOOPBACK_IP: &str = "127.0.0.1";

/// Forwarding headers consulted after the framework and socket addresses,
/// in priority order.
pub const FORWARDING_HEADERS: &[&str] = &[
    "x-forwarded-for",
    "x-real-ip",
    "cf-connecting-ip", // Cloudflare
    "x-client-ip",
];

/// Client IP as resolved by the hosting framework (for example by a trusted
/// proxy layer). Takes precedence over the socket address when present in
/// the request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

/// Resolve and normalise the client address.
///
/// First present, non-empty source wins: framework IP, socket peer address,
/// then [`FORWARDING_HEADERS`], falling back to `"unknown"`. Always returns
/// a string.
pub fn resolve_client_ip(
    framework_ip: Option<&str>,
    remote_addr: Option<SocketAddr>,
    headers: &HeaderMap,
) -> String {
    let raw = framework_ip
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| remote_addr.map(|addr| addr.ip().to_string()))
        .or_else(|| {
            FORWARDING_HEADERS.iter().find_map(|name| {
                headers
                    .get(*name)
                    .and_then(|v| v.to_str().ok())
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
            })
        })
        .unwrap_or_else(|| UNKNOWN_IP.to_string());

    normalize_ip(&raw)
}

/// Canonicalise a raw address value.
///
/// - forwarded chains (`"a, b, c"`) keep their first entry, trimmed
/// - `::1` and `::ffff:127.0.0.1` become `"127.0.0.1"`
/// - the IPv4-mapped prefix `::ffff:` is stripped
pub fn normalize_ip(raw: &str) -> String {
    let first = raw.split(',').next().unwrap_or(raw).trim();

    if first == "::1" || first == "::ffff:127.0.0.1" {
        return LOOPBACK_IP.to_string();
    }

    first.strip_prefix("::ffff:").unwrap_or(first).to_string()
}

/// Whether a normalised IP is one of the sentinels geolocation skips.
pub fn is_local_or_unknown(ip: &str) -> bool {
    ip == LOOPBACK_IP || ip == UNKNOWN_IP
}

// Network prefix kept by `anonymize_ip`: a /24 for IPv4, a /64 for IPv6.
const V4_KEPT: u32 = u32::MAX << 8;
const V6_KEPT: u128 = u128::MAX << 64;

/// Masks a recorded address down to its network prefix (/24 or /64).
///
/// Anything that is not an IP literal, such as the `"unknown"` sentinel,
/// comes back as given.
pub fn anonymize_ip(ip: &str) -> String {
    let masked = match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => IpAddr::V4(Ipv4Addr::from(u32::from(v4) & V4_KEPT)),
        Ok(IpAddr::V6(v6)) => IpAddr::V6(Ipv6Addr::from(u128::from(v6) & V6_KEPT)),
        Err(_) => return ip.to_string(),
    };
    masked.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    // ── normalize_ip ─────────────────────────────────────────────

    #[test]
    fn mapped_loopback_becomes_ipv4_loopback() {
        assert_eq!(normalize_ip("::ffff:127.0.0.1"), "127.0.0.1");
    }

    #[test]
    fn ipv6_loopback_becomes_ipv4_loopback() {
        assert_eq!(normalize_ip("::1"), "127.0.0.1");
    }

    #[test]
    fn mapped_prefix_is_stripped() {
        assert_eq!(normalize_ip("::ffff:192.168.1.7"), "192.168.1.7");
    }

    #[test]
    fn forwarded_chain_keeps_first_hop() {
        assert_eq!(normalize_ip("203.0.113.5, 70.41.3.18"), "203.0.113.5");
        assert_eq!(normalize_ip("  203.0.113.5 ,70.41.3.18,150.172.238.178"), "203.0.113.5");
    }

    #[test]
    fn forwarded_chain_with_mapped_first_hop() {
        assert_eq!(normalize_ip("::ffff:10.1.2.3, 10.0.0.1"), "10.1.2.3");
    }

    #[test]
    fn plain_addresses_pass_through() {
        assert_eq!(normalize_ip("10.0.0.1"), "10.0.0.1");
        assert_eq!(normalize_ip("2001:db8::1"), "2001:db8::1");
        assert_eq!(normalize_ip("unknown"), "unknown");
    }

    // ── resolve_client_ip ────────────────────────────────────────

    #[test]
    fn framework_ip_wins_over_everything() {
        let remote: SocketAddr = "10.0.0.9:5000".parse().unwrap();
        let h = headers(&[("x-forwarded-for", "1.1.1.1")]);
        assert_eq!(resolve_client_ip(Some("8.8.8.8"), Some(remote), &h), "8.8.8.8");
    }

    #[test]
    fn empty_framework_ip_is_treated_as_absent() {
        let remote: SocketAddr = "10.0.0.9:5000".parse().unwrap();
        assert_eq!(resolve_client_ip(Some(""), Some(remote), &HeaderMap::new()), "10.0.0.9");
    }

    #[test]
    fn socket_address_is_used_without_port() {
        let remote: SocketAddr = "[::1]:8080".parse().unwrap();
        assert_eq!(resolve_client_ip(None, Some(remote), &HeaderMap::new()), "127.0.0.1");
    }

    #[test]
    fn headers_are_consulted_in_priority_order() {
        let h = headers(&[("x-client-ip", "4.4.4.4"), ("x-real-ip", "2.2.2.2")]);
        assert_eq!(resolve_client_ip(None, None, &h), "2.2.2.2");

        let h = headers(&[("cf-connecting-ip", "3.3.3.3"), ("x-client-ip", "4.4.4.4")]);
        assert_eq!(resolve_client_ip(None, None, &h), "3.3.3.3");
    }

    #[test]
    fn forwarded_for_chain_is_normalised() {
        let h = headers(&[("x-forwarded-for", "203.0.113.5, 70.41.3.18")]);
        assert_eq!(resolve_client_ip(None, None, &h), "203.0.113.5");
    }

    #[test]
    fn no_source_yields_unknown() {
        assert_eq!(resolve_client_ip(None, None, &HeaderMap::new()), "unknown");
    }

    #[test]
    fn sentinels_are_detected() {
        assert!(is_local_or_unknown("127.0.0.1"));
        assert!(is_local_or_unknown("unknown"));
        assert!(!is_local_or_unknown("203.0.113.5"));
    }

    // ── anonymize_ip ─────────────────────────────────────────────

    #[test]
    fn ipv4_last_octet_zeroed() {
        assert_eq!(anonymize_ip("192.168.1.42"), "192.168.1.0");
    }

    #[test]
    fn ipv6_last_64_bits_zeroed() {
        let parsed: std::net::Ipv6Addr = anonymize_ip("2001:db8::1").parse().unwrap();
        assert_eq!(&parsed.segments()[4..], &[0, 0, 0, 0]);
    }

    #[test]
    fn ipv6_network_prefix_survives() {
        assert_eq!(anonymize_ip("2001:db8:1:2:aaaa:bbbb:cccc:dddd"), "2001:db8:1:2::");
    }

    #[test]
    fn unparseable_ip_passes_through() {
        assert_eq!(anonymize_ip("unknown"), "unknown");
    }
}
