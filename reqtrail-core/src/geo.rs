//! Geolocation enrichment.
//!
//! The lookup itself is an external collaborator behind [`GeoLookup`].
//! [`CidrGeoTable`] is a small in-memory implementation keyed by CIDR ranges,
//! suitable for tests and for deployments that ship their own range list.

use crate::entry::Location;
use crate::error::TrailError;
use crate::ip::is_local_or_unknown;
use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Location record returned by a lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoRecord {
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
}

impl GeoRecord {
    pub fn new(country: &str, region: &str, city: &str) -> Self {
        Self {
            country: Some(country.to_string()),
            region: Some(region.to_string()),
            city: Some(city.to_string()),
        }
    }
}

impl From<GeoRecord> for Location {
    fn from(r: GeoRecord) -> Self {
        Location {
            country: r.country,
            region: r.region,
            city: r.city,
        }
    }
}

/// Maps a normalised IP string to a location.
///
/// `Ok(None)` is a miss; errors are swallowed by [`GeoEnricher`].
pub trait GeoLookup: Send + Sync + 'static {
    fn lookup(&self, ip: &str) -> Result<Option<GeoRecord>, TrailError>;
}

/// In-memory CIDR → location table. The most specific matching range wins.
#[derive(Debug, Clone, Default)]
pub struct CidrGeoTable {
    ranges: Vec<(IpNet, GeoRecord)>,
}

impl CidrGeoTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a range given as CIDR (`203.0.113.0/24`) or bare IP.
    pub fn insert(&mut self, cidr: &str, record: GeoRecord) -> Result<(), TrailError> {
        let net = parse_ip_or_cidr(cidr)
            .ok_or_else(|| TrailError::Config(format!("invalid CIDR or IP: {cidr}")))?;
        self.ranges.push((net, record));
        Ok(())
    }

    /// Builder form of [`insert`](Self::insert); invalid ranges are skipped
    /// with a warning.
    pub fn with_range(mut self, cidr: &str, record: GeoRecord) -> Self {
        if let Err(e) = self.insert(cidr, record) {
            warn!(error = %e, "skipping geo range");
        }
        self
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl GeoLookup for CidrGeoTable {
    fn lookup(&self, ip: &str) -> Result<Option<GeoRecord>, TrailError> {
        let addr: IpAddr = ip
            .parse()
            .map_err(|_| TrailError::GeoLookup(format!("not an IP address: {ip}")))?;
        Ok(self
            .ranges
            .iter()
            .filter(|(net, _)| net.contains(&addr))
            .max_by_key(|(net, _)| net.prefix_len())
            .map(|(_, record)| record.clone()))
    }
}

fn parse_ip_or_cidr(s: &str) -> Option<IpNet> {
    // Try parsing as CIDR first, then as bare IP
    s.parse::<IpNet>().ok().or_else(|| match s.parse::<IpAddr>().ok()? {
        IpAddr::V4(v4) => Ipv4Net::new(v4, 32).ok().map(IpNet::V4),
        IpAddr::V6(v6) => Ipv6Net::new(v6, 128).ok().map(IpNet::V6),
    })
}

/// Attaches a [`Location`] to entries when geolocation is enabled.
#[derive(Clone, Default)]
pub struct GeoEnricher {
    enabled: bool,
    lookup: Option<Arc<dyn GeoLookup>>,
}

impl GeoEnricher {
    pub fn new(enabled: bool, lookup: Option<Arc<dyn GeoLookup>>) -> Self {
        Self { enabled, lookup }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    /// Location for a normalised IP.
    ///
    /// - disabled or no IP → `None`
    /// - loopback / unknown → the "not available" record
    /// - otherwise the lookup result; misses and failures → `None`
    pub fn locate(&self, ip: Option<&str>) -> Option<Location> {
        if !self.enabled {
            return None;
        }
        let ip = ip?;
        if is_local_or_unknown(ip) {
            return Some(Location::not_available());
        }
        let lookup = self.lookup.as_ref()?;
        match lookup.lookup(ip) {
            Ok(record) => record.map(Location::from),
            Err(e) => {
                debug!(ip = %ip, error = %e, "geo lookup failed");
                None
            }
        }
    }
}

impl std::fmt::Debug for GeoEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoEnricher")
            .field("enabled", &self.enabled)
            .field("lookup", &self.lookup.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::LOCATION_NOT_AVAILABLE;

    struct Failing;

    impl GeoLookup for Failing {
        fn lookup(&self, _ip: &str) -> Result<Option<GeoRecord>, TrailError> {
            Err(TrailError::GeoLookup("database unavailable".into()))
        }
    }

    fn table() -> CidrGeoTable {
        CidrGeoTable::new()
            .with_range("203.0.113.0/24", GeoRecord::new("AU", "NSW", "Sydney"))
            .with_range("203.0.113.128/25", GeoRecord::new("AU", "VIC", "Melbourne"))
            .with_range("2001:db8::/32", GeoRecord::new("NL", "NH", "Amsterdam"))
    }

    fn enricher(lookup: impl GeoLookup) -> GeoEnricher {
        GeoEnricher::new(true, Some(Arc::new(lookup)))
    }

    // ── CidrGeoTable ─────────────────────────────────────────────

    #[test]
    fn most_specific_range_wins() {
        let t = table();
        assert_eq!(t.lookup("203.0.113.5").unwrap().unwrap().city.as_deref(), Some("Sydney"));
        assert_eq!(t.lookup("203.0.113.200").unwrap().unwrap().city.as_deref(), Some("Melbourne"));
    }

    #[test]
    fn ipv6_ranges_match() {
        let r = table().lookup("2001:db8::42").unwrap().unwrap();
        assert_eq!(r.country.as_deref(), Some("NL"));
    }

    #[test]
    fn miss_returns_none() {
        assert!(table().lookup("198.51.100.1").unwrap().is_none());
    }

    #[test]
    fn non_ip_input_is_an_error() {
        assert!(matches!(table().lookup("unknown"), Err(TrailError::GeoLookup(_))));
    }

    #[test]
    fn invalid_range_is_rejected() {
        let mut t = CidrGeoTable::new();
        assert!(t.insert("300.1.1.0/24", GeoRecord::default()).is_err());
        assert!(t.insert("10.0.0.1", GeoRecord::default()).is_ok());
        assert_eq!(t.len(), 1);
    }

    // ── GeoEnricher ──────────────────────────────────────────────

    #[test]
    fn disabled_never_attaches_location() {
        let g = GeoEnricher::new(false, Some(Arc::new(table())));
        assert!(g.locate(Some("203.0.113.5")).is_none());
        assert!(g.locate(Some("127.0.0.1")).is_none());
    }

    #[test]
    fn missing_ip_attaches_nothing() {
        assert!(enricher(table()).locate(None).is_none());
    }

    #[test]
    fn loopback_gets_not_available_marker() {
        let loc = enricher(table()).locate(Some("127.0.0.1")).unwrap();
        assert_eq!(loc.country.as_deref(), Some(LOCATION_NOT_AVAILABLE));
        assert_eq!(loc.region.as_deref(), Some(LOCATION_NOT_AVAILABLE));
        assert_eq!(loc.city.as_deref(), Some(LOCATION_NOT_AVAILABLE));
    }

    #[test]
    fn unknown_gets_not_available_even_without_lookup() {
        let g = GeoEnricher::new(true, None);
        assert_eq!(g.locate(Some("unknown")), Some(Location::not_available()));
    }

    #[test]
    fn hit_is_copied_into_location() {
        let loc = enricher(table()).locate(Some("203.0.113.5")).unwrap();
        assert_eq!(loc, Location::from(GeoRecord::new("AU", "NSW", "Sydney")));
    }

    #[test]
    fn miss_attaches_nothing() {
        assert!(enricher(table()).locate(Some("198.51.100.1")).is_none());
    }

    #[test]
    fn lookup_failure_is_swallowed() {
        assert!(enricher(Failing).locate(Some("203.0.113.5")).is_none());
    }
}
