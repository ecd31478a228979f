//! GeoIP lookup service using MaxMind GeoLite2/GeoIP2 MMDB
//!
//! This module provides thread-safe IP geolocation using a memory-mapped
//! MaxMind City database. Locations are reported as ISO codes: the country
//! (`"NL"`), optionally followed by the first subdivision (`"US-CA"`).

use anyhow::{Context, Result};
use maxminddb::{geoip2, Mmap, Reader};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Resolves a client IP to a location code
pub trait Geolocator: Send + Sync {
    /// Look up `ip`; misses and malformed addresses yield `None`
    fn lookup(&self, ip: &str) -> Option<String>;
}

/// Geolocator used when no database is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopGeolocator;

impl Geolocator for NoopGeolocator {
    fn lookup(&self, _ip: &str) -> Option<String> {
        None
    }
}

/// GeoIP lookup service backed by a City (or Country) database
#[derive(Clone)]
pub struct GeoIpService {
    reader: Arc<Reader<Mmap>>,
}

impl GeoIpService {
    /// Open a MaxMind GeoLite2-City / GeoIP2-City .mmdb file
    pub fn new(path: &str) -> Result<Self> {
        let reader = unsafe { Reader::open_mmap(path) }
            .with_context(|| format!("Failed to open GeoIP database at {}", path))?;

        Ok(Self {
            reader: Arc::new(reader),
        })
    }

    /// Lookup the location code for a parsed IP address
    pub fn lookup_ip(&self, ip: IpAddr) -> Option<String> {
        let result = self.reader.lookup(ip).ok()?;

        if let Ok(Some(city)) = result.decode::<geoip2::City>() {
            let country = city.country.iso_code?;
            return Some(match city.subdivisions.first().and_then(|s| s.iso_code) {
                Some(region) => format!("{}-{}", country, region),
                None => country.to_string(),
            });
        }

        // Country databases carry no subdivisions; geoip2::Country reads
        // the country fields from either kind.
        let country = result.decode::<geoip2::Country>().ok()??;
        country.country.iso_code.map(|s| s.to_string())
    }
}

impl Geolocator for GeoIpService {
    fn lookup(&self, ip: &str) -> Option<String> {
        self.lookup_ip(parse_ip(ip)?)
    }
}

/// Parse a bare IP or an `ip:port` socket address
pub fn parse_ip(s: &str) -> Option<IpAddr> {
    let s = s.trim();
    s.parse::<IpAddr>()
        .ok()
        .or_else(|| s.parse::<SocketAddr>().ok().map(|a| a.ip()))
}

/// Drop the subdivision part of a location code (`"US-CA"` -> `"US"`)
pub fn country_only(location: &str) -> &str {
    location.split_once('-').map_or(location, |(country, _)| country)
}
