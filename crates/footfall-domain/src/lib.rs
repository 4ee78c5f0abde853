//! # Coffee Footfall - Domain Model
//!
//! Core value objects and entities for foot-traffic site selection analysis.
//! These types are shared by the analytics engine, the map builders and the
//! command line front end.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// VALUE OBJECTS
// =============================================================================

/// WGS84 geographic coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            latitude: lat,
            longitude: lon,
        }
    }

    /// Validated constructor
    pub fn try_new(lat: f64, lon: f64) -> Result<Self, DomainError> {
        let coords = Self::new(lat, lon);
        if coords.is_valid() {
            Ok(coords)
        } else {
            Err(DomainError::InvalidCoordinates { lat, lon })
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Calculate great-circle distance to another point in meters (Haversine formula)
    #[must_use]
    pub fn distance_to_m(&self, other: &Coordinates) -> f64 {
        const EARTH_RADIUS_M: f64 = 6_371_008.8;

        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let delta_lat = (other.latitude - self.latitude).to_radians();
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();

        EARTH_RADIUS_M * c
    }
}

/// Census block group identifier (12-digit GEOID: state, county, tract, block group)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CbgId(String);

impl CbgId {
    pub const LEN: usize = 12;

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.len() == Self::LEN && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(DomainError::InvalidCbg(raw.to_string()))
        }
    }

    /// 5-digit state + county FIPS prefix
    #[must_use]
    pub fn county_fips(&self) -> &str {
        &self.0[..5]
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CbgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Set of county FIPS prefixes that delimit the study area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountyFilter {
    prefixes: Vec<String>,
}

impl CountyFilter {
    /// King, Pierce and Snohomish counties, WA
    pub const SEATTLE: [&'static str; 3] = ["53033", "53053", "53061"];

    pub fn new<I, S>(prefixes: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = Vec::new();
        for prefix in prefixes {
            let prefix = prefix.as_ref().trim();
            if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
                return Err(DomainError::InvalidCounty(prefix.to_string()));
            }
            if !out.iter().any(|p| p == prefix) {
                out.push(prefix.to_string());
            }
        }
        if out.is_empty() {
            return Err(DomainError::InvalidCounty(String::new()));
        }
        Ok(Self { prefixes: out })
    }

    pub fn seattle() -> Self {
        Self {
            prefixes: Self::SEATTLE.iter().map(ToString::to_string).collect(),
        }
    }

    /// Parse a comma separated list, e.g. `53033,53053`
    pub fn parse_list(raw: &str) -> Result<Self, DomainError> {
        Self::new(raw.split(',').filter(|s| !s.trim().is_empty()))
    }

    #[must_use]
    pub fn contains(&self, geoid: &str) -> bool {
        self.prefixes.iter().any(|p| geoid.starts_with(p.as_str()))
    }

    #[must_use]
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Anchored alternation usable with DuckDB `regexp_matches`
    #[must_use]
    pub fn sql_regex(&self) -> String {
        format!("^({})", self.prefixes.join("|"))
    }
}

impl Default for CountyFilter {
    fn default() -> Self {
        Self::seattle()
    }
}

// =============================================================================
// ENUMS
// =============================================================================

/// How the distance between a cafe and a home CBG is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistanceMetric {
    /// Planar distance after projecting both points to EPSG:3857
    #[default]
    WebMercator,
    Haversine,
    Geodesic,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebMercator => "web-mercator",
            Self::Haversine => "haversine",
            Self::Geodesic => "geodesic",
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "web-mercator" | "webmercator" | "epsg:3857" | "mercator" => Ok(Self::WebMercator),
            "haversine" => Ok(Self::Haversine),
            "geodesic" => Ok(Self::Geodesic),
            other => Err(DomainError::UnknownDistanceMetric(other.to_string())),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a cafe's visitors mostly come from outside (tourist) or inside (local) the study area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisitorType {
    Tourist,
    Local,
}

impl VisitorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tourist => "tourist",
            Self::Local => "local",
        }
    }

    /// Marker colour on the visitor type map
    pub fn color(&self) -> &'static str {
        match self {
            Self::Tourist => "blue",
            Self::Local => "red",
        }
    }
}

// =============================================================================
// ENTITY TYPES
// =============================================================================

/// One month of foot traffic for one point of interest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRecord {
    pub placekey: String,
    pub location_name: String,

    // Place
    pub brands: Option<String>,
    pub street_address: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub open_hours: Option<String>,

    // Period
    pub date_range_start: NaiveDate,
    pub date_range_end: Option<NaiveDate>,

    // Patterns
    pub raw_visit_counts: Option<i64>,
    pub raw_visitor_counts: Option<i64>,
    /// Median meters between the place and its visitors' homes
    pub distance_from_home: Option<f64>,
    /// Home CBG -> visitor count
    pub visitor_home_cbgs: BTreeMap<String, i64>,
}

/// Most recent known state of a cafe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cafe {
    pub placekey: String,
    pub location_name: String,
    pub brands: Option<String>,
    pub street_address: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub open_hours: Option<String>,
}

impl Cafe {
    /// Location, if both coordinates are present and in range
    #[must_use]
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Coordinates::try_new(lat, lon).ok(),
            _ => None,
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Domain-level errors
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Invalid coordinates: lat={lat}, lon={lon}")]
    InvalidCoordinates { lat: f64, lon: f64 },

    #[error("Invalid census block group id: '{0}'")]
    InvalidCbg(String),

    #[error("Invalid county FIPS prefix: '{0}'")]
    InvalidCounty(String),

    #[error("Unknown distance metric: '{0}'")]
    UnknownDistanceMetric(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_seattle_to_tacoma() {
        let seattle = Coordinates::new(47.6062, -122.3321);
        let tacoma = Coordinates::new(47.2529, -122.4443);
        let d = seattle.distance_to_m(&tacoma);
        assert!((d - 40_100.0).abs() < 1_000.0, "got {d}");
    }

    #[test]
    fn test_coordinates_validation() {
        assert!(Coordinates::try_new(47.6, -122.3).is_ok());
        assert!(matches!(
            Coordinates::try_new(122.3, 47.6),
            Err(DomainError::InvalidCoordinates { .. })
        ));
    }

    #[test]
    fn test_cbg_parse() {
        let cbg = CbgId::parse("530330082001").unwrap();
        assert_eq!(cbg.county_fips(), "53033");
        assert!(CbgId::parse("53033008200").is_err());
        assert!(CbgId::parse("53033008200x").is_err());
    }

    #[test]
    fn test_county_filter() {
        let filter = CountyFilter::seattle();
        assert!(filter.contains("530330082001"));
        assert!(filter.contains("530619400021"));
        assert!(!filter.contains("530670101001"));
        assert_eq!(filter.sql_regex(), "^(53033|53053|53061)");

        let houston = CountyFilter::parse_list("48201, 48157,48201").unwrap();
        assert_eq!(houston.prefixes(), &["48201".to_string(), "48157".to_string()]);
        assert!(CountyFilter::parse_list("").is_err());
        assert!(CountyFilter::parse_list("53033|1").is_err());
    }

    #[test]
    fn test_distance_metric_parse() {
        assert_eq!("web-mercator".parse::<DistanceMetric>().unwrap(), DistanceMetric::WebMercator);
        assert_eq!("EPSG:3857".parse::<DistanceMetric>().unwrap(), DistanceMetric::WebMercator);
        assert_eq!("Geodesic".parse::<DistanceMetric>().unwrap(), DistanceMetric::Geodesic);
        assert!("manhattan".parse::<DistanceMetric>().is_err());
    }

    #[test]
    fn test_cafe_coordinates() {
        let mut cafe = Cafe {
            placekey: "zzw-222@5x4-4b6-mzf".to_string(),
            location_name: "Cafe".to_string(),
            brands: None,
            street_address: None,
            city: None,
            region: None,
            postal_code: None,
            latitude: Some(47.61),
            longitude: Some(-122.33),
            open_hours: None,
        };
        assert!(cafe.coordinates().is_some());
        cafe.longitude = None;
        assert!(cafe.coordinates().is_none());
    }
}
