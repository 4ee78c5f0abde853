//! # Runner Configuration
//!
//! Environment-based configuration. Command line flags override it.

use footfall_analytics::AnalysisParams;
use footfall_domain::{CountyFilter, DistanceMetric, DomainError};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Runner configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Monthly patterns CSV
    pub patterns_path: Option<PathBuf>,

    /// Census block group polygons CSV (`GEOID`, `geometry`)
    pub block_groups_path: Option<PathBuf>,

    /// Neighborhood polygons CSV (`S_HOOD`, `geometry`)
    pub neighborhoods_path: Option<PathBuf>,

    /// Where maps, tables and reports are written
    pub output_dir: PathBuf,

    /// DuckDB file; in-memory when unset
    pub database: Option<PathBuf>,

    /// Study area
    pub counties: CountyFilter,

    pub distance_metric: DistanceMetric,

    /// Thresholds and limits
    pub params: AnalysisParams,

    /// Logging level
    pub log_level: String,

    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, DomainError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DomainError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AnalysisParams::default();
        let path = |key: &str| lookup(key).filter(|v| !v.trim().is_empty()).map(PathBuf::from);

        Ok(Self {
            patterns_path: path("FOOTFALL_PATTERNS_PATH"),
            block_groups_path: path("FOOTFALL_BLOCK_GROUPS_PATH"),
            neighborhoods_path: path("FOOTFALL_NEIGHBORHOODS_PATH"),
            output_dir: path("FOOTFALL_OUTPUT_DIR").unwrap_or_else(|| PathBuf::from("out")),
            database: path("FOOTFALL_DATABASE"),

            counties: match lookup("FOOTFALL_COUNTIES") {
                Some(raw) => CountyFilter::parse_list(&raw)?,
                None => CountyFilter::seattle(),
            },

            distance_metric: match lookup("FOOTFALL_DISTANCE_METRIC") {
                Some(raw) => raw.parse()?,
                None => DistanceMetric::default(),
            },

            params: AnalysisParams {
                min_cbg_visitors: parsed(&lookup, "FOOTFALL_MIN_CBG_VISITORS", defaults.min_cbg_visitors),
                min_total_visits: parsed(&lookup, "FOOTFALL_MIN_TOTAL_VISITS", defaults.min_total_visits),
                visitor_type_limit: parsed(&lookup, "FOOTFALL_VISITOR_TYPE_LIMIT", defaults.visitor_type_limit),
                top_home_cbgs: parsed(&lookup, "FOOTFALL_TOP_HOME_CBGS", defaults.top_home_cbgs),
                distance_cutoff_m: parsed(&lookup, "FOOTFALL_DISTANCE_CUTOFF_M", defaults.distance_cutoff_m),
                ..defaults
            },

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),

            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        })
    }
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, DomainError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert!(config.patterns_path.is_none());
        assert!(config.database.is_none());
        assert_eq!(config.counties, CountyFilter::seattle());
        assert_eq!(config.distance_metric, DistanceMetric::WebMercator);
        assert_eq!(config.params, AnalysisParams::default());
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("FOOTFALL_PATTERNS_PATH", "data/patterns.csv"),
            ("FOOTFALL_COUNTIES", "06075, 06081"),
            ("FOOTFALL_DISTANCE_METRIC", "geodesic"),
            ("FOOTFALL_MIN_TOTAL_VISITS", "250"),
            ("FOOTFALL_DISTANCE_CUTOFF_M", "12000.5"),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();
        assert_eq!(config.patterns_path, Some(PathBuf::from("data/patterns.csv")));
        assert_eq!(config.counties.prefixes(), ["06075", "06081"]);
        assert_eq!(config.distance_metric, DistanceMetric::Geodesic);
        assert_eq!(config.params.min_total_visits, 250);
        assert_eq!(config.params.distance_cutoff_m, 12_000.5);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_unparseable_numbers_fall_back() {
        let config = config(&[
            ("FOOTFALL_MIN_CBG_VISITORS", "four"),
            ("FOOTFALL_TOP_HOME_CBGS", "-3"),
            ("FOOTFALL_OUTPUT_DIR", "  "),
        ])
        .unwrap();
        assert_eq!(config.params.min_cbg_visitors, 4);
        assert_eq!(config.params.top_home_cbgs, 1_000);
        assert_eq!(config.output_dir, PathBuf::from("out"));
    }

    #[test]
    fn test_invalid_study_area_is_an_error() {
        assert!(config(&[("FOOTFALL_COUNTIES", "king")]).is_err());
        assert!(config(&[("FOOTFALL_DISTANCE_METRIC", "manhattan")]).is_err());
    }
}
