//! Command line arguments.

use crate::config::Config;
use clap::{Parser, Subcommand};
use footfall_domain::{CountyFilter, DistanceMetric};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "footfall")]
#[command(about = "Coffee shop site selection from foot traffic patterns")]
#[command(version)]
pub struct Cli {
    /// Monthly patterns CSV [env: FOOTFALL_PATTERNS_PATH]
    #[arg(long, global = true)]
    pub patterns: Option<PathBuf>,

    /// Census block group polygons CSV [env: FOOTFALL_BLOCK_GROUPS_PATH]
    #[arg(long, global = true)]
    pub block_groups: Option<PathBuf>,

    /// Neighborhood polygons CSV [env: FOOTFALL_NEIGHBORHOODS_PATH]
    #[arg(long, global = true)]
    pub neighborhoods: Option<PathBuf>,

    /// Output directory [env: FOOTFALL_OUTPUT_DIR]
    #[arg(short, long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Comma separated county FIPS codes of the study area [env: FOOTFALL_COUNTIES]
    #[arg(long, global = true, value_parser = CountyFilter::parse_list)]
    pub counties: Option<CountyFilter>,

    /// web-mercator, haversine or geodesic [env: FOOTFALL_DISTANCE_METRIC]
    #[arg(long, global = true)]
    pub metric: Option<DistanceMetric>,

    /// Persist the DuckDB database to this file [env: FOOTFALL_DATABASE]
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Map every coffee shop at its latest location
    Cafes,

    /// How far are customers willing to travel for coffee?
    Travel,

    /// Which neighborhoods see the most coffee shop visits?
    Visibility,

    /// Where do coffee shop customers live?
    Origins,

    /// Run every question and write the full report
    Report,

    /// Print the first rows of a table or query
    Preview {
        /// Table, view or SELECT statement
        table: String,

        /// Rows to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

impl Cli {
    /// Apply flags on top of the environment configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.patterns {
            config.patterns_path = Some(path.clone());
        }
        if let Some(path) = &self.block_groups {
            config.block_groups_path = Some(path.clone());
        }
        if let Some(path) = &self.neighborhoods {
            config.neighborhoods_path = Some(path.clone());
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(counties) = &self.counties {
            config.counties = counties.clone();
        }
        if let Some(metric) = self.metric {
            config.distance_metric = metric;
        }
        if let Some(path) = &self.database {
            config.database = Some(path.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "footfall",
            "travel",
            "--patterns",
            "p.csv",
            "--counties",
            "53033",
            "--metric",
            "haversine",
        ])
        .unwrap();
        assert_eq!(cli.command, Command::Travel);

        let mut config = Config::from_lookup(|_| None).unwrap();
        cli.apply(&mut config);
        assert_eq!(config.patterns_path, Some(PathBuf::from("p.csv")));
        assert_eq!(config.counties.prefixes(), ["53033"]);
        assert_eq!(config.distance_metric, DistanceMetric::Haversine);
        assert_eq!(config.output_dir, PathBuf::from("out"));
    }

    #[test]
    fn test_preview_arguments() {
        let cli = Cli::try_parse_from(["footfall", "preview", "cafes_latest", "-l", "5"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Preview {
                table: "cafes_latest".to_string(),
                limit: 5
            }
        );
    }

    #[test]
    fn test_rejects_bad_metric() {
        assert!(Cli::try_parse_from(["footfall", "--metric", "taxicab", "cafes"]).is_err());
    }
}
