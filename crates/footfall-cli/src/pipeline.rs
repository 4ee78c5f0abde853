//! Runs one command against a loaded engine and writes its outputs.

use crate::cli::Command;
use crate::config::Config;
use anyhow::{Context, Result, anyhow};
use footfall_analytics::AnalyticsEngine;
use footfall_analytics::reports::{report_json, report_markdown};
use footfall_maps::{LeafletMap, MapError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Tables written as Parquet by the full report
const DERIVED_TABLES: &[&str] = &[
    "cafes_latest",
    "furthest_traveled",
    "total_visits",
    "local_visitor_distances",
    "median_local_distance",
    "distance_traveled",
    "cafe_neighborhoods",
    "neighborhood_visits",
    "home_cbg_visitors",
];

/// Which inputs a command reads
#[derive(Debug, Clone, Copy, Default)]
struct Inputs {
    block_groups: bool,
    neighborhoods: bool,
}

impl Command {
    fn inputs(&self) -> Inputs {
        match self {
            Self::Cafes | Self::Preview { .. } => Inputs::default(),
            Self::Travel | Self::Origins => Inputs {
                block_groups: true,
                neighborhoods: false,
            },
            Self::Visibility => Inputs {
                block_groups: false,
                neighborhoods: true,
            },
            Self::Report => Inputs {
                block_groups: true,
                neighborhoods: true,
            },
        }
    }
}

pub struct Pipeline {
    engine: AnalyticsEngine,
    config: Config,
}

impl Pipeline {
    /// Open the engine and load whatever `command` needs.
    pub fn open(config: Config, command: &Command) -> Result<Self> {
        let engine = match &config.database {
            Some(path) => AnalyticsEngine::new_persistent(
                path,
                config.counties.clone(),
                config.distance_metric,
            )
            .with_context(|| format!("opening database {}", path.display()))?,
            None => AnalyticsEngine::new_in_memory(config.counties.clone(), config.distance_metric)?,
        };
        let pipeline = Self { engine, config };

        // Preview reads whatever is configured; other commands need their inputs
        let preview = matches!(command, Command::Preview { .. });
        let inputs = command.inputs();
        pipeline.load(
            "patterns",
            "FOOTFALL_PATTERNS_PATH",
            pipeline.config.patterns_path.as_deref(),
            !preview,
            |engine, path| engine.load_patterns_csv(path),
        )?;
        if inputs.block_groups || preview {
            pipeline.load(
                "census_block_groups",
                "FOOTFALL_BLOCK_GROUPS_PATH",
                pipeline.config.block_groups_path.as_deref(),
                !preview,
                |engine, path| engine.load_block_groups_csv(path),
            )?;
        }
        if inputs.neighborhoods || preview {
            pipeline.load(
                "neighborhoods",
                "FOOTFALL_NEIGHBORHOODS_PATH",
                pipeline.config.neighborhoods_path.as_deref(),
                !preview,
                |engine, path| engine.load_neighborhoods_csv(path),
            )?;
        }
        Ok(pipeline)
    }

    /// Load `table` from `path` unless a persistent database already holds it.
    fn load<F>(
        &self,
        table: &str,
        env_var: &str,
        path: Option<&Path>,
        required: bool,
        loader: F,
    ) -> Result<()>
    where
        F: Fn(&AnalyticsEngine, &Path) -> footfall_analytics::error::Result<usize>,
    {
        if self.engine.table_count(table)? > 0 {
            info!(table, "already loaded, input skipped");
            return Ok(());
        }
        match path {
            Some(path) => {
                loader(&self.engine, path)
                    .with_context(|| format!("loading {table} from {}", path.display()))?;
                Ok(())
            }
            None if !required => Ok(()),
            None => Err(anyhow!("{table} input missing: set {env_var} or pass the matching flag")),
        }
    }

    pub fn engine(&self) -> &AnalyticsEngine {
        &self.engine
    }

    pub fn run(&self, command: &Command) -> Result<()> {
        if !matches!(command, Command::Preview { .. }) {
            fs::create_dir_all(&self.config.output_dir).with_context(|| {
                format!("creating {}", self.config.output_dir.display())
            })?;
        }
        match command {
            Command::Cafes => self.cafes(),
            Command::Travel => self.travel(),
            Command::Visibility => self.visibility(),
            Command::Origins => self.origins(),
            Command::Report => self.report(),
            Command::Preview { table, limit } => {
                println!("{}", self.engine.preview(table, *limit)?);
                Ok(())
            }
        }
    }

    fn output(&self, name: &str) -> PathBuf {
        self.config.output_dir.join(name)
    }

    /// Write `<stem>.html` and `<stem>.geojson`. A map with nothing to draw
    /// is logged and skipped.
    fn write_map(&self, map: footfall_maps::Result<LeafletMap>, stem: &str) -> Result<()> {
        let map = match map {
            Ok(map) => map,
            Err(MapError::Empty(title)) => {
                warn!(map = %title, "nothing to draw, map skipped");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let html = self.output(&format!("{stem}.html"));
        fs::write(&html, map.render_html()?)
            .with_context(|| format!("writing {}", html.display()))?;
        let geojson = self.output(&format!("{stem}.geojson"));
        fs::write(&geojson, map.to_geojson()?)
            .with_context(|| format!("writing {}", geojson.display()))?;
        info!(map = stem, features = map.feature_count(), "map written");
        Ok(())
    }

    /// Write `table` to `<stem>.csv`.
    fn export_csv(&self, table: &str, stem: &str) -> Result<()> {
        let path = self.output(&format!("{stem}.csv"));
        self.engine
            .export_csv(table, &path)
            .with_context(|| format!("exporting {table}"))?;
        info!(path = %path.display(), "table exported");
        Ok(())
    }

    fn cafes(&self) -> Result<()> {
        let cafes = self.engine.latest_cafes()?;
        self.write_map(footfall_maps::cafes_map(&cafes), "cafes")
    }

    fn travel(&self) -> Result<()> {
        let params = &self.config.params;

        self.engine.furthest_traveled(None)?;
        self.export_csv("furthest_traveled", "furthest_traveled")?;
        println!(
            "{}",
            self.engine.preview(
                "SELECT * FROM furthest_traveled ORDER BY avg_median_dist_from_home DESC NULLS LAST",
                20
            )?
        );

        let bins = self
            .engine
            .distance_histogram(params.histogram_bin_m, Some(params.distance_cutoff_m))?;
        let widest = bins.iter().map(|b| b.cafes).max().unwrap_or(0).max(1);
        for bin in &bins {
            let bar = "#".repeat(usize::try_from(bin.cafes * 40 / widest).unwrap_or(0));
            println!(
                "{:>6.1} - {:<6.1} km | {:>5} {bar}",
                bin.bin_start_m / 1_000.0,
                bin.bin_end_m / 1_000.0,
                bin.cafes
            );
        }

        self.engine.compute_local_distances(params.min_cbg_visitors)?;
        let rows = self.engine.distance_traveled(params.min_total_visits)?;
        info!(cafes = rows.len(), "cafes compared against local travel");
        self.export_csv("distance_traveled", "distance_traveled")?;

        let entries = self.engine.visitor_types(params.visitor_type_limit)?;
        self.write_map(footfall_maps::visitor_type_map(&entries), "visitor_types")
    }

    fn visibility(&self) -> Result<()> {
        self.engine.assign_neighborhoods()?;
        let rows = self.engine.neighborhood_visits()?;
        self.export_csv("neighborhood_visits", "neighborhood_visits")?;
        println!(
            "{}",
            self.engine.preview(
                "SELECT neighborhood, cafes, total_visits, total_visitors FROM neighborhood_visits ORDER BY total_visits DESC",
                20
            )?
        );

        self.write_map(footfall_maps::neighborhood_map(&rows), "neighborhoods")
    }

    fn origins(&self) -> Result<()> {
        let top = self.config.params.top_home_cbgs;
        let rows = self.engine.home_cbg_visitors(top)?;
        info!(home_cbgs = rows.len(), "top home block groups ranked");
        self.export_csv("home_cbg_visitors", "home_cbgs")?;

        let areas = self.engine.home_cbg_polygons(top)?;
        self.write_map(footfall_maps::home_cbg_map(&areas), "home_cbgs")
    }

    fn report(&self) -> Result<()> {
        self.cafes()?;
        self.travel()?;
        self.visibility()?;
        self.origins()?;

        // Local distances and neighborhood assignments are already in place
        let report = self.engine.assemble_report(&self.config.params)?;
        fs::write(self.output("report.json"), report_json(&report)?)
            .context("writing report.json")?;
        fs::write(self.output("report.md"), report_markdown(&report))
            .context("writing report.md")?;

        for table in DERIVED_TABLES {
            let path = self.output(&format!("{table}.parquet"));
            self.engine
                .export_parquet(table, &path)
                .with_context(|| format!("exporting {table} to Parquet"))?;
        }

        info!(
            run_id = %report.run_id,
            output_dir = %self.config.output_dir.display(),
            "report written"
        );
        Ok(())
    }
}
