//! Report generation for the site selection analysis.

use crate::engine::AnalyticsEngine;
use crate::error::Result;
use crate::queries::{
    DistanceTraveled, HistogramBin, HomeCbgVisitors, NeighborhoodVisits, TravelDistance,
};
use footfall_domain::VisitorType;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Thresholds and limits of the analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParams {
    /// Home CBG rows need strictly more visitors than this to count as local travel
    pub min_cbg_visitors: i64,
    /// Cafes need strictly more visits than this for the travel comparison
    pub min_total_visits: i64,
    /// Cafes per visitor type on the tourist/local map
    pub visitor_type_limit: usize,
    /// Home CBGs on the origins map
    pub top_home_cbgs: usize,
    /// Outlier cutoff for average home distance, meters
    pub distance_cutoff_m: f64,
    /// Histogram bucket width, meters
    pub histogram_bin_m: f64,
    /// Rows per table in the report
    pub report_rows: usize,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            min_cbg_visitors: 4,
            min_total_visits: 1_000,
            visitor_type_limit: 500,
            top_home_cbgs: 1_000,
            distance_cutoff_m: 25_000.0,
            histogram_bin_m: 1_000.0,
            report_rows: 10,
        }
    }
}

/// Neighborhood ranking row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborhoodRank {
    pub rank: usize,
    #[serde(flatten)]
    pub visits: NeighborhoodVisits,
}

/// Answers to the three site selection questions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSelectionReport {
    pub run_id: Uuid,
    pub generated_at: String,
    pub distance_metric: String,
    pub counties: Vec<String>,
    pub params: AnalysisParams,

    pub pattern_rows: i64,
    pub cafe_count: usize,

    // How far are customers willing to travel?
    pub furthest_traveled: Vec<TravelDistance>,
    pub distance_histogram: Vec<HistogramBin>,
    pub qualifying_cafes: usize,
    pub most_tourists: Vec<DistanceTraveled>,
    pub most_locals: Vec<DistanceTraveled>,

    // What location receives the most visibility?
    pub neighborhoods: Vec<NeighborhoodRank>,

    // Where do customers come from?
    pub home_cbgs: Vec<HomeCbgVisitors>,
}

impl AnalyticsEngine {
    /// Run the full analysis and gather the answers.
    pub fn generate_report(&self, params: &AnalysisParams) -> Result<SiteSelectionReport> {
        self.compute_local_distances(params.min_cbg_visitors)?;
        self.assign_neighborhoods()?;
        self.assemble_report(params)
    }

    /// Build the report from `local_visitor_distances` and
    /// `cafe_neighborhoods` as they stand, without recomputing them.
    pub fn assemble_report(&self, params: &AnalysisParams) -> Result<SiteSelectionReport> {
        let pattern_rows = self.table_count("patterns")?;
        let cafe_count = self.latest_cafes()?.len();

        let furthest_traveled = self
            .furthest_traveled(None)?
            .into_iter()
            .take(params.report_rows)
            .collect();
        let distance_histogram =
            self.distance_histogram(params.histogram_bin_m, Some(params.distance_cutoff_m))?;

        let qualifying_cafes = self.distance_traveled(params.min_total_visits)?.len();
        let (most_tourists, most_locals) = self
            .visitor_types(params.report_rows)?
            .into_iter()
            .partition::<Vec<_>, _>(|entry| entry.visitor_type == VisitorType::Tourist);

        let neighborhoods = self
            .neighborhood_visits()?
            .into_iter()
            .take(params.report_rows)
            .enumerate()
            .map(|(i, visits)| NeighborhoodRank { rank: i + 1, visits })
            .collect();

        let home_cbgs = self.home_cbg_visitors(params.report_rows)?;

        info!(
            pattern_rows,
            cafe_count, qualifying_cafes, "site selection report generated"
        );

        Ok(SiteSelectionReport {
            run_id: Uuid::new_v4(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            distance_metric: self.metric.to_string(),
            counties: self.counties.prefixes().to_vec(),
            params: params.clone(),
            pattern_rows,
            cafe_count,
            furthest_traveled,
            distance_histogram,
            qualifying_cafes,
            most_tourists: most_tourists.into_iter().map(|e| e.cafe).collect(),
            most_locals: most_locals.into_iter().map(|e| e.cafe).collect(),
            neighborhoods,
            home_cbgs,
        })
    }

    /// Generate report as JSON string.
    pub fn generate_report_json(&self, params: &AnalysisParams) -> Result<String> {
        let report = self.generate_report(params)?;
        report_json(&report)
    }

    /// Generate Markdown report.
    pub fn generate_report_markdown(&self, params: &AnalysisParams) -> Result<String> {
        let report = self.generate_report(params)?;
        Ok(report_markdown(&report))
    }
}

/// Serialize a report as pretty JSON.
pub fn report_json(report: &SiteSelectionReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

fn meters(value: Option<f64>) -> String {
    value
        .map(|m| format!("{:.1} km", m / 1_000.0))
        .unwrap_or_else(|| "N/A".to_string())
}

/// Render a report as Markdown.
pub fn report_markdown(report: &SiteSelectionReport) -> String {
    let mut md = String::new();
    md.push_str("# Coffee Shop Site Selection Report\n\n");
    md.push_str(&format!("**Generated:** {}\n\n", report.generated_at));
    md.push_str(&format!("**Run:** {}\n\n", report.run_id));

    md.push_str("| Metric | Value |\n");
    md.push_str("|--------|-------|\n");
    md.push_str(&format!("| Counties | {} |\n", report.counties.join(", ")));
    md.push_str(&format!("| Distance Metric | {} |\n", report.distance_metric));
    md.push_str(&format!("| Pattern Rows | {} |\n", report.pattern_rows));
    md.push_str(&format!("| Cafes | {} |\n", report.cafe_count));
    md.push_str(&format!(
        "| Cafes With > {} Visits | {} |\n",
        report.params.min_total_visits, report.qualifying_cafes
    ));
    md.push('\n');

    md.push_str("## How Far Do Customers Travel for Coffee?\n\n");
    if !report.furthest_traveled.is_empty() {
        md.push_str("### Highest Average Median Distance From Home\n\n");
        md.push_str("| Rank | Cafe | Placekey | Avg Median Distance |\n");
        md.push_str("|------|------|----------|---------------------|\n");
        for (i, row) in report.furthest_traveled.iter().enumerate() {
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                i + 1,
                row.location_name,
                row.placekey,
                meters(row.avg_median_dist_from_home)
            ));
        }
        md.push('\n');
    }

    if !report.distance_histogram.is_empty() {
        md.push_str(&format!(
            "### Distance Distribution (below {:.0} km)\n\n",
            report.params.distance_cutoff_m / 1_000.0
        ));
        md.push_str("| Bucket | Cafes |\n");
        md.push_str("|--------|-------|\n");
        for bin in &report.distance_histogram {
            md.push_str(&format!(
                "| {:.1}-{:.1} km | {} |\n",
                bin.bin_start_m / 1_000.0,
                bin.bin_end_m / 1_000.0,
                bin.cafes
            ));
        }
        md.push('\n');
    }

    for (title, rows) in [
        ("Most Tourist Visitors", &report.most_tourists),
        ("Most Local Visitors", &report.most_locals),
    ] {
        if rows.is_empty() {
            continue;
        }
        md.push_str(&format!("### {title}\n\n"));
        md.push_str("| Cafe | Address | Avg Median Distance | Local Median Distance | Difference | Visits |\n");
        md.push_str("|------|---------|---------------------|-----------------------|------------|--------|\n");
        for row in rows {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} |\n",
                row.cafe.location_name,
                row.cafe.street_address.as_deref().unwrap_or(""),
                meters(row.avg_median_dist_from_home),
                meters(Some(row.median_dist_traveled_local)),
                meters(row.distance_traveled_diff),
                row.total_visits
            ));
        }
        md.push('\n');
    }

    if !report.neighborhoods.is_empty() {
        md.push_str("## Which Neighborhoods Get the Most Visits?\n\n");
        md.push_str("| Rank | Neighborhood | Cafes | Visits | Visitors |\n");
        md.push_str("|------|--------------|-------|--------|----------|\n");
        for row in &report.neighborhoods {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                row.rank,
                row.visits.neighborhood,
                row.visits.cafes,
                row.visits.total_visits,
                row.visits.total_visitors
            ));
        }
        md.push('\n');
    }

    if !report.home_cbgs.is_empty() {
        md.push_str("## Where Do Coffee Customers Live?\n\n");
        md.push_str("| Rank | Home CBG | Visitors |\n");
        md.push_str("|------|----------|----------|\n");
        for (i, row) in report.home_cbgs.iter().enumerate() {
            md.push_str(&format!("| {} | {} | {} |\n", i + 1, row.cbg, row.visitors));
        }
        md.push('\n');
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::{engine, record};

    #[test]
    fn test_empty_report() {
        let engine = engine();
        let report = engine.generate_report(&AnalysisParams::default()).unwrap();
        assert_eq!(report.cafe_count, 0);
        assert!(report.furthest_traveled.is_empty());
        assert!(report.neighborhoods.is_empty());
        assert_eq!(report.counties.len(), 3);
    }

    #[test]
    fn test_markdown_generation() {
        let engine = engine();
        engine
            .ingest_pattern(&record(
                "p1",
                "Espresso Bar",
                1,
                (47.61, -122.33),
                Some(2_500.0),
                50,
                &[("530330082001", 9)],
            ))
            .unwrap();
        let md = engine
            .generate_report_markdown(&AnalysisParams::default())
            .unwrap();
        assert!(md.contains("# Coffee Shop Site Selection Report"));
        assert!(md.contains("Espresso Bar"));
        assert!(md.contains("530330082001"));
    }

    #[test]
    fn test_json_round_trip_keeps_params() {
        let engine = engine();
        let params = AnalysisParams {
            report_rows: 3,
            ..AnalysisParams::default()
        };
        let json = engine.generate_report_json(&params).unwrap();
        let parsed: SiteSelectionReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.params, params);
        assert_eq!(parsed.distance_metric, "web-mercator");
    }
}
