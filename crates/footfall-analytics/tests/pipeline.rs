//! End-to-end run over small CSV extracts.

use footfall_analytics::{AnalysisParams, AnalyticsEngine, AnalyticsError};
use footfall_domain::{CountyFilter, DistanceMetric};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const PATTERNS: &str = r#"placekey,location_name,brands,street_address,city,region,postal_code,latitude,longitude,open_hours,date_range_start,date_range_end,raw_visit_counts,raw_visitor_counts,distance_from_home,visitor_home_cbgs
zzw-222@5x4-4b6-xyz,Pike Place Coffee,,1912 Pike Pl,Seattle,WA,98101,47.6097,-122.3422,,2021-01-01T00:00:00-08:00,2021-02-01T00:00:00-08:00,3000,2500,40000,"{""530330081001"": 20, ""530330053011"": 8}"
zzw-222@5x4-4b6-xyz,Pike Place Coffee,,1912 Pike Pl,Seattle,WA,98101,47.6097,-122.3422,,2021-02-01T00:00:00-08:00,2021-03-01T00:00:00-08:00,2500,2000,30000,"{""530330081001"": 12, ""060750101001"": 40}"
zzw-223@5x4-4b6-abc,Fremont Beans,,3400 Fremont Ave N,Seattle,WA,98103,47.6510,-122.3505,,2021-01-01T00:00:00-08:00,2021-02-01T00:00:00-08:00,1800,900,2500,"{""530330053011"": 30, ""530330081001"": 6}"
zzw-224@5x4-4b6-def,Quiet Corner,,1 Nowhere Rd,Seattle,WA,98199,47.6400,-122.4000,,2021-01-01T00:00:00-08:00,2021-02-01T00:00:00-08:00,40,30,1500,
,Missing Key,,,Seattle,WA,98101,47.6,-122.3,,2021-01-01,,10,10,100,"{}"
zzw-225@5x4-4b6-ghi,Broken Json,,,Seattle,WA,98101,47.6,-122.3,,2021-01-01,,10,10,100,"{not json"
"#;

const BLOCK_GROUPS: &str = r#"GEOID,geometry
530330081001,"POLYGON ((-122.345 47.605, -122.335 47.605, -122.335 47.615, -122.345 47.615, -122.345 47.605))"
530330053011,"POLYGON ((-122.355 47.645, -122.345 47.645, -122.345 47.655, -122.355 47.655, -122.355 47.645))"
060750101001,"POLYGON ((-122.42 37.77, -122.41 37.77, -122.41 37.78, -122.42 37.78, -122.42 37.77))"
530330099001,"POLYGON ((broken"
5303300990,"POLYGON ((-122.30 47.60, -122.29 47.60, -122.29 47.61, -122.30 47.61, -122.30 47.60))"
"#;

const NEIGHBORHOODS: &str = r#"S_HOOD,geometry
Downtown,"POLYGON ((-122.36 47.60, -122.33 47.60, -122.33 47.62, -122.36 47.62, -122.36 47.60))"
Fremont,"POLYGON ((-122.36 47.64, -122.34 47.64, -122.34 47.66, -122.36 47.66, -122.36 47.64))"
Laurelhurst,"POLYGON ((-122.29 47.65, -122.27 47.65, -122.27 47.67, -122.29 47.67, -122.29 47.65))"
"#;

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn loaded_engine(dir: &TempDir) -> AnalyticsEngine {
    let engine =
        AnalyticsEngine::new_in_memory(CountyFilter::seattle(), DistanceMetric::WebMercator)
            .unwrap();
    engine
        .load_patterns_csv(write(dir.path(), "patterns.csv", PATTERNS))
        .unwrap();
    engine
        .load_block_groups_csv(write(dir.path(), "cbg.csv", BLOCK_GROUPS))
        .unwrap();
    engine
        .load_neighborhoods_csv(write(dir.path(), "hoods.csv", NEIGHBORHOODS))
        .unwrap();
    engine
}

#[test]
fn test_csv_loading() {
    let dir = TempDir::new().unwrap();
    let engine = loaded_engine(&dir);

    // The row without a placekey is dropped
    assert_eq!(engine.table_count("patterns").unwrap(), 5);
    // Home CBG rows from the parseable maps only
    assert_eq!(engine.table_count("visitor_home_cbgs").unwrap(), 6);
    // Out-of-area rows, broken geometries and short GEOIDs are skipped
    assert_eq!(engine.table_count("census_block_groups").unwrap(), 2);
    assert_eq!(engine.table_count("neighborhoods").unwrap(), 3);
    assert_eq!(engine.latest_cafes().unwrap().len(), 4);
}

#[test]
fn test_full_report() {
    let dir = TempDir::new().unwrap();
    let engine = loaded_engine(&dir);
    let report = engine.generate_report(&AnalysisParams::default()).unwrap();

    assert_eq!(report.cafe_count, 4);
    assert_eq!(report.furthest_traveled[0].location_name, "Pike Place Coffee");
    assert_eq!(
        report.furthest_traveled[0].avg_median_dist_from_home,
        Some(35_000.0)
    );

    // Only the two cafes with more than 1000 visits qualify
    assert_eq!(report.qualifying_cafes, 2);
    assert_eq!(report.most_tourists[0].cafe.location_name, "Pike Place Coffee");
    assert_eq!(report.most_locals[0].cafe.location_name, "Fremont Beans");

    let names: Vec<_> = report
        .neighborhoods
        .iter()
        .map(|n| n.visits.neighborhood.as_str())
        .collect();
    assert_eq!(names, vec!["Downtown", "Fremont"]);
    assert_eq!(report.neighborhoods[0].visits.total_visits, 5_500);

    // Out-of-state origins still count toward home CBG totals
    assert_eq!(report.home_cbgs[0].cbg, "060750101001");
    assert_eq!(report.home_cbgs[0].visitors, 40);
}

#[test]
fn test_assembled_report_reads_existing_tables() {
    let dir = TempDir::new().unwrap();
    let engine = loaded_engine(&dir);
    let params = AnalysisParams::default();

    // Nothing computed yet, so no cafe has a local median
    let bare = engine.assemble_report(&params).unwrap();
    assert_eq!(bare.qualifying_cafes, 0);
    assert!(bare.neighborhoods.is_empty());

    engine.compute_local_distances(params.min_cbg_visitors).unwrap();
    engine.assign_neighborhoods().unwrap();
    let assembled = engine.assemble_report(&params).unwrap();
    let generated = engine.generate_report(&params).unwrap();
    assert_eq!(assembled.qualifying_cafes, 2);
    assert_eq!(assembled.qualifying_cafes, generated.qualifying_cafes);
    assert_eq!(assembled.neighborhoods.len(), generated.neighborhoods.len());
    assert_eq!(
        assembled.most_tourists[0].cafe.placekey,
        generated.most_tourists[0].cafe.placekey
    );
}

#[test]
fn test_local_median_uses_heavier_cbg() {
    let dir = TempDir::new().unwrap();
    let engine = loaded_engine(&dir);
    engine.compute_local_distances(4).unwrap();

    let medians = engine.median_local_distance(None).unwrap();
    let pike = medians
        .iter()
        .find(|m| m.placekey == "zzw-222@5x4-4b6-xyz")
        .unwrap();
    // 32 visitors from the adjacent CBG outweigh 8 from Fremont
    assert!(pike.median_dist_traveled_local < 1_500.0);

    let fremont = medians
        .iter()
        .find(|m| m.placekey == "zzw-223@5x4-4b6-abc")
        .unwrap();
    assert!(fremont.median_dist_traveled_local < 1_000.0);
}

#[test]
fn test_exports() {
    let dir = TempDir::new().unwrap();
    let engine = loaded_engine(&dir);
    engine.furthest_traveled(None).unwrap();

    let csv = dir.path().join("furthest_traveled.csv");
    engine.export_csv("furthest_traveled", &csv).unwrap();
    let text = fs::read_to_string(&csv).unwrap();
    assert!(text.starts_with("placekey,location_name,avg_median_dist_from_home"));
    assert_eq!(text.lines().count(), 5);

    let parquet = dir.path().join("cafes.parquet");
    engine.export_parquet("cafes_latest", &parquet).unwrap();
    assert!(fs::metadata(&parquet).unwrap().len() > 0);
}

#[test]
fn test_missing_required_column() {
    let dir = TempDir::new().unwrap();
    let engine =
        AnalyticsEngine::new_in_memory(CountyFilter::seattle(), DistanceMetric::Haversine)
            .unwrap();
    let path = write(
        dir.path(),
        "bad.csv",
        "placekey,location_name\nabc,Cafe\n",
    );

    match engine.load_patterns_csv(&path) {
        Err(AnalyticsError::MissingColumn { column, .. }) => assert_eq!(column, "latitude"),
        other => panic!("expected missing column, got {other:?}"),
    }
}

#[test]
fn test_missing_file() {
    let engine =
        AnalyticsEngine::new_in_memory(CountyFilter::seattle(), DistanceMetric::Geodesic).unwrap();
    assert!(matches!(
        engine.load_neighborhoods_csv("/definitely/not/here.csv"),
        Err(AnalyticsError::Io(_))
    ));
}
