//! # Site Selection Maps
//!
//! One builder per question: where the cafes are, who visits them, which
//! neighborhoods see the most visits and where visitors live.

use crate::error::{MapError, Result};
use crate::layer::{ChoroplethLayer, CircleLayer};
use crate::leaflet::LeafletMap;
use footfall_analytics::queries::{HomeCbgArea, NeighborhoodVisits, VisitorTypeEntry};
use footfall_analytics::spatial;
use footfall_analytics::stats::quantile_bins;
use footfall_domain::Cafe;
use geo::Geometry;
use geojson::{JsonObject, JsonValue};
use serde::Serialize;
use tracing::{info, warn};

const CAFE_FIELDS: &[&str] = &[
    "placekey",
    "location_name",
    "brands",
    "street_address",
    "city",
    "region",
    "postal_code",
    "open_hours",
];

const VISITOR_TYPE_FIELDS: &[&str] = &[
    "visitor_type",
    "placekey",
    "location_name",
    "brands",
    "street_address",
    "city",
    "region",
    "postal_code",
    "open_hours",
    "avg_median_dist_from_home",
];

fn properties<T: Serialize>(row: &T) -> Result<JsonObject> {
    match serde_json::to_value(row)? {
        JsonValue::Object(map) => Ok(map),
        other => {
            let mut map = JsonObject::new();
            map.insert("value".to_string(), other);
            Ok(map)
        }
    }
}

fn finish(map: LeafletMap, skipped: usize) -> Result<LeafletMap> {
    if skipped > 0 {
        warn!(map = %map.title, skipped, "rows without a usable location skipped");
    }
    if map.feature_count() == 0 {
        return Err(MapError::Empty(map.title));
    }
    info!(map = %map.title, features = map.feature_count(), "map built");
    Ok(map)
}

/// Blue circle at every cafe.
pub fn cafes_map(cafes: &[Cafe]) -> Result<LeafletMap> {
    let mut layer = CircleLayer::new("Coffee shops", CAFE_FIELDS);
    let mut skipped = 0;
    for cafe in cafes {
        let Some(coords) = cafe.coordinates() else {
            skipped += 1;
            continue;
        };
        let mut props = properties(cafe)?;
        props.insert("color".to_string(), JsonValue::from("blue"));
        layer.push_point(spatial::cafe_point(coords), props);
    }
    finish(LeafletMap::new("Coffee shops").with_layer(layer), skipped)
}

/// Tourist cafes in blue, local cafes in red.
pub fn visitor_type_map(entries: &[VisitorTypeEntry]) -> Result<LeafletMap> {
    let mut layer = CircleLayer::new("Visitor types", VISITOR_TYPE_FIELDS);
    let mut skipped = 0;
    for entry in entries {
        let Some(coords) = entry.cafe.cafe.coordinates() else {
            skipped += 1;
            continue;
        };
        let mut props = properties(entry)?;
        props.insert(
            "color".to_string(),
            JsonValue::from(entry.visitor_type.color()),
        );
        layer.push_point(spatial::cafe_point(coords), props);
    }
    finish(
        LeafletMap::new("Tourist vs. local coffee shops").with_layer(layer),
        skipped,
    )
}

/// Parse each row's WKT, dropping the rows that fail.
fn with_geometry<'a, T>(
    rows: &'a [T],
    wkt: impl Fn(&T) -> &str,
) -> (Vec<(&'a T, Geometry<f64>)>, usize) {
    let mut parsed = Vec::with_capacity(rows.len());
    let mut skipped = 0;
    for row in rows {
        match spatial::parse_wkt(wkt(row)) {
            Ok(geometry) => parsed.push((row, geometry)),
            Err(_) => skipped += 1,
        }
    }
    (parsed, skipped)
}

/// Neighborhoods shaded by the percentile of their total visits.
pub fn neighborhood_map(rows: &[NeighborhoodVisits]) -> Result<LeafletMap> {
    let (parsed, skipped) = with_geometry(rows, |row| row.polygon_wkt.as_str());
    let visits: Vec<f64> = parsed
        .iter()
        .map(|(row, _)| row.total_visits as f64)
        .collect();
    let percentiles = quantile_bins(&visits, 100);

    let mut layer = ChoroplethLayer::new(
        "Neighborhood visits",
        "percentile",
        &["neighborhood", "cafes", "total_visits", "total_visitors", "percentile"],
    );
    for ((row, geometry), percentile) in parsed.iter().zip(percentiles) {
        let mut props = properties(*row)?;
        props.insert("percentile".to_string(), JsonValue::from(percentile));
        layer.push_polygon(geometry, props);
    }
    finish(
        LeafletMap::new("Coffee shop visits by neighborhood").with_layer(layer),
        skipped,
    )
}

/// Home block groups shaded by the percentile of their visitor count.
pub fn home_cbg_map(rows: &[HomeCbgArea]) -> Result<LeafletMap> {
    let (parsed, skipped) = with_geometry(rows, |row| row.polygon_wkt.as_str());
    let visitors: Vec<f64> = parsed
        .iter()
        .map(|(row, _)| row.visitors as f64)
        .collect();
    let quantiles = quantile_bins(&visitors, 100);

    let mut layer = ChoroplethLayer::new(
        "Visitor home block groups",
        "quantile",
        &["cbg", "visitors", "quantile"],
    );
    for ((row, geometry), quantile) in parsed.iter().zip(quantiles) {
        let mut props = JsonObject::new();
        props.insert("cbg".to_string(), JsonValue::from(row.cbg.clone()));
        props.insert("visitors".to_string(), JsonValue::from(row.visitors));
        props.insert("quantile".to_string(), JsonValue::from(quantile));
        layer.push_polygon(geometry, props);
    }
    finish(
        LeafletMap::new("Where coffee shop visitors live").with_layer(layer),
        skipped,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use footfall_analytics::queries::DistanceTraveled;
    use footfall_domain::VisitorType;

    fn cafe(placekey: &str, coords: Option<(f64, f64)>) -> Cafe {
        Cafe {
            placekey: placekey.to_string(),
            location_name: format!("Cafe {placekey}"),
            brands: None,
            street_address: Some("1st Ave".to_string()),
            city: Some("Seattle".to_string()),
            region: Some("WA".to_string()),
            postal_code: None,
            latitude: coords.map(|c| c.0),
            longitude: coords.map(|c| c.1),
            open_hours: None,
        }
    }

    fn square(x: f64, y: f64) -> String {
        format!(
            "POLYGON (({x} {y}, {} {y}, {} {}, {x} {}, {x} {y}))",
            x + 0.01,
            x + 0.01,
            y + 0.01,
            y + 0.01
        )
    }

    fn property(map: &LeafletMap, index: usize, key: &str) -> JsonValue {
        map.feature_collection().features[index]
            .properties
            .as_ref()
            .and_then(|p| p.get(key).cloned())
            .unwrap_or(JsonValue::Null)
    }

    #[test]
    fn test_cafes_map_skips_missing_coordinates() {
        let map = cafes_map(&[
            cafe("a", Some((47.61, -122.33))),
            cafe("b", None),
            cafe("c", Some((147.0, -122.33))),
        ])
        .unwrap();
        assert_eq!(map.feature_count(), 1);
        assert_eq!(property(&map, 0, "color"), "blue");
        let tooltip = property(&map, 0, "tooltip");
        assert!(tooltip.as_str().unwrap().starts_with("placekey: a<br>location_name: Cafe a<br>"));
    }

    #[test]
    fn test_cafes_map_empty() {
        assert!(matches!(cafes_map(&[]), Err(MapError::Empty(_))));
        assert!(matches!(cafes_map(&[cafe("b", None)]), Err(MapError::Empty(_))));
    }

    #[test]
    fn test_visitor_type_colours() {
        let entry = |visitor_type, key| VisitorTypeEntry {
            visitor_type,
            cafe: DistanceTraveled {
                cafe: cafe(key, Some((47.6, -122.3))),
                avg_median_dist_from_home: Some(9_000.0),
                median_dist_traveled_local: 1_000.0,
                distance_traveled_diff: Some(8_000.0),
                total_visits: 2_000,
                total_visitors: Some(1_500),
            },
        };
        let map = visitor_type_map(&[
            entry(VisitorType::Tourist, "t"),
            entry(VisitorType::Local, "l"),
        ])
        .unwrap();
        assert_eq!(property(&map, 0, "color"), "blue");
        assert_eq!(property(&map, 1, "color"), "red");
        assert_eq!(property(&map, 1, "visitor_type"), "local");
        assert_eq!(property(&map, 0, "placekey"), "t");
    }

    #[test]
    fn test_neighborhood_percentiles() {
        let rows: Vec<_> = [("Belltown", 100), ("Fremont", 300), ("Broken", 50), ("Ballard", 200)]
            .into_iter()
            .enumerate()
            .map(|(i, (name, visits))| NeighborhoodVisits {
                neighborhood_id: i as i64,
                neighborhood: name.to_string(),
                polygon_wkt: if name == "Broken" {
                    "POLYGON ((".to_string()
                } else {
                    square(-122.3 + i as f64 * 0.02, 47.6)
                },
                cafes: 1,
                total_visits: visits,
                total_visitors: visits / 2,
            })
            .collect();

        let map = neighborhood_map(&rows).unwrap();
        assert_eq!(map.feature_count(), 3);
        let percentile = |i| property(&map, i, "percentile").as_f64().unwrap();
        assert_eq!(percentile(0), 0.0);
        assert_eq!(percentile(1), 0.99);
        assert_eq!(percentile(2), 0.49);
        assert_eq!(property(&map, 2, "neighborhood"), "Ballard");
    }

    #[test]
    fn test_home_cbg_quantiles() {
        let rows = vec![
            HomeCbgArea {
                cbg: "530330001001".to_string(),
                visitors: 80,
                polygon_wkt: square(-122.3, 47.6),
            },
            HomeCbgArea {
                cbg: "530330001002".to_string(),
                visitors: 20,
                polygon_wkt: square(-122.2, 47.6),
            },
        ];
        let map = home_cbg_map(&rows).unwrap();
        assert_eq!(property(&map, 0, "quantile"), 0.99);
        assert_eq!(property(&map, 1, "quantile"), 0.0);
        assert!(map.render_html().unwrap().contains("\"opacity_property\":\"quantile\""));
    }
}
