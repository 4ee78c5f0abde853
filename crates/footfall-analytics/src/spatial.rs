//! Spatial helpers built on `geo`: WKT parsing, centroids, Web Mercator
//! projection, distances and point-in-polygon lookup.

use crate::error::{AnalyticsError, Result};
use footfall_domain::{Coordinates, DistanceMetric};
use geo::{BoundingRect, Centroid, Distance, Geometry, Intersects, Point, Rect, coord};
use wkt::TryFromWkt;

/// Sphere radius used by EPSG:3857.
pub const WEB_MERCATOR_RADIUS_M: f64 = 6_378_137.0;

/// Latitude at which EPSG:3857 becomes square.
pub const WEB_MERCATOR_MAX_LAT: f64 = 85.051_128_78;

/// Parse a WKT string into a geometry.
pub fn parse_wkt(text: &str) -> Result<Geometry<f64>> {
    Geometry::<f64>::try_from_wkt_str(text.trim())
        .map_err(|e| AnalyticsError::Geometry(format!("invalid WKT: {e}")))
}

/// Centroid of any geometry; `None` for empty geometries.
pub fn centroid(geometry: &Geometry<f64>) -> Option<Point<f64>> {
    geometry.centroid()
}

/// Point for a cafe location, x = longitude, y = latitude.
pub fn cafe_point(coords: Coordinates) -> Point<f64> {
    Point::new(coords.longitude, coords.latitude)
}

/// Project a WGS84 lon/lat point to EPSG:3857 meters.
pub fn to_web_mercator(point: Point<f64>) -> Point<f64> {
    let lat = point
        .y()
        .clamp(-WEB_MERCATOR_MAX_LAT, WEB_MERCATOR_MAX_LAT)
        .to_radians();
    let x = WEB_MERCATOR_RADIUS_M * point.x().to_radians();
    let y = WEB_MERCATOR_RADIUS_M * (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln();
    Point::new(x, y)
}

/// Distance in meters between two lon/lat points.
pub fn distance_m(a: Point<f64>, b: Point<f64>, metric: DistanceMetric) -> f64 {
    match metric {
        DistanceMetric::WebMercator => {
            let (pa, pb) = (to_web_mercator(a), to_web_mercator(b));
            (pa.x() - pb.x()).hypot(pa.y() - pb.y())
        }
        DistanceMetric::Haversine => {
            Coordinates::new(a.y(), a.x()).distance_to_m(&Coordinates::new(b.y(), b.x()))
        }
        DistanceMetric::Geodesic => geo::Geodesic::distance(a, b),
    }
}

/// Bounding box covering every geometry, `None` if nothing has extent.
pub fn bounds<'a, I>(geometries: I) -> Option<Rect<f64>>
where
    I: IntoIterator<Item = &'a Geometry<f64>>,
{
    geometries
        .into_iter()
        .filter_map(|geometry| geometry.bounding_rect())
        .reduce(|acc, rect| {
            Rect::new(
                coord! { x: acc.min().x.min(rect.min().x), y: acc.min().y.min(rect.min().y) },
                coord! { x: acc.max().x.max(rect.max().x), y: acc.max().y.max(rect.max().y) },
            )
        })
}

/// A polygon with an id and a display name.
#[derive(Debug, Clone)]
pub struct NamedPolygon {
    /// Row id
    pub id: i64,
    /// Display name
    pub name: String,
    /// Geometry in lon/lat
    pub geometry: Geometry<f64>,
    bbox: Option<Rect<f64>>,
}

/// Linear scan point-in-polygon lookup with a bounding box prefilter.
#[derive(Debug, Clone, Default)]
pub struct PolygonIndex {
    polygons: Vec<NamedPolygon>,
}

impl PolygonIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a polygon.
    pub fn insert(&mut self, id: i64, name: impl Into<String>, geometry: Geometry<f64>) {
        let bbox = geometry.bounding_rect();
        self.polygons.push(NamedPolygon {
            id,
            name: name.into(),
            geometry,
            bbox,
        });
    }

    /// Number of polygons.
    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    /// True when no polygons were added.
    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    /// Every polygon intersecting the point. Boundary points count as inside.
    pub fn containing(&self, point: Point<f64>) -> impl Iterator<Item = &NamedPolygon> + '_ {
        self.polygons.iter().filter(move |polygon| {
            polygon.bbox.is_some_and(|bbox| {
                point.x() >= bbox.min().x
                    && point.x() <= bbox.max().x
                    && point.y() >= bbox.min().y
                    && point.y() <= bbox.max().y
            }) && polygon.geometry.intersects(&point)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: &str = "POLYGON ((-122.4 47.5, -122.2 47.5, -122.2 47.7, -122.4 47.7, -122.4 47.5))";

    #[test]
    fn test_parse_and_centroid() {
        let geometry = parse_wkt(SQUARE).unwrap();
        let c = centroid(&geometry).unwrap();
        assert!((c.x() + 122.3).abs() < 1e-9);
        assert!((c.y() - 47.6).abs() < 1e-9);
    }

    #[test]
    fn test_parse_invalid_wkt() {
        assert!(matches!(
            parse_wkt("POLYGON ((nonsense"),
            Err(AnalyticsError::Geometry(_))
        ));
    }

    #[test]
    fn test_web_mercator_origin_and_scale() {
        let origin = to_web_mercator(Point::new(0.0, 0.0));
        assert!(origin.x().abs() < 1e-6 && origin.y().abs() < 1e-6);

        let edge = to_web_mercator(Point::new(180.0, 0.0));
        assert!((edge.x() - 20_037_508.342_789_244).abs() < 1e-3);

        let clamped = to_web_mercator(Point::new(0.0, 89.9));
        assert!((clamped.y() - 20_037_508.342_789_244).abs() < 1.0);
    }

    #[test]
    fn test_mercator_distance_is_inflated_at_seattle_latitude() {
        let a = Point::new(-122.3321, 47.6062);
        let b = Point::new(-122.3321, 47.6152);
        let haversine = distance_m(a, b, DistanceMetric::Haversine);
        let geodesic = distance_m(a, b, DistanceMetric::Geodesic);
        let mercator = distance_m(a, b, DistanceMetric::WebMercator);

        assert!((haversine - 1_000.0).abs() < 10.0, "haversine {haversine}");
        assert!((geodesic - haversine).abs() < 10.0, "geodesic {geodesic}");
        // Scale factor is 1 / cos(lat)
        let ratio = mercator / haversine;
        assert!((ratio - 1.0 / 47.61_f64.to_radians().cos()).abs() < 0.01, "ratio {ratio}");
    }

    #[test]
    fn test_polygon_index() {
        let mut index = PolygonIndex::new();
        index.insert(1, "Downtown", parse_wkt(SQUARE).unwrap());
        index.insert(
            2,
            "Overlap",
            parse_wkt("POLYGON ((-122.3 47.6, -122.1 47.6, -122.1 47.8, -122.3 47.8, -122.3 47.6))")
                .unwrap(),
        );
        assert_eq!(index.len(), 2);

        let inside_one: Vec<_> = index
            .containing(Point::new(-122.35, 47.55))
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(inside_one, vec!["Downtown"]);

        let inside_both = index.containing(Point::new(-122.25, 47.65)).count();
        assert_eq!(inside_both, 2);

        assert_eq!(index.containing(Point::new(-121.0, 47.0)).count(), 0);
    }

    #[test]
    fn test_bounds_union() {
        let a = parse_wkt(SQUARE).unwrap();
        let b = parse_wkt("POINT (-122.0 48.0)").unwrap();
        let rect = bounds([&a, &b]).unwrap();
        assert_eq!(rect.min().x, -122.4);
        assert_eq!(rect.min().y, 47.5);
        assert_eq!(rect.max().x, -122.0);
        assert_eq!(rect.max().y, 48.0);
        assert!(bounds(std::iter::empty()).is_none());
    }
}
