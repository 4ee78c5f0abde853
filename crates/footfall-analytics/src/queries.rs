//! Predefined analytical queries answering the site selection questions.

use crate::engine::{AnalyticsEngine, quote_literal};
use crate::error::{AnalyticsError, Result};
use crate::spatial::{self, PolygonIndex};
use duckdb::{Row, params};
use footfall_domain::{Cafe, Coordinates, VisitorType};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Average of a cafe's monthly median home distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TravelDistance {
    pub placekey: String,
    pub location_name: String,
    pub avg_median_dist_from_home: Option<f64>,
}

/// Visit and visitor totals over the whole sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitTotals {
    pub placekey: String,
    pub total_visits: Option<i64>,
    pub total_visitors: Option<i64>,
}

/// Visitor weighted median distance travelled from home CBGs in the study area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalMedian {
    pub placekey: String,
    pub median_dist_traveled_local: f64,
}

/// Overall vs. local travel distance for a cafe with a meaningful sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceTraveled {
    #[serde(flatten)]
    pub cafe: Cafe,
    pub avg_median_dist_from_home: Option<f64>,
    pub median_dist_traveled_local: f64,
    /// Positive when visitors from outside the study area pull the overall distance up
    pub distance_traveled_diff: Option<f64>,
    pub total_visits: i64,
    pub total_visitors: Option<i64>,
}

/// A cafe tagged as drawing tourists or locals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitorTypeEntry {
    pub visitor_type: VisitorType,
    #[serde(flatten)]
    pub cafe: DistanceTraveled,
}

/// Visits to cafes inside a neighborhood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborhoodVisits {
    pub neighborhood_id: i64,
    pub neighborhood: String,
    #[serde(skip)]
    pub polygon_wkt: String,
    pub cafes: i64,
    pub total_visits: i64,
    pub total_visitors: i64,
}

/// Visitors originating from a home CBG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeCbgVisitors {
    pub cbg: String,
    pub visitors: i64,
}

/// Home CBG with its polygon, for mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeCbgArea {
    pub cbg: String,
    pub visitors: i64,
    pub polygon_wkt: String,
}

/// Histogram bucket of average home distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub bin_start_m: f64,
    pub bin_end_m: f64,
    pub cafes: i64,
}

const DISTANCE_TRAVELED_COLUMNS: &str = r#"
    placekey, location_name, brands, street_address, city, region, postal_code,
    latitude, longitude, open_hours,
    avg_median_dist_from_home, median_dist_traveled_local, distance_traveled_diff,
    total_visits, total_visitors
"#;

fn cafe_from_row(row: &Row<'_>) -> duckdb::Result<Cafe> {
    Ok(Cafe {
        placekey: row.get(0)?,
        location_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        brands: row.get(2)?,
        street_address: row.get(3)?,
        city: row.get(4)?,
        region: row.get(5)?,
        postal_code: row.get(6)?,
        latitude: row.get(7)?,
        longitude: row.get(8)?,
        open_hours: row.get(9)?,
    })
}

fn distance_traveled_from_row(row: &Row<'_>) -> duckdb::Result<DistanceTraveled> {
    Ok(DistanceTraveled {
        cafe: cafe_from_row(row)?,
        avg_median_dist_from_home: row.get(10)?,
        median_dist_traveled_local: row.get(11)?,
        distance_traveled_diff: row.get(12)?,
        total_visits: row.get(13)?,
        total_visitors: row.get(14)?,
    })
}

impl AnalyticsEngine {
    /// Most recent row of every cafe.
    pub fn latest_cafes(&self) -> Result<Vec<Cafe>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT
                placekey, location_name, brands, street_address, city, region,
                postal_code, latitude, longitude, open_hours
            FROM cafes_latest
            ORDER BY placekey
            "#,
        )?;

        let rows = stmt.query_map([], cafe_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(AnalyticsError::from)
    }

    /// Which cafes' visitors travel furthest, by the average of the monthly
    /// median distance from home. Optionally only cafes strictly below a cutoff.
    pub fn furthest_traveled(&self, max_distance_m: Option<f64>) -> Result<Vec<TravelDistance>> {
        self.materialize_furthest_traveled()?;

        let filter = match max_distance_m {
            Some(_) => "WHERE avg_median_dist_from_home < ?",
            None => "",
        };
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT placekey, location_name, avg_median_dist_from_home
            FROM furthest_traveled
            {filter}
            ORDER BY avg_median_dist_from_home DESC NULLS LAST, placekey
            "#
        ))?;

        let map = |row: &Row<'_>| -> duckdb::Result<TravelDistance> {
            Ok(TravelDistance {
                placekey: row.get(0)?,
                location_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                avg_median_dist_from_home: row.get(2)?,
            })
        };
        let rows = match max_distance_m {
            Some(cutoff) => stmt
                .query_map(params![cutoff], map)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
            None => stmt
                .query_map([], map)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }

    /// Total visits and visitors per cafe.
    pub fn total_visits(&self) -> Result<Vec<VisitTotals>> {
        self.materialize_total_visits()?;

        let mut stmt = self.conn.prepare(
            r#"
            SELECT placekey, total_visits, total_visitors
            FROM total_visits
            ORDER BY total_visits DESC NULLS LAST, placekey
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(VisitTotals {
                placekey: row.get(0)?,
                total_visits: row.get(1)?,
                total_visitors: row.get(2)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(AnalyticsError::from)
    }

    /// Distance from every cafe to the centroid of each study-area home CBG,
    /// over CBG rows with strictly more than `min_cbg_visitors` visitors.
    /// Replaces the contents of `local_visitor_distances`.
    pub fn compute_local_distances(&self, min_cbg_visitors: i64) -> Result<usize> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT
                v.placekey, v.cbg, v.visitors,
                c.latitude, c.longitude,
                g.centroid_latitude, g.centroid_longitude
            FROM (
                SELECT placekey, cbg, SUM(visitors)::BIGINT AS visitors
                FROM visitor_home_cbgs
                WHERE visitors > ? AND regexp_matches(cbg, {})
                GROUP BY placekey, cbg
            ) v
            JOIN cafes_latest c ON c.placekey = v.placekey
            JOIN census_block_groups g ON g.cbg = v.cbg
            WHERE c.latitude IS NOT NULL AND c.longitude IS NOT NULL
            "#,
            quote_literal(&self.counties.sql_regex())
        ))?;
        let pairs = stmt
            .query_map(params![min_cbg_visitors], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    Coordinates::new(row.get(3)?, row.get(4)?),
                    Coordinates::new(row.get(5)?, row.get(6)?),
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);

        self.conn.execute("DELETE FROM local_visitor_distances", [])?;
        let mut appender = self.conn.appender("local_visitor_distances")?;
        let mut count = 0;
        for (placekey, cbg, visitors, cafe, home) in pairs {
            if !cafe.is_valid() {
                warn!(placekey = %placekey, "cafe coordinates out of range, skipped");
                continue;
            }
            let distance = spatial::distance_m(
                spatial::cafe_point(cafe),
                spatial::cafe_point(home),
                self.metric,
            );
            appender.append_row(params![placekey, cbg, visitors, distance])?;
            count += 1;
        }
        appender.flush()?;

        info!(pairs = count, metric = %self.metric, "local visitor distances computed");
        Ok(count)
    }

    /// Visitor weighted median distance per cafe over `local_visitor_distances`:
    /// the smallest distance at which the cumulative visitor count reaches half
    /// of the cafe's total.
    pub fn median_local_distance(&self, max_distance_m: Option<f64>) -> Result<Vec<LocalMedian>> {
        self.materialize_median_local_distance()?;

        let filter = match max_distance_m {
            Some(_) => "WHERE median_dist_traveled_local < ?",
            None => "",
        };
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT placekey, median_dist_traveled_local
            FROM median_local_distance
            {filter}
            ORDER BY median_dist_traveled_local DESC, placekey
            "#
        ))?;

        let map = |row: &Row<'_>| -> duckdb::Result<LocalMedian> {
            Ok(LocalMedian {
                placekey: row.get(0)?,
                median_dist_traveled_local: row.get(1)?,
            })
        };
        let rows = match max_distance_m {
            Some(cutoff) => stmt
                .query_map(params![cutoff], map)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
            None => stmt
                .query_map([], map)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }

    /// Overall vs. local travel distance for cafes with strictly more than
    /// `min_total_visits` visits, largest difference first.
    ///
    /// Uses the current contents of `local_visitor_distances`; run
    /// [`Self::compute_local_distances`] first.
    pub fn distance_traveled(&self, min_total_visits: i64) -> Result<Vec<DistanceTraveled>> {
        self.materialize_distance_traveled(min_total_visits)?;

        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {DISTANCE_TRAVELED_COLUMNS}
            FROM distance_traveled
            ORDER BY distance_traveled_diff DESC NULLS LAST, placekey
            "#
        ))?;

        let rows = stmt.query_map([], distance_traveled_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(AnalyticsError::from)
    }

    /// The `limit` cafes with the largest difference tagged tourist, followed by
    /// the `limit` cafes with the smallest difference tagged local. Reads the
    /// table written by [`Self::distance_traveled`]. Cafes without an average
    /// distance are in neither set, where an ascending Spark sort would have
    /// put them first among the locals.
    pub fn visitor_types(&self, limit: usize) -> Result<Vec<VisitorTypeEntry>> {
        let mut entries = Vec::new();
        for (visitor_type, direction) in [(VisitorType::Tourist, "DESC"), (VisitorType::Local, "ASC")] {
            let mut stmt = self.conn.prepare(&format!(
                r#"
                SELECT {DISTANCE_TRAVELED_COLUMNS}
                FROM distance_traveled
                WHERE distance_traveled_diff IS NOT NULL
                ORDER BY distance_traveled_diff {direction}, placekey
                LIMIT ?
                "#
            ))?;
            let rows = stmt.query_map(params![limit as i64], distance_traveled_from_row)?;
            for row in rows {
                entries.push(VisitorTypeEntry {
                    visitor_type,
                    cafe: row?,
                });
            }
        }
        Ok(entries)
    }

    /// Point-in-polygon join of the latest cafe locations against the
    /// neighborhood polygons. Replaces the contents of `cafe_neighborhoods`.
    pub fn assign_neighborhoods(&self) -> Result<usize> {
        let mut stmt = self
            .conn
            .prepare("SELECT neighborhood_id, neighborhood, polygon_wkt FROM neighborhoods")?;
        let polygons = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);

        let mut index = PolygonIndex::new();
        for (id, name, wkt) in polygons {
            match spatial::parse_wkt(&wkt) {
                Ok(geometry) => index.insert(id, name, geometry),
                Err(e) => warn!(neighborhood = %name, error = %e, "neighborhood skipped"),
            }
        }

        let cafes = self.latest_cafes()?;
        self.conn.execute("DELETE FROM cafe_neighborhoods", [])?;
        let mut appender = self.conn.appender("cafe_neighborhoods")?;
        let mut count = 0;
        let mut outside = 0;
        for cafe in &cafes {
            let Some(coords) = cafe.coordinates() else {
                continue;
            };
            let mut matched = false;
            for polygon in index.containing(spatial::cafe_point(coords)) {
                appender.append_row(params![cafe.placekey, polygon.id])?;
                matched = true;
                count += 1;
            }
            if !matched {
                outside += 1;
            }
        }
        appender.flush()?;

        debug!(outside, "cafes outside every neighborhood");
        info!(
            cafes = cafes.len(),
            neighborhoods = index.len(),
            matches = count,
            "cafes assigned to neighborhoods"
        );
        Ok(count)
    }

    /// Total visits and visitors of the cafes inside each neighborhood. Reads
    /// the join written by [`Self::assign_neighborhoods`].
    pub fn neighborhood_visits(&self) -> Result<Vec<NeighborhoodVisits>> {
        self.materialize_total_visits()?;
        self.conn.execute_batch(
            r#"
            CREATE OR REPLACE TABLE neighborhood_visits AS
            SELECT
                n.neighborhood_id,
                n.neighborhood,
                n.polygon_wkt,
                COUNT(*) AS cafes,
                COALESCE(SUM(t.total_visits), 0)::BIGINT AS total_visits,
                COALESCE(SUM(t.total_visitors), 0)::BIGINT AS total_visitors
            FROM cafe_neighborhoods cn
            JOIN neighborhoods n ON n.neighborhood_id = cn.neighborhood_id
            JOIN total_visits t ON t.placekey = cn.placekey
            GROUP BY n.neighborhood_id, n.neighborhood, n.polygon_wkt
            "#,
        )?;

        let mut stmt = self.conn.prepare(
            r#"
            SELECT neighborhood_id, neighborhood, polygon_wkt, cafes, total_visits, total_visitors
            FROM neighborhood_visits
            ORDER BY total_visits DESC, neighborhood
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(NeighborhoodVisits {
                neighborhood_id: row.get(0)?,
                neighborhood: row.get(1)?,
                polygon_wkt: row.get(2)?,
                cafes: row.get(3)?,
                total_visits: row.get(4)?,
                total_visitors: row.get(5)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(AnalyticsError::from)
    }

    /// Home CBGs with the most coffee shop visitors, over every month and every
    /// home CBG (no study area or size filter).
    pub fn home_cbg_visitors(&self, limit: usize) -> Result<Vec<HomeCbgVisitors>> {
        self.materialize_home_cbg_visitors()?;

        let mut stmt = self.conn.prepare(
            r#"
            SELECT cbg, visitors
            FROM home_cbg_visitors
            ORDER BY visitors DESC, cbg
            LIMIT ?
            "#,
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(HomeCbgVisitors {
                cbg: row.get(0)?,
                visitors: row.get(1)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(AnalyticsError::from)
    }

    /// The top `limit` home CBGs joined with their polygons. CBGs outside the
    /// study area have no polygon and are dropped after the limit is applied.
    pub fn home_cbg_polygons(&self, limit: usize) -> Result<Vec<HomeCbgArea>> {
        self.materialize_home_cbg_visitors()?;

        let mut stmt = self.conn.prepare(
            r#"
            SELECT h.cbg, h.visitors, g.polygon_wkt
            FROM (
                SELECT cbg, visitors
                FROM home_cbg_visitors
                ORDER BY visitors DESC, cbg
                LIMIT ?
            ) h
            JOIN census_block_groups g ON g.cbg = h.cbg
            ORDER BY h.visitors DESC, h.cbg
            "#,
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(HomeCbgArea {
                cbg: row.get(0)?,
                visitors: row.get(1)?,
                polygon_wkt: row.get(2)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(AnalyticsError::from)
    }

    /// Number of cafes per bucket of average home distance.
    pub fn distance_histogram(
        &self,
        bin_width_m: f64,
        max_distance_m: Option<f64>,
    ) -> Result<Vec<HistogramBin>> {
        if !(bin_width_m.is_finite() && bin_width_m > 0.0) {
            return Err(AnalyticsError::InvalidParameter(format!(
                "histogram bin width must be positive, got {bin_width_m}"
            )));
        }
        if let Some(max) = max_distance_m.filter(|max| !max.is_finite()) {
            return Err(AnalyticsError::InvalidParameter(format!(
                "histogram cutoff must be finite, got {max}"
            )));
        }
        self.materialize_furthest_traveled()?;

        let cutoff = max_distance_m
            .map(|max| format!("AND avg_median_dist_from_home < {max:?}"))
            .unwrap_or_default();
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT
                FLOOR(avg_median_dist_from_home / {bin_width_m:?}) * {bin_width_m:?} AS bin_start,
                COUNT(*) AS cafes
            FROM furthest_traveled
            WHERE avg_median_dist_from_home IS NOT NULL {cutoff}
            GROUP BY bin_start
            ORDER BY bin_start
            "#
        ))?;

        let rows = stmt.query_map([], |row| {
            let bin_start_m: f64 = row.get(0)?;
            Ok(HistogramBin {
                bin_start_m,
                bin_end_m: bin_start_m + bin_width_m,
                cafes: row.get(1)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(AnalyticsError::from)
    }

    // =========================================================================
    // MATERIALIZED INTERMEDIATES
    // =========================================================================

    fn materialize_furthest_traveled(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE OR REPLACE TABLE furthest_traveled AS
            SELECT
                placekey,
                location_name,
                AVG(distance_from_home) AS avg_median_dist_from_home
            FROM patterns
            GROUP BY placekey, location_name
            "#,
        )?;
        Ok(())
    }

    fn materialize_total_visits(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE OR REPLACE TABLE total_visits AS
            SELECT
                placekey,
                SUM(raw_visit_counts)::BIGINT AS total_visits,
                SUM(raw_visitor_counts)::BIGINT AS total_visitors
            FROM patterns
            GROUP BY placekey
            "#,
        )?;
        Ok(())
    }

    fn materialize_median_local_distance(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE OR REPLACE TABLE median_local_distance AS
            SELECT placekey, MIN(distance_from_home) AS median_dist_traveled_local
            FROM (
                SELECT
                    placekey,
                    distance_from_home,
                    SUM(visitors) OVER (
                        PARTITION BY placekey
                        ORDER BY distance_from_home
                        ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW
                    ) AS cumulative_visitors,
                    SUM(visitors) OVER (PARTITION BY placekey) AS cafe_visitors
                FROM local_visitor_distances
            )
            WHERE 2 * cumulative_visitors >= cafe_visitors
            GROUP BY placekey
            "#,
        )?;
        Ok(())
    }

    fn materialize_distance_traveled(&self, min_total_visits: i64) -> Result<()> {
        self.materialize_furthest_traveled()?;
        self.materialize_total_visits()?;
        self.materialize_median_local_distance()?;
        self.conn.execute_batch(&format!(
            r#"
            CREATE OR REPLACE TABLE distance_traveled AS
            SELECT
                f.placekey, f.location_name, c.brands, c.street_address, c.city,
                c.region, c.postal_code, c.latitude, c.longitude, c.open_hours,
                f.avg_median_dist_from_home,
                m.median_dist_traveled_local,
                f.avg_median_dist_from_home - m.median_dist_traveled_local AS distance_traveled_diff,
                t.total_visits,
                t.total_visitors
            FROM furthest_traveled f
            JOIN median_local_distance m ON m.placekey = f.placekey
            JOIN cafes_latest c ON c.placekey = f.placekey AND c.location_name = f.location_name
            JOIN total_visits t ON t.placekey = f.placekey
            WHERE t.total_visits > {min_total_visits}
            "#
        ))?;
        Ok(())
    }

    fn materialize_home_cbg_visitors(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE OR REPLACE TABLE home_cbg_visitors AS
            SELECT cbg, SUM(visitors)::BIGINT AS visitors
            FROM visitor_home_cbgs
            GROUP BY cbg
            "#,
        )?;
        Ok(())
    }
}
