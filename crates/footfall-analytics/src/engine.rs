//! Analytics engine using DuckDB for OLAP queries.
//!
//! Owns the connection and the ingestion side: monthly patterns, census block
//! groups and neighborhood polygons. Query methods live in [`crate::queries`].

use crate::error::{AnalyticsError, Result};
use crate::spatial;
use duckdb::{Connection, params};
use footfall_domain::{CbgId, CountyFilter, DistanceMetric, PatternRecord};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Column of an input CSV and the SQL expression that converts it.
struct CsvColumn {
    name: &'static str,
    /// `{c}` is replaced with the quoted column name
    expr: &'static str,
    required: bool,
}

const PATTERN_COLUMNS: &[CsvColumn] = &[
    CsvColumn { name: "placekey", expr: "{c}", required: true },
    CsvColumn { name: "location_name", expr: "{c}", required: true },
    CsvColumn { name: "brands", expr: "{c}", required: false },
    CsvColumn { name: "street_address", expr: "{c}", required: false },
    CsvColumn { name: "city", expr: "{c}", required: false },
    CsvColumn { name: "region", expr: "{c}", required: false },
    CsvColumn { name: "postal_code", expr: "{c}", required: false },
    CsvColumn { name: "latitude", expr: "TRY_CAST({c} AS DOUBLE)", required: true },
    CsvColumn { name: "longitude", expr: "TRY_CAST({c} AS DOUBLE)", required: true },
    CsvColumn { name: "open_hours", expr: "{c}", required: false },
    CsvColumn { name: "date_range_start", expr: "TRY_CAST(left({c}, 10) AS DATE)", required: true },
    CsvColumn { name: "date_range_end", expr: "TRY_CAST(left({c}, 10) AS DATE)", required: false },
    CsvColumn { name: "raw_visit_counts", expr: "TRY_CAST({c} AS BIGINT)", required: true },
    CsvColumn { name: "raw_visitor_counts", expr: "TRY_CAST({c} AS BIGINT)", required: true },
    CsvColumn { name: "distance_from_home", expr: "TRY_CAST({c} AS DOUBLE)", required: true },
    CsvColumn { name: "visitor_home_cbgs", expr: "{c}", required: true },
];

/// DuckDB-based analytics engine for foot traffic site selection.
pub struct AnalyticsEngine {
    pub(crate) conn: Connection,
    pub(crate) counties: CountyFilter,
    pub(crate) metric: DistanceMetric,
}

impl AnalyticsEngine {
    /// Create a new in-memory analytics engine.
    pub fn new_in_memory(counties: CountyFilter, metric: DistanceMetric) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let engine = Self {
            conn,
            counties,
            metric,
        };
        engine.initialize_schema()?;
        Ok(engine)
    }

    /// Create analytics engine with persistent storage.
    pub fn new_persistent<P: AsRef<Path>>(
        path: P,
        counties: CountyFilter,
        metric: DistanceMetric,
    ) -> Result<Self> {
        let conn = Connection::open(path)?;
        let engine = Self {
            conn,
            counties,
            metric,
        };
        engine.initialize_schema()?;
        Ok(engine)
    }

    /// Initialize the analytics schema.
    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            -- One row per POI per month
            CREATE TABLE IF NOT EXISTS patterns (
                placekey VARCHAR NOT NULL,
                location_name VARCHAR,
                brands VARCHAR,
                street_address VARCHAR,
                city VARCHAR,
                region VARCHAR,
                postal_code VARCHAR,
                latitude DOUBLE,
                longitude DOUBLE,
                open_hours VARCHAR,
                date_range_start DATE NOT NULL,
                date_range_end DATE,
                raw_visit_counts BIGINT,
                raw_visitor_counts BIGINT,
                distance_from_home DOUBLE,
                visitor_home_cbgs VARCHAR
            );

            -- visitor_home_cbgs exploded, one row per POI, month and home CBG
            CREATE TABLE IF NOT EXISTS visitor_home_cbgs (
                placekey VARCHAR NOT NULL,
                cbg VARCHAR NOT NULL,
                visitors BIGINT NOT NULL
            );

            -- Study area block groups
            CREATE TABLE IF NOT EXISTS census_block_groups (
                cbg VARCHAR PRIMARY KEY,
                polygon_wkt VARCHAR NOT NULL,
                centroid_longitude DOUBLE NOT NULL,
                centroid_latitude DOUBLE NOT NULL
            );

            CREATE TABLE IF NOT EXISTS neighborhoods (
                neighborhood_id BIGINT PRIMARY KEY,
                neighborhood VARCHAR NOT NULL,
                polygon_wkt VARCHAR NOT NULL
            );

            -- Derived by queries
            CREATE TABLE IF NOT EXISTS local_visitor_distances (
                placekey VARCHAR NOT NULL,
                cbg VARCHAR NOT NULL,
                visitors BIGINT NOT NULL,
                distance_from_home DOUBLE NOT NULL
            );

            CREATE TABLE IF NOT EXISTS cafe_neighborhoods (
                placekey VARCHAR NOT NULL,
                neighborhood_id BIGINT NOT NULL
            );

            -- Addresses and geocodes change over time; keep the latest appearance of each place
            CREATE OR REPLACE VIEW cafes_latest AS
            SELECT
                placekey, location_name, brands, street_address, city, region,
                postal_code, latitude, longitude, open_hours
            FROM (
                SELECT
                    *,
                    row_number() OVER (
                        PARTITION BY placekey
                        ORDER BY date_range_start DESC, date_range_end DESC NULLS LAST
                    ) AS row_num
                FROM patterns
            )
            WHERE row_num = 1;

            CREATE INDEX IF NOT EXISTS idx_patterns_placekey ON patterns(placekey);
            CREATE INDEX IF NOT EXISTS idx_home_cbgs_cbg ON visitor_home_cbgs(cbg);
            "#,
        )?;
        Ok(())
    }

    // =========================================================================
    // PATTERNS
    // =========================================================================

    /// Load a monthly patterns CSV. Returns the number of pattern rows added.
    pub fn load_patterns_csv<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let source = path.as_ref().display().to_string();
        let columns = self.csv_columns(&source)?;

        let mut select = Vec::with_capacity(PATTERN_COLUMNS.len());
        for column in PATTERN_COLUMNS {
            let present = columns.iter().any(|c| c.eq_ignore_ascii_case(column.name));
            let input = if present {
                quote_ident(column.name)
            } else if column.required {
                return Err(AnalyticsError::MissingColumn {
                    column: column.name.to_string(),
                    source_name: source,
                });
            } else {
                "CAST(NULL AS VARCHAR)".to_string()
            };
            select.push(format!(
                "{} AS {}",
                column.expr.replace("{c}", &input),
                quote_ident(column.name)
            ));
        }

        let staging = format!(
            r#"
            CREATE OR REPLACE TEMP TABLE patterns_staging AS
            SELECT {} FROM {}
            "#,
            select.join(", "),
            csv_reader(&source)
        );
        debug!(sql = %staging, "staging patterns");
        self.conn.execute_batch(&staging)?;

        let skipped: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM patterns_staging WHERE placekey IS NULL OR date_range_start IS NULL",
            [],
            |row| row.get(0),
        )?;
        if skipped > 0 {
            warn!(source = %source, skipped, "pattern rows without placekey or start date skipped");
        }

        let inserted = self.conn.execute(
            r#"
            INSERT INTO patterns
            SELECT * FROM patterns_staging
            WHERE placekey IS NOT NULL AND date_range_start IS NOT NULL
            "#,
            [],
        )?;

        let staged = self.staged_home_cbgs()?;
        let exploded = self.append_home_cbgs(staged)?;
        self.conn.execute_batch("DROP TABLE IF EXISTS patterns_staging")?;

        info!(source = %source, rows = inserted, home_cbg_rows = exploded, "patterns loaded");
        Ok(inserted)
    }

    /// Ingest a single pattern record.
    pub fn ingest_pattern(&self, record: &PatternRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO patterns VALUES (
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                CAST(? AS DATE), CAST(? AS DATE), ?, ?, ?, ?
            )
            "#,
            params![
                record.placekey,
                record.location_name,
                record.brands,
                record.street_address,
                record.city,
                record.region,
                record.postal_code,
                record.latitude,
                record.longitude,
                record.open_hours,
                record.date_range_start.format("%Y-%m-%d").to_string(),
                record
                    .date_range_end
                    .map(|d| d.format("%Y-%m-%d").to_string()),
                record.raw_visit_counts,
                record.raw_visitor_counts,
                record.distance_from_home,
                serde_json::to_string(&record.visitor_home_cbgs)?,
            ],
        )?;

        let rows = record
            .visitor_home_cbgs
            .iter()
            .map(|(cbg, visitors)| (record.placekey.clone(), cbg.clone(), *visitors))
            .collect();
        self.append_home_cbgs(rows)?;
        Ok(())
    }

    /// Parse the staged `visitor_home_cbgs` JSON maps into rows.
    fn staged_home_cbgs(&self) -> Result<Vec<(String, String, i64)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT placekey, visitor_home_cbgs
            FROM patterns_staging
            WHERE placekey IS NOT NULL
              AND date_range_start IS NOT NULL
              AND visitor_home_cbgs IS NOT NULL
            "#,
        )?;
        let staged = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut rows = Vec::new();
        let mut malformed = 0usize;
        for (placekey, raw) in staged {
            match parse_home_cbgs(&raw) {
                Ok(map) => rows.extend(map.into_iter().map(|(cbg, n)| (placekey.clone(), cbg, n))),
                Err(e) => {
                    malformed += 1;
                    debug!(placekey = %placekey, error = %e, "unparseable visitor_home_cbgs");
                }
            }
        }
        if malformed > 0 {
            warn!(rows = malformed, "visitor_home_cbgs values could not be parsed and were ignored");
        }
        Ok(rows)
    }

    fn append_home_cbgs(&self, rows: Vec<(String, String, i64)>) -> Result<usize> {
        let mut appender = self.conn.appender("visitor_home_cbgs")?;
        let count = rows.len();
        for (placekey, cbg, visitors) in rows {
            appender.append_row(params![placekey, cbg, visitors])?;
        }
        appender.flush()?;
        Ok(count)
    }

    // =========================================================================
    // CENSUS BLOCK GROUPS
    // =========================================================================

    /// Load census block groups (`GEOID`, `geometry` as WKT), keeping only the
    /// study area. Returns the number of block groups added.
    pub fn load_block_groups_csv<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let source = path.as_ref().display().to_string();
        let columns = self.csv_columns(&source)?;
        require_columns(&columns, &["GEOID", "geometry"], &source)?;

        let mut stmt = self.conn.prepare(&format!(
            r#"SELECT "GEOID", "geometry" FROM {} WHERE regexp_matches("GEOID", {})"#,
            csv_reader(&source),
            quote_literal(&self.counties.sql_regex())
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut count = 0;
        for (geoid, wkt) in rows {
            let Some(wkt) = wkt else {
                warn!(cbg = %geoid, "block group without geometry skipped");
                continue;
            };
            match self.ingest_block_group(&geoid, &wkt) {
                Ok(true) => count += 1,
                Ok(false) => {}
                Err(AnalyticsError::Geometry(e)) => {
                    warn!(cbg = %geoid, error = %e, "block group geometry skipped");
                }
                Err(AnalyticsError::Domain(e)) => {
                    warn!(cbg = %geoid, error = %e, "malformed block group id skipped");
                }
                Err(e) => return Err(e),
            }
        }

        info!(source = %source, block_groups = count, "census block groups loaded");
        Ok(count)
    }

    /// Ingest a single block group. Returns `false` when it lies outside the
    /// study area or is already present; a GEOID that is not 12 digits is an
    /// error.
    pub fn ingest_block_group(&self, cbg: &str, wkt: &str) -> Result<bool> {
        let cbg = CbgId::parse(cbg)?;
        if !self.counties.contains(cbg.as_str()) {
            return Ok(false);
        }
        let geometry = spatial::parse_wkt(wkt)?;
        let centroid = spatial::centroid(&geometry)
            .ok_or_else(|| AnalyticsError::Geometry(format!("block group {cbg} has no centroid")))?;

        let inserted = self.conn.execute(
            r#"
            INSERT INTO census_block_groups (cbg, polygon_wkt, centroid_longitude, centroid_latitude)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (cbg) DO NOTHING
            "#,
            params![cbg.as_str(), wkt.trim(), centroid.x(), centroid.y()],
        )?;
        Ok(inserted > 0)
    }

    // =========================================================================
    // NEIGHBORHOODS
    // =========================================================================

    /// Load neighborhood polygons (`S_HOOD`, `geometry` as WKT).
    pub fn load_neighborhoods_csv<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let source = path.as_ref().display().to_string();
        let columns = self.csv_columns(&source)?;
        require_columns(&columns, &["S_HOOD", "geometry"], &source)?;

        let mut stmt = self.conn.prepare(&format!(
            r#"SELECT "S_HOOD", "geometry" FROM {}"#,
            csv_reader(&source)
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, Option<String>>(0)?, row.get::<_, Option<String>>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut count = 0;
        for (name, wkt) in rows {
            let (Some(name), Some(wkt)) = (name, wkt) else {
                warn!("neighborhood row without name or geometry skipped");
                continue;
            };
            match self.ingest_neighborhood(&name, &wkt) {
                Ok(_) => count += 1,
                Err(AnalyticsError::Geometry(e)) => {
                    warn!(neighborhood = %name, error = %e, "neighborhood geometry skipped");
                }
                Err(e) => return Err(e),
            }
        }

        info!(source = %source, neighborhoods = count, "neighborhoods loaded");
        Ok(count)
    }

    /// Ingest a single neighborhood polygon. Returns its id.
    pub fn ingest_neighborhood(&self, name: &str, wkt: &str) -> Result<i64> {
        spatial::parse_wkt(wkt)?;
        let id: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(neighborhood_id), 0) + 1 FROM neighborhoods",
            [],
            |row| row.get(0),
        )?;
        self.conn.execute(
            "INSERT INTO neighborhoods (neighborhood_id, neighborhood, polygon_wkt) VALUES (?, ?, ?)",
            params![id, name, wkt.trim()],
        )?;
        Ok(id)
    }

    // =========================================================================
    // INSPECTION & EXPORT
    // =========================================================================

    /// Row count of a table or view.
    pub fn table_count(&self, table: &str) -> Result<i64> {
        let table = checked_ident(table)?;
        let count = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(count)
    }

    /// Render the first `limit` rows of a table, view or query as a text table.
    pub fn preview(&self, table_or_query: &str, limit: usize) -> Result<String> {
        let source = if is_ident(table_or_query) {
            table_or_query.to_string()
        } else {
            format!("({})", table_or_query.trim().trim_end_matches(';'))
        };
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM {source} LIMIT {limit}"))?;
        let batches: Vec<duckdb::arrow::record_batch::RecordBatch> = stmt.query_arrow([])?.collect();
        let table = duckdb::arrow::util::pretty::pretty_format_batches(&batches)
            .map_err(|e| AnalyticsError::Conversion(e.to_string()))?;
        Ok(table.to_string())
    }

    /// Export a table or view to a Parquet file.
    pub fn export_parquet<P: AsRef<Path>>(&self, table: &str, path: P) -> Result<()> {
        let table = checked_ident(table)?;
        let query = format!(
            "COPY {table} TO {} (FORMAT PARQUET)",
            quote_literal(&path.as_ref().display().to_string())
        );
        self.conn.execute(&query, [])?;
        Ok(())
    }

    /// Export a table or view to a CSV file with a header row.
    pub fn export_csv<P: AsRef<Path>>(&self, table: &str, path: P) -> Result<()> {
        let table = checked_ident(table)?;
        let query = format!(
            "COPY {table} TO {} (FORMAT CSV, HEADER)",
            quote_literal(&path.as_ref().display().to_string())
        );
        self.conn.execute(&query, [])?;
        Ok(())
    }

    /// Column names of a CSV file as DuckDB sniffs them.
    fn csv_columns(&self, source: &str) -> Result<Vec<String>> {
        if !Path::new(source).exists() {
            return Err(AnalyticsError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{source} does not exist"),
            )));
        }
        let mut stmt = self
            .conn
            .prepare(&format!("DESCRIBE SELECT * FROM {}", csv_reader(source)))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(AnalyticsError::from)
    }
}

/// `read_csv` call keeping every column as text, with `"` as quote and escape.
fn csv_reader(source: &str) -> String {
    format!(
        "read_csv({}, header = true, all_varchar = true, quote = '\"', escape = '\"')",
        quote_literal(source)
    )
}

fn require_columns(columns: &[String], required: &[&str], source: &str) -> Result<()> {
    for name in required {
        if !columns.iter().any(|c| c.eq_ignore_ascii_case(name)) {
            return Err(AnalyticsError::MissingColumn {
                column: (*name).to_string(),
                source_name: source.to_string(),
            });
        }
    }
    Ok(())
}

/// Parse a `{"cbg": visitors, ...}` JSON map.
pub(crate) fn parse_home_cbgs(raw: &str) -> Result<BTreeMap<String, i64>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(BTreeMap::new());
    }
    Ok(serde_json::from_str(raw)?)
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn checked_ident(s: &str) -> Result<&str> {
    if is_ident(s) {
        Ok(s)
    } else {
        Err(AnalyticsError::InvalidParameter(format!(
            "'{s}' is not a table name"
        )))
    }
}

fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub(crate) fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
