//! # Footfall Analytics
//!
//! OLAP analytics engine for coffee shop site selection.
//! Uses DuckDB for columnar storage and fast analytical queries, and `geo`
//! for the spatial side of the joins.
//!
//! ## Features
//!
//! - Monthly patterns ingestion with home-CBG explosion
//! - How far visitors travel (overall vs. within the study area)
//! - Neighborhood visibility via point-in-polygon join
//! - Home locations of coffee shop visitors
//! - JSON / Markdown reports and Parquet exports

#![forbid(unsafe_code)]
#![warn(clippy::all, missing_docs)]

pub mod engine;
pub mod error;
pub mod queries;
pub mod reports;
pub mod spatial;
pub mod stats;

pub use engine::AnalyticsEngine;
pub use error::AnalyticsError;
pub use reports::{AnalysisParams, SiteSelectionReport};
