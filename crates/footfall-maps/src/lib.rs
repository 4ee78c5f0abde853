//! # Footfall Maps
//!
//! GeoJSON layers and self-contained Leaflet pages for the site selection
//! results: cafe locations, tourist vs. local cafes, neighborhood visibility
//! and visitor home block groups.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod builders;
pub mod error;
pub mod layer;
pub mod leaflet;

pub use builders::{cafes_map, home_cbg_map, neighborhood_map, visitor_type_map};
pub use error::{MapError, Result};
pub use layer::{ChoroplethLayer, CircleLayer, Layer};
pub use leaflet::LeafletMap;
