//! # Leaflet Page
//!
//! Renders layers into a single HTML file that loads Leaflet from a CDN and
//! draws on OpenStreetMap tiles.

use crate::error::{MapError, Result};
use crate::layer::{Layer, escape_html};
use footfall_analytics::spatial;
use geo::Geometry;
use geojson::FeatureCollection;
use tracing::debug;

const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{{title}}</title>
<link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
<script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
<style>html, body, #map { height: 100%; width: 100%; margin: 0; padding: 0; }</style>
</head>
<body>
<div id="map"></div>
<script>
const map = L.map('map').setView({{center}}, 12);
L.tileLayer('https://tile.openstreetmap.org/{z}/{x}/{y}.png', {
  maxZoom: 19,
  attribution: '&copy; <a href="https://www.openstreetmap.org/copyright">OpenStreetMap</a> contributors'
}).addTo(map);

const layers = {{layers}};
const overlays = {};
for (const entry of layers) {
  const options = entry.kind === 'circle'
    ? {
        pointToLayer: (feature, latlng) => L.circle(latlng, {
          radius: entry.radius,
          color: feature.properties[entry.color_property],
          fillColor: feature.properties[entry.color_property],
          fillOpacity: 1
        })
      }
    : {
        style: (feature) => ({
          weight: 0,
          color: entry.color,
          fillColor: entry.color,
          fillOpacity: feature.properties[entry.opacity_property]
        })
      };
  options.onEachFeature = (feature, layer) => layer.bindTooltip(feature.properties.tooltip);
  overlays[entry.name] = L.geoJSON(entry.data, options).addTo(map);
}
L.control.layers(null, overlays).addTo(map);
map.fitBounds({{bounds}});
</script>
</body>
</html>
"#;

/// A standalone Leaflet map
#[derive(Debug, Clone)]
pub struct LeafletMap {
    pub title: String,
    pub layers: Vec<Layer>,
}

impl LeafletMap {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            layers: Vec::new(),
        }
    }

    /// Add a layer, drawn above the ones already added.
    #[must_use]
    pub fn with_layer(mut self, layer: impl Into<Layer>) -> Self {
        self.layers.push(layer.into());
        self
    }

    /// Number of features across all layers.
    pub fn feature_count(&self) -> usize {
        self.layers.iter().map(Layer::len).sum()
    }

    /// Every feature of every layer.
    pub fn feature_collection(&self) -> FeatureCollection {
        self.layers
            .iter()
            .flat_map(|layer| layer.feature_collection().features)
            .collect()
    }

    /// GeoJSON text of [`Self::feature_collection`].
    pub fn to_geojson(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.feature_collection())?)
    }

    /// Render the map as an HTML page, zoomed to fit every feature.
    pub fn render_html(&self) -> Result<String> {
        let extents: Vec<Geometry<f64>> = self
            .layers
            .iter()
            .filter_map(Layer::bounds)
            .map(Geometry::Rect)
            .collect();
        let bounds =
            spatial::bounds(&extents).ok_or_else(|| MapError::Empty(self.title.clone()))?;
        let center = self
            .layers
            .iter()
            .find_map(Layer::first_centroid)
            .unwrap_or_else(|| bounds.center().into());

        let entries: Vec<_> = self.layers.iter().map(Layer::script_entry).collect();
        // Keep "</script>" inside string values from closing the tag
        let layers = serde_json::to_string(&entries)?.replace("</", "<\\/");

        debug!(title = %self.title, layers = self.layers.len(), "rendering map");

        Ok(PAGE
            .replace("{{title}}", &escape_html(&self.title))
            .replace("{{center}}", &format!("[{:?}, {:?}]", center.y(), center.x()))
            .replace(
                "{{bounds}}",
                &format!(
                    "[[{:?}, {:?}], [{:?}, {:?}]]",
                    bounds.min().y,
                    bounds.min().x,
                    bounds.max().y,
                    bounds.max().x
                ),
            )
            .replace("{{layers}}", &layers))
    }
}
