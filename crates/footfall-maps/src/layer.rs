//! # Map Layers
//!
//! GeoJSON features plus the styling Leaflet needs to draw them.

use footfall_analytics::spatial;
use geo::{Centroid, Geometry, Point, Rect};
use geojson::{Feature, FeatureCollection, JsonObject, JsonValue};
use serde_json::json;

/// Property holding the rendered tooltip HTML of a feature
pub const TOOLTIP_PROPERTY: &str = "tooltip";

/// Features shared by every layer kind
#[derive(Debug, Clone, Default)]
struct Features {
    features: Vec<Feature>,
    bbox: Option<Rect<f64>>,
    first_centroid: Option<Point<f64>>,
}

impl Features {
    fn push(&mut self, geometry: &Geometry<f64>, mut properties: JsonObject, tooltip_fields: &[String]) {
        properties.insert(
            TOOLTIP_PROPERTY.to_string(),
            JsonValue::String(tooltip_html(&properties, tooltip_fields)),
        );

        let extent = self.bbox.map(Geometry::Rect);
        self.bbox = spatial::bounds(extent.iter().chain([geometry]));
        if self.first_centroid.is_none() {
            self.first_centroid = geometry.centroid();
        }

        self.features.push(Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(geometry))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        });
    }
}

/// Fixed-radius circles, one per point
#[derive(Debug, Clone)]
pub struct CircleLayer {
    pub name: String,
    /// Circle radius in meters
    pub radius_m: f64,
    /// Feature property holding the stroke and fill colour
    pub color_property: String,
    pub tooltip_fields: Vec<String>,
    features: Features,
}

impl CircleLayer {
    pub fn new(name: impl Into<String>, tooltip_fields: &[&str]) -> Self {
        Self {
            name: name.into(),
            radius_m: 40.0,
            color_property: "color".to_string(),
            tooltip_fields: tooltip_fields.iter().map(|f| (*f).to_string()).collect(),
            features: Features::default(),
        }
    }

    /// Add a lon/lat point.
    pub fn push_point(&mut self, point: Point<f64>, properties: JsonObject) {
        self.features
            .push(&Geometry::Point(point), properties, &self.tooltip_fields);
    }
}

/// Polygons shaded by a numeric property
#[derive(Debug, Clone)]
pub struct ChoroplethLayer {
    pub name: String,
    pub color: String,
    /// Feature property holding the fill opacity in `[0, 1]`
    pub opacity_property: String,
    pub tooltip_fields: Vec<String>,
    features: Features,
}

impl ChoroplethLayer {
    pub fn new(
        name: impl Into<String>,
        opacity_property: impl Into<String>,
        tooltip_fields: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            color: "blue".to_string(),
            opacity_property: opacity_property.into(),
            tooltip_fields: tooltip_fields.iter().map(|f| (*f).to_string()).collect(),
            features: Features::default(),
        }
    }

    /// Add a polygon in lon/lat.
    pub fn push_polygon(&mut self, geometry: &Geometry<f64>, properties: JsonObject) {
        self.features.push(geometry, properties, &self.tooltip_fields);
    }
}

/// A layer on a [`crate::LeafletMap`]
#[derive(Debug, Clone)]
pub enum Layer {
    Circles(CircleLayer),
    Choropleth(ChoroplethLayer),
}

impl Layer {
    fn features(&self) -> &Features {
        match self {
            Self::Circles(layer) => &layer.features,
            Self::Choropleth(layer) => &layer.features,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Circles(layer) => &layer.name,
            Self::Choropleth(layer) => &layer.name,
        }
    }

    pub fn len(&self) -> usize {
        self.features().features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features().features.is_empty()
    }

    /// Bounding box of every feature.
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.features().bbox
    }

    /// Centroid of the first feature added.
    pub fn first_centroid(&self) -> Option<Point<f64>> {
        self.features().first_centroid
    }

    /// The layer's features as a GeoJSON feature collection.
    pub fn feature_collection(&self) -> FeatureCollection {
        self.features().features.iter().cloned().collect()
    }

    /// Layer description consumed by the page script.
    pub(crate) fn script_entry(&self) -> JsonValue {
        let data = self.feature_collection();
        match self {
            Self::Circles(layer) => json!({
                "kind": "circle",
                "name": layer.name,
                "radius": layer.radius_m,
                "color_property": layer.color_property,
                "data": data,
            }),
            Self::Choropleth(layer) => json!({
                "kind": "choropleth",
                "name": layer.name,
                "color": layer.color,
                "opacity_property": layer.opacity_property,
                "data": data,
            }),
        }
    }
}

impl From<CircleLayer> for Layer {
    fn from(layer: CircleLayer) -> Self {
        Self::Circles(layer)
    }
}

impl From<ChoroplethLayer> for Layer {
    fn from(layer: ChoroplethLayer) -> Self {
        Self::Choropleth(layer)
    }
}

/// `field: value<br>` for each configured field, HTML escaped.
fn tooltip_html(properties: &JsonObject, fields: &[String]) -> String {
    fields
        .iter()
        .map(|field| {
            let value = match properties.get(field) {
                Some(JsonValue::String(s)) => s.clone(),
                Some(JsonValue::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            format!("{}: {}<br>", escape_html(field), escape_html(&value))
        })
        .collect()
}

pub(crate) fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
