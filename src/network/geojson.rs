//! Reading track and stations from GeoJSON feature collections.
//!
//! `LineString` and `MultiLineString` features become track, `Point` features with a
//! `name` property become stations. Coordinates are `[longitude, latitude]` pairs.

use super::{Network, RawNetwork, TopologyBuilder, TopologyConfig};
use crate::error::ImportError;
use crate::math::{CoordinateSpace, Point3d};
use log::debug;
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize)]
struct FeatureCollection {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    geometry: Option<Geometry>,
    #[serde(default)]
    properties: Option<Properties>,
}

#[derive(Deserialize)]
struct Properties {
    name: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    LineString { coordinates: Vec<Vec<f64>> },
    MultiLineString { coordinates: Vec<Vec<Vec<f64>>> },
    Point { coordinates: Vec<f64> },
    #[serde(other)]
    Other,
}

/// Reads a GeoJSON file and builds a network from it.
pub fn load_geojson(
    path: impl AsRef<Path>,
    space: &CoordinateSpace,
    config: TopologyConfig,
) -> Result<Network, ImportError> {
    let text = std::fs::read_to_string(path)?;
    parse_geojson(&text, space, config)
}

/// Parses a GeoJSON document and builds a network from it.
pub fn parse_geojson(
    text: &str,
    space: &CoordinateSpace,
    config: TopologyConfig,
) -> Result<Network, ImportError> {
    let raw = read_features(text, space)?;
    Ok(TopologyBuilder::new(config).build(&raw))
}

/// Collects the raw track and station geometry of a GeoJSON document.
///
/// All track is read before any station, so that stations can be snapped to the final network.
fn read_features(text: &str, space: &CoordinateSpace) -> Result<RawNetwork, ImportError> {
    let collection: FeatureCollection = serde_json::from_str(text)?;
    if collection.kind != "FeatureCollection" {
        return Err(ImportError::NotAFeatureCollection(collection.kind));
    }

    let mut raw = RawNetwork::default();
    let project = |coord: &Vec<f64>| -> Result<Point3d, ImportError> {
        match coord.as_slice() {
            [lon, lat, ..] => Ok(space.to_local(*lat, *lon)),
            _ => Err(ImportError::MalformedCoordinate(coord.clone())),
        }
    };

    for feature in &collection.features {
        match &feature.geometry {
            Some(Geometry::LineString { coordinates }) => {
                let points = coordinates.iter().map(project).collect::<Result<Vec<_>, _>>()?;
                raw.add_polyline(points);
            }
            Some(Geometry::MultiLineString { coordinates }) => {
                for line in coordinates {
                    let points = line.iter().map(project).collect::<Result<Vec<_>, _>>()?;
                    raw.add_polyline(points);
                }
            }
            _ => {}
        }
    }

    for feature in &collection.features {
        if let Some(Geometry::Point { coordinates }) = &feature.geometry {
            let name = feature.properties.as_ref().and_then(|p| p.name.as_ref());
            match name {
                Some(name) => raw.add_station_point(name.clone(), project(coordinates)?),
                None => debug!("Ignoring unnamed point feature"),
            }
        }
    }

    Ok(raw)
}
