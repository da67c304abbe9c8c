//! Scenario descriptors: which network to load, which units to run on it.

use crate::error::ScenarioError;
use crate::math::{direction_to_rotation, CoordinateSpace};
use crate::network::{load_geojson, Network, NetworkDatabase, TopologyConfig};
use crate::segment::{Endpoint, SegmentId, SegmentLookup};
use crate::signal::SignalSink;
use crate::simulation::{Simulation, SimulationConfig};
use crate::unit::{Unit, UnitClassDatabase, UnitStore};
use log::info;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// The contents of a scenario file. Paths are relative to the file.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioDescriptor {
    /// Latitude and longitude of the local coordinate system's origin, in degrees.
    pub coordinate_system_origin: [f64; 2],
    /// A GeoJSON file holding the track and stations.
    pub network_database: PathBuf,
    /// A JSON list of unit classes.
    pub unit_class_database: PathBuf,
    #[serde(default)]
    pub units: Vec<UnitDescriptor>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct UnitDescriptor {
    /// The name of the unit's class.
    pub class: String,
}

/// A loaded scenario, ready to be simulated.
#[derive(Clone, Debug)]
pub struct Scenario {
    pub space: CoordinateSpace,
    pub network: Network,
    pub unit_classes: UnitClassDatabase,
    pub units: UnitStore,
}

impl Scenario {
    /// Starts simulating the scenario.
    pub fn into_simulation(self, sink: Box<dyn SignalSink>, config: SimulationConfig) -> Simulation<Network, UnitStore> {
        Simulation::new(self.network, self.units, sink, config)
    }
}

/// Loads a scenario file and everything it refers to.
pub fn load_scenario(path: impl AsRef<Path>) -> Result<Scenario, ScenarioError> {
    let path = path.as_ref();
    let descriptor: ScenarioDescriptor = serde_json::from_str(&read(path)?)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    load_descriptor(&descriptor, base)
}

/// Loads the files a scenario descriptor refers to.
///
/// # Parameters
/// * `descriptor` - The scenario
/// * `base` - The directory relative paths are resolved against
pub fn load_descriptor(descriptor: &ScenarioDescriptor, base: &Path) -> Result<Scenario, ScenarioError> {
    let [lat, lon] = descriptor.coordinate_system_origin;
    let space = CoordinateSpace::new(lat, lon);

    let network = load_geojson(
        base.join(&descriptor.network_database),
        &space,
        TopologyConfig::default(),
    )?;
    let unit_classes = UnitClassDatabase::from_json(&read(&base.join(&descriptor.unit_class_database))?)?;

    let units = descriptor
        .units
        .iter()
        .map(|unit| {
            let class = unit_classes
                .by_name(&unit.class)
                .ok_or_else(|| ScenarioError::UnknownUnitClass(unit.class.clone()))?;
            let segment = network
                .segment_by_id(SegmentId(1))
                .ok_or(ScenarioError::EmptyNetwork)?;
            let (pos, tangent) = segment.point_and_tangent(0.5, Endpoint::End);
            Ok(Unit::new(class.clone(), pos, direction_to_rotation(tangent)))
        })
        .collect::<Result<Vec<_>, ScenarioError>>()?;

    info!(
        "Loaded scenario: {} segments, {} stations, {} unit classes, {} units",
        network.iter_segments().count(),
        network.iter_stations().count(),
        unit_classes.len(),
        units.len()
    );

    Ok(Scenario {
        space,
        network,
        unit_classes,
        units: UnitStore::new(units),
    })
}

fn read(path: &Path) -> Result<String, ScenarioError> {
    std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
        path: path.to_owned(),
        source,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::unit::UnitDatabase;
    use assert_approx_eq::assert_approx_eq;
    use std::fs;

    const NETWORK: &str = r#"{ "type": "FeatureCollection", "features": [
        { "type": "Feature", "properties": {},
          "geometry": { "type": "LineString", "coordinates": [[14.0, 50.0], [14.002, 50.0]] } }
    ] }"#;

    const CLASSES: &str = r#"[{ "name": "tram", "mass": 40000, "dimensions": [30, 2.5, 3.5] }]"#;

    fn scenario_dir(name: &str, units: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rail-sim-scenario-{}-{}", name, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("network.geojson"), NETWORK).unwrap();
        fs::write(dir.join("classes.json"), CLASSES).unwrap();
        fs::write(
            dir.join("scenario.json"),
            format!(
                r#"{{ "coordinateSystemOrigin": [50.0, 14.0],
                     "networkDatabase": "network.geojson",
                     "unitClassDatabase": "classes.json",
                     "units": {} }}"#,
                units
            ),
        )
        .unwrap();
        dir
    }

    #[test]
    fn loads_units_onto_first_segment() {
        let dir = scenario_dir("ok", r#"[{ "class": "tram" }, { "class": "tram" }]"#);
        let scenario = load_scenario(dir.join("scenario.json")).unwrap();
        assert_eq!(scenario.units.len(), 2);
        let unit = scenario.units.get(0).unwrap();
        let segment = scenario.network.segment_by_id(SegmentId(1)).unwrap();
        assert_approx_eq!(unit.pos.x, segment.length() / 2.0);
        assert_approx_eq!(unit.pos.y, 0.0);
        assert_eq!(unit.class.name, "tram");
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn reports_unknown_class_and_missing_files() {
        let dir = scenario_dir("bad", r#"[{ "class": "maglev" }]"#);
        let err = load_scenario(dir.join("scenario.json"));
        assert!(matches!(err, Err(ScenarioError::UnknownUnitClass(name)) if name == "maglev"));

        let err = load_scenario(dir.join("missing.json"));
        assert!(matches!(err, Err(ScenarioError::Io { .. })));
        fs::remove_dir_all(dir).unwrap();
    }
}
