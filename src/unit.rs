//! Rail vehicles, their classes, and the databases holding them.

use crate::error::{SnapshotError, UnitError};
use crate::math::{Point3d, Rotation, Vector3d};
use cgmath::Zero;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The performance envelope used to control a train.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TractionLimits {
    /// The maximum velocity in m/s.
    pub max_velocity: f64,
    /// The maximum acceleration in m/s<sup>2</sup>.
    pub max_acceleration: f64,
    /// The nominal braking deceleration in m/s<sup>2</sup>, as a positive number.
    pub max_deceleration: f64,
}

impl Default for TractionLimits {
    fn default() -> Self {
        Self {
            max_velocity: 80.0 / 3.6,
            max_acceleration: 1.0,
            max_deceleration: 1.3,
        }
    }
}

/// A type of rail vehicle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitClass {
    pub name: String,
    /// The mass in kg.
    #[serde(default)]
    pub mass: f64,
    /// Length, width and height in m.
    #[serde(default)]
    pub dimensions: [f64; 3],
    #[serde(default)]
    pub limits: TractionLimits,
}

/// A rail vehicle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub class: UnitClass,
    pub pos: Point3d,
    pub velocity: Vector3d,
    pub orientation: Rotation,
}

impl Unit {
    /// Creates a stationary unit.
    pub fn new(class: UnitClass, pos: Point3d, orientation: Rotation) -> Self {
        Self {
            class,
            pos,
            velocity: Vector3d::zero(),
            orientation,
        }
    }
}

/// Storage for the units being simulated, addressed by index.
pub trait UnitDatabase {
    /// The number of units.
    fn len(&self) -> usize;

    /// Returns true if there are no units.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gets the unit at the given index.
    fn get(&self, index: usize) -> Option<&Unit>;

    /// Replaces the unit at the given index.
    fn update(&mut self, index: usize, unit: Unit) -> Result<(), UnitError>;

    /// Returns an iterator over all units, in index order.
    fn iter(&self) -> Box<dyn Iterator<Item = &Unit> + '_>;

    /// Serialises the state of every unit into an opaque blob.
    fn snapshot(&self) -> Result<Vec<u8>, SnapshotError>;

    /// Replaces the state of every unit from a blob made by [UnitDatabase::snapshot].
    fn restore(&mut self, snapshot: &[u8]) -> Result<(), SnapshotError>;
}

/// An in-memory unit database.
#[derive(Clone, Debug, Default)]
pub struct UnitStore {
    units: Vec<Unit>,
}

impl UnitStore {
    /// Creates a unit database holding the given units.
    pub fn new(units: Vec<Unit>) -> Self {
        Self { units }
    }
}

impl UnitDatabase for UnitStore {
    fn len(&self) -> usize {
        self.units.len()
    }

    fn get(&self, index: usize) -> Option<&Unit> {
        self.units.get(index)
    }

    fn update(&mut self, index: usize, unit: Unit) -> Result<(), UnitError> {
        let slot = self.units.get_mut(index).ok_or(UnitError::UnknownUnit(index))?;
        *slot = unit;
        Ok(())
    }

    fn iter(&self) -> Box<dyn Iterator<Item = &Unit> + '_> {
        Box::new(self.units.iter())
    }

    fn snapshot(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(serde_json::to_vec(&self.units)?)
    }

    fn restore(&mut self, snapshot: &[u8]) -> Result<(), SnapshotError> {
        let units: Vec<Unit> = serde_json::from_slice(snapshot)?;
        if units.len() != self.units.len() {
            return Err(SnapshotError::UnitCountMismatch {
                expected: self.units.len(),
                found: units.len(),
            });
        }
        self.units = units;
        Ok(())
    }
}

/// A catalogue of unit classes, keyed by name.
#[derive(Clone, Debug, Default)]
pub struct UnitClassDatabase {
    classes: HashMap<String, UnitClass>,
}

impl UnitClassDatabase {
    /// Parses a JSON list of unit classes.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        let classes: Vec<UnitClass> = serde_json::from_str(text)?;
        Ok(classes.into_iter().collect())
    }

    /// Gets a unit class by name.
    pub fn by_name(&self, name: &str) -> Option<&UnitClass> {
        self.classes.get(name)
    }

    /// The number of classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns true if there are no classes.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl FromIterator<UnitClass> for UnitClassDatabase {
    fn from_iter<I: IntoIterator<Item = UnitClass>>(iter: I) -> Self {
        Self {
            classes: iter.into_iter().map(|c| (c.name.clone(), c)).collect(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use cgmath::One;

    fn tram() -> UnitClass {
        UnitClass {
            name: "tram".into(),
            mass: 40_000.0,
            dimensions: [30.0, 2.5, 3.5],
            limits: TractionLimits::default(),
        }
    }

    #[test]
    fn classes_from_json() {
        let db = UnitClassDatabase::from_json(
            r#"[
                { "name": "tram", "mass": 40000, "dimensions": [30, 2.5, 3.5] },
                { "name": "loco", "mass": 80000, "dimensions": [20, 3, 4],
                  "limits": { "maxVelocity": 30, "maxAcceleration": 0.5, "maxDeceleration": 0.8 } }
            ]"#,
        )
        .unwrap();
        assert_eq!(db.len(), 2);
        assert_approx_eq!(db.by_name("tram").unwrap().limits.max_velocity, 80.0 / 3.6);
        assert_approx_eq!(db.by_name("loco").unwrap().limits.max_deceleration, 0.8);
        assert!(db.by_name("bus").is_none());
    }

    #[test]
    fn snapshot_restores_state() {
        let mut store = UnitStore::new(vec![Unit::new(tram(), Point3d::new(1.0, 2.0, 0.0), Rotation::one())]);
        let blob = store.snapshot().unwrap();

        let mut moved = store.get(0).unwrap().clone();
        moved.pos = Point3d::new(50.0, 2.0, 0.0);
        moved.velocity = Vector3d::new(3.0, 0.0, 0.0);
        store.update(0, moved.clone()).unwrap();
        assert_eq!(store.update(1, moved), Err(UnitError::UnknownUnit(1)));

        store.restore(&blob).unwrap();
        assert_eq!(store.get(0).unwrap().pos, Point3d::new(1.0, 2.0, 0.0));
        assert_eq!(store.get(0).unwrap().velocity, Vector3d::zero());

        let mut empty = UnitStore::default();
        assert!(matches!(
            empty.restore(&blob),
            Err(SnapshotError::UnitCountMismatch { expected: 0, found: 1 })
        ));
    }
}
