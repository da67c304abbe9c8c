//! Mathematical structs and functions.

use cgmath::{Point2, Point3, Quaternion, Vector2, Vector3};
pub use bbox::BoundingBox;
pub use geo::CoordinateSpace;
pub use util::*;

mod bbox;
mod geo;
mod util;

/// A 2D point
pub type Point2d = Point2<f64>;

/// A 2D vector
pub type Vector2d = Vector2<f64>;

/// A 3D point
pub type Point3d = Point3<f64>;

/// A 3D vector
pub type Vector3d = Vector3<f64>;

/// A rotation in 3D space.
pub type Rotation = Quaternion<f64>;
