use super::{Point2d, Point3d, Rotation, Vector3d};
use cgmath::prelude::*;
use cgmath::Rotation as _;

/// Tolerance on the intersection parameters of [segments_intersect].
const INTERSECTION_EPSILON: f64 = 0.00001;

/// Drops the Z coordinate of a point.
pub fn flatten(point: Point3d) -> Point2d {
    Point2d::new(point.x, point.y)
}

/// Determines whether two line segments in the plane cross each other.
///
/// Intersections within a small tolerance of either segment's ends are not counted,
/// and parallel segments never intersect.
///
/// # Parameters
/// * `a1`, `a2` - The ends of the first segment
/// * `b1`, `b2` - The ends of the second segment
pub fn segments_intersect(a1: Point2d, a2: Point2d, b1: Point2d, b2: Point2d) -> bool {
    let da = a2 - a1;
    let db = b2 - b1;
    let denominator = db.y * da.x - db.x * da.y;
    if denominator == 0.0 {
        return false;
    }

    let u_a = (db.x * (a1.y - b1.y) - db.y * (a1.x - b1.x)) / denominator;
    let u_b = (da.x * (a1.y - b1.y) - da.y * (a1.x - b1.x)) / denominator;

    let inside = |u: f64| u >= INTERSECTION_EPSILON && u <= 1.0 - INTERSECTION_EPSILON;
    inside(u_a) && inside(u_b)
}

/// Computes the rotation which turns the +X axis onto the given heading.
pub fn direction_to_rotation(dir: Vector3d) -> Rotation {
    let dir = dir.normalize();
    Rotation::from_arc(Vector3d::unit_x(), dir, Some(Vector3d::unit_z()))
}

/// Computes the heading of a rotation, the inverse of [direction_to_rotation].
pub fn rotation_to_direction(rotation: Rotation) -> Vector3d {
    rotation.rotate_vector(Vector3d::unit_x())
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn crossing_segments() {
        let a1 = Point2d::new(0.0, 0.0);
        let a2 = Point2d::new(10.0, 10.0);
        assert!(segments_intersect(
            a1,
            a2,
            Point2d::new(0.0, 10.0),
            Point2d::new(10.0, 0.0)
        ));
        assert!(!segments_intersect(
            a1,
            a2,
            Point2d::new(20.0, 0.0),
            Point2d::new(20.0, 10.0)
        ));
    }

    #[test]
    fn parallel_segments_never_intersect() {
        assert!(!segments_intersect(
            Point2d::new(0.0, 0.0),
            Point2d::new(10.0, 0.0),
            Point2d::new(0.0, 0.0),
            Point2d::new(10.0, 0.0)
        ));
    }

    #[test]
    fn touching_ends_do_not_count() {
        assert!(!segments_intersect(
            Point2d::new(0.0, 0.0),
            Point2d::new(10.0, 0.0),
            Point2d::new(10.0, -5.0),
            Point2d::new(10.0, 5.0)
        ));
    }

    #[test]
    fn diagonal_rotation() {
        let rot = direction_to_rotation(Vector3d::new(10.0, 10.0, 0.0));
        let dir = rotation_to_direction(rot);
        assert_approx_eq!(dir.x, 0.707, 0.001);
        assert_approx_eq!(dir.y, 0.707, 0.001);
        assert_approx_eq!(dir.z, 0.0, 0.001);
    }

    #[test]
    fn reverse_rotation() {
        let dir = rotation_to_direction(direction_to_rotation(Vector3d::new(-3.0, 0.0, 0.0)));
        assert_approx_eq!(dir.x, -1.0, 0.0001);
        assert_approx_eq!(dir.y, 0.0, 0.0001);
    }
}
