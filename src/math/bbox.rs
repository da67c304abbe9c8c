use super::{segments_intersect, Point2d};
use crate::util::Interval;

/// An axis-aligned rectangle in the simulation plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: Interval<f64>,
    pub y: Interval<f64>,
}

impl BoundingBox {
    /// Creates a bounding box from its minimum and maximum corners.
    pub fn new(min: Point2d, max: Point2d) -> Self {
        Self {
            x: Interval::new(min.x, max.x),
            y: Interval::new(min.y, max.y),
        }
    }

    /// Creates a square bounding box with the given centre and half-extent.
    pub fn around(centre: Point2d, half_extent: f64) -> Self {
        Self {
            x: Interval::disc(centre.x, half_extent),
            y: Interval::disc(centre.y, half_extent),
        }
    }

    pub fn min(&self) -> Point2d {
        Point2d::new(self.x.min, self.y.min)
    }

    pub fn max(&self) -> Point2d {
        Point2d::new(self.x.max, self.y.max)
    }

    /// Returns true if the point lies within the half-open box `[min, max)`.
    pub fn contains(&self, point: Point2d) -> bool {
        self.x.contains_half_open(point.x) && self.y.contains_half_open(point.y)
    }

    /// The euclidean distance from a point to the box, zero if the point is inside.
    pub fn distance_to(&self, point: Point2d) -> f64 {
        let dx = f64::max(self.x.distance(point.x), 0.0);
        let dy = f64::max(self.y.distance(point.y), 0.0);
        dx.hypot(dy)
    }

    /// The four corners, counter-clockwise from the minimum corner.
    fn corners(&self) -> [Point2d; 4] {
        [
            Point2d::new(self.x.min, self.y.min),
            Point2d::new(self.x.max, self.y.min),
            Point2d::new(self.x.max, self.y.max),
            Point2d::new(self.x.min, self.y.max),
        ]
    }

    /// Determines whether a straight segment touches the box: either of its ends lies
    /// inside, or it crosses one of the four edges.
    pub fn intersects_segment(&self, start: Point2d, end: Point2d) -> bool {
        if self.contains(start) || self.contains(end) {
            return true;
        }
        let c = self.corners();
        (0..4).any(|i| segments_intersect(start, end, c[i], c[(i + 1) % 4]))
    }

    /// Splits the box into quadrants, arranged as +X+Y, -X+Y, -X-Y, +X-Y.
    pub fn quadrants(&self) -> [BoundingBox; 4] {
        let mid = Point2d::new(self.x.midpoint(), self.y.midpoint());
        let (min, max) = (self.min(), self.max());
        [
            BoundingBox::new(mid, max),
            BoundingBox::new(Point2d::new(min.x, mid.y), Point2d::new(mid.x, max.y)),
            BoundingBox::new(min, mid),
            BoundingBox::new(Point2d::new(mid.x, min.y), Point2d::new(max.x, mid.y)),
        ]
    }
}
