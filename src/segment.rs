use crate::math::{flatten, Point2d, Point3d, Vector3d};
use cgmath::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Two points closer than this are considered the same, in m.
pub const COINCIDENCE_TOLERANCE: f64 = 0.001;

/// Unique ID of a [Segment]. IDs are 1-based and stable once assigned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(pub u32);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One of the two ends of a segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    Start,
    End,
}

impl Endpoint {
    /// The opposite end.
    pub fn other(self) -> Self {
        match self {
            Endpoint::Start => Endpoint::End,
            Endpoint::End => Endpoint::Start,
        }
    }

    /// The t-parameter of this end.
    pub fn t(self) -> f64 {
        match self {
            Endpoint::Start => 0.0,
            Endpoint::End => 1.0,
        }
    }
}

/// The kind of infrastructure a segment represents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentType {
    #[default]
    Rail,
}

/// A straight piece of track between two control points.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub kind: SegmentType,
    /// The start and end points, in simulation space.
    pub points: [Point3d; 2],
    /// Whether the segment may only be travelled from start to end.
    #[serde(default)]
    pub one_way: bool,
}

impl Segment {
    /// Creates a new two-way rail segment.
    pub fn new(id: SegmentId, start: Point3d, end: Point3d) -> Self {
        Self {
            id,
            kind: SegmentType::Rail,
            points: [start, end],
            one_way: false,
        }
    }

    /// Returns a copy of this segment with a different ID.
    pub fn with_id(&self, id: SegmentId) -> Self {
        Self { id, ..*self }
    }

    /// The length of the segment in m.
    pub fn length(&self) -> f64 {
        self.points[0].distance(self.points[1])
    }

    /// Gets the position of one end.
    pub fn endpoint(&self, ep: Endpoint) -> Point3d {
        match ep {
            Endpoint::Start => self.points[0],
            Endpoint::End => self.points[1],
        }
    }

    /// The unit tangent pointing from start to end.
    pub fn tangent(&self) -> Vector3d {
        (self.points[1] - self.points[0]).normalize()
    }

    /// The unit tangent at one end, pointing out of the segment if `outwards` is set
    /// and into it otherwise.
    pub fn endpoint_tangent(&self, ep: Endpoint, outwards: bool) -> Vector3d {
        let tangent = self.tangent();
        match (ep, outwards) {
            (Endpoint::Start, false) | (Endpoint::End, true) => tangent,
            _ => -tangent,
        }
    }

    /// Samples the position at parameter `t` in `[0, 1]`.
    pub fn point(&self, t: f64) -> Point3d {
        self.points[0] + (self.points[1] - self.points[0]) * t
    }

    /// Samples the position at `t` along with the unit heading of a vehicle travelling towards `dir`.
    pub fn point_and_tangent(&self, t: f64, dir: Endpoint) -> (Point3d, Vector3d) {
        let tangent = match dir {
            Endpoint::End => self.tangent(),
            Endpoint::Start => -self.tangent(),
        };
        (self.point(t), tangent)
    }

    /// Distance in m from parameter `t` to one end.
    pub fn distance_to_endpoint(&self, t: f64, ep: Endpoint) -> f64 {
        distance_to_endpoint(self.length(), t, ep)
    }

    /// Projects a point onto the segment, returning the closest point and its clamped t-parameter.
    pub fn closest_point(&self, point: Point3d) -> (Point3d, f64) {
        let ab = self.points[1] - self.points[0];
        let ap = point - self.points[0];
        let t = ap.dot(ab) / ab.magnitude2();
        if t < 0.0 {
            (self.points[0], 0.0)
        } else if t > 1.0 {
            (self.points[1], 1.0)
        } else {
            (self.points[0] + ab * t, t)
        }
    }

    /// The segment's ends projected onto the simulation plane.
    pub fn flat_points(&self) -> [Point2d; 2] {
        self.points.map(flatten)
    }

    /// Returns true if both segments join the same two points, in either order.
    pub fn is_equivalent(&self, other: &Segment) -> bool {
        let near = |a: Point3d, b: Point3d| a.distance(b) < COINCIDENCE_TOLERANCE;
        let [a0, a1] = self.points;
        let [b0, b1] = other.points;
        (near(a0, b0) && near(a1, b1)) || (near(a0, b1) && near(a1, b0))
    }
}

/// Distance in m from parameter `t` to one end of a segment of the given length.
pub fn distance_to_endpoint(length: f64, t: f64, ep: Endpoint) -> f64 {
    match ep {
        Endpoint::Start => length * t,
        Endpoint::End => length * (1.0 - t),
    }
}

/// Resolves segment IDs to their geometry.
pub trait SegmentLookup {
    /// Gets the segment with the given ID, if it exists.
    fn segment_by_id(&self, id: SegmentId) -> Option<Segment>;
}

impl SegmentLookup for [Segment] {
    fn segment_by_id(&self, id: SegmentId) -> Option<Segment> {
        // IDs are normally dense and 1-based, so try the direct slot first
        let direct = (id.0 as usize)
            .checked_sub(1)
            .and_then(|idx| self.get(idx))
            .filter(|seg| seg.id == id);
        direct.or_else(|| self.iter().find(|seg| seg.id == id)).copied()
    }
}

impl SegmentLookup for Vec<Segment> {
    fn segment_by_id(&self, id: SegmentId) -> Option<Segment> {
        self.as_slice().segment_by_id(id)
    }
}

/// A topological connection between the ends of two segments.
///
/// Links are stored in canonical form: `segment1 <= segment2`, and when both refer to
/// the same segment, `ep1 < ep2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentLink {
    pub segment1: SegmentId,
    pub ep1: Endpoint,
    pub segment2: SegmentId,
    pub ep2: Endpoint,
}

impl SegmentLink {
    /// Creates a link between two segment ends, in canonical form.
    ///
    /// # Panics
    /// If both ends are the same.
    pub fn new(a: (SegmentId, Endpoint), b: (SegmentId, Endpoint)) -> Self {
        assert!(a != b, "cannot link segment {} {:?} to itself", a.0, a.1);
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        Self {
            segment1: a.0,
            ep1: a.1,
            segment2: b.0,
            ep2: b.1,
        }
    }

    /// Given one of the link's ends, returns the other.
    /// Returns `None` if the link does not touch the given end.
    pub fn other_side(&self, segment: SegmentId, ep: Endpoint) -> Option<(SegmentId, Endpoint)> {
        if (self.segment1, self.ep1) == (segment, ep) {
            Some((self.segment2, self.ep2))
        } else if (self.segment2, self.ep2) == (segment, ep) {
            Some((self.segment1, self.ep1))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn diagonal() -> Segment {
        Segment::new(
            SegmentId(1),
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(30.0, 40.0, 0.0),
        )
    }

    #[test]
    fn length_and_sampling() {
        let seg = diagonal();
        assert_approx_eq!(seg.length(), 50.0);
        let p = seg.point(0.5);
        assert_approx_eq!(p.x, 15.0);
        assert_approx_eq!(p.y, 20.0);
        assert_approx_eq!(seg.distance_to_endpoint(0.2, Endpoint::Start), 10.0);
        assert_approx_eq!(seg.distance_to_endpoint(0.2, Endpoint::End), 40.0);
    }

    #[test]
    fn tangents() {
        let seg = diagonal();
        let out_end = seg.endpoint_tangent(Endpoint::End, true);
        let out_start = seg.endpoint_tangent(Endpoint::Start, true);
        assert_approx_eq!(out_end.x, 0.6);
        assert_approx_eq!(out_start.x, -0.6);
        assert_eq!(seg.endpoint_tangent(Endpoint::Start, false), out_end);
        let (_, heading) = seg.point_and_tangent(0.3, Endpoint::Start);
        assert_approx_eq!(heading.y, -0.8);
    }

    #[test]
    fn closest_point_is_clamped() {
        let seg = diagonal();
        let (p, t) = seg.closest_point(Point3d::new(-10.0, -10.0, 0.0));
        assert_eq!(t, 0.0);
        assert_eq!(p, seg.points[0]);
        let (_, t) = seg.closest_point(Point3d::new(100.0, 100.0, 0.0));
        assert_eq!(t, 1.0);
        let (p, t) = seg.closest_point(Point3d::new(15.0 + 4.0, 20.0 - 3.0, 0.0));
        assert_approx_eq!(t, 0.5);
        assert_approx_eq!(p.x, 15.0);
    }

    #[test]
    fn equivalence_ignores_orientation() {
        let seg = diagonal();
        let reversed = Segment::new(SegmentId(7), seg.points[1], seg.points[0]);
        assert!(seg.is_equivalent(&reversed));
        let shifted = Segment::new(
            SegmentId(8),
            seg.points[0],
            seg.points[1] + Vector3d::new(0.01, 0.0, 0.0),
        );
        assert!(!seg.is_equivalent(&shifted));
    }

    #[test]
    fn links_are_canonical() {
        let link = SegmentLink::new((SegmentId(5), Endpoint::Start), (SegmentId(2), Endpoint::End));
        assert_eq!(link.segment1, SegmentId(2));
        assert_eq!(link.ep1, Endpoint::End);
        assert_eq!(
            link.other_side(SegmentId(2), Endpoint::End),
            Some((SegmentId(5), Endpoint::Start))
        );
        assert_eq!(link.other_side(SegmentId(2), Endpoint::Start), None);

        let self_link = SegmentLink::new((SegmentId(3), Endpoint::End), (SegmentId(3), Endpoint::Start));
        assert_eq!(self_link.ep1, Endpoint::Start);
    }

    #[test]
    #[should_panic]
    fn degenerate_link_panics() {
        SegmentLink::new((SegmentId(3), Endpoint::End), (SegmentId(3), Endpoint::End));
    }
}
