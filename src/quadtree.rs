//! A quadtree over track segments, used for proximity queries.

use crate::math::{flatten, BoundingBox, Point2d, Point3d};
use crate::segment::{Endpoint, Segment, SegmentId, SegmentLookup};
use cgmath::MetricSpace;
use slotmap::{new_key_type, SlotMap};
use std::collections::HashSet;
use thiserror::Error;

/// The maximum number of segments held by a leaf before it is split.
pub const NODE_CAPACITY: usize = 10;

/// Leaves at this depth are never split, so that many segments meeting at
/// a single point cannot cause unbounded subdivision.
const MAX_DEPTH: usize = 20;

new_key_type! {
    /// Unique ID of a node in a [QuadTree].
    pub struct NodeId;
}

/// A segment could not be indexed because it lies wholly outside the tree.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("segment {0} lies outside the bounds of the spatial index")]
pub struct OutsideBounds(pub SegmentId);

#[derive(Clone, Debug)]
struct Node {
    bounds: BoundingBox,
    depth: usize,
    kind: NodeKind,
}

#[derive(Clone, Debug)]
enum NodeKind {
    Leaf(Vec<SegmentId>),
    /// Children covering the +X+Y, -X+Y, -X-Y and +X-Y quadrants.
    Internal([NodeId; 4]),
}

/// A spatial index over segments.
///
/// Segments are referenced by ID and may appear in several leaves when they
/// straddle a split boundary.
#[derive(Clone, Debug)]
pub struct QuadTree {
    nodes: SlotMap<NodeId, Node>,
    root: NodeId,
}

impl QuadTree {
    /// Creates an empty tree covering the given box.
    pub fn new(bounds: BoundingBox) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node {
            bounds,
            depth: 0,
            kind: NodeKind::Leaf(vec![]),
        });
        Self { nodes, root }
    }

    /// Creates an empty, square tree centred on the origin.
    pub fn with_half_extent(half_extent: f64) -> Self {
        Self::new(BoundingBox::around(Point2d::new(0.0, 0.0), half_extent))
    }

    /// The area covered by the tree.
    pub fn bounds(&self) -> BoundingBox {
        self.nodes[self.root].bounds
    }

    /// Inserts a segment into every leaf it intersects, splitting leaves as they fill up.
    ///
    /// # Parameters
    /// * `segment` - The segment to insert
    /// * `lookup` - Resolves the IDs of previously inserted segments, needed when a leaf is split
    pub fn insert<L>(&mut self, segment: &Segment, lookup: &L) -> Result<(), OutsideBounds>
    where
        L: SegmentLookup + ?Sized,
    {
        let [start, end] = segment.flat_points();
        if !self.bounds().intersects_segment(start, end) {
            return Err(OutsideBounds(segment.id));
        }
        self.insert_at(self.root, segment.id, start, end, lookup);
        Ok(())
    }

    fn insert_at<L>(&mut self, node_id: NodeId, id: SegmentId, start: Point2d, end: Point2d, lookup: &L)
    where
        L: SegmentLookup + ?Sized,
    {
        let node = &mut self.nodes[node_id];
        match &mut node.kind {
            NodeKind::Internal(children) => {
                let children = *children;
                for child in children {
                    if self.nodes[child].bounds.intersects_segment(start, end) {
                        self.insert_at(child, id, start, end, lookup);
                    }
                }
            }
            NodeKind::Leaf(ids) => {
                ids.push(id);
                if ids.len() > NODE_CAPACITY && node.depth < MAX_DEPTH {
                    self.split(node_id, lookup);
                }
            }
        }
    }

    /// Turns a leaf into an internal node and redistributes its segments.
    fn split<L>(&mut self, node_id: NodeId, lookup: &L)
    where
        L: SegmentLookup + ?Sized,
    {
        let node = &self.nodes[node_id];
        let depth = node.depth + 1;
        let quadrants = node.bounds.quadrants();
        let children = quadrants.map(|bounds| {
            self.nodes.insert(Node {
                bounds,
                depth,
                kind: NodeKind::Leaf(vec![]),
            })
        });
        let kind = std::mem::replace(&mut self.nodes[node_id].kind, NodeKind::Internal(children));
        let NodeKind::Leaf(ids) = kind else {
            unreachable!("only leaves are split");
        };
        for id in ids {
            let Some(segment) = lookup.segment_by_id(id) else {
                panic!("segment {} is indexed but cannot be looked up", id);
            };
            let [start, end] = segment.flat_points();
            for child in children {
                if self.nodes[child].bounds.intersects_segment(start, end) {
                    self.insert_at(child, id, start, end, lookup);
                }
            }
        }
    }

    /// Calls `f` with the contents of every leaf within `radius` of `point`.
    fn visit_leaves_near(&self, point: Point2d, radius: f64, mut f: impl FnMut(&[SegmentId])) {
        let mut stack = vec![self.root];
        while let Some(node_id) = stack.pop() {
            let node = &self.nodes[node_id];
            if node.bounds.distance_to(point) > radius {
                continue;
            }
            match &node.kind {
                NodeKind::Leaf(ids) => f(ids),
                // Reversed so that children are visited in quadrant order
                NodeKind::Internal(children) => stack.extend(children.iter().rev()),
            }
        }
    }

    /// Finds segment ends strictly within `radius` of a point.
    ///
    /// A segment stored in several leaves is reported once per leaf, so the
    /// result may contain duplicates.
    pub fn nearest_endpoints<L>(&self, point: Point2d, radius: f64, lookup: &L) -> Vec<(SegmentId, Endpoint)>
    where
        L: SegmentLookup + ?Sized,
    {
        let mut result = vec![];
        self.visit_leaves_near(point, radius, |ids| {
            for segment in ids.iter().filter_map(|id| lookup.segment_by_id(*id)) {
                for ep in [Endpoint::Start, Endpoint::End] {
                    if flatten(segment.endpoint(ep)).distance(point) < radius {
                        result.push((segment.id, ep));
                    }
                }
            }
        });
        result
    }

    /// Finds the segments passing within `radius` of a point, along with the
    /// t-parameter of the closest point on each. Each segment is reported at most once,
    /// in the order it was first found.
    pub fn nearest_segments<L>(&self, point: Point2d, radius: f64, lookup: &L) -> Vec<(SegmentId, f64)>
    where
        L: SegmentLookup + ?Sized,
    {
        let mut seen = HashSet::new();
        let mut result = vec![];
        let query = Point3d::new(point.x, point.y, 0.0);
        self.visit_leaves_near(point, radius, |ids| {
            for segment in ids.iter().filter_map(|id| lookup.segment_by_id(*id)) {
                if seen.contains(&segment.id) {
                    continue;
                }
                let (closest, t) = segment.closest_point(query);
                if flatten(closest).distance(point) < radius {
                    seen.insert(segment.id);
                    result.push((segment.id, t));
                }
            }
        });
        result
    }

    /// Returns an iterator over the leaves of the tree and the segments they hold.
    pub fn leaves(&self) -> impl Iterator<Item = (BoundingBox, &[SegmentId])> + '_ {
        self.nodes.values().filter_map(|node| match &node.kind {
            NodeKind::Leaf(ids) => Some((node.bounds, ids.as_slice())),
            NodeKind::Internal(_) => None,
        })
    }

    /// The depth of the deepest leaf, zero for a tree that was never split.
    pub fn depth(&self) -> usize {
        self.nodes.values().map(|node| node.depth).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn seg(id: u32, a: (f64, f64), b: (f64, f64)) -> Segment {
        Segment::new(
            SegmentId(id),
            Point3d::new(a.0, a.1, 0.0),
            Point3d::new(b.0, b.1, 0.0),
        )
    }

    fn build(segments: &[Segment], half_extent: f64) -> QuadTree {
        let mut tree = QuadTree::with_half_extent(half_extent);
        for segment in segments {
            tree.insert(segment, segments).unwrap();
        }
        tree
    }

    #[test]
    fn rejects_segments_outside() {
        let segments = vec![seg(1, (200.0, 200.0), (300.0, 300.0))];
        let mut tree = QuadTree::with_half_extent(100.0);
        assert_eq!(tree.insert(&segments[0], &segments), Err(OutsideBounds(SegmentId(1))));
    }

    #[test]
    fn splits_when_full() {
        let segments = (1..=NODE_CAPACITY as u32 + 1)
            .map(|i| {
                let x = 10.0 * i as f64 - 60.0;
                seg(i, (x, -90.0), (x, 90.0))
            })
            .collect::<Vec<_>>();
        let tree = build(&segments, 100.0);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.leaves().count(), 4);
        assert!(tree.leaves().all(|(_, ids)| ids.len() <= NODE_CAPACITY));
    }

    #[test]
    fn straddling_segment_is_in_several_leaves() {
        let mut segments = (1..=NODE_CAPACITY as u32)
            .map(|i| seg(i, (50.0, 50.0 + i as f64), (60.0, 50.0 + i as f64)))
            .collect::<Vec<_>>();
        segments.push(seg(11, (-20.0, 10.0), (20.0, 10.0)));
        let tree = build(&segments, 100.0);
        let holders = tree
            .leaves()
            .filter(|(_, ids)| ids.contains(&SegmentId(11)))
            .count();
        assert_eq!(holders, 2);

        // Endpoint queries report per leaf, segment queries do not
        let hits = tree.nearest_segments(Point2d::new(0.0, 10.0), 1.0, &segments);
        assert_eq!(hits.len(), 1);
        assert_approx_eq!(hits[0].1, 0.5);

        // Reaches both holders of segment 11
        let point = Point2d::new(-20.0, 10.0);
        let ends = tree.nearest_endpoints(point, 21.0, &segments);
        assert_eq!(ends, vec![(SegmentId(11), Endpoint::Start); 2]);
        let hits = tree.nearest_segments(point, 21.0, &segments);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, SegmentId(11));
        assert_approx_eq!(hits[0].1, 0.0);
    }

    #[test]
    fn endpoint_radius_is_strict() {
        let segments = vec![seg(1, (0.0, 0.0), (10.0, 0.0))];
        let tree = build(&segments, 100.0);
        let hits = tree.nearest_endpoints(Point2d::new(10.0, 1.0), 1.0, &segments);
        assert!(hits.is_empty());
        let hits = tree.nearest_endpoints(Point2d::new(10.0, 0.5), 1.0, &segments);
        assert_eq!(hits, vec![(SegmentId(1), Endpoint::End)]);
    }

    #[test]
    fn random_segments_are_indexed() {
        let mut rng = StdRng::seed_from_u64(7);
        let segments = (1..=300)
            .map(|i| {
                let a = (rng.gen_range(-500.0..500.0), rng.gen_range(-500.0..500.0));
                let b = (a.0 + rng.gen_range(-50.0..50.0), a.1 + rng.gen_range(-50.0..50.0));
                seg(i, a, b)
            })
            .collect::<Vec<_>>();
        let tree = build(&segments, 1024.0);

        for segment in &segments {
            let [start, end] = segment.flat_points();
            let found = tree.leaves().any(|(bounds, ids)| {
                ids.contains(&segment.id) && bounds.intersects_segment(start, end)
            });
            assert!(found, "segment {} not indexed", segment.id);
        }

        for _ in 0..50 {
            let point = Point2d::new(rng.gen_range(-500.0..500.0), rng.gen_range(-500.0..500.0));
            let radius = 25.0;
            for (id, t) in tree.nearest_segments(point, radius, &segments) {
                let segment = segments.segment_by_id(id).unwrap();
                assert!(flatten(segment.point(t)).distance(point) < radius);
            }
        }
    }
}
