//! Properties of networks built from randomised raw geometry.

use rail_sim::math::{flatten, Point3d};
use rail_sim::network::{RawNetwork, TopologyBuilder, TopologyConfig};
use rail_sim::{Endpoint, NetworkDatabase, SegmentLookup};
use cgmath::{InnerSpace, MetricSpace};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// A jittered grid of polylines, with some of them drawn twice.
fn random_grid(seed: u64) -> RawNetwork {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut raw = RawNetwork::default();
    let mut lines = vec![];
    for row in 0..8 {
        let y = 200.0 * row as f64 - 700.0;
        let points = (0..10)
            .map(|col| Point3d::new(150.0 * col as f64 - 700.0, y + rng.gen_range(-20.0..20.0), 0.0))
            .collect::<Vec<_>>();
        lines.push(points);
    }
    for points in &lines {
        raw.add_polyline(points.iter().copied());
    }
    // Duplicate some lines, half of them reversed
    for (i, points) in lines.iter().enumerate().filter(|(i, _)| i % 3 == 0) {
        if i % 2 == 0 {
            raw.add_polyline(points.iter().rev().copied());
        } else {
            raw.add_polyline(points.iter().copied());
        }
    }
    raw
}

#[test]
fn dedup_is_idempotent() {
    for seed in 0..5 {
        let raw = random_grid(seed);
        let builder = TopologyBuilder::default();
        let once = builder.unique_segments(&raw.segments, 1024.0);
        let twice = builder.unique_segments(&once, 1024.0);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 8 * 9);
    }
}

#[test]
fn links_are_canonical_and_within_tolerance() {
    let config = TopologyConfig::default();
    let net = TopologyBuilder::new(config).build(&random_grid(42));
    assert!(!net.links().is_empty());

    for link in net.iter_links() {
        assert!(link.segment1 <= link.segment2);
        assert!((link.segment1, link.ep1) != (link.segment2, link.ep2));

        let a = net.segment_by_id(link.segment1).unwrap();
        let b = net.segment_by_id(link.segment2).unwrap();
        let gap = flatten(a.endpoint(link.ep1)).distance(flatten(b.endpoint(link.ep2)));
        assert!(gap < config.connection_range);
        let dot = a.endpoint_tangent(link.ep1, true).dot(b.endpoint_tangent(link.ep2, false));
        assert!(dot >= config.max_angle.cos() - 1e-9);
    }

    // Consecutive pieces of each line are linked, one link per joint
    assert_eq!(net.links().len(), 8 * 8);
    for segment in net.iter_segments() {
        let ends = [Endpoint::Start, Endpoint::End]
            .into_iter()
            .map(|ep| net.links_at(segment.id, ep).len())
            .sum::<usize>();
        assert!((1..=2).contains(&ends));
    }
}

#[test]
fn spatial_index_finds_every_segment() {
    let net = TopologyBuilder::default().build(&random_grid(3));
    let tree = net.spatial_index().unwrap();
    for segment in net.iter_segments() {
        let [start, end] = segment.flat_points();
        assert!(tree
            .leaves()
            .any(|(bounds, ids)| ids.contains(&segment.id) && bounds.intersects_segment(start, end)));

        let mid = flatten(segment.point(0.5));
        let hits = net.segments_near(mid, 1.0);
        assert!(hits.iter().any(|(id, _)| *id == segment.id));
        for (id, t) in hits {
            let other = net.segment_by_id(id).unwrap();
            assert!(flatten(other.point(t)).distance(mid) < 1.0);
        }
    }
}
