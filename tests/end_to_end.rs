//! Tests which go from GeoJSON all the way to route plans.

use assert_approx_eq::assert_approx_eq;
use rail_sim::math::CoordinateSpace;
use rail_sim::network::{parse_geojson, TopologyConfig};
use rail_sim::{Endpoint, NetworkDatabase, RoutePlanner, SegmentId, SegmentLookup};

const LINE: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        { "type": "Feature", "properties": { "name": "Main line" },
          "geometry": { "type": "LineString", "coordinates": [[14.0, 50.0], [14.001, 50.0], [14.002, 50.0]] } },
        { "type": "Feature", "properties": { "name": "West" },
          "geometry": { "type": "Point", "coordinates": [14.0, 50.0] } }
    ]
}"#;

/// Plans from the far end of the line back to a station at its start.
#[test]
fn plans_back_to_station() {
    let space = CoordinateSpace::new(50.0, 14.0);
    let net = parse_geojson(LINE, &space, TopologyConfig::default()).unwrap();
    assert_eq!(net.segments().len(), 2);
    assert_eq!(net.links().len(), 1);

    let station = net.station_by_name("West").unwrap();
    let stop = station.stops[0];
    assert_eq!(stop.segment_id, SegmentId(1));
    assert_approx_eq!(stop.t, 0.0);

    let plan = RoutePlanner::default()
        .plan_route(&net, SegmentId(2), 1.0, Endpoint::Start, stop.segment_id, stop.t)
        .unwrap();
    assert_eq!(plan.hops.len(), 2);
    assert_eq!(plan.hops[0].segment_id, SegmentId(2));
    assert_eq!(plan.hops[1].segment_id, SegmentId(1));
    assert_eq!(plan.hops[1].entry_ep, Endpoint::End);

    let l1 = net.segment_by_id(SegmentId(1)).unwrap().length();
    let l2 = net.segment_by_id(SegmentId(2)).unwrap().length();
    assert_approx_eq!(plan.total_cost, l1 + l2, 1e-6);
}

/// The nearest-station search agrees with the planner.
#[test]
fn nearest_station_matches_plan() {
    let space = CoordinateSpace::new(50.0, 14.0);
    let net = parse_geojson(LINE, &space, TopologyConfig::default()).unwrap();

    let found = net
        .nearest_station_along_track(SegmentId(2), 0.5, Endpoint::Start, None)
        .unwrap();
    assert_eq!(found.station.name, "West");
    let l1 = net.segment_by_id(SegmentId(1)).unwrap().length();
    let l2 = net.segment_by_id(SegmentId(2)).unwrap().length();
    assert_approx_eq!(found.distance, l1 + l2 / 2.0, 1e-6);
    assert_eq!(found.trajectory.len(), 2);

    assert!(net
        .nearest_station_along_track(SegmentId(2), 0.5, Endpoint::End, None)
        .is_none());
}
