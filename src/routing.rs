//! Searches over the track network: point-to-point route planning and nearest-station lookup.

use crate::network::{NearestStation, NetworkDatabase, StationId, StationStop, TrajectorySegment};
use crate::segment::{Endpoint, SegmentId};
use cgmath::MetricSpace;
use log::{debug, warn};
use ordered_float::OrderedFloat;
use pathfinding::directed::astar::astar;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

/// The default bound on the number of nodes a search may expand.
pub const MAX_SEARCH_ITERATIONS: usize = 1_000;

/// One segment of a [RoutePlan].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteHop {
    pub segment_id: SegmentId,
    /// The end through which the segment is entered.
    pub entry_ep: Endpoint,
    /// The full length of the segment, in m.
    pub segment_length: f64,
    /// Where to stop on this segment. `None` means traverse it to the far end.
    pub goal_t: Option<f64>,
}

/// A route across the network.
///
/// The first hop is the segment the route starts on, entered through the end behind the
/// train. Only the last hop has a goal.
#[derive(Clone, Debug, PartialEq)]
pub struct RoutePlan {
    pub hops: Vec<RouteHop>,
    /// The length of the route, in m.
    pub total_cost: f64,
}

/// A node of the route search graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Node {
    /// The train's starting position.
    Origin,
    /// A segment, entered through the given end.
    Entry(SegmentId, Endpoint),
}

/// A* route planning over the segment graph.
#[derive(Clone, Copy, Debug)]
pub struct RoutePlanner {
    /// Searches expanding more nodes than this are abandoned.
    pub max_iterations: usize,
}

impl Default for RoutePlanner {
    fn default() -> Self {
        Self {
            max_iterations: MAX_SEARCH_ITERATIONS,
        }
    }
}

impl RoutePlanner {
    /// Plans a route from a position on the track to a point on a destination segment.
    ///
    /// The heuristic is the straight-line distance to the destination, which suits networks laid
    /// out roughly along their geodesics but is not guaranteed to give the shortest route.
    ///
    /// # Parameters
    /// * `network` - The track network
    /// * `origin`, `origin_t`, `origin_dir` - Where the train is and which end it is heading for
    /// * `destination`, `destination_t` - Where the train should stop
    pub fn plan_route<N>(
        &self,
        network: &N,
        origin: SegmentId,
        origin_t: f64,
        origin_dir: Endpoint,
        destination: SegmentId,
        destination_t: f64,
    ) -> Option<RoutePlan>
    where
        N: NetworkDatabase + ?Sized,
    {
        let Some(origin_seg) = network.segment_by_id(origin) else {
            warn!("Cannot plan route: unknown origin segment {}", origin);
            return None;
        };
        let Some(destination_seg) = network.segment_by_id(destination) else {
            warn!("Cannot plan route: unknown destination segment {}", destination);
            return None;
        };
        debug!(
            "Planning route ({}:{:.3} -> {:?}) to ({}:{:.3})",
            origin, origin_t, origin_dir, destination, destination_t
        );

        let origin_hop = RouteHop {
            segment_id: origin,
            entry_ep: origin_dir.other(),
            segment_length: origin_seg.length(),
            goal_t: None,
        };

        // Destination just ahead on the same segment
        let ahead = match origin_dir {
            Endpoint::End => destination_t >= origin_t,
            Endpoint::Start => destination_t <= origin_t,
        };
        if origin == destination && ahead {
            return Some(RoutePlan {
                hops: vec![RouteHop {
                    goal_t: Some(destination_t),
                    ..origin_hop
                }],
                total_cost: origin_seg.length() * (destination_t - origin_t).abs(),
            });
        }

        let goal = destination_seg.point(destination_t);
        let initial_cost = origin_seg.distance_to_endpoint(origin_t, origin_dir);
        let expansions = Cell::new(0);
        let aborted = Cell::new(false);

        let successors = |node: &Node| -> Vec<(Node, OrderedFloat<f64>)> {
            let (segment_id, exit, cost) = match *node {
                Node::Origin => (origin, origin_dir, initial_cost),
                Node::Entry(segment_id, entry) => {
                    if expansions.get() >= self.max_iterations {
                        aborted.set(true);
                        return vec![];
                    }
                    expansions.set(expansions.get() + 1);
                    let length = network.segment_by_id(segment_id).map_or(0.0, |s| s.length());
                    (segment_id, entry.other(), length)
                }
            };
            network
                .links_at(segment_id, exit)
                .iter()
                .filter_map(|link| link.other_side(segment_id, exit))
                .map(|(next, entry)| (Node::Entry(next, entry), OrderedFloat(cost)))
                .collect()
        };
        let heuristic = |node: &Node| match *node {
            Node::Origin => OrderedFloat(0.0),
            Node::Entry(segment_id, entry) => OrderedFloat(
                network
                    .segment_by_id(segment_id)
                    .map_or(0.0, |s| s.endpoint(entry).distance(goal)),
            ),
        };
        let success = |node: &Node| {
            !aborted.get() && matches!(node, Node::Entry(segment_id, _) if *segment_id == destination)
        };

        let result = astar(&Node::Origin, successors, heuristic, success);
        let Some((path, cost)) = result else {
            if aborted.get() {
                debug!("Route search aborted after {} iterations", self.max_iterations);
            } else {
                debug!("No route after {} iterations", expansions.get());
            }
            return None;
        };

        let mut hops = vec![origin_hop];
        for node in &path {
            if let Node::Entry(segment_id, entry_ep) = *node {
                let segment_length = network.segment_by_id(segment_id).map_or(0.0, |s| s.length());
                hops.push(RouteHop {
                    segment_id,
                    entry_ep,
                    segment_length,
                    goal_t: None,
                });
            }
        }

        let mut total_cost = cost.0;
        if let Some(last) = hops.last_mut() {
            last.goal_t = Some(destination_t);
            total_cost += destination_seg.distance_to_endpoint(destination_t, last.entry_ep);
        }
        debug!(
            "Route found after {} iterations: {} hops, {:.2} m",
            expansions.get(),
            hops.len(),
            total_cost
        );

        Some(RoutePlan { hops, total_cost })
    }
}

/// A partial path explored by the nearest-station search.
struct Trace {
    prev: Option<usize>,
    segment_id: SegmentId,
    dir: Endpoint,
    dist_at_entry: f64,
    dist_at_exit: f64,
}

/// A search frontier entry: where to continue, how far it is, and how we got there.
#[derive(Clone, Copy)]
struct Frontier {
    segment_id: SegmentId,
    t: f64,
    dir: Endpoint,
    distance: f64,
    prev: Option<usize>,
}

/// Searches along the track, in the direction of travel only, for the closest station stop.
///
/// The search is best-first by distance travelled and bounded by [MAX_SEARCH_ITERATIONS].
/// Branches are not followed past a segment holding a stop, nor beyond the best stop found so far.
pub fn nearest_station_along_track<N>(
    network: &N,
    segment_id: SegmentId,
    t: f64,
    dir: Endpoint,
    excluded: Option<StationId>,
) -> Option<NearestStation>
where
    N: NetworkDatabase + ?Sized,
{
    let mut traces: Vec<Trace> = vec![];
    let mut frontier = vec![Frontier {
        segment_id,
        t,
        dir,
        distance: 0.0,
        prev: None,
    }];
    let mut queue = BinaryHeap::from([Reverse((OrderedFloat(0.0), 0usize))]);
    let mut visited = HashSet::new();
    let mut best: Option<(StationId, StationStop, f64, usize)> = None;
    let mut iterations = 0;

    while let Some(Reverse((_, idx))) = queue.pop() {
        if iterations >= MAX_SEARCH_ITERATIONS {
            debug!("Nearest station search aborted after {} iterations", iterations);
            break;
        }
        iterations += 1;

        let Frontier {
            segment_id,
            t,
            dir,
            distance,
            prev,
        } = frontier[idx];
        if best.map_or(false, |b| b.2 <= distance) {
            continue;
        }
        let Some(segment) = network.segment_by_id(segment_id) else {
            continue;
        };
        let length = segment.length();

        // Stops ahead on this segment
        let nearest_here = network
            .stops_on_segment(segment_id)
            .into_iter()
            .filter(|(station_id, _)| Some(*station_id) != excluded)
            .filter_map(|(station_id, stop)| {
                let ahead = match dir {
                    Endpoint::End => stop.t > t,
                    Endpoint::Start => stop.t < t,
                };
                ahead.then(|| (station_id, stop, distance + length * (stop.t - t).abs()))
            })
            .min_by(|a, b| a.2.total_cmp(&b.2));

        if let Some((station_id, stop, stop_distance)) = nearest_here {
            if best.map_or(true, |b| stop_distance < b.2) {
                traces.push(Trace {
                    prev,
                    segment_id,
                    dir,
                    dist_at_entry: distance,
                    dist_at_exit: stop_distance,
                });
                best = Some((station_id, stop, stop_distance, traces.len() - 1));
            }
            continue;
        }

        let distance_at_end = distance + segment.distance_to_endpoint(t, dir);
        if best.map_or(false, |b| b.2 < distance_at_end) {
            continue;
        }

        traces.push(Trace {
            prev,
            segment_id,
            dir,
            dist_at_entry: distance,
            dist_at_exit: distance_at_end,
        });
        let trace_idx = traces.len() - 1;

        for link in network.links_at(segment_id, dir) {
            let Some((next, entry)) = link.other_side(segment_id, dir) else {
                continue;
            };
            if !visited.insert((next, entry)) {
                continue;
            }
            frontier.push(Frontier {
                segment_id: next,
                t: entry.t(),
                dir: entry.other(),
                distance: distance_at_end,
                prev: Some(trace_idx),
            });
            queue.push(Reverse((OrderedFloat(distance_at_end), frontier.len() - 1)));
        }
    }

    let (station_id, stop, distance, head) = best?;
    let station = network.station_by_id(station_id)?.clone();

    let mut trajectory = vec![];
    let mut cursor = Some(head);
    while let Some(idx) = cursor {
        let trace = &traces[idx];
        trajectory.push(TrajectorySegment {
            segment_id: trace.segment_id,
            dir: trace.dir,
            dist_to_goal_at_entry: distance - trace.dist_at_entry,
            dist_to_goal_at_exit: distance - trace.dist_at_exit,
        });
        cursor = trace.prev;
    }
    trajectory.reverse();

    Some(NearestStation {
        station,
        stop,
        distance,
        trajectory,
    })
}
