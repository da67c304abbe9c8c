//! The track network: segments, the links between them, and stations.

use crate::math::{flatten, rotation_to_direction, Point2d, Point3d, Rotation};
use crate::quadtree::QuadTree;
use crate::routing;
use crate::segment::{Endpoint, Segment, SegmentId, SegmentLink, SegmentLookup};
use cgmath::{InnerSpace, MetricSpace};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;

pub use geojson::{load_geojson, parse_geojson};
pub use import::{build_spatial_index, index_half_extent, RawNetwork, TopologyBuilder, TopologyConfig};

mod geojson;
mod import;

/// The links touching one end of a segment.
pub type LinkList = SmallVec<[SegmentLink; 4]>;

/// Unique ID of a [Station]. IDs are 1-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationId(pub u32);

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A place on the track where trains may stop.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StationStop {
    pub segment_id: SegmentId,
    pub t: f64,
}

/// A named station with one or more stops.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: StationId,
    pub name: String,
    pub stops: Vec<StationStop>,
}

/// A position on the track: a segment, a t-parameter along it, and the end being travelled towards.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackPosition {
    pub segment_id: SegmentId,
    pub t: f64,
    pub dir: Endpoint,
}

/// One hop of a path found by searching along the track.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrajectorySegment {
    pub segment_id: SegmentId,
    /// The end being travelled towards.
    pub dir: Endpoint,
    /// The distance left to travel when entering this hop, in m.
    pub dist_to_goal_at_entry: f64,
    /// The distance left to travel when leaving this hop, in m.
    pub dist_to_goal_at_exit: f64,
}

/// The result of a nearest-station search.
#[derive(Clone, Debug, PartialEq)]
pub struct NearestStation {
    pub station: Station,
    pub stop: StationStop,
    /// The distance along the track to the stop, in m.
    pub distance: f64,
    /// The hops leading to the stop, starting with the segment the search began on.
    pub trajectory: Vec<TrajectorySegment>,
}

/// Read access to a track network, independent of how it is stored.
///
/// Backends implement the accessors; the search algorithms come for free.
pub trait NetworkDatabase: SegmentLookup {
    /// Gets the links touching one end of a segment.
    fn links_at(&self, segment_id: SegmentId, ep: Endpoint) -> LinkList;

    /// Gets the station with the given ID.
    fn station_by_id(&self, id: StationId) -> Option<&Station>;

    /// Gets the stops located on a segment, with the stations they belong to.
    fn stops_on_segment(&self, segment_id: SegmentId) -> Vec<(StationId, StationStop)>;

    /// Finds the segments passing within `radius` of a point, with the t-parameter of the closest point.
    fn segments_near(&self, point: Point2d, radius: f64) -> Vec<(SegmentId, f64)>;

    /// Returns an iterator over all segments.
    fn iter_segments(&self) -> Box<dyn Iterator<Item = &Segment> + '_>;

    /// Returns an iterator over all links.
    fn iter_links(&self) -> Box<dyn Iterator<Item = &SegmentLink> + '_>;

    /// Returns an iterator over all stations.
    fn iter_stations(&self) -> Box<dyn Iterator<Item = &Station> + '_>;

    /// Gets the spatial index, if the backend keeps one. Intended for diagnostics.
    fn spatial_index(&self) -> Option<&QuadTree> {
        None
    }

    /// Finds the closest station stop ahead of a position, following the track in the
    /// direction of travel.
    ///
    /// # Parameters
    /// * `segment_id`, `t`, `dir` - The starting position and direction of travel
    /// * `excluded` - A station to ignore, typically the one the train is leaving
    fn nearest_station_along_track(
        &self,
        segment_id: SegmentId,
        t: f64,
        dir: Endpoint,
        excluded: Option<StationId>,
    ) -> Option<NearestStation> {
        routing::nearest_station_along_track(self, segment_id, t, dir, excluded)
    }

    /// Matches a position and heading to the track.
    ///
    /// Candidates within `radius` are considered closest first; the first whose tangent
    /// lies within `max_angle` (in radians) of the heading, in either direction, is returned.
    fn segment_at(
        &self,
        position: Point3d,
        orientation: Rotation,
        radius: f64,
        max_angle: f64,
    ) -> Option<TrackPosition> {
        let heading = rotation_to_direction(orientation);
        let min_cosine = max_angle.cos();
        let point = flatten(position);

        let mut candidates = self
            .segments_near(point, radius)
            .into_iter()
            .filter_map(|(id, t)| self.segment_by_id(id).map(|seg| (seg, t)))
            .map(|(seg, t)| (flatten(seg.point(t)).distance2(point), seg, t))
            .collect::<Vec<_>>();
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));

        candidates.into_iter().find_map(|(_, seg, t)| {
            let tangent = seg.tangent();
            let dir = if tangent.dot(heading) >= min_cosine {
                Endpoint::End
            } else if (-tangent).dot(heading) >= min_cosine {
                Endpoint::Start
            } else {
                return None;
            };
            Some(TrackPosition {
                segment_id: seg.id,
                t,
                dir,
            })
        })
    }
}

/// The serialisable contents of a [Network].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NetworkData {
    pub segments: Vec<Segment>,
    pub links: Vec<SegmentLink>,
    pub stations: Vec<Station>,
}

/// An in-memory track network.
#[derive(Clone, Debug)]
pub struct Network {
    segments: Vec<Segment>,
    links: Vec<SegmentLink>,
    /// Indices into `links`, by the segment ends they touch.
    links_by_end: HashMap<(SegmentId, Endpoint), SmallVec<[usize; 4]>>,
    stations: Vec<Station>,
    /// Station and stop indices, by the segment the stop lies on.
    stops_by_segment: HashMap<SegmentId, SmallVec<[(usize, usize); 2]>>,
    quadtree: QuadTree,
}

impl Network {
    /// Assembles a network from its parts, building the lookup indices.
    ///
    /// # Parameters
    /// * `segments` - The segments, with IDs numbered sequentially from 1
    /// * `links` - The links between segment ends
    /// * `stations` - The stations
    /// * `quadtree` - A spatial index holding every segment
    pub fn new(
        segments: Vec<Segment>,
        links: Vec<SegmentLink>,
        stations: Vec<Station>,
        quadtree: QuadTree,
    ) -> Self {
        let mut links_by_end: HashMap<_, SmallVec<[usize; 4]>> = HashMap::new();
        for (idx, link) in links.iter().enumerate() {
            links_by_end
                .entry((link.segment1, link.ep1))
                .or_default()
                .push(idx);
            links_by_end
                .entry((link.segment2, link.ep2))
                .or_default()
                .push(idx);
        }

        let mut stops_by_segment: HashMap<_, SmallVec<[(usize, usize); 2]>> = HashMap::new();
        for (station_idx, station) in stations.iter().enumerate() {
            for (stop_idx, stop) in station.stops.iter().enumerate() {
                stops_by_segment
                    .entry(stop.segment_id)
                    .or_default()
                    .push((station_idx, stop_idx));
            }
        }

        Self {
            segments,
            links,
            links_by_end,
            stations,
            stops_by_segment,
            quadtree,
        }
    }

    /// Restores a network from stored data, rebuilding the spatial index.
    pub fn from_data(data: NetworkData) -> Self {
        let quadtree = build_spatial_index(&data.segments);
        Self::new(data.segments, data.links, data.stations, quadtree)
    }

    /// Extracts the network's contents for storage.
    pub fn to_data(&self) -> NetworkData {
        NetworkData {
            segments: self.segments.clone(),
            links: self.links.clone(),
            stations: self.stations.clone(),
        }
    }

    /// Gets the segments, ordered by ID.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Gets the links.
    pub fn links(&self) -> &[SegmentLink] {
        &self.links
    }

    /// Gets the stations, ordered by ID.
    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    /// Finds a station by name.
    pub fn station_by_name(&self, name: &str) -> Option<&Station> {
        self.stations.iter().find(|st| st.name == name)
    }
}

impl SegmentLookup for Network {
    fn segment_by_id(&self, id: SegmentId) -> Option<Segment> {
        self.segments.segment_by_id(id)
    }
}

impl NetworkDatabase for Network {
    fn links_at(&self, segment_id: SegmentId, ep: Endpoint) -> LinkList {
        self.links_by_end
            .get(&(segment_id, ep))
            .map(|idxs| idxs.iter().map(|idx| self.links[*idx]).collect())
            .unwrap_or_default()
    }

    fn station_by_id(&self, id: StationId) -> Option<&Station> {
        let direct = (id.0 as usize)
            .checked_sub(1)
            .and_then(|idx| self.stations.get(idx))
            .filter(|st| st.id == id);
        direct.or_else(|| self.stations.iter().find(|st| st.id == id))
    }

    fn stops_on_segment(&self, segment_id: SegmentId) -> Vec<(StationId, StationStop)> {
        self.stops_by_segment
            .get(&segment_id)
            .map(|idxs| {
                idxs.iter()
                    .map(|(station_idx, stop_idx)| {
                        let station = &self.stations[*station_idx];
                        (station.id, station.stops[*stop_idx])
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn segments_near(&self, point: Point2d, radius: f64) -> Vec<(SegmentId, f64)> {
        self.quadtree.nearest_segments(point, radius, &self.segments)
    }

    fn iter_segments(&self) -> Box<dyn Iterator<Item = &Segment> + '_> {
        Box::new(self.segments.iter())
    }

    fn iter_links(&self) -> Box<dyn Iterator<Item = &SegmentLink> + '_> {
        Box::new(self.links.iter())
    }

    fn iter_stations(&self) -> Box<dyn Iterator<Item = &Station> + '_> {
        Box::new(self.stations.iter())
    }

    fn spatial_index(&self) -> Option<&QuadTree> {
        Some(&self.quadtree)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::math::direction_to_rotation;
    use crate::math::Vector3d;
    use assert_approx_eq::assert_approx_eq;

    /// An L-shaped pair of segments joined at (100, 0), with a station on the second.
    fn corner() -> Network {
        let segments = vec![
            Segment::new(SegmentId(1), Point3d::new(0.0, 0.0, 0.0), Point3d::new(100.0, 0.0, 0.0)),
            Segment::new(SegmentId(2), Point3d::new(100.0, 0.0, 0.0), Point3d::new(100.0, 50.0, 0.0)),
        ];
        let links = vec![SegmentLink::new(
            (SegmentId(1), Endpoint::End),
            (SegmentId(2), Endpoint::Start),
        )];
        let stations = vec![Station {
            id: StationId(1),
            name: "Corner".into(),
            stops: vec![StationStop {
                segment_id: SegmentId(2),
                t: 0.5,
            }],
        }];
        Network::from_data(NetworkData {
            segments,
            links,
            stations,
        })
    }

    #[test]
    fn links_are_indexed_by_end() {
        let net = corner();
        assert_eq!(net.links_at(SegmentId(1), Endpoint::End).len(), 1);
        assert_eq!(net.links_at(SegmentId(2), Endpoint::Start).len(), 1);
        assert!(net.links_at(SegmentId(1), Endpoint::Start).is_empty());
        assert_eq!(net.stops_on_segment(SegmentId(2))[0].0, StationId(1));
        assert!(net.stops_on_segment(SegmentId(1)).is_empty());
    }

    #[test]
    fn segment_at_matches_heading() {
        let net = corner();
        let pos = Point3d::new(40.0, 0.1, 0.0);

        let east = direction_to_rotation(Vector3d::new(1.0, 0.0, 0.0));
        let found = net.segment_at(pos, east, 0.2, 45f64.to_radians()).unwrap();
        assert_eq!(found.segment_id, SegmentId(1));
        assert_eq!(found.dir, Endpoint::End);
        assert_approx_eq!(found.t, 0.4);

        let west = direction_to_rotation(Vector3d::new(-1.0, 0.2, 0.0));
        let found = net.segment_at(pos, west, 0.2, 45f64.to_radians()).unwrap();
        assert_eq!(found.dir, Endpoint::Start);

        let north = direction_to_rotation(Vector3d::new(0.0, 1.0, 0.0));
        assert!(net.segment_at(pos, north, 0.2, 45f64.to_radians()).is_none());
    }

    #[test]
    fn data_round_trip_rebuilds_indices() {
        let net = corner();
        let json = serde_json::to_string(&net.to_data()).unwrap();
        let restored = Network::from_data(serde_json::from_str(&json).unwrap());
        assert_eq!(restored.segments(), net.segments());
        assert_eq!(restored.links_at(SegmentId(2), Endpoint::Start).len(), 1);
        assert_eq!(restored.segments_near(Point2d::new(100.0, 25.0), 1.0).len(), 1);
        assert_eq!(restored.station_by_name("Corner").map(|st| st.id), Some(StationId(1)));
    }
}
