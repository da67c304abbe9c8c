use super::{Network, Station, StationId, StationStop};
use crate::math::{flatten, Point3d};
use crate::quadtree::QuadTree;
use crate::segment::{Endpoint, Segment, SegmentId, SegmentLink, COINCIDENCE_TOLERANCE};
use cgmath::InnerSpace;
use itertools::Itertools;
use log::{debug, info, warn};
use std::collections::HashSet;

/// The smallest half-extent used for a network's spatial index, in m.
const MIN_INDEX_HALF_EXTENT: f64 = 1024.0;

/// The parameters used when turning raw geometry into a linked network.
#[derive(Clone, Copy, Debug)]
pub struct TopologyConfig {
    /// Segment ends closer than this are candidates for linking, in m.
    pub connection_range: f64,
    /// The largest angle between two linked segments, in radians.
    pub max_angle: f64,
    /// Rejected pairs with an angle below this are reported, in radians.
    pub warning_angle: Option<f64>,
    /// Segments whose ends match within this distance are duplicates, in m.
    pub dedup_tolerance: f64,
    /// Stations further than this from the track are not placed, in m.
    pub station_snap_radius: f64,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            connection_range: 0.2,
            max_angle: 45f64.to_radians(),
            warning_angle: Some(60f64.to_radians()),
            dedup_tolerance: COINCIDENCE_TOLERANCE,
            station_snap_radius: 20.0,
        }
    }
}

/// Track and station geometry as read from a source file, before any topology is inferred.
#[derive(Clone, Debug, Default)]
pub struct RawNetwork {
    /// Straight pieces of track, numbered sequentially from 1 and possibly overlapping.
    pub segments: Vec<Segment>,
    /// Named points to be snapped onto the track.
    pub station_points: Vec<(String, Point3d)>,
    /// The largest absolute X or Y coordinate of any track point.
    pub max_coordinate: f64,
}

impl RawNetwork {
    /// Appends a polyline as a chain of segments. Zero-length pieces are dropped.
    pub fn add_polyline(&mut self, points: impl IntoIterator<Item = Point3d>) {
        let points = points.into_iter().collect::<Vec<_>>();
        for point in &points {
            self.max_coordinate = self
                .max_coordinate
                .max(point.x.abs())
                .max(point.y.abs());
        }
        for (start, end) in points.into_iter().tuple_windows() {
            if start == end {
                debug!("Dropping zero-length segment at {:?}", start);
                continue;
            }
            let id = SegmentId(self.segments.len() as u32 + 1);
            self.segments.push(Segment::new(id, start, end));
        }
    }

    /// Adds a named station location.
    pub fn add_station_point(&mut self, name: impl Into<String>, point: Point3d) {
        self.station_points.push((name.into(), point));
    }
}

/// Computes the half-extent of a square, origin-centred index covering all coordinates.
pub fn index_half_extent(max_coordinate: f64) -> f64 {
    let mut half_extent = MIN_INDEX_HALF_EXTENT;
    while half_extent <= max_coordinate {
        half_extent *= 2.0;
    }
    half_extent
}

/// Builds a spatial index holding every segment.
///
/// # Panics
/// If a segment cannot be indexed, which would mean the extent was computed wrongly.
pub fn build_spatial_index(segments: &[Segment]) -> QuadTree {
    let max_coordinate = segments
        .iter()
        .flat_map(|seg| seg.points)
        .fold(0.0, |max: f64, p| max.max(p.x.abs()).max(p.y.abs()));
    let mut tree = QuadTree::with_half_extent(index_half_extent(max_coordinate));
    for segment in segments {
        if let Err(err) = tree.insert(segment, segments) {
            panic!("{}", err);
        }
    }
    tree
}

/// Turns raw track geometry into a deduplicated, linked network with stations.
#[derive(Clone, Debug, Default)]
pub struct TopologyBuilder {
    config: TopologyConfig,
}

impl TopologyBuilder {
    /// Creates a topology builder.
    pub fn new(config: TopologyConfig) -> Self {
        Self { config }
    }

    /// Builds a network from raw geometry.
    pub fn build(&self, raw: &RawNetwork) -> Network {
        let half_extent = index_half_extent(raw.max_coordinate);
        let segments = self.unique_segments(&raw.segments, half_extent);
        let quadtree = build_spatial_index(&segments);
        let links = self.create_links(&segments, &quadtree);
        let stations = self.snap_stations(&raw.station_points, &segments, &quadtree);
        info!(
            "Built network: {} segments ({} raw), {} links, {} stations",
            segments.len(),
            raw.segments.len(),
            links.len(),
            stations.len()
        );
        Network::new(segments, links, stations, quadtree)
    }

    /// Removes duplicate segments, renumbering the survivors sequentially from 1.
    ///
    /// Two segments are duplicates when both of their ends coincide, in either order.
    pub fn unique_segments(&self, raw: &[Segment], half_extent: f64) -> Vec<Segment> {
        let tolerance = self.config.dedup_tolerance;
        let mut tree = QuadTree::with_half_extent(half_extent);
        let mut unique: Vec<Segment> = Vec::with_capacity(raw.len());

        for segment in raw {
            let start = flatten(segment.points[0]);
            let duplicate = tree
                .nearest_endpoints(start, tolerance, &unique)
                .into_iter()
                .filter_map(|(id, _)| unique.get(id.0 as usize - 1))
                .any(|candidate| candidate.is_equivalent(segment));
            if duplicate {
                continue;
            }

            let segment = segment.with_id(SegmentId(unique.len() as u32 + 1));
            unique.push(segment);
            if let Err(err) = tree.insert(&segment, &unique) {
                panic!("{}", err);
            }
        }

        unique
    }

    /// Links segment ends that meet within the connection range at a shallow enough angle.
    pub fn create_links(&self, segments: &[Segment], tree: &QuadTree) -> Vec<SegmentLink> {
        let max_cosine = self.config.max_angle.cos();
        let warning_cosine = self.config.warning_angle.map(f64::cos);
        let mut seen = HashSet::new();
        let mut links = vec![];

        for segment in segments {
            for ep in [Endpoint::Start, Endpoint::End] {
                let point = flatten(segment.endpoint(ep));
                let outwards = segment.endpoint_tangent(ep, true);

                for (other_id, other_ep) in tree.nearest_endpoints(point, self.config.connection_range, segments) {
                    // Each pair is considered from its lower-numbered side only
                    if other_id <= segment.id {
                        continue;
                    }
                    let Some(other) = segments.get(other_id.0 as usize - 1) else {
                        continue;
                    };
                    let dot = outwards.dot(other.endpoint_tangent(other_ep, false));
                    if dot < max_cosine {
                        if warning_cosine.map_or(false, |cos| dot > cos) {
                            warn!(
                                "Angle between segments {} and {} too large: {:.1} deg",
                                segment.id,
                                other_id,
                                dot.clamp(-1.0, 1.0).acos().to_degrees()
                            );
                        }
                        continue;
                    }

                    let link = SegmentLink::new((segment.id, ep), (other_id, other_ep));
                    if seen.insert(link) {
                        links.push(link);
                    }
                }
            }
        }

        links
    }

    /// Places each station point onto the track, merging points that share a name.
    ///
    /// The first segment found within the snap radius is used; points with none are skipped.
    pub fn snap_stations(&self, points: &[(String, Point3d)], segments: &[Segment], tree: &QuadTree) -> Vec<Station> {
        let radius = self.config.station_snap_radius;
        let mut stations: Vec<Station> = vec![];

        for (name, point) in points {
            let candidates = tree.nearest_segments(flatten(*point), radius, segments);
            let Some(&(segment_id, t)) = candidates.first() else {
                warn!(
                    "Couldn't snap station {} to network (radius {:.0} m)",
                    name, radius
                );
                continue;
            };

            let stop = StationStop { segment_id, t };
            match stations.iter_mut().find(|st| &st.name == name) {
                Some(station) => station.stops.push(stop),
                None => stations.push(Station {
                    id: StationId(stations.len() as u32 + 1),
                    name: name.clone(),
                    stops: vec![stop],
                }),
            }
        }

        stations
    }
}
