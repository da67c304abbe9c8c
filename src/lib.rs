//! A rail network simulation: track topology built from geographic data, spatial indexing,
//! route planning, and a cascade of controllers driving each train.

pub use cgmath;
pub use control::{ControlStack, ControlStateSummary, ScheduleEntry, ScheduleMode};
pub use error::{ImportError, ScenarioError, SnapshotError, UnitError};
pub use network::{Network, NetworkData, NetworkDatabase, Station, StationId, StationStop, TrackPosition};
pub use quadtree::QuadTree;
pub use routing::{RouteHop, RoutePlan, RoutePlanner};
pub use scenario::{load_scenario, Scenario};
pub use segment::{Endpoint, Segment, SegmentId, SegmentLink, SegmentLookup};
pub use signal::{LogSignalSink, NullSignalSink, SignalSink};
pub use simulation::{Simulation, SimulationConfig, SimulationSnapshot};
pub use unit::{TractionLimits, Unit, UnitClass, UnitClassDatabase, UnitDatabase, UnitStore};
pub use util::Interval;

pub mod control;
mod error;
pub mod math;
pub mod network;
pub mod quadtree;
pub mod routing;
pub mod scenario;
pub mod segment;
pub mod signal;
mod simulation;
pub mod unit;
mod util;
