use super::traction::{TractionCommand, TractionState, STANDSTILL_SPEED};
use super::TrainStatus;
use crate::network::{NetworkDatabase, StationId};
use crate::routing::RoutePlanner;
use crate::signal::{PinId, SignalSink};
use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;

/// An instruction from the schedule controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaypointCommand {
    Stop,
    GotoStation(StationId),
    GotoNearestStation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaypointState {
    Stopped,
    Planning,
    EnRoute,
    Stopping,
    Arrived,
    NoPath,
}

impl WaypointState {
    pub fn as_str(&self) -> &'static str {
        use WaypointState::*;
        match self {
            Stopped => "STOPPED",
            Planning => "PLANNING",
            EnRoute => "EN_ROUTE",
            Stopping => "STOPPING",
            Arrived => "ARRIVED",
            NoPath => "NO_PATH",
        }
    }
}

impl fmt::Display for WaypointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the waypoint controller reports to the schedule controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaypointStatus {
    pub state: WaypointState,
    /// The station most recently arrived at.
    pub arrived_at: Option<StationId>,
}

/// Turns station goals into route plans for the traction controller.
#[derive(Clone, Debug)]
pub struct WaypointController {
    unit_index: usize,
    state: WaypointState,
    planner: RoutePlanner,
    command: TractionCommand,
    /// The station the current plan leads to.
    destination: Option<StationId>,
    last_arrived: Option<StationId>,
    /// The station most recently headed for, skipped when looking for the nearest one.
    last_destination: Option<StationId>,
    info_pin: PinId,
    state_pin: PinId,
}

impl WaypointController {
    /// Creates a waypoint controller, registering its signals with the sink.
    pub fn new(unit_index: usize, sink: &mut dyn SignalSink) -> Self {
        let entity = sink.entity_handle("waypoint", unit_index);
        Self {
            unit_index,
            state: WaypointState::Stopped,
            planner: RoutePlanner::default(),
            command: TractionCommand::stop(),
            destination: None,
            last_arrived: None,
            last_destination: None,
            info_pin: sink.pin(entity, "info"),
            state_pin: sink.pin(entity, "state"),
        }
    }

    pub fn state(&self) -> WaypointState {
        self.state
    }

    pub fn status(&self) -> WaypointStatus {
        WaypointStatus {
            state: self.state,
            arrived_at: self.last_arrived,
        }
    }

    /// Handles a new command, if any, then advances the state machine.
    ///
    /// # Parameters
    /// * `network` - The track network
    /// * `command` - A new instruction, or `None` to carry on
    /// * `status` - Where the train is and how fast it is going
    /// * `traction_state` - The traction controller's state after the previous tick
    /// * `sink` - Receives telemetry
    ///
    /// Returns the command for the traction controller.
    pub fn update<N>(
        &mut self,
        network: &N,
        command: Option<WaypointCommand>,
        status: &TrainStatus,
        traction_state: TractionState,
        sink: &mut dyn SignalSink,
    ) -> TractionCommand
    where
        N: NetworkDatabase + ?Sized,
    {
        let replanned = command.is_some();
        match command {
            Some(WaypointCommand::Stop) => self.state = WaypointState::Stopping,
            Some(WaypointCommand::GotoStation(station)) => self.go_to_station(network, station, status, sink),
            Some(WaypointCommand::GotoNearestStation) => self.go_to_nearest_station(network, status, sink),
            None => {}
        }

        match self.state {
            WaypointState::Stopping if status.speed < STANDSTILL_SPEED => {
                self.state = WaypointState::Stopped;
            }
            WaypointState::EnRoute if !replanned && traction_state == TractionState::InDestination => {
                info!(
                    "Unit {} arrived at station {:?}",
                    self.unit_index, self.destination
                );
                self.state = WaypointState::Arrived;
                self.last_arrived = self.destination;
            }
            _ => {}
        }
        sink.feed(self.state_pin, self.state.as_str().into());

        match self.state {
            WaypointState::EnRoute => self.command.clone(),
            _ => TractionCommand::stop(),
        }
    }

    fn go_to_station<N>(
        &mut self,
        network: &N,
        station_id: StationId,
        status: &TrainStatus,
        sink: &mut dyn SignalSink,
    ) where
        N: NetworkDatabase + ?Sized,
    {
        self.state = WaypointState::Planning;
        self.destination = Some(station_id);
        self.last_destination = Some(station_id);

        let Some(station) = network.station_by_id(station_id) else {
            warn!("Unit {}: unknown station {}", self.unit_index, station_id);
            sink.feed(self.info_pin, format!("Unknown station {}", station_id).as_str().into());
            self.state = WaypointState::NoPath;
            return;
        };
        let Some(stop) = station.stops.first() else {
            warn!(
                "Unit {}: station {} has no stops",
                self.unit_index, station.name
            );
            sink.feed(self.info_pin, format!("Station {} has no stops", station.name).as_str().into());
            self.state = WaypointState::NoPath;
            return;
        };

        let plan = self.planner.plan_route(
            network,
            status.segment_id,
            status.t,
            status.dir,
            stop.segment_id,
            stop.t,
        );
        match plan {
            Some(plan) => {
                debug!(
                    "Unit {}: heading for {} over {} hops, {:.0} m",
                    self.unit_index,
                    station.name,
                    plan.hops.len(),
                    plan.total_cost
                );
                let info = format!("OK route to station {}, distance {:.0} m", station.name, plan.total_cost);
                sink.feed(self.info_pin, info.as_str().into());
                self.command = TractionCommand::follow(plan.hops);
                self.state = WaypointState::EnRoute;
            }
            None => {
                warn!("Unit {}: no path to {}", self.unit_index, station.name);
                sink.feed(self.info_pin, format!("NO ROUTE to station {}", station.name).as_str().into());
                self.state = WaypointState::NoPath;
            }
        }
    }

    fn go_to_nearest_station<N>(
        &mut self,
        network: &N,
        status: &TrainStatus,
        sink: &mut dyn SignalSink,
    ) where
        N: NetworkDatabase + ?Sized,
    {
        let nearest = network.nearest_station_along_track(
            status.segment_id,
            status.t,
            status.dir,
            self.last_destination,
        );
        match nearest {
            Some(nearest) => {
                let info = format!(
                    "Set goal: station {}, {:.0} m away",
                    nearest.station.name, nearest.distance
                );
                sink.feed(self.info_pin, info.as_str().into());
                self.go_to_station(network, nearest.station.id, status, sink)
            }
            None => {
                debug!("Unit {}: no station ahead", self.unit_index);
                sink.feed(self.info_pin, "Cannot find any station ahead".into());
                self.state = WaypointState::NoPath;
            }
        }
    }
}
