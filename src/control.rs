//! Train control: the schedule, waypoint and traction controllers, composed into a cascade
//! which turns a high-level goal into an acceleration every tick.

use crate::network::NetworkDatabase;
use crate::routing::RouteHop;
use crate::segment::{Endpoint, SegmentId};
use crate::signal::SignalSink;
use crate::unit::TractionLimits;
use chrono::NaiveDateTime;
use serde::Serialize;

pub use kinematics::{full_stop, stop_after_distance, Solution, SolverMode};
pub use schedule::{ScheduleController, ScheduleEntry, ScheduleMode, ScheduleState};
pub use traction::{TractionCommand, TractionController, TractionState, STANDSTILL_SPEED};
pub use waypoint::{WaypointCommand, WaypointController, WaypointState, WaypointStatus};

mod kinematics;
mod schedule;
mod traction;
mod waypoint;

/// What the control stack knows about its train at the start of a tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrainStatus {
    pub segment_id: SegmentId,
    pub t: f64,
    /// The end of the segment being travelled towards.
    pub dir: Endpoint,
    /// The current speed in m/s.
    pub speed: f64,
}

/// A summary of a control stack's state, for remote displays.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlStateSummary {
    pub scheduler_mode: ScheduleMode,
    pub scheduler_state: ScheduleState,
    /// The hops of the plan being followed, if any.
    pub segments_to_follow: Option<Vec<RouteHop>>,
    pub waypoint_controller_state: WaypointState,
    pub traction_controller_state: TractionState,
}

/// The controllers of one train.
#[derive(Clone, Debug)]
pub struct ControlStack {
    mode: ScheduleMode,
    limits: TractionLimits,
    schedule: ScheduleController,
    waypoint: WaypointController,
    traction: TractionController,
}

impl ControlStack {
    /// Creates the control stack of a train, which starts out stopped.
    ///
    /// # Parameters
    /// * `unit_index` - The index of the train in the unit database
    /// * `limits` - The train's performance envelope
    /// * `sink` - Receives telemetry
    pub fn new(unit_index: usize, limits: TractionLimits, sink: &mut dyn SignalSink) -> Self {
        Self {
            mode: ScheduleMode::Stop,
            limits,
            schedule: ScheduleController::new(unit_index, sink),
            waypoint: WaypointController::new(unit_index, sink),
            traction: TractionController::new(unit_index, sink),
        }
    }

    /// Visit whichever station comes next along the track, forever.
    pub fn go_auto_schedule(&mut self) {
        self.mode = ScheduleMode::AutoSchedule;
    }

    pub fn set_mode(&mut self, mode: ScheduleMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> ScheduleMode {
        self.mode
    }

    /// Replaces the schedule followed in [ScheduleMode::FollowSchedule].
    pub fn set_schedule(&mut self, schedule: Vec<ScheduleEntry>) {
        self.schedule.set_schedule(schedule);
    }

    pub fn schedule_controller(&self) -> &ScheduleController {
        &self.schedule
    }

    pub fn waypoint_controller(&self) -> &WaypointController {
        &self.waypoint
    }

    pub fn traction_controller(&self) -> &TractionController {
        &self.traction
    }

    /// Runs the cascade for one tick.
    ///
    /// # Parameters
    /// * `dt` - The time step in s
    /// * `now` - The simulated time
    /// * `status` - Where the train is and how fast it is going
    /// * `network` - The track network
    /// * `sink` - Receives telemetry
    ///
    /// Returns the acceleration to apply over the tick, in m/s<sup>2</sup>.
    pub fn update<N>(
        &mut self,
        dt: f64,
        now: NaiveDateTime,
        status: &TrainStatus,
        network: &N,
        sink: &mut dyn SignalSink,
    ) -> f64
    where
        N: NetworkDatabase + ?Sized,
    {
        let waypoint_cmd = self
            .schedule
            .update(now, self.mode, self.waypoint.status(), sink);
        let traction_cmd = self
            .waypoint
            .update(network, waypoint_cmd, status, self.traction.state(), sink);
        self.traction
            .update(dt, traction_cmd, status, &self.limits, sink)
    }

    /// Picks which link to follow out of a segment end, when there are several.
    ///
    /// Returns the segment and entry endpoint the current plan continues with, if any.
    pub fn preferred_continuation(&self, segment_id: SegmentId, exit: Endpoint) -> Option<(SegmentId, Endpoint)> {
        self.traction.preferred_continuation(segment_id, exit)
    }

    pub fn summary(&self) -> ControlStateSummary {
        ControlStateSummary {
            scheduler_mode: self.mode,
            scheduler_state: self.schedule.state(),
            segments_to_follow: self
                .traction
                .command()
                .filter(|cmd| !cmd.is_stop())
                .map(|cmd| cmd.hops.clone()),
            waypoint_controller_state: self.waypoint.state(),
            traction_controller_state: self.traction.state(),
        }
    }
}
