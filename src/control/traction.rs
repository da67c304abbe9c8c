use super::kinematics::{full_stop, stop_after_distance};
use super::TrainStatus;
use crate::routing::RouteHop;
use crate::segment::{distance_to_endpoint, Endpoint, SegmentId};
use crate::signal::{PinId, SignalSink};
use crate::unit::TractionLimits;
use log::{debug, warn};
use serde::Serialize;
use std::fmt;

/// Speeds below this count as standing still, in m/s.
pub const STANDSTILL_SPEED: f64 = 0.01;

/// A sequence of hops for the traction controller to follow. No hops means stop.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TractionCommand {
    pub hops: Vec<RouteHop>,
}

impl TractionCommand {
    /// A command to stop where we are.
    pub fn stop() -> Self {
        Default::default()
    }

    /// Follow the given hops.
    pub fn follow(hops: Vec<RouteHop>) -> Self {
        Self { hops }
    }

    pub fn is_stop(&self) -> bool {
        self.hops.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TractionState {
    Stopped,
    EnRoute,
    Approaching,
    InDestination,
    NoPlan,
}

impl TractionState {
    pub fn as_str(&self) -> &'static str {
        use TractionState::*;
        match self {
            Stopped => "STOPPED",
            EnRoute => "EN_ROUTE",
            Approaching => "APPROACHING",
            InDestination => "IN_DESTINATION",
            NoPlan => "NO_PLAN",
        }
    }
}

impl fmt::Display for TractionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug)]
struct Pins {
    state: PinId,
    track_ahead: PinId,
    v_max: PinId,
    control_mode: PinId,
    current_index: PinId,
}

/// Turns a sequence of hops into an acceleration, tick by tick.
#[derive(Clone, Debug)]
pub struct TractionController {
    state: TractionState,
    command: Option<TractionCommand>,
    pins: Pins,
}

impl TractionController {
    /// Creates a traction controller, registering its signals with the sink.
    pub fn new(unit_index: usize, sink: &mut dyn SignalSink) -> Self {
        let entity = sink.entity_handle("traction", unit_index);
        let pins = Pins {
            state: sink.pin(entity, "state"),
            track_ahead: sink.pin(entity, "trackAhead"),
            v_max: sink.pin(entity, "vMax"),
            control_mode: sink.pin(entity, "controlMode"),
            current_index: sink.pin(entity, "currentIndex"),
        };
        Self {
            state: TractionState::Stopped,
            command: None,
            pins,
        }
    }

    pub fn state(&self) -> TractionState {
        self.state
    }

    /// The command currently being followed.
    pub fn command(&self) -> Option<&TractionCommand> {
        self.command.as_ref()
    }

    /// Computes the acceleration for the next tick.
    ///
    /// # Parameters
    /// * `dt` - The time step in s
    /// * `command` - The hops to follow, replacing the previous command
    /// * `status` - Where the train is and how fast it is going
    /// * `limits` - The train's performance envelope
    /// * `sink` - Receives telemetry
    pub fn update(
        &mut self,
        dt: f64,
        command: TractionCommand,
        status: &TrainStatus,
        limits: &TractionLimits,
        sink: &mut dyn SignalSink,
    ) -> f64 {
        self.command = Some(command);
        let hops = match &self.command {
            Some(command) if !command.is_stop() => command.hops.as_slice(),
            _ => {
                self.set_state(TractionState::NoPlan, sink);
                return full_stop(limits);
            }
        };

        let Some(index) = hops.iter().position(|hop| hop.segment_id == status.segment_id) else {
            if self.state != TractionState::NoPlan {
                warn!(
                    "Train lost: segment {} is not part of its plan",
                    status.segment_id
                );
            }
            self.set_state(TractionState::NoPlan, sink);
            return full_stop(limits);
        };

        let distance = distance_to_go(hops, index, status.t);
        if distance < 0.0 {
            debug!("Train has overrun its goal by {:.3} m", -distance);
        }
        sink.feed(self.pins.current_index, (index as f64).into());
        sink.feed(self.pins.track_ahead, distance.into());
        sink.feed(self.pins.v_max, limits.max_velocity.into());

        if distance > 0.1 * dt {
            let solution = stop_after_distance(status.speed, distance, limits, dt);
            sink.feed(self.pins.control_mode, solution.mode.as_str().into());
            self.set_state(TractionState::EnRoute, sink);
            solution.acceleration
        } else if status.speed > STANDSTILL_SPEED {
            self.set_state(TractionState::Approaching, sink);
            full_stop(limits)
        } else {
            self.set_state(TractionState::InDestination, sink);
            full_stop(limits)
        }
    }

    /// Picks which way to go when leaving a segment end with several links, based on the
    /// current command.
    ///
    /// Returns the segment and entry endpoint of the following hop.
    pub fn preferred_continuation(&self, segment_id: SegmentId, exit: Endpoint) -> Option<(SegmentId, Endpoint)> {
        let hops = &self.command.as_ref()?.hops;
        let index = hops
            .iter()
            .position(|hop| hop.segment_id == segment_id && hop.entry_ep.other() == exit)?;
        hops.get(index + 1).map(|next| (next.segment_id, next.entry_ep))
    }

    fn set_state(&mut self, state: TractionState, sink: &mut dyn SignalSink) {
        self.state = state;
        sink.feed(self.pins.state, state.as_str().into());
    }
}

/// Where the train should stop on a hop, as a t-parameter.
fn goal_t(hop: &RouteHop) -> f64 {
    hop.goal_t.unwrap_or_else(|| hop.entry_ep.other().t())
}

/// The distance along the plan from the given position on hop `index` to the goal on the last hop.
fn distance_to_go(hops: &[RouteHop], index: usize, t: f64) -> f64 {
    let current = &hops[index];
    let Some((last, middle)) = hops[index + 1..].split_last() else {
        let goal = goal_t(current);
        return match current.entry_ep {
            Endpoint::Start => (goal - t) * current.segment_length,
            Endpoint::End => (t - goal) * current.segment_length,
        };
    };

    distance_to_endpoint(current.segment_length, t, current.entry_ep.other())
        + middle.iter().map(|hop| hop.segment_length).sum::<f64>()
        + distance_to_endpoint(last.segment_length, goal_t(last), last.entry_ep)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::signal::NullSignalSink;
    use assert_approx_eq::assert_approx_eq;

    fn hop(id: u32, entry_ep: Endpoint, goal_t: Option<f64>) -> RouteHop {
        RouteHop {
            segment_id: SegmentId(id),
            entry_ep,
            segment_length: 100.0,
            goal_t,
        }
    }

    fn status(id: u32, t: f64, dir: Endpoint, speed: f64) -> TrainStatus {
        TrainStatus {
            segment_id: SegmentId(id),
            t,
            dir,
            speed,
        }
    }

    fn plan() -> TractionCommand {
        TractionCommand::follow(vec![
            hop(1, Endpoint::Start, None),
            hop(2, Endpoint::End, None),
            hop(3, Endpoint::Start, Some(0.4)),
        ])
    }

    #[test]
    fn sums_distance_along_plan() {
        let cmd = plan();
        assert_approx_eq!(distance_to_go(&cmd.hops, 0, 0.25), 75.0 + 100.0 + 40.0);
        assert_approx_eq!(distance_to_go(&cmd.hops, 1, 0.5), 50.0 + 40.0);
        assert_approx_eq!(distance_to_go(&cmd.hops, 2, 0.1), 30.0);
        assert!(distance_to_go(&cmd.hops, 2, 0.5) < 0.0);
    }

    #[test]
    fn follows_plan() {
        let mut sink = NullSignalSink;
        let mut ctrl = TractionController::new(0, &mut sink);
        let limits = TractionLimits::default();
        let acc = ctrl.update(0.1, plan(), &status(1, 0.25, Endpoint::End, 0.0), &limits, &mut sink);
        assert_eq!(ctrl.state(), TractionState::EnRoute);
        assert!(acc > 0.0);
    }

    #[test]
    fn stops_without_plan() {
        let mut sink = NullSignalSink;
        let mut ctrl = TractionController::new(0, &mut sink);
        let limits = TractionLimits::default();

        let acc = ctrl.update(0.1, TractionCommand::stop(), &status(1, 0.5, Endpoint::End, 3.0), &limits, &mut sink);
        assert_eq!(ctrl.state(), TractionState::NoPlan);
        assert_approx_eq!(acc, -1.3);

        let acc = ctrl.update(0.1, plan(), &status(9, 0.5, Endpoint::End, 3.0), &limits, &mut sink);
        assert_eq!(ctrl.state(), TractionState::NoPlan);
        assert_approx_eq!(acc, -1.3);
    }

    #[test]
    fn arrives_at_goal() {
        let mut sink = NullSignalSink;
        let mut ctrl = TractionController::new(0, &mut sink);
        let limits = TractionLimits::default();

        ctrl.update(0.1, plan(), &status(3, 0.4, Endpoint::End, 0.5), &limits, &mut sink);
        assert_eq!(ctrl.state(), TractionState::Approaching);
        ctrl.update(0.1, plan(), &status(3, 0.4, Endpoint::End, 0.0), &limits, &mut sink);
        assert_eq!(ctrl.state(), TractionState::InDestination);
    }

    #[test]
    fn prefers_next_hop() {
        let mut sink = NullSignalSink;
        let mut ctrl = TractionController::new(0, &mut sink);
        assert_eq!(ctrl.preferred_continuation(SegmentId(1), Endpoint::End), None);

        ctrl.update(0.1, plan(), &status(1, 0.5, Endpoint::End, 0.0), &Default::default(), &mut sink);
        assert_eq!(
            ctrl.preferred_continuation(SegmentId(1), Endpoint::End),
            Some((SegmentId(2), Endpoint::End))
        );
        assert_eq!(
            ctrl.preferred_continuation(SegmentId(2), Endpoint::Start),
            Some((SegmentId(3), Endpoint::Start))
        );
        assert_eq!(ctrl.preferred_continuation(SegmentId(1), Endpoint::Start), None);
        assert_eq!(ctrl.preferred_continuation(SegmentId(3), Endpoint::End), None);
    }
}
