use super::waypoint::{WaypointCommand, WaypointState, WaypointStatus};
use crate::network::StationId;
use crate::signal::{PinId, SignalSink};
use chrono::{Duration, NaiveDateTime, NaiveTime};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// How long a train waits at each station in [ScheduleMode::AutoSchedule].
pub const AUTO_BOARDING_SECS: i64 = 10;

/// The number of visits remembered in [ScheduleMode::AutoSchedule].
pub const AUTO_LOG_CAPACITY: usize = 256;

/// The operating mode selected for a train.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleMode {
    /// Come to a halt and stay there.
    Stop,
    /// Visit the stations of the schedule in turn, forever.
    FollowSchedule,
    /// Visit whichever station comes next along the track.
    #[default]
    AutoSchedule,
}

impl ScheduleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleMode::Stop => "STOP",
            ScheduleMode::FollowSchedule => "FOLLOW_SCHEDULE",
            ScheduleMode::AutoSchedule => "AUTO_SCHEDULE",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleState {
    Stopped,
    Boarding,
    BoardingComplete,
    EnRoute,
    GotoNearestStation,
    Stopping,
    NoSchedule,
    NoRoute,
}

impl ScheduleState {
    pub fn as_str(&self) -> &'static str {
        use ScheduleState::*;
        match self {
            Stopped => "STOPPED",
            Boarding => "BOARDING",
            BoardingComplete => "BOARDING_COMPLETE",
            EnRoute => "EN_ROUTE",
            GotoNearestStation => "GOTO_NEAREST_STATION",
            Stopping => "STOPPING",
            NoSchedule => "NO_SCHEDULE",
            NoRoute => "NO_ROUTE",
        }
    }
}

impl fmt::Display for ScheduleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A visit to a station. Times are times of day.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub station_id: StationId,
    pub arrival: NaiveTime,
    pub departure: NaiveTime,
    /// The shortest time to stay at the station, however late the train is.
    pub min_boarding: Duration,
}

/// Decides which station a train should head for next.
#[derive(Clone, Debug)]
pub struct ScheduleController {
    unit_index: usize,
    state: ScheduleState,
    schedule: Vec<ScheduleEntry>,
    position: usize,
    boarding_end: NaiveDateTime,
    /// Stations visited in [ScheduleMode::AutoSchedule], oldest first.
    log: VecDeque<ScheduleEntry>,
    pins: Pins,
}

#[derive(Clone, Copy, Debug)]
struct Pins {
    info: PinId,
    state: PinId,
    schedule_pos: PinId,
}

impl ScheduleController {
    /// Creates a schedule controller, registering its signals with the sink.
    pub fn new(unit_index: usize, sink: &mut dyn SignalSink) -> Self {
        let entity = sink.entity_handle("schedule", unit_index);
        let pins = Pins {
            info: sink.pin(entity, "info"),
            state: sink.pin(entity, "state"),
            schedule_pos: sink.pin(entity, "schedulePos"),
        };
        Self {
            unit_index,
            state: ScheduleState::NoSchedule,
            schedule: vec![],
            position: 0,
            boarding_end: NaiveDateTime::MIN,
            log: VecDeque::new(),
            pins,
        }
    }

    pub fn state(&self) -> ScheduleState {
        self.state
    }

    /// The stations visited in [ScheduleMode::AutoSchedule], oldest first.
    pub fn log(&self) -> impl Iterator<Item = &ScheduleEntry> + '_ {
        self.log.iter()
    }

    /// Replaces the schedule. The first entry is headed for on the next update in
    /// [ScheduleMode::FollowSchedule].
    pub fn set_schedule(&mut self, schedule: Vec<ScheduleEntry>) {
        self.schedule = schedule;
        self.position = 0;
        self.state = ScheduleState::Stopped;
    }

    /// Advances the state machine.
    ///
    /// # Parameters
    /// * `now` - The simulated time
    /// * `mode` - The operating mode selected for the train
    /// * `waypoint` - The waypoint controller's status after the previous tick
    /// * `sink` - Receives telemetry
    ///
    /// Returns a new instruction for the waypoint controller, if any.
    pub fn update(
        &mut self,
        now: NaiveDateTime,
        mode: ScheduleMode,
        waypoint: WaypointStatus,
        sink: &mut dyn SignalSink,
    ) -> Option<WaypointCommand> {
        let command = self.advance(now, mode, waypoint, sink);
        sink.feed(self.pins.state, self.state.as_str().into());
        sink.feed(self.pins.schedule_pos, (self.position as f64).into());
        command
    }

    fn advance(
        &mut self,
        now: NaiveDateTime,
        mode: ScheduleMode,
        waypoint: WaypointStatus,
        sink: &mut dyn SignalSink,
    ) -> Option<WaypointCommand> {
        use ScheduleState::*;

        match mode {
            ScheduleMode::Stop => match self.state {
                Stopping if waypoint.state == WaypointState::Stopped => {
                    self.state = Stopped;
                    None
                }
                Stopping | Stopped => None,
                _ => {
                    self.state = Stopping;
                    Some(WaypointCommand::Stop)
                }
            },

            ScheduleMode::AutoSchedule => match self.state {
                GotoNearestStation => {
                    match (waypoint.state, waypoint.arrived_at) {
                        (WaypointState::Arrived, Some(station_id)) => self.begin_auto_boarding(now, station_id),
                        (WaypointState::NoPath, _) => self.no_route(sink),
                        _ => {}
                    }
                    None
                }
                Boarding => {
                    self.check_boarding(now);
                    None
                }
                NoRoute => None,
                _ => {
                    self.state = GotoNearestStation;
                    Some(WaypointCommand::GotoNearestStation)
                }
            },

            ScheduleMode::FollowSchedule => match self.state {
                EnRoute => {
                    match waypoint.state {
                        WaypointState::Arrived => self.begin_boarding(now),
                        WaypointState::NoPath => self.no_route(sink),
                        _ => {}
                    }
                    None
                }
                Boarding => {
                    self.check_boarding(now);
                    None
                }
                BoardingComplete => {
                    self.position += 1;
                    self.go(sink)
                }
                NoRoute => None,
                NoSchedule if self.schedule.is_empty() => None,
                _ => self.go(sink),
            },
        }
    }

    /// Heads for the current schedule entry.
    fn go(&mut self, sink: &mut dyn SignalSink) -> Option<WaypointCommand> {
        if self.schedule.is_empty() {
            if self.state == ScheduleState::NoSchedule {
                return None;
            }
            info!("Unit {} has no schedule", self.unit_index);
            sink.feed(self.pins.info, "Cannot start: no orders in schedule".into());
            self.state = ScheduleState::NoSchedule;
            return Some(WaypointCommand::Stop);
        }

        self.position %= self.schedule.len();
        self.state = ScheduleState::EnRoute;
        Some(WaypointCommand::GotoStation(self.schedule[self.position].station_id))
    }

    fn begin_boarding(&mut self, now: NaiveDateTime) {
        let Some(entry) = self.schedule.get(self.position) else {
            self.state = ScheduleState::BoardingComplete;
            return;
        };
        let departure = now.date().and_time(entry.departure);
        self.boarding_end = departure.max(now + entry.min_boarding);
        self.state = ScheduleState::Boarding;
    }

    fn begin_auto_boarding(&mut self, now: NaiveDateTime, station_id: StationId) {
        let boarding = Duration::seconds(AUTO_BOARDING_SECS);
        self.boarding_end = now + boarding;
        if self.log.len() >= AUTO_LOG_CAPACITY {
            self.log.pop_front();
        }
        self.log.push_back(ScheduleEntry {
            station_id,
            arrival: now.time(),
            departure: self.boarding_end.time(),
            min_boarding: boarding,
        });
        self.state = ScheduleState::Boarding;
    }

    fn check_boarding(&mut self, now: NaiveDateTime) {
        if now >= self.boarding_end {
            self.state = ScheduleState::BoardingComplete;
        }
    }

    fn no_route(&mut self, sink: &mut dyn SignalSink) {
        warn!("Unit {} cannot reach its next station", self.unit_index);
        sink.feed(self.pins.info, "No route to the next station".into());
        self.state = ScheduleState::NoRoute;
    }
}
