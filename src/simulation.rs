use crate::control::{ControlStack, ControlStateSummary, ScheduleMode, TrainStatus};
use crate::error::SnapshotError;
use crate::math::direction_to_rotation;
use crate::network::{NetworkDatabase, TrackPosition};
use crate::segment::{distance_to_endpoint, Endpoint};
use crate::signal::{PinId, SignalSink};
use crate::unit::UnitDatabase;
use cgmath::InnerSpace;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

/// The most links a train may cross in a single tick.
const MAX_LINKS_PER_TICK: usize = 64;

/// The parameters of a [Simulation].
#[derive(Clone, Copy, Debug)]
pub struct SimulationConfig {
    /// The simulated time when the simulation starts.
    pub start_time: NaiveDateTime,
    /// How far a unit may be from the track to be placed on it, in m.
    pub snap_radius: f64,
    /// The largest angle between a unit's heading and the track, in radians.
    pub snap_angle: f64,
    /// The mode every train starts in.
    pub initial_mode: ScheduleMode,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start_time: NaiveDate::from_ymd_opt(2000, 1, 1)
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .unwrap_or_default(),
            snap_radius: 0.2,
            snap_angle: 45f64.to_radians(),
            initial_mode: ScheduleMode::AutoSchedule,
        }
    }
}

/// Timing information for remote displays.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSnapshot {
    /// The simulated time elapsed since the start, in s.
    pub elapsed_secs: f64,
    /// Wall-clock time spent on the last step per unit of simulated time.
    pub step_ratio: f64,
}

#[derive(Clone, Copy, Debug)]
struct UnitPins {
    acceleration: PinId,
    velocity: PinId,
    segment_id: PinId,
    t: PinId,
}

/// A unit which has been placed on the track.
struct Train {
    unit_index: usize,
    position: TrackPosition,
    control: ControlStack,
    /// The acceleration applied over the current tick.
    acceleration: f64,
    pins: UnitPins,
}

/// A rail network simulation.
pub struct Simulation<N: NetworkDatabase, U: UnitDatabase> {
    network: N,
    units: U,
    sink: Box<dyn SignalSink>,
    config: SimulationConfig,
    /// The units being simulated. Units which could not be placed on the track are left out.
    trains: Vec<Train>,
    /// The simulated time since the start, in s.
    elapsed: f64,
    step_ratio: f64,
}

impl<N: NetworkDatabase, U: UnitDatabase> Simulation<N, U> {
    /// Creates a simulation, placing every unit on the track nearest to it.
    ///
    /// # Parameters
    /// * `network` - The track network
    /// * `units` - The units to simulate
    /// * `sink` - Receives telemetry
    /// * `config` - Simulation parameters
    pub fn new(network: N, units: U, mut sink: Box<dyn SignalSink>, config: SimulationConfig) -> Self {
        let mut trains = vec![];
        for (unit_index, unit) in units.iter().enumerate() {
            let Some(position) = network.segment_at(unit.pos, unit.orientation, config.snap_radius, config.snap_angle)
            else {
                warn!(
                    "Unit {} at {:?} could not be placed on the network and will not move",
                    unit_index, unit.pos
                );
                continue;
            };
            debug!(
                "Unit {} placed on segment {} at t={:.3} heading {:?}",
                unit_index, position.segment_id, position.t, position.dir
            );

            let entity = sink.entity_handle("unit", unit_index);
            let pins = UnitPins {
                acceleration: sink.pin(entity, "acceleration"),
                velocity: sink.pin(entity, "velocity"),
                segment_id: sink.pin(entity, "segmentId"),
                t: sink.pin(entity, "t"),
            };
            let mut control = ControlStack::new(unit_index, unit.class.limits, sink.as_mut());
            control.set_mode(config.initial_mode);
            trains.push(Train {
                unit_index,
                position,
                control,
                acceleration: 0.0,
                pins,
            });
        }
        info!("Simulating {} of {} units", trains.len(), units.len());

        Self {
            network,
            units,
            sink,
            config,
            trains,
            elapsed: 0.0,
            step_ratio: 0.0,
        }
    }

    /// Advances the simulation by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        let start = Instant::now();
        self.sink.set_simulated_time(self.elapsed);
        self.apply_controls(dt);
        self.integrate(dt);
        self.elapsed += dt;
        self.step_ratio = start.elapsed().as_secs_f64() / dt;
    }

    /// The simulated time since the start, in s.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// The current simulated time.
    pub fn sim_time(&self) -> NaiveDateTime {
        self.config.start_time + Duration::microseconds((self.elapsed * 1e6).round() as i64)
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn units(&self) -> &U {
        &self.units
    }

    /// The number of units placed on the track.
    pub fn active_units(&self) -> usize {
        self.trains.len()
    }

    /// Gets the control stack of a unit, if it was placed on the track.
    pub fn control(&self, unit_index: usize) -> Option<&ControlStack> {
        self.train(unit_index).map(|train| &train.control)
    }

    /// Gets the control stack of a unit mutably, to change its mode or schedule.
    pub fn control_mut(&mut self, unit_index: usize) -> Option<&mut ControlStack> {
        self.trains
            .iter_mut()
            .find(|train| train.unit_index == unit_index)
            .map(|train| &mut train.control)
    }

    /// Gets where a unit is on the track, if it was placed on the track.
    pub fn track_state(&self, unit_index: usize) -> Option<TrackPosition> {
        self.train(unit_index).map(|train| train.position)
    }

    /// Summarises the state of every placed unit's controllers, by unit index.
    pub fn controller_summary(&self) -> BTreeMap<usize, ControlStateSummary> {
        self.trains
            .iter()
            .map(|train| (train.unit_index, train.control.summary()))
            .collect()
    }

    /// [Simulation::controller_summary] as JSON.
    pub fn controller_summary_json(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(serde_json::to_vec(&self.controller_summary())?)
    }

    pub fn snapshot(&self) -> SimulationSnapshot {
        SimulationSnapshot {
            elapsed_secs: self.elapsed,
            step_ratio: self.step_ratio,
        }
    }

    /// [Simulation::snapshot] as JSON.
    pub fn snapshot_json(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(serde_json::to_vec(&self.snapshot())?)
    }

    fn train(&self, unit_index: usize) -> Option<&Train> {
        self.trains.iter().find(|train| train.unit_index == unit_index)
    }

    /// Runs every train's control stack to obtain its acceleration for this tick.
    fn apply_controls(&mut self, dt: f64) {
        let now = self.sim_time();
        for train in &mut self.trains {
            let Some(unit) = self.units.get(train.unit_index) else {
                continue;
            };
            let status = TrainStatus {
                segment_id: train.position.segment_id,
                t: train.position.t,
                dir: train.position.dir,
                speed: unit.velocity.magnitude(),
            };
            train.acceleration = train
                .control
                .update(dt, now, &status, &self.network, self.sink.as_mut());
        }
    }

    /// Moves every train along the track and updates its unit.
    fn integrate(&mut self, dt: f64) {
        for train in &mut self.trains {
            let Some(mut unit) = self.units.get(train.unit_index).cloned() else {
                continue;
            };
            let speed = unit.velocity.magnitude();
            let acc = train.acceleration;

            // Never reverse: stop at the instant the speed reaches zero
            let (new_speed, eff_dt) = if speed + acc * dt < 0.0 {
                (0.0, if acc < 0.0 { -speed / acc } else { 0.0 })
            } else {
                (speed + acc * dt, dt)
            };
            let distance = speed * eff_dt + 0.5 * acc * eff_dt * eff_dt;

            train.position = advance_along_track(&self.network, &train.control, train.position, distance);
            let TrackPosition { segment_id, t, dir } = train.position;
            if let Some(segment) = self.network.segment_by_id(segment_id) {
                let (pos, tangent) = segment.point_and_tangent(t, dir);
                unit.pos = pos;
                unit.velocity = tangent * new_speed;
                unit.orientation = direction_to_rotation(tangent);
            }
            if let Err(err) = self.units.update(train.unit_index, unit) {
                warn!("Cannot store unit {}: {}", train.unit_index, err);
            }

            let sink = self.sink.as_mut();
            sink.feed(train.pins.acceleration, acc.into());
            sink.feed(train.pins.velocity, new_speed.into());
            sink.feed(train.pins.segment_id, (segment_id.0 as f64).into());
            sink.feed(train.pins.t, t.into());
        }
    }
}

/// Moves a position a given distance along the track in its direction of travel.
///
/// Dead ends turn the train around. Where several links leave a segment end, the one the
/// control stack prefers is taken, falling back on the first.
fn advance_along_track<N>(network: &N, control: &ControlStack, start: TrackPosition, distance: f64) -> TrackPosition
where
    N: NetworkDatabase + ?Sized,
{
    let mut pos = start;
    let mut remaining = distance;

    for _ in 0..MAX_LINKS_PER_TICK {
        let Some(segment) = network.segment_by_id(pos.segment_id) else {
            warn!("Train on unknown segment {}", pos.segment_id);
            return pos;
        };
        let length = segment.length();
        let travellable = distance_to_endpoint(length, pos.t, pos.dir);
        if remaining <= travellable {
            let dt = remaining / length;
            pos.t = match pos.dir {
                Endpoint::End => pos.t + dt,
                Endpoint::Start => pos.t - dt,
            };
            return pos;
        }

        remaining -= travellable;
        pos.t = pos.dir.t();
        let links = network.links_at(pos.segment_id, pos.dir);
        let mut candidates = links
            .iter()
            .filter_map(|link| link.other_side(pos.segment_id, pos.dir));

        let next = if links.len() > 1 {
            let preferred = control.preferred_continuation(pos.segment_id, pos.dir);
            let chosen = candidates.clone().find(|c| Some(*c) == preferred);
            if chosen.is_none() {
                warn!(
                    "Ambiguous junction at segment {} {:?}, taking the first link",
                    pos.segment_id, pos.dir
                );
            }
            chosen.or_else(|| candidates.next())
        } else {
            candidates.next()
        };

        match next {
            Some((segment_id, entry)) => {
                pos = TrackPosition {
                    segment_id,
                    t: entry.t(),
                    dir: entry.other(),
                };
            }
            None => {
                debug!("Dead end at segment {} {:?}, reversing", pos.segment_id, pos.dir);
                pos.dir = pos.dir.other();
            }
        }
    }

    warn!(
        "Train crossed more than {} links in one tick, stopping at segment {}",
        MAX_LINKS_PER_TICK, pos.segment_id
    );
    pos
}
