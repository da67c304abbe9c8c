//! Closed-form acceleration control for stopping at a given distance.

use crate::unit::TractionLimits;
use serde::Serialize;

/// Time constant used when accelerating towards the target speed, in s.
const ACCELERATION_TIME_CONSTANT: f64 = 3.0;

/// Remaining distances below this are treated as zero, in m.
const DISTANCE_EPSILON: f64 = 1e-9;

/// The branch of the solver which produced an acceleration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolverMode {
    /// Nothing left to travel: full braking.
    Stop,
    /// Below the braking curve: speeding up towards it.
    Accelerate,
    /// Would overshoot within one tick: land exactly on the goal.
    Deadbeat,
    /// Above the braking curve: braking along it.
    Brake,
    /// Close and slow: stopping exactly over two ticks.
    PerfectFinish,
}

impl SolverMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolverMode::Stop => "STOP",
            SolverMode::Accelerate => "ACCELERATE",
            SolverMode::Deadbeat => "DEADBEAT",
            SolverMode::Brake => "BRAKE",
            SolverMode::PerfectFinish => "PERFECT_FINISH",
        }
    }
}

/// The output of [stop_after_distance].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Solution {
    /// The acceleration to apply for the next tick, in m/s<sup>2</sup>.
    pub acceleration: f64,
    /// The target speed at the current distance, in m/s.
    pub v_target: f64,
    pub mode: SolverMode,
    /// Whether the one-tick lookahead changed the acceleration.
    pub corrected: bool,
}

/// The acceleration which brings a train to a halt as quickly as allowed.
pub fn full_stop(limits: &TractionLimits) -> f64 {
    -limits.max_deceleration
}

/// Computes the acceleration needed to come to a stop after travelling a given distance.
///
/// # Parameters
/// * `v` - The current speed in m/s
/// * `s` - The distance left to travel in m
/// * `limits` - The train's acceleration, braking and speed limits
/// * `dt` - The time step in s
pub fn stop_after_distance(v: f64, s: f64, limits: &TractionLimits, dt: f64) -> Solution {
    let decel = limits.max_deceleration;
    let v_target = (2.0 * s.max(0.0) * decel).sqrt().min(limits.max_velocity);

    if s <= 0.0 {
        return Solution {
            acceleration: full_stop(limits),
            v_target: 0.0,
            mode: SolverMode::Stop,
            corrected: false,
        };
    }

    let (acceleration, mode) = if s < 2.0 * v * dt && v < 2.0 * decel * dt {
        (-1.5 * v / dt + s / (dt * dt), SolverMode::PerfectFinish)
    } else if v_target >= v {
        let acc = ((v_target - v) / ACCELERATION_TIME_CONSTANT).min(limits.max_acceleration);
        if v * dt + 0.5 * acc * dt * dt > s {
            (2.0 * (s - v * dt) / (dt * dt), SolverMode::Deadbeat)
        } else {
            (acc, SolverMode::Accelerate)
        }
    } else {
        (-v * v / (2.0 * s), SolverMode::Brake)
    };

    let corrected = lookahead(v, s, acceleration, decel, dt);
    Solution {
        acceleration: corrected.unwrap_or(acceleration),
        v_target,
        mode,
        corrected: corrected.is_some(),
    }
}

/// Checks whether applying `a` now would require braking harder than `decel` on the next tick.
///
/// Returns the acceleration which puts the train exactly on the nominal braking curve after one
/// tick, or `None` if no correction is needed.
fn lookahead(v: f64, s: f64, a: f64, decel: f64, dt: f64) -> Option<f64> {
    let v_next = v + a * dt;
    let s_next = s - v * dt - 0.5 * a * dt * dt;
    if s_next <= DISTANCE_EPSILON {
        return None;
    }

    let v1_next = (2.0 * s_next * decel).sqrt();
    if v1_next >= v_next || -v_next * v_next / (2.0 * s_next) >= -decel {
        return None;
    }

    // Solve (v + a dt)^2 = 2 decel (s - v dt - a dt^2 / 2) for a
    let qa = dt * dt;
    let qb = 2.0 * v * dt + decel * dt * dt;
    let qc = v * v - 2.0 * decel * s + 2.0 * decel * v * dt;
    let discriminant = qb * qb - 4.0 * qa * qc;
    if discriminant < 0.0 {
        return Some(-decel);
    }
    Some((-qb + discriminant.sqrt()) / (2.0 * qa))
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn limits() -> TractionLimits {
        TractionLimits {
            max_velocity: 80.0 / 3.6,
            max_acceleration: 1.0,
            max_deceleration: 1.3,
        }
    }

    /// Applies an acceleration for one tick, returning the new speed and remaining distance.
    fn integrate(v: f64, s: f64, a: f64, dt: f64) -> (f64, f64) {
        (v + a * dt, s - v * dt - 0.5 * a * dt * dt)
    }

    #[test]
    fn finishes_short_of_goal() {
        let solution = stop_after_distance(0.46089262, 0.08170131, &limits(), 0.1);
        assert_approx_eq!(solution.acceleration, -1.3, 1e-3);
        assert_approx_eq!(solution.v_target, 0.46089414, 1e-6);
        assert!(solution.corrected);
    }

    #[test]
    fn finishes_in_two_ticks() {
        let solution = stop_after_distance(0.46089262, 0.08170131, &limits(), 0.2);
        assert_eq!(solution.mode, SolverMode::PerfectFinish);
        assert_approx_eq!(solution.acceleration, -1.414, 1e-3);
    }

    #[test]
    fn stays_on_braking_curve() {
        let limits = limits();
        for (v, s) in [(10.0, 50.0), (12.0, 50.0), (20.0, 100.0), (3.0, 400.0)] {
            let solution = stop_after_distance(v, s, &limits, 0.1);
            let (v_next, s_next) = integrate(v, s, solution.acceleration, 0.1);
            let implied = -v_next * v_next / (2.0 * s_next);
            assert!(implied >= -limits.max_deceleration - 1e-6, "v={} s={}", v, s);
        }
    }

    #[test]
    fn brakes_above_curve() {
        let solution = stop_after_distance(12.0, 50.0, &limits(), 0.1);
        assert_eq!(solution.mode, SolverMode::Brake);
        assert!(solution.acceleration <= 0.0);
    }

    #[test]
    fn accelerates_from_rest() {
        let solution = stop_after_distance(0.0, 1000.0, &limits(), 0.1);
        assert_eq!(solution.mode, SolverMode::Accelerate);
        assert_approx_eq!(solution.v_target, 80.0 / 3.6);
        assert_approx_eq!(solution.acceleration, 1.0);
    }

    #[test]
    fn stops_when_nothing_left() {
        let solution = stop_after_distance(5.0, 0.0, &limits(), 0.1);
        assert_eq!(solution.mode, SolverMode::Stop);
        assert_approx_eq!(solution.acceleration, -1.3);
    }
}
