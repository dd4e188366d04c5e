//! Reference high-level planner.
//!
//! Every move is a single 7th-order polynomial piece per axis that starts
//! from the current goal's position, velocity and acceleration and ends
//! at rest with zero jerk at both ends.

use std::f64::consts::{PI, TAU};

use swarm_domain::{FullState, Piece, Poly, StartedTrajectory, Vec3};

use crate::engine::{Planner, PlannerState};

/// Polynomial go-to planner
#[derive(Debug, Clone)]
pub struct ReferencePlanner {
    state: PlannerState,
    trajectory: StartedTrajectory,
}

impl ReferencePlanner {
    pub fn new() -> Self {
        Self {
            state: PlannerState::Idle,
            trajectory: StartedTrajectory::from_piece(Piece::default(), 0.0),
        }
    }

    /// A finished descent counts as back on the ground.
    fn settled_state(&self, t: f64) -> PlannerState {
        match self.state {
            PlannerState::Lowering if self.trajectory.is_finished(t) => PlannerState::Idle,
            state => state,
        }
    }

    fn go_to_from(&mut self, from: &FullState, goal: Vec3, goal_yaw: f64, duration: f64, t: f64) {
        // take the short way round
        let goal_yaw = from.yaw + shortest_signed_angle(from.yaw, goal_yaw);
        let piece = Piece {
            duration: duration.max(0.0),
            x: seventh_order_no_jerk(duration, from.pos.x, from.vel.x, from.acc.x, goal.x),
            y: seventh_order_no_jerk(duration, from.pos.y, from.vel.y, from.acc.y, goal.y),
            z: seventh_order_no_jerk(duration, from.pos.z, from.vel.z, from.acc.z, goal.z),
            yaw: seventh_order_no_jerk(duration, from.yaw, from.omega.z, 0.0, goal_yaw),
        };
        self.trajectory = StartedTrajectory::from_piece(piece, t);
    }
}

impl Default for ReferencePlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Planner for ReferencePlanner {
    fn takeoff(
        &mut self,
        pos: Vec3,
        yaw: f64,
        height: f64,
        target_yaw: f64,
        duration: f64,
        t: f64,
    ) -> bool {
        if self.settled_state(t) != PlannerState::Idle {
            return false;
        }
        let from = FullState {
            yaw,
            ..FullState::at_rest(pos)
        };
        let hover = Vec3::new(pos.x, pos.y, height);
        self.go_to_from(&from, hover, target_yaw, duration, t);
        self.state = PlannerState::Flying;
        true
    }

    fn land(
        &mut self,
        pos: Vec3,
        yaw: f64,
        height: f64,
        target_yaw: f64,
        duration: f64,
        t: f64,
    ) -> bool {
        if matches!(self.state, PlannerState::Idle | PlannerState::Lowering) {
            return false;
        }
        let from = FullState {
            yaw,
            ..FullState::at_rest(pos)
        };
        let ground = Vec3::new(pos.x, pos.y, height);
        self.go_to_from(&from, ground, target_yaw, duration, t);
        self.state = PlannerState::Lowering;
        true
    }

    fn stop(&mut self) {
        self.state = PlannerState::Idle;
    }

    fn go_to(&mut self, relative: bool, goal: Vec3, yaw: f64, duration: f64, t: f64) {
        let from = self.current_goal(t);
        let (goal, yaw) = if relative {
            (from.pos + goal, from.yaw + yaw)
        } else {
            (goal, yaw)
        };
        self.go_to_from(&from, goal, yaw, duration, t);
        self.state = PlannerState::Flying;
    }

    fn start_trajectory(&mut self, trajectory: StartedTrajectory) {
        self.trajectory = trajectory;
        self.state = PlannerState::Flying;
    }

    fn current_goal(&self, t: f64) -> FullState {
        self.trajectory.eval(t)
    }

    fn is_finished(&self, t: f64) -> bool {
        self.trajectory.is_finished(t)
    }

    fn state(&self) -> PlannerState {
        self.state
    }
}

/// Coefficients taking `x0, dx0, ddx0` at 0 to `xf` at rest at `duration`,
/// with zero jerk at both ends. A non-positive duration jumps to `xf`.
fn seventh_order_no_jerk(duration: f64, x0: f64, dx0: f64, ddx0: f64, xf: f64) -> Poly {
    if duration <= 0.0 {
        return Poly::constant(xf);
    }
    let t = duration;
    let t2 = t * t;
    let t4 = t2 * t2;
    let dx = x0 - xf;
    Poly([
        x0,
        dx0,
        ddx0 / 2.0,
        0.0,
        -(5.0 * (14.0 * dx + 8.0 * t * dx0 + 2.0 * t2 * ddx0)) / (2.0 * t4),
        (84.0 * dx + 45.0 * t * dx0 + 10.0 * t2 * ddx0) / (t4 * t),
        -(140.0 * dx + 72.0 * t * dx0 + 15.0 * t2 * ddx0) / (2.0 * t4 * t2),
        (2.0 * (10.0 * dx + 5.0 * t * dx0 + t2 * ddx0)) / (t4 * t2 * t),
    ])
}

/// Signed angle in `[-pi, pi)` rotating `from` onto `to`.
fn shortest_signed_angle(from: f64, to: f64) -> f64 {
    (to - from + PI).rem_euclid(TAU) - PI
}
