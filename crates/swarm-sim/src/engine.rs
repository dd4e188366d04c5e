//! # Flight-Control Engine Boundary
//!
//! Narrow interfaces to the trajectory-planning and collision-avoidance
//! engine. Every agent owns one [`Planner`] and, while collision avoidance
//! is enabled, one [`CollisionAvoider`]; both are opaque handles created by
//! a [`FlightEngine`]. The simulation core only talks to these traits, so
//! it runs unchanged against the bundled reference engine or a test stub.

use serde::{Deserialize, Serialize};
use swarm_domain::{FullState, StartedTrajectory, Vec3};

use crate::avoidance::{AvoidanceRequest, CollisionParams, PassthroughAvoider};
use crate::planner::ReferencePlanner;

/// Planner life-cycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlannerState {
    #[default]
    Idle,
    Flying,
    Lowering,
}

/// Per-agent high-level trajectory planner.
///
/// All times are absolute simulation times in seconds.
pub trait Planner {
    /// Plan a climb to `height` above the origin plane. Returns `false`
    /// when the planner refuses the request in its current state.
    fn takeoff(
        &mut self,
        pos: Vec3,
        yaw: f64,
        height: f64,
        target_yaw: f64,
        duration: f64,
        t: f64,
    ) -> bool;

    /// Plan a descent to `height`. Returns `false` when refused.
    fn land(
        &mut self,
        pos: Vec3,
        yaw: f64,
        height: f64,
        target_yaw: f64,
        duration: f64,
        t: f64,
    ) -> bool;

    fn stop(&mut self);

    /// Plan a smooth move from the current goal to `goal`.
    fn go_to(&mut self, relative: bool, goal: Vec3, yaw: f64, duration: f64, t: f64);

    fn start_trajectory(&mut self, trajectory: StartedTrajectory);

    /// Goal state at time `t`.
    fn current_goal(&self, t: f64) -> FullState;

    fn is_finished(&self, t: f64) -> bool;

    fn state(&self) -> PlannerState;
}

/// Collision-avoidance service bound to one agent.
///
/// The implementor is the opaque avoidance state: the same instance is
/// handed every call so it can accumulate history.
pub trait CollisionAvoider {
    fn params(&self) -> &CollisionParams;

    /// Adjust the authoritative fields of `request` given the agent's
    /// current position and velocity and every other agent's position.
    fn update_setpoint(
        &mut self,
        request: AvoidanceRequest,
        position: Vec3,
        velocity: Vec3,
        others: &[Vec3],
    ) -> AvoidanceRequest;
}

/// Factory for the per-agent engine handles
pub trait FlightEngine {
    fn create_planner(&self) -> Box<dyn Planner>;

    fn create_avoider(&self, params: CollisionParams) -> Box<dyn CollisionAvoider>;
}

/// Engine used when no external one is supplied: polynomial go-to
/// planning and pass-through collision avoidance.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceEngine;

impl FlightEngine for ReferenceEngine {
    fn create_planner(&self) -> Box<dyn Planner> {
        Box::new(ReferencePlanner::new())
    }

    fn create_avoider(&self, params: CollisionParams) -> Box<dyn CollisionAvoider> {
        Box::new(PassthroughAvoider::new(params))
    }
}
