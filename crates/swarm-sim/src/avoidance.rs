//! Collision-avoidance parameters, requests and the pass-through avoider.

use serde::{Deserialize, Serialize};
use swarm_domain::Vec3;

use crate::engine::CollisionAvoider;

/// Static per-agent collision-avoidance configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollisionParams {
    /// Half-axes of the keep-out ellipsoid around each agent
    pub ellipsoid_radii: Vec3,
    pub bbox_min: Vec3,
    pub bbox_max: Vec3,
    pub horizon_secs: f64,
    pub max_speed: f64,
    pub sidestep_threshold: f64,
    pub voronoi_projection_tolerance: f64,
    pub voronoi_projection_max_iters: u32,
}

impl CollisionParams {
    pub fn new(ellipsoid_radii: Vec3) -> Self {
        Self {
            ellipsoid_radii,
            ..Self::default()
        }
    }
}

impl Default for CollisionParams {
    fn default() -> Self {
        Self {
            ellipsoid_radii: Vec3::new(0.12, 0.12, 0.3),
            bbox_min: Vec3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            bbox_max: Vec3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            horizon_secs: 1.0,
            max_speed: 2.0,
            sidestep_threshold: 0.25,
            voronoi_projection_tolerance: 1e-5,
            voronoi_projection_max_iters: 100,
        }
    }
}

/// Setpoint as seen by the avoidance engine: only the fields the current
/// flight mode makes authoritative
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AvoidanceRequest {
    Idle,
    /// Position and velocity both authoritative
    Absolute { pos: Vec3, vel: Vec3 },
    Position { pos: Vec3 },
    Velocity { vel: Vec3 },
}

impl AvoidanceRequest {
    pub const fn position(&self) -> Option<Vec3> {
        match self {
            Self::Absolute { pos, .. } | Self::Position { pos } => Some(*pos),
            Self::Idle | Self::Velocity { .. } => None,
        }
    }

    pub const fn velocity(&self) -> Option<Vec3> {
        match self {
            Self::Absolute { vel, .. } | Self::Velocity { vel } => Some(*vel),
            Self::Idle | Self::Position { .. } => None,
        }
    }
}

/// Returns every request unchanged while tracking the last position it
/// accepted as feasible.
#[derive(Debug, Clone)]
pub struct PassthroughAvoider {
    params: CollisionParams,
    last_feasible_position: Vec3,
}

impl PassthroughAvoider {
    pub fn new(params: CollisionParams) -> Self {
        Self {
            params,
            last_feasible_position: Vec3::new(f64::NAN, f64::NAN, f64::NAN),
        }
    }

    /// NaN until a positional request has been seen.
    pub const fn last_feasible_position(&self) -> Vec3 {
        self.last_feasible_position
    }
}

impl CollisionAvoider for PassthroughAvoider {
    fn params(&self) -> &CollisionParams {
        &self.params
    }

    fn update_setpoint(
        &mut self,
        request: AvoidanceRequest,
        _position: Vec3,
        _velocity: Vec3,
        _others: &[Vec3],
    ) -> AvoidanceRequest {
        if let Some(pos) = request.position() {
            self.last_feasible_position = pos;
        }
        request
    }
}
