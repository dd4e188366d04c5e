//! Translation between agent setpoints and the collision-avoidance call.
//!
//! The avoidance engine only sees the fields the current flight mode makes
//! authoritative. Whatever it hands back is merged into the candidate
//! setpoint; yaw, angular rate and acceleration always pass through.

use swarm_domain::{FullState, Setpoint, Vec3};

use crate::avoidance::AvoidanceRequest;
use crate::engine::CollisionAvoider;

/// Engine-facing view of a setpoint.
pub fn request_for(setpoint: &Setpoint) -> AvoidanceRequest {
    match *setpoint {
        Setpoint::Idle => AvoidanceRequest::Idle,
        Setpoint::HighLevel(goal) | Setpoint::FullState(goal) => AvoidanceRequest::Absolute {
            pos: goal.pos,
            vel: goal.vel,
        },
        Setpoint::Position { pos, .. } => AvoidanceRequest::Position { pos },
        Setpoint::Velocity { vel, .. } => AvoidanceRequest::Velocity { vel },
    }
}

/// Merge an engine response back into the candidate setpoint.
///
/// Fields the response does not carry keep their candidate values.
pub fn merge_response(candidate: &Setpoint, response: &AvoidanceRequest) -> Setpoint {
    let merge_goal = |goal: FullState| FullState {
        pos: response.position().unwrap_or(goal.pos),
        vel: response.velocity().unwrap_or(goal.vel),
        ..goal
    };
    match *candidate {
        Setpoint::Idle => Setpoint::Idle,
        Setpoint::HighLevel(goal) => Setpoint::HighLevel(merge_goal(goal)),
        Setpoint::FullState(goal) => Setpoint::FullState(merge_goal(goal)),
        Setpoint::Position { pos, yaw } => Setpoint::Position {
            pos: response.position().unwrap_or(pos),
            yaw,
        },
        Setpoint::Velocity { vel, omega } => Setpoint::Velocity {
            vel: response.velocity().unwrap_or(vel),
            omega,
        },
    }
}

/// Run `candidate` through the avoider and return the adjusted setpoint.
///
/// `current` is the agent's committed (front-buffer) state and `others`
/// the committed positions of every other agent.
pub fn collision_adjusted(
    avoider: &mut dyn CollisionAvoider,
    current: &FullState,
    candidate: &Setpoint,
    others: &[Vec3],
) -> Setpoint {
    let request = request_for(candidate);
    let response = avoider.update_setpoint(request, current.pos, current.vel, others);
    merge_response(candidate, &response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avoidance::CollisionParams;

    /// Pushes positions up by one metre and zeroes velocities, recording
    /// what it was shown.
    struct Lifter {
        params: CollisionParams,
        seen: Vec<(AvoidanceRequest, usize)>,
    }

    impl CollisionAvoider for Lifter {
        fn params(&self) -> &CollisionParams {
            &self.params
        }

        fn update_setpoint(
            &mut self,
            request: AvoidanceRequest,
            _position: Vec3,
            _velocity: Vec3,
            others: &[Vec3],
        ) -> AvoidanceRequest {
            self.seen.push((request, others.len()));
            let up = Vec3::new(0.0, 0.0, 1.0);
            match request {
                AvoidanceRequest::Idle => AvoidanceRequest::Idle,
                AvoidanceRequest::Absolute { pos, .. } => AvoidanceRequest::Absolute {
                    pos: pos + up,
                    vel: Vec3::ZERO,
                },
                AvoidanceRequest::Position { pos } => AvoidanceRequest::Position { pos: pos + up },
                AvoidanceRequest::Velocity { .. } => AvoidanceRequest::Velocity { vel: Vec3::ZERO },
            }
        }
    }

    fn lifter() -> Lifter {
        Lifter {
            params: CollisionParams::default(),
            seen: Vec::new(),
        }
    }

    #[test]
    fn test_request_carries_authoritative_fields_only() {
        let goal = FullState {
            pos: Vec3::new(1.0, 2.0, 3.0),
            vel: Vec3::new(0.1, 0.0, 0.0),
            ..FullState::default()
        };
        assert_eq!(
            request_for(&Setpoint::HighLevel(goal)),
            AvoidanceRequest::Absolute {
                pos: goal.pos,
                vel: goal.vel
            }
        );
        assert_eq!(
            request_for(&Setpoint::Position {
                pos: goal.pos,
                yaw: 1.0
            }),
            AvoidanceRequest::Position { pos: goal.pos }
        );
        assert_eq!(
            request_for(&Setpoint::Velocity {
                vel: goal.vel,
                omega: Vec3::ZERO
            }),
            AvoidanceRequest::Velocity { vel: goal.vel }
        );
        assert_eq!(request_for(&Setpoint::Idle), AvoidanceRequest::Idle);
    }

    #[test]
    fn test_full_state_passes_yaw_and_rates_through() {
        let mut avoider = lifter();
        let goal = FullState {
            pos: Vec3::new(1.0, 0.0, 0.0),
            vel: Vec3::new(1.0, 0.0, 0.0),
            acc: Vec3::new(0.0, 0.5, 0.0),
            yaw: 0.7,
            omega: Vec3::new(0.1, 0.2, 0.3),
        };
        let others = [Vec3::ZERO, Vec3::new(5.0, 0.0, 0.0)];
        let adjusted = collision_adjusted(
            &mut avoider,
            &FullState::default(),
            &Setpoint::FullState(goal),
            &others,
        );
        let Setpoint::FullState(out) = adjusted else {
            panic!("mode changed: {adjusted:?}");
        };
        assert_eq!(out.pos, Vec3::new(1.0, 0.0, 1.0));
        assert_eq!(out.vel, Vec3::ZERO);
        assert_eq!(out.yaw, 0.7);
        assert_eq!(out.omega, goal.omega);
        assert_eq!(out.acc, goal.acc);
        assert_eq!(avoider.seen[0].1, 2);
    }

    #[test]
    fn test_position_and_velocity_modes() {
        let mut avoider = lifter();
        let adjusted = collision_adjusted(
            &mut avoider,
            &FullState::default(),
            &Setpoint::Position {
                pos: Vec3::new(2.0, 0.0, 0.0),
                yaw: 0.4,
            },
            &[],
        );
        assert_eq!(
            adjusted,
            Setpoint::Position {
                pos: Vec3::new(2.0, 0.0, 1.0),
                yaw: 0.4
            }
        );

        let omega = Vec3::new(0.0, 0.0, 0.9);
        let adjusted = collision_adjusted(
            &mut avoider,
            &FullState::default(),
            &Setpoint::Velocity {
                vel: Vec3::new(3.0, 0.0, 0.0),
                omega,
            },
            &[],
        );
        assert_eq!(
            adjusted,
            Setpoint::Velocity {
                vel: Vec3::ZERO,
                omega
            }
        );
    }

    #[test]
    fn test_mismatched_response_keeps_candidate_fields() {
        let candidate = Setpoint::Position {
            pos: Vec3::new(1.0, 1.0, 1.0),
            yaw: 0.0,
        };
        let merged = merge_response(&candidate, &AvoidanceRequest::Velocity { vel: Vec3::ZERO });
        assert_eq!(merged, candidate);
        assert_eq!(merge_response(&Setpoint::Idle, &AvoidanceRequest::Idle), Setpoint::Idle);
    }
}
