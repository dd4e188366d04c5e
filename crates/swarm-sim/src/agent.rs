//! Simulated vehicle: flight-mode state machine and per-tick integrator.
//!
//! Each agent keeps a double-buffered state. [`Agent::integrate`] reads the
//! committed front buffer (its own and, through a [`WorldView`], everyone
//! else's) and writes only its own back buffer; [`Agent::flip`] publishes
//! the result once every agent has integrated.

use std::collections::HashMap;
use std::fmt;

use rand::Rng;
use rand_distr::StandardNormal;
use swarm_domain::{
    DomainError, FlightMode, FullState, GroupMask, Setpoint, StartedTrajectory, Trajectory, Vec3,
};
use tracing::{debug, warn};

use crate::adapter;
use crate::avoidance::CollisionParams;
use crate::clock::SimTime;
use crate::engine::{CollisionAvoider, Planner};

const GRAVITY: f64 = 9.81;

/// Committed positions of every agent at the start of a tick
#[derive(Debug, Clone, Default)]
pub struct WorldView {
    positions: Vec<(u32, Vec3)>,
}

impl WorldView {
    pub fn capture(agents: &[Agent]) -> Self {
        Self {
            positions: agents.iter().map(|a| (a.id, a.position())).collect(),
        }
    }

    /// Positions of all agents except `id`.
    pub fn others(&self, id: u32) -> Vec<Vec3> {
        self.positions
            .iter()
            .filter(|(other, _)| *other != id)
            .map(|(_, pos)| *pos)
            .collect()
    }
}

/// Constants turning an attitude/thrust command into a world velocity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrustModel {
    /// Heading used for the attitude rotation, degrees
    pub yaw_deg: f64,
    /// Integration step for the single velocity update
    pub dt: f64,
    pub gravity: f64,
    pub mass: f64,
    /// Thrust command that exactly cancels gravity
    pub hover_throttle: f64,
}

impl Default for ThrustModel {
    fn default() -> Self {
        Self {
            yaw_deg: 0.0,
            dt: 2e-2,
            gravity: GRAVITY,
            mass: 0.034,
            hover_throttle: 34.0 / 64.0,
        }
    }
}

/// One simulated vehicle
pub struct Agent {
    id: u32,
    group_mask: GroupMask,
    initial_position: Vec3,
    time: SimTime,
    setpoint: Setpoint,
    front: FullState,
    back: FullState,
    planner: Box<dyn Planner>,
    trajectories: HashMap<u32, Trajectory>,
    avoider: Option<Box<dyn CollisionAvoider>>,
    led: [f64; 3],
}

impl Agent {
    pub fn new(id: u32, initial_position: Vec3, time: SimTime, planner: Box<dyn Planner>) -> Self {
        let state = FullState::at_rest(initial_position);
        Self {
            id,
            group_mask: GroupMask::ALL,
            initial_position,
            time,
            setpoint: Setpoint::Idle,
            front: state,
            back: state,
            planner,
            trajectories: HashMap::new(),
            avoider: None,
            led: [0.5, 0.5, 1.0],
        }
    }

    // -------------------------------------------------------------------------
    // Observation
    // -------------------------------------------------------------------------

    pub const fn id(&self) -> u32 {
        self.id
    }

    pub const fn group_mask(&self) -> GroupMask {
        self.group_mask
    }

    pub const fn mode(&self) -> FlightMode {
        self.setpoint.mode()
    }

    pub const fn setpoint(&self) -> &Setpoint {
        &self.setpoint
    }

    /// Committed state; the back buffer is never exposed.
    pub const fn state(&self) -> &FullState {
        &self.front
    }

    pub const fn initial_position(&self) -> Vec3 {
        self.initial_position
    }

    pub const fn position(&self) -> Vec3 {
        self.front.pos
    }

    pub const fn velocity(&self) -> Vec3 {
        self.front.vel
    }

    pub const fn acceleration(&self) -> Vec3 {
        self.front.acc
    }

    pub const fn yaw(&self) -> f64 {
        self.front.yaw
    }

    pub const fn angular_rate(&self) -> Vec3 {
        self.front.omega
    }

    pub const fn led(&self) -> [f64; 3] {
        self.led
    }

    pub fn planner(&self) -> &dyn Planner {
        self.planner.as_ref()
    }

    pub fn trajectory(&self, id: u32) -> Option<&Trajectory> {
        self.trajectories.get(&id)
    }

    pub const fn collision_avoidance_enabled(&self) -> bool {
        self.avoider.is_some()
    }

    /// Roll, pitch, yaw in radians implied by the committed acceleration.
    pub fn rpy(&self) -> (f64, f64, f64) {
        let acc = self.acceleration();
        let yaw = self.yaw();
        if acc.norm() < 1e-6 {
            return (0.0, 0.0, yaw);
        }
        let z_body = (acc + Vec3::new(0.0, 0.0, GRAVITY)).normalized();
        let x_world = Vec3::new(yaw.cos(), yaw.sin(), 0.0);
        let y_body = z_body.cross(x_world).normalized();
        let x_body = y_body.cross(z_body);
        let pitch = (-x_body.z).asin();
        let roll = y_body.z.atan2(z_body.z);
        (roll, pitch, yaw)
    }

    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------

    pub fn set_group_mask(&mut self, group_mask: GroupMask) {
        self.group_mask = group_mask;
    }

    /// Install an avoider. It is kept for every subsequent tick so it can
    /// accumulate history.
    pub fn enable_collision_avoidance(&mut self, avoider: Box<dyn CollisionAvoider>) {
        self.avoider = Some(avoider);
    }

    pub fn disable_collision_avoidance(&mut self) {
        self.avoider = None;
    }

    pub fn collision_params(&self) -> Option<&CollisionParams> {
        self.avoider.as_deref().map(|avoider| avoider.params())
    }

    pub fn set_led_color(&mut self, r: f64, g: f64, b: f64) {
        self.led = [r, g, b];
    }

    pub fn get_param(&self, name: &str) -> Option<f64> {
        warn!(agent = self.id, param = name, "getParam is not simulated");
        None
    }

    pub fn set_param(&mut self, name: &str, value: f64) {
        warn!(agent = self.id, param = name, value, "setParam is not simulated");
    }

    pub fn set_params(&mut self, params: &[(&str, f64)]) {
        warn!(agent = self.id, count = params.len(), "setParams is not simulated");
    }

    // -------------------------------------------------------------------------
    // High-level commands (group-gated)
    // -------------------------------------------------------------------------

    pub const fn accepts(&self, selector: GroupMask) -> bool {
        self.group_mask.accepts(selector)
    }

    /// Returns whether the group filter accepted the command.
    pub fn takeoff(&mut self, height: f64, duration: f64, group: GroupMask) -> bool {
        if !self.admit("takeoff", group) {
            return false;
        }
        let now = self.time.now();
        self.planner
            .takeoff(self.front.pos, self.front.yaw, height, 0.0, duration, now);
        self.enter_high_level(now);
        true
    }

    pub fn land(&mut self, height: f64, duration: f64, group: GroupMask) -> bool {
        if !self.admit("land", group) {
            return false;
        }
        let now = self.time.now();
        self.planner
            .land(self.front.pos, self.front.yaw, height, 0.0, duration, now);
        self.enter_high_level(now);
        true
    }

    pub fn stop(&mut self, group: GroupMask) -> bool {
        if !self.admit("stop", group) {
            return false;
        }
        self.planner.stop();
        self.apply_setpoint(Setpoint::Idle);
        true
    }

    /// # Errors
    ///
    /// [`DomainError::InvalidModeTransition`] unless already flying a
    /// high-level trajectory.
    pub fn go_to(
        &mut self,
        goal: Vec3,
        yaw: f64,
        duration: f64,
        relative: bool,
        group: GroupMask,
    ) -> Result<bool, DomainError> {
        if !self.admit("go_to", group) {
            return Ok(false);
        }
        self.check_go_to()?;
        let now = self.time.now();
        self.planner.go_to(relative, goal, yaw, duration, now);
        self.enter_high_level(now);
        Ok(true)
    }

    pub(crate) fn check_go_to(&self) -> Result<(), DomainError> {
        if self.mode() == FlightMode::HighLevelTrajectory {
            Ok(())
        } else {
            Err(DomainError::InvalidModeTransition {
                agent: self.id,
                from: self.mode(),
                command: "go_to",
            })
        }
    }

    /// Store `trajectory` under `id`, replacing any earlier upload.
    pub fn upload_trajectory(&mut self, id: u32, trajectory: Trajectory) {
        self.trajectories.insert(id, trajectory);
    }

    /// Start a previously uploaded trajectory now.
    ///
    /// With `relative`, the trajectory is shifted so it begins at the
    /// current position.
    ///
    /// # Errors
    ///
    /// [`DomainError::UnknownTrajectory`] or [`DomainError::InvalidTimescale`];
    /// nothing changes on error.
    pub fn start_trajectory(
        &mut self,
        id: u32,
        timescale: f64,
        reverse: bool,
        relative: bool,
        group: GroupMask,
    ) -> Result<bool, DomainError> {
        if !self.admit("start_trajectory", group) {
            return Ok(false);
        }
        let now = self.time.now();
        let started = self.prepare_trajectory(id, timescale, reverse, now)?;
        let started = if relative {
            started.anchored_at(self.front.pos)
        } else {
            started
        };
        self.planner.start_trajectory(started);
        self.enter_high_level(now);
        Ok(true)
    }

    pub(crate) fn prepare_trajectory(
        &self,
        id: u32,
        timescale: f64,
        reverse: bool,
        now: f64,
    ) -> Result<StartedTrajectory, DomainError> {
        let trajectory = self
            .trajectories
            .get(&id)
            .ok_or(DomainError::UnknownTrajectory {
                agent: self.id,
                trajectory: id,
            })?;
        StartedTrajectory::new(trajectory.clone(), now, timescale, reverse)
    }

    /// Accepted and ignored: streamed setpoints are not prioritised here.
    pub fn notify_setpoints_stop(&mut self) {}

    // -------------------------------------------------------------------------
    // Low-level streaming commands (not group-gated)
    // -------------------------------------------------------------------------

    pub fn cmd_full_state(&mut self, pos: Vec3, vel: Vec3, acc: Vec3, yaw: f64, omega: Vec3) {
        self.apply_setpoint(Setpoint::FullState(FullState {
            pos,
            vel,
            acc,
            yaw,
            omega,
        }));
    }

    pub fn cmd_position(&mut self, pos: Vec3, yaw: f64) {
        self.apply_setpoint(Setpoint::Position { pos, yaw });
    }

    pub fn cmd_velocity_world(&mut self, vel: Vec3, yaw_rate: f64) {
        self.apply_setpoint(Setpoint::Velocity {
            vel,
            omega: Vec3::new(0.0, 0.0, yaw_rate),
        });
    }

    /// Attitude/thrust command with the default [`ThrustModel`].
    pub fn cmd_vel(&mut self, roll_deg: f64, pitch_deg: f64, yaw_rate: f64, thrust: f64) {
        self.cmd_vel_with(roll_deg, pitch_deg, yaw_rate, thrust, &ThrustModel::default());
    }

    /// Convert roll/pitch (degrees) and thrust into one velocity step and
    /// stream it as a world-frame velocity command.
    pub fn cmd_vel_with(
        &mut self,
        roll_deg: f64,
        pitch_deg: f64,
        yaw_rate: f64,
        thrust: f64,
        model: &ThrustModel,
    ) {
        let force = thrust_vector(roll_deg, pitch_deg, model.yaw_deg, thrust)
            * (model.gravity / model.hover_throttle);
        let acc = (force - Vec3::new(0.0, 0.0, model.gravity)) / model.mass;
        let vel = self.front.vel + acc * model.dt;
        self.cmd_velocity_world(vel, yaw_rate);
    }

    /// Accepted and ignored.
    pub fn cmd_stop(&mut self) {}

    // -------------------------------------------------------------------------
    // Tick
    // -------------------------------------------------------------------------

    /// Compute the next state into the back buffer.
    ///
    /// `disturbance` scales a per-axis standard-normal velocity kick that is
    /// added after the `max_vel` clamp, so the committed velocity may
    /// exceed the cap.
    pub fn integrate<R: Rng + ?Sized>(
        &mut self,
        dt: f64,
        disturbance: f64,
        max_vel: f64,
        world: &WorldView,
        rng: &mut R,
    ) {
        if let Setpoint::HighLevel(_) = self.setpoint {
            self.setpoint = Setpoint::HighLevel(self.planner.current_goal(self.time.now()));
        }

        let setpoint = match self.avoider.as_deref_mut() {
            Some(avoider) => adapter::collision_adjusted(
                avoider,
                &self.front,
                &self.setpoint,
                &world.others(self.id),
            ),
            None => self.setpoint,
        };

        if dt <= 0.0 {
            self.back = self.front;
            return;
        }

        let front = self.front;
        let (commanded, mut next) = match setpoint {
            Setpoint::Idle => {
                self.back = front;
                return;
            }
            Setpoint::HighLevel(goal) | Setpoint::FullState(goal) => {
                ((goal.pos - front.pos) / dt, goal)
            }
            Setpoint::Position { pos, yaw } => (
                (pos - front.pos) / dt,
                FullState {
                    yaw,
                    omega: Vec3::new(0.0, 0.0, (yaw - front.yaw) / dt),
                    ..FullState::default()
                },
            ),
            Setpoint::Velocity { vel, omega } => (
                vel,
                FullState {
                    yaw: front.yaw + dt * omega.z,
                    omega,
                    ..FullState::default()
                },
            ),
        };

        let velocity = commanded.clamp_norm(max_vel) + sample_disturbance(rng, disturbance);
        next.pos = front.pos + velocity * dt;
        next.vel = velocity;
        self.back = next;
    }

    /// Publish the back buffer. Only call once every agent has integrated.
    pub fn flip(&mut self) {
        std::mem::swap(&mut self.front, &mut self.back);
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn admit(&self, command: &'static str, group: GroupMask) -> bool {
        let accepted = self.accepts(group);
        if !accepted {
            debug!(
                agent = self.id,
                command,
                selector = group.0,
                mask = self.group_mask.0,
                "Command filtered by group"
            );
        }
        accepted
    }

    fn enter_high_level(&mut self, now: f64) {
        self.apply_setpoint(Setpoint::HighLevel(self.planner.current_goal(now)));
    }

    fn apply_setpoint(&mut self, setpoint: Setpoint) {
        let from = self.mode();
        let to = setpoint.mode();
        if from != to {
            debug!(agent = self.id, from = %from, to = %to, "Flight mode transition");
        }
        self.setpoint = setpoint;
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("group_mask", &self.group_mask)
            .field("mode", &self.mode())
            .field("state", &self.front)
            .field("trajectories", &self.trajectories.len())
            .field("collision_avoidance", &self.avoider.is_some())
            .finish_non_exhaustive()
    }
}

fn sample_disturbance<R: Rng + ?Sized>(rng: &mut R, scale: f64) -> Vec3 {
    if scale == 0.0 {
        return Vec3::ZERO;
    }
    let x: f64 = rng.sample(StandardNormal);
    let y: f64 = rng.sample(StandardNormal);
    let z: f64 = rng.sample(StandardNormal);
    Vec3::new(x, y, z) * scale
}

/// `R · (0, 0, thrust)` for an extrinsic x-y-z rotation given in degrees.
fn thrust_vector(roll_deg: f64, pitch_deg: f64, yaw_deg: f64, thrust: f64) -> Vec3 {
    let (sr, cr) = roll_deg.to_radians().sin_cos();
    let (sp, cp) = pitch_deg.to_radians().sin_cos();
    let (sy, cy) = yaw_deg.to_radians().sin_cos();
    Vec3::new(
        cy * sp * cr + sy * sr,
        sy * sp * cr - cy * sr,
        cp * cr,
    ) * thrust
}
