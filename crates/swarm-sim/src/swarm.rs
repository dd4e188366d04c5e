//! # Swarm Coordinator
//!
//! Builds the fleet once from its record list and routes fleet-wide
//! commands to every agent. Each agent applies the group filter itself.
//! Fleet verbs that can fail validate every accepting agent first, so a
//! rejected command leaves the whole swarm untouched.

use std::collections::HashMap;

use swarm_domain::{AgentRecord, DomainError, GroupMask, Trajectory, Vec3};
use tracing::{info, warn};

use crate::agent::Agent;
use crate::avoidance::CollisionParams;
use crate::clock::SimulationClock;
use crate::engine::{FlightEngine, ReferenceEngine};
use crate::error::Result;

/// The simulated fleet and the clock that drives it
pub struct Swarm {
    clock: SimulationClock,
    index: HashMap<u32, usize>,
    engine: Box<dyn FlightEngine>,
}

impl Swarm {
    /// Build a swarm on the reference flight-control engine.
    ///
    /// # Errors
    ///
    /// [`DomainError::DuplicateAgent`] when two records share an id.
    pub fn new(records: &[AgentRecord], clock: SimulationClock) -> Result<Self> {
        Self::with_engine(records, clock, Box::new(ReferenceEngine))
    }

    /// Build a swarm whose planners and avoiders come from `engine`.
    ///
    /// # Errors
    ///
    /// [`DomainError::DuplicateAgent`] when two records share an id.
    pub fn with_engine(
        records: &[AgentRecord],
        mut clock: SimulationClock,
        engine: Box<dyn FlightEngine>,
    ) -> Result<Self> {
        let mut index = HashMap::with_capacity(records.len());
        for record in records {
            if index.contains_key(&record.id) {
                return Err(DomainError::DuplicateAgent(record.id).into());
            }
            let agent = Agent::new(
                record.id,
                Vec3::from(record.initial_position),
                clock.time_handle(),
                engine.create_planner(),
            );
            index.insert(record.id, clock.attach(agent));
        }

        info!(agents = records.len(), dt = clock.dt(), "Swarm ready");

        Ok(Self {
            clock,
            index,
            engine,
        })
    }

    // -------------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------------

    /// Agents in record order
    pub fn agents(&self) -> &[Agent] {
        self.clock.agents()
    }

    pub fn agent(&self, id: u32) -> Option<&Agent> {
        self.index.get(&id).map(|&i| &self.clock.agents()[i])
    }

    pub fn agent_mut(&mut self, id: u32) -> Option<&mut Agent> {
        let i = *self.index.get(&id)?;
        Some(&mut self.clock.agents_mut()[i])
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub const fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    fn require(&mut self, id: u32) -> std::result::Result<&mut Agent, DomainError> {
        self.agent_mut(id).ok_or(DomainError::UnknownAgent(id))
    }

    // -------------------------------------------------------------------------
    // Fleet-wide commands
    // -------------------------------------------------------------------------

    /// Returns how many agents accepted the command.
    pub fn takeoff(&mut self, height: f64, duration: f64, group: GroupMask) -> usize {
        self.clock
            .agents_mut()
            .iter_mut()
            .map(|agent| agent.takeoff(height, duration, group))
            .filter(|&accepted| accepted)
            .count()
    }

    pub fn land(&mut self, height: f64, duration: f64, group: GroupMask) -> usize {
        self.clock
            .agents_mut()
            .iter_mut()
            .map(|agent| agent.land(height, duration, group))
            .filter(|&accepted| accepted)
            .count()
    }

    pub fn stop(&mut self, group: GroupMask) -> usize {
        self.clock
            .agents_mut()
            .iter_mut()
            .map(|agent| agent.stop(group))
            .filter(|&accepted| accepted)
            .count()
    }

    /// Move every accepting agent by `offset` from its current goal.
    ///
    /// Always relative: one absolute goal would stack the fleet on a
    /// single point.
    ///
    /// # Errors
    ///
    /// [`DomainError::InvalidModeTransition`] if any accepting agent is
    /// not flying a high-level trajectory; no agent is changed.
    pub fn go_to(
        &mut self,
        offset: Vec3,
        yaw: f64,
        duration: f64,
        group: GroupMask,
    ) -> std::result::Result<usize, DomainError> {
        for agent in self.accepting(group) {
            agent.check_go_to()?;
        }
        let mut accepted = 0;
        for agent in self.clock.agents_mut() {
            if agent.go_to(offset, yaw, duration, true, group)? {
                accepted += 1;
            }
        }
        Ok(accepted)
    }

    /// Store `trajectory` under `trajectory_id` on agent `agent_id`.
    ///
    /// # Errors
    ///
    /// [`DomainError::UnknownAgent`] for an id not in the swarm.
    pub fn upload_trajectory(
        &mut self,
        agent_id: u32,
        trajectory_id: u32,
        trajectory: Trajectory,
    ) -> std::result::Result<(), DomainError> {
        self.require(agent_id)?
            .upload_trajectory(trajectory_id, trajectory);
        Ok(())
    }

    /// Start trajectory `id` on every accepting agent.
    ///
    /// # Errors
    ///
    /// [`DomainError::UnknownTrajectory`] or [`DomainError::InvalidTimescale`]
    /// if any accepting agent would refuse; no agent is changed.
    pub fn start_trajectory(
        &mut self,
        id: u32,
        timescale: f64,
        reverse: bool,
        relative: bool,
        group: GroupMask,
    ) -> std::result::Result<usize, DomainError> {
        let now = self.clock.time();
        for agent in self.accepting(group) {
            agent.prepare_trajectory(id, timescale, reverse, now)?;
        }
        let mut accepted = 0;
        for agent in self.clock.agents_mut() {
            if agent.start_trajectory(id, timescale, reverse, relative, group)? {
                accepted += 1;
            }
        }
        Ok(accepted)
    }

    /// Give every agent its own avoider built from `params`.
    pub fn enable_collision_avoidance(&mut self, params: CollisionParams) {
        let engine = &self.engine;
        for agent in self.clock.agents_mut() {
            agent.enable_collision_avoidance(engine.create_avoider(params));
        }
    }

    pub fn disable_collision_avoidance(&mut self) {
        for agent in self.clock.agents_mut() {
            agent.disable_collision_avoidance();
        }
    }

    pub fn emergency(&mut self) {
        warn!(agents = self.len(), "emergency is not simulated");
    }

    pub fn set_param(&mut self, name: &str, value: f64) {
        warn!(param = name, value, "setParam is not simulated");
    }

    fn accepting(&self, group: GroupMask) -> impl Iterator<Item = &Agent> {
        self.agents().iter().filter(move |agent| agent.accepts(group))
    }

    // -------------------------------------------------------------------------
    // Time
    // -------------------------------------------------------------------------

    pub fn time(&self) -> f64 {
        self.clock.time()
    }

    pub fn step(&mut self, duration: f64) {
        self.clock.step(duration);
    }

    pub fn sleep(&mut self, duration: f64) {
        self.clock.sleep(duration);
    }

    pub fn sleep_for_rate(&mut self, rate: f64) {
        self.clock.sleep_for_rate(rate);
    }

    pub const fn is_shutdown(&self) -> bool {
        self.clock.is_shutdown()
    }
}
