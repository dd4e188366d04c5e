//! # Simulation Clock
//!
//! Owns simulated time and every agent, and advances them in fixed ticks.
//! A tick is two phases: every agent integrates into its back buffer while
//! reading only front buffers, then every agent flips. Visiting order
//! therefore never changes the outcome.

use std::cell::Cell;
use std::rc::Rc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::trace;

use crate::agent::{Agent, WorldView};
use crate::config::SimConfig;
use crate::error::Result;
use crate::sink::{Sink, SinkBackend};

/// Residual drift tolerated below zero before it is treated as a bug
const RESIDUAL_TOLERANCE: f64 = 1e-9;

/// Shared read handle on the simulation time.
///
/// Only the clock advances it; agents read it when a high-level command
/// needs "now".
#[derive(Debug, Clone, Default)]
pub struct SimTime(Rc<Cell<f64>>);

impl SimTime {
    pub fn now(&self) -> f64 {
        self.0.get()
    }

    pub(crate) fn advance(&self, duration: f64) {
        self.0.set(self.0.get() + duration);
    }
}

/// Fixed-step clock driving a swarm
pub struct SimulationClock {
    time: SimTime,
    dt: f64,
    disturbance: f64,
    max_vel: f64,
    seed: u64,
    residual: f64,
    ticks: u64,
    agents: Vec<Agent>,
    rngs: Vec<StdRng>,
    sinks: Vec<Box<dyn Sink>>,
}

impl SimulationClock {
    /// Build a clock from validated configuration, attaching the configured
    /// visualizer and logger sinks.
    ///
    /// # Errors
    ///
    /// Fails on invalid numeric settings or an unknown sink backend.
    pub fn from_config(config: &SimConfig) -> Result<Self> {
        config.validate()?;
        let visualizer: SinkBackend = config.visualizer.parse()?;
        let logger: SinkBackend = config.logger.parse()?;

        Ok(Self {
            time: SimTime::default(),
            dt: config.dt,
            disturbance: config.disturbance,
            max_vel: config.max_vel,
            seed: config.seed,
            residual: 0.0,
            ticks: 0,
            agents: Vec::new(),
            rngs: Vec::new(),
            sinks: vec![visualizer.build(), logger.build()],
        })
    }

    pub fn add_sink(&mut self, sink: Box<dyn Sink>) {
        self.sinks.push(sink);
    }

    pub fn time(&self) -> f64 {
        self.time.now()
    }

    pub fn time_handle(&self) -> SimTime {
        self.time.clone()
    }

    pub const fn dt(&self) -> f64 {
        self.dt
    }

    pub const fn disturbance(&self) -> f64 {
        self.disturbance
    }

    pub const fn max_vel(&self) -> f64 {
        self.max_vel
    }

    /// Ticks executed so far
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Requested time not yet simulated, always in `[0, dt)`
    pub const fn residual(&self) -> f64 {
        self.residual
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub(crate) fn agents_mut(&mut self) -> &mut [Agent] {
        &mut self.agents
    }

    /// Take ownership of `agent` and give it its own disturbance stream.
    pub(crate) fn attach(&mut self, agent: Agent) -> usize {
        let seed = self.seed ^ u64::from(agent.id()).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        self.rngs.push(StdRng::seed_from_u64(seed));
        self.agents.push(agent);
        self.agents.len() - 1
    }

    /// Always `false`: the simulation never shuts itself down.
    pub const fn is_shutdown(&self) -> bool {
        false
    }

    /// Advance by as many whole ticks as fit into `duration` plus the
    /// carried residual. Sinks see the state before each tick.
    ///
    /// # Panics
    ///
    /// On a negative or NaN duration, or if the carried residual drifts out
    /// of `[0, dt)`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn sleep(&mut self, duration: f64) {
        assert!(duration >= 0.0, "sleep duration must be non-negative, got {duration}");

        let mut ticks = ((duration + self.residual) / self.dt).floor();
        self.residual += duration - self.dt * ticks;
        // rounding in the division can leave a whole tick in the residual
        if self.residual >= self.dt - RESIDUAL_TOLERANCE {
            ticks += 1.0;
            self.residual -= self.dt;
        }
        assert!(
            self.residual >= -RESIDUAL_TOLERANCE && self.residual < self.dt,
            "sleep residual {} escaped [0, {})",
            self.residual,
            self.dt
        );
        self.residual = self.residual.max(0.0);

        for _ in 0..ticks as u64 {
            let t = self.time.now();
            for sink in &mut self.sinks {
                sink.update(t, &self.agents);
            }
            self.step(self.dt);
        }
    }

    /// Sleep one period of a loop running at `rate` Hz.
    pub fn sleep_for_rate(&mut self, rate: f64) {
        self.sleep(1.0 / rate);
    }

    /// Run exactly one tick of `duration`, visiting agents in insertion
    /// order.
    pub fn step(&mut self, duration: f64) {
        let order: Vec<usize> = (0..self.agents.len()).collect();
        self.step_visiting(duration, &order);
    }

    /// Run exactly one tick of `duration`, integrating agents in `order`
    /// (indices into [`agents`](Self::agents)).
    ///
    /// # Panics
    ///
    /// If `order` is not a permutation of the agent indices.
    pub fn step_visiting(&mut self, duration: f64, order: &[usize]) {
        assert_permutation(order, self.agents.len());

        self.time.advance(duration);
        let world = WorldView::capture(&self.agents);
        for &index in order {
            self.agents[index].integrate(
                duration,
                self.disturbance,
                self.max_vel,
                &world,
                &mut self.rngs[index],
            );
        }
        for agent in &mut self.agents {
            agent.flip();
        }
        self.ticks += 1;

        trace!(t = self.time.now(), tick = self.ticks, agents = self.agents.len(), "Tick");
    }
}

fn assert_permutation(order: &[usize], len: usize) {
    let mut seen = vec![false; len];
    assert_eq!(order.len(), len, "visit order must name every agent once");
    for &index in order {
        assert!(index < len && !seen[index], "visit order is not a permutation: {order:?}");
        seen[index] = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avoidance::CollisionParams;
    use crate::engine::{CollisionAvoider, FlightEngine, ReferenceEngine};
    use crate::sink::RecordingSink;
    use fake::Fake;
    use swarm_domain::Vec3;

    fn clock_with(disturbance: f64) -> SimulationClock {
        let config = SimConfig {
            dt: 0.01,
            disturbance,
            seed: 42,
            ..SimConfig::default()
        };
        SimulationClock::from_config(&config).unwrap()
    }

    fn populate(clock: &mut SimulationClock, positions: &[Vec3]) {
        for (id, pos) in positions.iter().enumerate() {
            let id = u32::try_from(id).unwrap() + 1;
            let mut agent = Agent::new(
                id,
                *pos,
                clock.time_handle(),
                ReferenceEngine.create_planner(),
            );
            let avoider: Box<dyn CollisionAvoider> =
                ReferenceEngine.create_avoider(CollisionParams::default());
            agent.enable_collision_avoidance(avoider);
            agent.cmd_velocity_world(Vec3::new(0.1 * f64::from(id), 0.0, 0.2), 0.5);
            clock.attach(agent);
        }
    }

    #[test]
    fn test_rejects_unknown_backend() {
        let config = SimConfig {
            visualizer: "vispy".to_string(),
            ..SimConfig::default()
        };
        assert!(SimulationClock::from_config(&config).is_err());
    }

    #[test]
    fn test_sleep_quantizes_and_carries_residual() {
        let mut clock = clock_with(0.0);
        clock.sleep(0.025);
        assert_eq!(clock.ticks(), 2);
        assert!((clock.residual() - 0.005).abs() < 1e-12);
        clock.sleep(0.025);
        assert_eq!(clock.ticks(), 5);
        assert!(clock.residual() < 1e-9);
        assert!((clock.time() - 0.05).abs() < 1e-12);

        clock.sleep(0.0);
        assert_eq!(clock.ticks(), 5);

        let mut once = clock_with(0.0);
        once.sleep(0.05);
        assert_eq!(once.ticks(), 5);
        assert!((once.residual() - clock.residual()).abs() < 1e-12);
    }

    #[test]
    fn test_sleep_absorbs_rounding_at_tick_boundary() {
        let mut clock = clock_with(0.0);
        clock.sleep(0.009);
        assert_eq!(clock.ticks(), 0);
        clock.sleep(0.061);
        assert_eq!(clock.ticks(), 7);
        assert!(clock.residual() < 1e-9);
    }

    #[test]
    fn test_sleep_residual_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(17);
        for dt in [0.01, 0.005, 1.0 / 120.0] {
            let config = SimConfig {
                dt,
                ..SimConfig::default()
            };
            let mut clock = SimulationClock::from_config(&config).unwrap();
            let mut requested = 0.0;
            for i in 0..2000 {
                let duration: f64 = if i % 7 == 0 {
                    1.0 / 30.0
                } else {
                    (0.0..0.2).fake_with_rng(&mut rng)
                };
                clock.sleep(duration);
                requested += duration;
                assert!(clock.residual() >= 0.0 && clock.residual() < dt);
            }
            #[allow(clippy::cast_precision_loss)]
            let simulated = clock.ticks() as f64 * dt + clock.residual();
            assert!((simulated - requested).abs() < 1e-6);
        }
    }

    #[test]
    fn test_sleep_for_rate() {
        let mut clock = clock_with(0.0);
        clock.sleep_for_rate(20.0);
        assert_eq!(clock.ticks(), 5);
        assert!(!clock.is_shutdown());
    }

    #[test]
    #[should_panic(expected = "non-negative")]
    fn test_negative_sleep_panics() {
        let mut clock = clock_with(0.0);
        clock.sleep(-0.1);
    }

    #[test]
    #[should_panic(expected = "permutation")]
    fn test_step_visiting_rejects_repeats() {
        let mut clock = clock_with(0.0);
        populate(&mut clock, &[Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0)]);
        clock.step_visiting(0.01, &[0, 0]);
    }

    #[test]
    fn test_sinks_see_state_before_each_tick() {
        let mut clock = clock_with(0.0);
        populate(&mut clock, &[Vec3::ZERO]);
        let sink = RecordingSink::new();
        let frames = sink.handle();
        clock.add_sink(Box::new(sink));

        clock.sleep(0.05);
        let frames = frames.borrow();
        assert_eq!(frames.len(), 5);
        assert_eq!(frames[0].t, 0.0);
        assert_eq!(frames[0].agents[0].position, Vec3::ZERO);
        assert!(frames[4].agents[0].position.z > 0.0);
    }

    #[test]
    fn test_step_is_exactly_one_tick() {
        let mut clock = clock_with(0.0);
        populate(&mut clock, &[Vec3::ZERO]);
        clock.step(0.5);
        assert_eq!(clock.ticks(), 1);
        assert!((clock.agents()[0].position().z - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_visit_order_does_not_change_outcome() {
        let positions = [
            Vec3::ZERO,
            Vec3::new(0.3, 0.0, 0.0),
            Vec3::new(0.0, 0.3, 0.0),
            Vec3::new(0.3, 0.3, 0.0),
        ];
        let orders: [[usize; 4]; 3] = [[0, 1, 2, 3], [3, 2, 1, 0], [2, 0, 3, 1]];

        let runs: Vec<Vec<Vec3>> = orders
            .iter()
            .map(|order| {
                let mut clock = clock_with(0.3);
                populate(&mut clock, &positions);
                for _ in 0..50 {
                    clock.step_visiting(0.01, order);
                }
                clock.agents().iter().map(Agent::position).collect()
            })
            .collect();

        assert_eq!(runs[0], runs[1]);
        assert_eq!(runs[0], runs[2]);
    }

    #[test]
    fn test_agent_streams_are_independent() {
        let mut clock = clock_with(0.3);
        populate(&mut clock, &[Vec3::ZERO, Vec3::ZERO]);
        clock.agents_mut()[0].cmd_velocity_world(Vec3::ZERO, 0.0);
        clock.agents_mut()[1].cmd_velocity_world(Vec3::ZERO, 0.0);
        clock.step(0.01);
        let [a, b] = clock.agents() else {
            panic!("expected two agents");
        };
        assert_ne!(a.position(), b.position());
    }
}
