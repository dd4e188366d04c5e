//! Per-tick observers attached to the simulation clock.

use std::cell::RefCell;
use std::rc::Rc;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use swarm_domain::{FlightMode, Vec3};
use tracing::info;

use crate::agent::Agent;
use crate::error::SimError;

/// Receives the committed swarm state once per tick, before the tick runs.
pub trait Sink {
    fn update(&mut self, t: f64, agents: &[Agent]);
}

/// Discards every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl Sink for NullSink {
    fn update(&mut self, _t: f64, _agents: &[Agent]) {}
}

/// Emits one tracing event per agent per tick
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl Sink for LogSink {
    fn update(&mut self, t: f64, agents: &[Agent]) {
        for agent in agents {
            let pos = agent.position();
            info!(
                t,
                agent = agent.id(),
                mode = agent.mode().as_str(),
                x = pos.x,
                y = pos.y,
                z = pos.z,
                "Agent state"
            );
        }
    }
}

/// Snapshot of one agent as seen by a sink
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: u32,
    pub mode: FlightMode,
    pub position: Vec3,
    pub velocity: Vec3,
    pub yaw: f64,
}

/// All agents at one simulation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub t: f64,
    pub agents: Vec<AgentSnapshot>,
}

/// Keeps every frame in memory. Clone the [`handle`](Self::handle) before
/// boxing the sink to read the frames back.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    frames: Rc<RefCell<Vec<Frame>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> Rc<RefCell<Vec<Frame>>> {
        Rc::clone(&self.frames)
    }
}

impl Sink for RecordingSink {
    fn update(&mut self, t: f64, agents: &[Agent]) {
        let agents = agents
            .iter()
            .map(|agent| AgentSnapshot {
                id: agent.id(),
                mode: agent.mode(),
                position: agent.position(),
                velocity: agent.velocity(),
                yaw: agent.yaw(),
            })
            .collect();
        self.frames.borrow_mut().push(Frame { t, agents });
    }
}

/// Sink selectable by name from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SinkBackend {
    #[default]
    Null,
    Log,
}

impl SinkBackend {
    pub fn build(self) -> Box<dyn Sink> {
        match self {
            Self::Null => Box::new(NullSink),
            Self::Log => Box::new(LogSink),
        }
    }
}

impl FromStr for SinkBackend {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "null" => Ok(Self::Null),
            "log" => Ok(Self::Log),
            _ => Err(SimError::UnknownBackend(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimTime;
    use crate::planner::ReferencePlanner;

    #[test]
    fn test_backend_from_str() {
        assert_eq!("null".parse::<SinkBackend>().unwrap(), SinkBackend::Null);
        assert_eq!("LOG".parse::<SinkBackend>().unwrap(), SinkBackend::Log);
        let err = "vispy".parse::<SinkBackend>().unwrap_err();
        assert!(matches!(err, SimError::UnknownBackend(name) if name == "vispy"));
    }

    #[test]
    fn test_recording_sink_snapshots_agents() {
        let agents = vec![
            Agent::new(
                3,
                Vec3::new(1.0, 0.0, 0.0),
                SimTime::default(),
                Box::new(ReferencePlanner::new()),
            ),
            Agent::new(
                9,
                Vec3::new(0.0, 1.0, 0.0),
                SimTime::default(),
                Box::new(ReferencePlanner::new()),
            ),
        ];
        let mut sink = RecordingSink::new();
        let frames = sink.handle();
        sink.update(0.25, &agents);

        let frames = frames.borrow();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].t, 0.25);
        assert_eq!(frames[0].agents[1].id, 9);
        assert_eq!(frames[0].agents[1].position, Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(frames[0].agents[0].mode, FlightMode::Idle);
    }
}
