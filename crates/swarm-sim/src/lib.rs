//! # Swarm Simulator
//!
//! Deterministic, tick-based kinematic simulator standing in for a fleet of
//! aerial vehicles, so fleet-control logic can run without hardware.
//!
//! ## Features
//!
//! - Double-buffered integrate/flip ticks, independent of visit order
//! - Flight-mode state machine with group-mask command filtering
//! - Pluggable flight-control engine (planner and collision avoidance)
//! - Residual-carrying fixed-step clock with per-tick sinks
//! - Seeded, per-agent velocity disturbance

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod adapter;
pub mod agent;
pub mod avoidance;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod planner;
pub mod sink;
pub mod swarm;

pub use agent::{Agent, ThrustModel, WorldView};
pub use avoidance::{AvoidanceRequest, CollisionParams, PassthroughAvoider};
pub use clock::{SimTime, SimulationClock};
pub use config::SimConfig;
pub use engine::{CollisionAvoider, FlightEngine, Planner, PlannerState, ReferenceEngine};
pub use error::{Result, SimError};
pub use planner::ReferencePlanner;
pub use sink::{Frame, LogSink, NullSink, RecordingSink, Sink, SinkBackend};
pub use swarm::Swarm;
