//! # Simulation Configuration
//!
//! Environment-based configuration for the simulation clock and sinks.

use std::env;
use std::fs;
use std::path::Path;

use swarm_domain::AgentRecord;

use crate::error::{Result, SimError};

/// Simulation configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Fixed tick length in seconds
    pub dt: f64,

    /// Scale of the per-axis gaussian velocity disturbance
    pub disturbance: f64,

    /// Velocity norm cap applied before the disturbance
    pub max_vel: f64,

    /// Seed for the per-agent disturbance streams
    pub seed: u64,

    /// Visualizer backend name
    pub visualizer: String,

    /// Logger backend name
    pub logger: String,

    /// Logging level
    pub log_level: String,
}

impl SimConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            dt: parse_var("SWARM_DT").unwrap_or(0.01),

            disturbance: parse_var("SWARM_DISTURBANCE").unwrap_or(0.0),

            max_vel: parse_var("SWARM_MAX_VEL").unwrap_or(f64::INFINITY),

            seed: parse_var("SWARM_SEED").unwrap_or(0),

            visualizer: env::var("SWARM_VISUALIZER").unwrap_or_else(|_| "null".to_string()),

            logger: env::var("SWARM_LOGGER").unwrap_or_else(|_| "null".to_string()),

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }

    /// Check the numeric fields.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidConfig`] for a non-positive `dt` or a
    /// negative disturbance or velocity cap.
    pub fn validate(&self) -> Result<()> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(SimError::InvalidConfig(format!(
                "dt must be positive, got {}",
                self.dt
            )));
        }
        if !(self.disturbance.is_finite() && self.disturbance >= 0.0) {
            return Err(SimError::InvalidConfig(format!(
                "disturbance must be non-negative, got {}",
                self.disturbance
            )));
        }
        if self.max_vel.is_nan() || self.max_vel < 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "max_vel must be non-negative, got {}",
                self.max_vel
            )));
        }
        Ok(())
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            dt: 0.01,
            disturbance: 0.0,
            max_vel: f64::INFINITY,
            seed: 0,
            visualizer: "null".to_string(),
            logger: "null".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Parse a JSON array of `{"id", "initialPosition"}` fleet records.
pub fn parse_fleet(raw: &str) -> Result<Vec<AgentRecord>> {
    Ok(serde_json::from_str(raw)?)
}

/// Read and parse a fleet file.
pub fn load_fleet(path: &Path) -> Result<Vec<AgentRecord>> {
    parse_fleet(&fs::read_to_string(path)?)
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
