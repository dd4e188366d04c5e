//! Simulation error types

use swarm_domain::DomainError;
use thiserror::Error;

/// Simulation-level errors
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Unknown sink backend: {0}")]
    UnknownBackend(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<serde_json::Error> for SimError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

impl From<std::io::Error> for SimError {
    fn from(err: std::io::Error) -> Self {
        Self::InvalidConfig(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
