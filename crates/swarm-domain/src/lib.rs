//! # Swarm Simulation - Domain Model
//!
//! Value objects, flight modes, setpoints and trajectories shared by the
//! simulation core and anything that drives or observes it. These types
//! carry no behaviour beyond arithmetic and evaluation; the per-tick
//! engine lives in `swarm-sim`.

use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

pub mod trajectory;

pub use trajectory::{Piece, Poly, StartedTrajectory, Trajectory, POLY_SIZE};

// =============================================================================
// VALUE OBJECTS
// =============================================================================

/// Cartesian vector in the world frame (metres, m/s, rad/s depending on use)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[must_use]
    pub fn cross(self, other: Self) -> Self {
        Self {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    #[must_use]
    pub fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction; zero stays zero.
    #[must_use]
    pub fn normalized(self) -> Self {
        let norm = self.norm();
        if norm <= f64::EPSILON {
            Self::ZERO
        } else {
            self / norm
        }
    }

    /// Scale down so the norm does not exceed `max`, preserving direction.
    ///
    /// An infinite `max` leaves the vector untouched.
    #[must_use]
    pub fn clamp_norm(self, max: f64) -> Self {
        let norm = self.norm();
        if norm > max {
            self * (max / norm)
        } else {
            self
        }
    }

    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    #[must_use]
    pub const fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self::new(x, y, z)
    }
}

impl Add for Vec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Vec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Mul<Vec3> for f64 {
    type Output = Vec3;

    fn mul(self, rhs: Vec3) -> Vec3 {
        rhs * self
    }
}

impl Div<f64> for Vec3 {
    type Output = Self;

    fn div(self, rhs: f64) -> Self {
        Self::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl Neg for Vec3 {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// Full kinematic state of one vehicle, also used as a trajectory sample
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FullState {
    pub pos: Vec3,
    pub vel: Vec3,
    pub acc: Vec3,
    /// Heading in radians
    pub yaw: f64,
    /// Body angular rate; `omega.z` is the yaw rate
    pub omega: Vec3,
}

impl FullState {
    /// At rest at `pos` with zero heading.
    #[must_use]
    pub fn at_rest(pos: Vec3) -> Self {
        Self {
            pos,
            ..Self::default()
        }
    }
}

// =============================================================================
// ENUMS
// =============================================================================

/// Control regime deciding which setpoint fields drive the integrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlightMode {
    #[default]
    Idle,
    HighLevelTrajectory,
    LowLevelFullState,
    LowLevelPosition,
    LowLevelVelocity,
}

impl FlightMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::HighLevelTrajectory => "HIGH_LEVEL_TRAJECTORY",
            Self::LowLevelFullState => "LOW_LEVEL_FULL_STATE",
            Self::LowLevelPosition => "LOW_LEVEL_POSITION",
            Self::LowLevelVelocity => "LOW_LEVEL_VELOCITY",
        }
    }

    /// Numeric code used when a mode crosses a process or file boundary.
    pub const fn code(&self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::HighLevelTrajectory => 1,
            Self::LowLevelFullState => 2,
            Self::LowLevelPosition => 3,
            Self::LowLevelVelocity => 4,
        }
    }
}

impl TryFrom<u8> for FlightMode {
    type Error = DomainError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Idle),
            1 => Ok(Self::HighLevelTrajectory),
            2 => Ok(Self::LowLevelFullState),
            3 => Ok(Self::LowLevelPosition),
            4 => Ok(Self::LowLevelVelocity),
            other => Err(DomainError::UnsupportedMode(other)),
        }
    }
}

impl fmt::Display for FlightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// SETPOINTS
// =============================================================================

/// Commanded target, tagged by flight mode.
///
/// Each variant holds only the fields that are authoritative in its mode,
/// so consumers match on the variant instead of reading a flat struct
/// conditionally.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Setpoint {
    #[default]
    Idle,
    /// Latest goal sampled from the planner
    HighLevel(FullState),
    FullState(FullState),
    Position { pos: Vec3, yaw: f64 },
    Velocity { vel: Vec3, omega: Vec3 },
}

impl Setpoint {
    pub const fn mode(&self) -> FlightMode {
        match self {
            Self::Idle => FlightMode::Idle,
            Self::HighLevel(_) => FlightMode::HighLevelTrajectory,
            Self::FullState(_) => FlightMode::LowLevelFullState,
            Self::Position { .. } => FlightMode::LowLevelPosition,
            Self::Velocity { .. } => FlightMode::LowLevelVelocity,
        }
    }
}

// =============================================================================
// GROUPS & FLEET RECORDS
// =============================================================================

/// Group membership bitset. Zero on an agent means "no explicit group";
/// zero as a command selector means broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupMask(pub u8);

impl GroupMask {
    /// Broadcast selector, and the mask a new agent starts with
    pub const ALL: Self = Self(0);

    /// Whether an agent carrying `self` accepts a command sent to `selector`.
    #[must_use]
    pub const fn accepts(self, selector: Self) -> bool {
        selector.0 == 0 || (selector.0 & self.0) != 0
    }
}

impl From<u8> for GroupMask {
    fn from(bits: u8) -> Self {
        Self(bits)
    }
}

/// One entry of the fleet list a swarm is built from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
    pub id: u32,
    pub initial_position: [f64; 3],
}

impl AgentRecord {
    pub const fn new(id: u32, initial_position: [f64; 3]) -> Self {
        Self {
            id,
            initial_position,
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Domain-level errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomainError {
    #[error("Agent {agent} cannot accept {command} while in {from}")]
    InvalidModeTransition {
        agent: u32,
        from: FlightMode,
        command: &'static str,
    },

    #[error("Unsupported flight mode code: {0}")]
    UnsupportedMode(u8),

    #[error("Agent {agent} has no trajectory with id {trajectory}")]
    UnknownTrajectory { agent: u32, trajectory: u32 },

    #[error("Unknown agent id: {0}")]
    UnknownAgent(u32),

    #[error("Duplicate agent id: {0}")]
    DuplicateAgent(u32),

    #[error("Trajectory has no pieces")]
    EmptyTrajectory,

    #[error("Trajectory piece {index} has invalid duration {duration}")]
    InvalidPieceDuration { index: usize, duration: f64 },

    #[error("Time scale must be positive and finite, got {0}")]
    InvalidTimescale(f64),
}
