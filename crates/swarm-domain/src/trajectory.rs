//! Piecewise-polynomial trajectories.
//!
//! A [`Trajectory`] is the raw uploaded shape. Starting it produces a
//! [`StartedTrajectory`], which pins it to a start time and carries the
//! time scale, spatial shift and playback direction chosen at start.

use serde::{Deserialize, Serialize};

use crate::{DomainError, FullState, Vec3};

/// Coefficients per axis polynomial (degree 7)
pub const POLY_SIZE: usize = 8;

/// Polynomial in ascending powers: `c[0] + c[1] t + ... + c[7] t^7`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Poly(pub [f64; POLY_SIZE]);

impl Poly {
    pub const fn constant(value: f64) -> Self {
        let mut c = [0.0; POLY_SIZE];
        c[0] = value;
        Self(c)
    }

    #[must_use]
    pub fn eval(&self, t: f64) -> f64 {
        self.0.iter().rev().fold(0.0, |acc, c| acc.mul_add(t, *c))
    }

    /// Value, first and second derivative at `t`.
    #[must_use]
    pub fn eval_derivatives(&self, t: f64) -> (f64, f64, f64) {
        let c = &self.0;
        let mut value: f64 = 0.0;
        let mut d1: f64 = 0.0;
        let mut d2: f64 = 0.0;
        for i in (0..POLY_SIZE).rev() {
            let k = i as f64;
            value = value.mul_add(t, c[i]);
            if i >= 1 {
                d1 = d1.mul_add(t, k * c[i]);
            }
            if i >= 2 {
                d2 = d2.mul_add(t, k * (k - 1.0) * c[i]);
            }
        }
        (value, d1, d2)
    }
}

/// One timed segment: x, y, z and yaw polynomials over `[0, duration]`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Piece {
    pub duration: f64,
    pub x: Poly,
    pub y: Poly,
    pub z: Poly,
    pub yaw: Poly,
}

impl Piece {
    /// Sample at piece-local time `t` with time stretched by `timescale`.
    fn sample(&self, t: f64, timescale: f64) -> FullState {
        let (x, dx, ddx) = self.x.eval_derivatives(t);
        let (y, dy, ddy) = self.y.eval_derivatives(t);
        let (z, dz, ddz) = self.z.eval_derivatives(t);
        let (yaw, dyaw, _) = self.yaw.eval_derivatives(t);
        let s2 = timescale * timescale;
        FullState {
            pos: Vec3::new(x, y, z),
            vel: Vec3::new(dx, dy, dz) / timescale,
            acc: Vec3::new(ddx, ddy, ddz) / s2,
            yaw,
            omega: Vec3::new(0.0, 0.0, dyaw / timescale),
        }
    }

    /// Sample with all derivatives zeroed; used to hold an endpoint.
    fn hold(&self, t: f64) -> FullState {
        FullState {
            pos: Vec3::new(self.x.eval(t), self.y.eval(t), self.z.eval(t)),
            yaw: self.yaw.eval(t),
            ..FullState::default()
        }
    }
}

/// Ordered sequence of pieces, as uploaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Piece>", into = "Vec<Piece>")]
pub struct Trajectory {
    pieces: Vec<Piece>,
}

impl Trajectory {
    /// # Errors
    ///
    /// Fails on an empty piece list or a negative / non-finite duration.
    pub fn new(pieces: Vec<Piece>) -> Result<Self, DomainError> {
        if pieces.is_empty() {
            return Err(DomainError::EmptyTrajectory);
        }
        if let Some((index, piece)) = pieces
            .iter()
            .enumerate()
            .find(|(_, p)| !p.duration.is_finite() || p.duration < 0.0)
        {
            return Err(DomainError::InvalidPieceDuration {
                index,
                duration: piece.duration,
            });
        }
        Ok(Self { pieces })
    }

    pub(crate) fn single(piece: Piece) -> Self {
        Self {
            pieces: vec![piece],
        }
    }

    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    /// Total duration at time scale 1.
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.pieces.iter().map(|p| p.duration).sum()
    }

    /// Evaluate at trajectory-local time, unshifted and unscaled.
    #[must_use]
    pub fn eval(&self, t: f64) -> FullState {
        self.eval_scaled(t, 1.0)
    }

    fn eval_scaled(&self, t: f64, timescale: f64) -> FullState {
        let mut t = t.max(0.0);
        for piece in &self.pieces {
            let span = piece.duration * timescale;
            if t <= span {
                return piece.sample(t / timescale, timescale);
            }
            t -= span;
        }
        let last = self.pieces[self.pieces.len() - 1];
        last.hold(last.duration)
    }

    fn eval_reversed_scaled(&self, t: f64, timescale: f64) -> FullState {
        let mut t = t.max(0.0);
        for piece in self.pieces.iter().rev() {
            let span = piece.duration * timescale;
            if t <= span {
                let mut sample = piece.sample(piece.duration - t / timescale, timescale);
                sample.vel = -sample.vel;
                sample.omega = -sample.omega;
                return sample;
            }
            t -= span;
        }
        self.pieces[0].hold(0.0)
    }
}

impl TryFrom<Vec<Piece>> for Trajectory {
    type Error = DomainError;

    fn try_from(pieces: Vec<Piece>) -> Result<Self, Self::Error> {
        Self::new(pieces)
    }
}

impl From<Trajectory> for Vec<Piece> {
    fn from(trajectory: Trajectory) -> Self {
        trajectory.pieces
    }
}

/// A trajectory pinned to the simulation clock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartedTrajectory {
    pub trajectory: Trajectory,
    pub t_begin: f64,
    /// Multiplies every piece duration; `2.0` plays at half speed
    pub timescale: f64,
    pub shift: Vec3,
    pub reversed: bool,
}

impl StartedTrajectory {
    /// # Errors
    ///
    /// Fails if `timescale` is not positive and finite.
    pub fn new(
        trajectory: Trajectory,
        t_begin: f64,
        timescale: f64,
        reversed: bool,
    ) -> Result<Self, DomainError> {
        if !(timescale.is_finite() && timescale > 0.0) {
            return Err(DomainError::InvalidTimescale(timescale));
        }
        Ok(Self {
            trajectory,
            t_begin,
            timescale,
            shift: Vec3::ZERO,
            reversed,
        })
    }

    /// Single-piece trajectory starting at `t_begin`, unscaled and unshifted.
    #[must_use]
    pub fn from_piece(piece: Piece, t_begin: f64) -> Self {
        Self {
            trajectory: Trajectory::single(piece),
            t_begin,
            timescale: 1.0,
            shift: Vec3::ZERO,
            reversed: false,
        }
    }

    /// Shift so that the sample at `t_begin` lands on `position`.
    ///
    /// The shape is preserved: every sample moves by the same vector.
    #[must_use]
    pub fn anchored_at(mut self, position: Vec3) -> Self {
        self.shift = Vec3::ZERO;
        let start = self.eval(self.t_begin);
        self.shift = position - start.pos;
        self
    }

    /// Sample at absolute time `t`. Past the end the final point is held.
    #[must_use]
    pub fn eval(&self, t: f64) -> FullState {
        let local = t - self.t_begin;
        let mut sample = if self.reversed {
            self.trajectory.eval_reversed_scaled(local, self.timescale)
        } else {
            self.trajectory.eval_scaled(local, self.timescale)
        };
        sample.pos += self.shift;
        sample
    }

    #[must_use]
    pub fn duration(&self) -> f64 {
        self.trajectory.duration() * self.timescale
    }

    #[must_use]
    pub fn is_finished(&self, t: f64) -> bool {
        t - self.t_begin >= self.duration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake::Fake;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// x(t) = t over one second, then x(t) = 1 + 2t over another.
    fn ramp() -> Trajectory {
        let mut first = Piece {
            duration: 1.0,
            ..Piece::default()
        };
        first.x.0[1] = 1.0;
        let mut second = Piece {
            duration: 1.0,
            ..Piece::default()
        };
        second.x.0[0] = 1.0;
        second.x.0[1] = 2.0;
        second.yaw.0[1] = 0.5;
        Trajectory::new(vec![first, second]).unwrap()
    }

    fn random_trajectory(rng: &mut StdRng) -> Trajectory {
        let pieces = (0..3)
            .map(|_| {
                let mut piece = Piece {
                    duration: (0.5..2.0).fake_with_rng(rng),
                    ..Piece::default()
                };
                for poly in [&mut piece.x, &mut piece.y, &mut piece.z, &mut piece.yaw] {
                    for c in &mut poly.0 {
                        *c = (-1.0..1.0).fake_with_rng(rng);
                    }
                }
                piece
            })
            .collect();
        Trajectory::new(pieces).unwrap()
    }

    #[test]
    fn test_poly_derivatives() {
        // 1 + 2t + 3t^2
        let mut poly = Poly::default();
        poly.0[..3].copy_from_slice(&[1.0, 2.0, 3.0]);
        let (v, d1, d2) = poly.eval_derivatives(2.0);
        assert!((v - 17.0).abs() < 1e-12);
        assert!((d1 - 14.0).abs() < 1e-12);
        assert!((d2 - 6.0).abs() < 1e-12);
        assert!((poly.eval(2.0) - 17.0).abs() < 1e-12);
    }

    #[test]
    fn test_poly_derivatives_match_finite_differences() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut poly = Poly::default();
        for c in &mut poly.0 {
            *c = (-1.0..1.0).fake_with_rng(&mut rng);
        }
        let h = 1e-5;
        for _ in 0..20 {
            let t: f64 = (0.0..1.5).fake_with_rng(&mut rng);
            let (v, d1, d2) = poly.eval_derivatives(t);
            assert!((v - poly.eval(t)).abs() < 1e-12);
            let fd1 = (poly.eval(t + h) - poly.eval(t - h)) / (2.0 * h);
            let fd2 = (poly.eval(t + h) - 2.0 * v + poly.eval(t - h)) / (h * h);
            assert!((d1 - fd1).abs() < 1e-6, "d1 {d1} vs {fd1}");
            assert!((d2 - fd2).abs() < 1e-3, "d2 {d2} vs {fd2}");
        }
    }

    #[test]
    fn test_rejects_invalid_pieces() {
        assert_eq!(Trajectory::new(vec![]), Err(DomainError::EmptyTrajectory));
        let bad = Piece {
            duration: -1.0,
            ..Piece::default()
        };
        assert!(matches!(
            Trajectory::new(vec![Piece::default(), bad]),
            Err(DomainError::InvalidPieceDuration { index: 1, .. })
        ));
    }

    #[test]
    fn test_forward_evaluation_walks_pieces() {
        let traj = ramp();
        assert!((traj.duration() - 2.0).abs() < 1e-12);
        assert!((traj.eval(0.5).pos.x - 0.5).abs() < 1e-12);
        assert!((traj.eval(1.5).pos.x - 2.0).abs() < 1e-12);
        assert!((traj.eval(1.5).vel.x - 2.0).abs() < 1e-12);
        // held after the end
        let end = traj.eval(10.0);
        assert!((end.pos.x - 3.0).abs() < 1e-12);
        assert_eq!(end.vel, Vec3::ZERO);
        assert_eq!(end.omega, Vec3::ZERO);
    }

    #[test]
    fn test_timescale_stretches_time() {
        let started = StartedTrajectory::new(ramp(), 10.0, 2.0, false).unwrap();
        assert!((started.duration() - 4.0).abs() < 1e-12);
        let sample = started.eval(11.0);
        assert!((sample.pos.x - 0.5).abs() < 1e-12);
        assert!((sample.vel.x - 0.5).abs() < 1e-12);
        assert!(!started.is_finished(13.9));
        assert!(started.is_finished(14.0));
    }

    #[test]
    fn test_reversed_playback() {
        let started = StartedTrajectory::new(ramp(), 0.0, 1.0, true).unwrap();
        let start = started.eval(0.0);
        assert!((start.pos.x - 3.0).abs() < 1e-12);
        assert!((start.vel.x + 2.0).abs() < 1e-12);
        assert!((start.omega.z + 0.5).abs() < 1e-12);
        assert!((started.eval(1.5).pos.x - 0.5).abs() < 1e-12);
        assert!((started.eval(5.0).pos.x).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_timescale() {
        assert_eq!(
            StartedTrajectory::new(ramp(), 0.0, 0.0, false),
            Err(DomainError::InvalidTimescale(0.0))
        );
    }

    #[test]
    fn test_anchor_preserves_shape() {
        let mut rng = StdRng::seed_from_u64(42);
        for reversed in [false, true] {
            let traj = random_trajectory(&mut rng);
            let t_begin: f64 = (0.0..5.0).fake_with_rng(&mut rng);
            let anchor = Vec3::new(
                (-3.0..3.0).fake_with_rng(&mut rng),
                (-3.0..3.0).fake_with_rng(&mut rng),
                (0.0..3.0).fake_with_rng(&mut rng),
            );
            let raw = StartedTrajectory::new(traj, t_begin, 1.0, reversed).unwrap();
            let shifted = raw.clone().anchored_at(anchor);

            assert!((shifted.eval(t_begin).pos - anchor).norm() < 1e-9);
            for _ in 0..20 {
                let a: f64 = (0.0..raw.duration()).fake_with_rng(&mut rng);
                let b: f64 = (0.0..raw.duration()).fake_with_rng(&mut rng);
                let raw_delta = raw.eval(t_begin + a).pos - raw.eval(t_begin + b).pos;
                let shifted_delta = shifted.eval(t_begin + a).pos - shifted.eval(t_begin + b).pos;
                assert!((raw_delta - shifted_delta).norm() < 1e-9);
            }
        }
    }

    #[test]
    fn test_json_rejects_empty() {
        assert!(serde_json::from_str::<Trajectory>("[]").is_err());
    }
}
