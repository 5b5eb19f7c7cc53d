//! Custom force laws evaluated explicitly once per step.

use crate::error::{SimError, SimResult};
use crate::math::Vec3;
use crate::physics::body::{Body, BodyId};
use serde::{Deserialize, Serialize};

/// Closest approach used by `ForceLaw::gravity` unless overridden.
pub const DEFAULT_MIN_DISTANCE: f64 = 1e-3;

/// Force and torque about the centre of mass, world frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Wrench {
    pub force: Vec3,
    pub torque: Vec3,
}

impl Wrench {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn from_force(force: Vec3) -> Self {
        Self {
            force,
            torque: Vec3::zero(),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.force.is_finite() && self.torque.is_finite()
    }
}

impl std::ops::AddAssign for Wrench {
    fn add_assign(&mut self, other: Self) {
        self.force += other.force;
        self.torque += other.torque;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ForceLaw {
    /// Inverse-square attraction towards the attractor (or the origin).
    ///
    /// Distances below `min_distance` are clamped to it, so the force magnitude
    /// never exceeds `g * m / min_distance^2`. Exactly coincident positions give
    /// no force at all since the direction is undefined.
    Gravity { g: f64, min_distance: f64 },
}

/// Result of evaluating a law at one relative position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LawSample {
    pub wrench: Wrench,
    pub clamped: bool,
}

impl ForceLaw {
    pub fn gravity(g: f64) -> Self {
        ForceLaw::Gravity {
            g,
            min_distance: DEFAULT_MIN_DISTANCE,
        }
    }

    pub fn with_min_distance(self, distance: f64) -> Self {
        match self {
            ForceLaw::Gravity { g, .. } => ForceLaw::Gravity {
                g,
                min_distance: distance,
            },
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        match *self {
            ForceLaw::Gravity { g, min_distance } => {
                if !g.is_finite() {
                    return Err(SimError::InvalidForceLaw {
                        reason: "gravity constant must be finite",
                    });
                }
                if !(min_distance.is_finite() && min_distance > 0.0) {
                    return Err(SimError::InvalidForceLaw {
                        reason: "minimum distance must be positive",
                    });
                }
                Ok(())
            }
        }
    }

    /// Evaluate for relative position `p` of the affected body of mass `mass`.
    pub fn evaluate(&self, p: &Vec3, mass: f64) -> LawSample {
        match *self {
            ForceLaw::Gravity { g, min_distance } => {
                let Some((direction, distance)) = p.normalize_with_length() else {
                    return LawSample {
                        wrench: Wrench::zero(),
                        clamped: true,
                    };
                };
                let clamped = distance < min_distance;
                let r = distance.max(min_distance);
                LawSample {
                    wrench: Wrench::from_force(direction * (-g * mass / (r * r))),
                    clamped,
                }
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ForceLaw::Gravity { .. } => "gravity",
        }
    }
}

/// A force law acting on `body`, measured relative to `attractor`.
///
/// Without an attractor the law is measured from the world origin. The
/// reaction on the attractor is not applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForceGenerator {
    pub body: BodyId,
    pub attractor: Option<BodyId>,
    pub law: ForceLaw,
}

impl ForceGenerator {
    pub fn new(body: BodyId, law: ForceLaw) -> Self {
        Self {
            body,
            attractor: None,
            law,
        }
    }

    pub fn towards(mut self, attractor: BodyId) -> Self {
        self.attractor = Some(attractor);
        self
    }

    pub(crate) fn evaluate(&self, bodies: &[Body]) -> LawSample {
        let target = &bodies[self.body.index()];
        let origin = self
            .attractor
            .map(|a| bodies[a.index()].state().position)
            .unwrap_or_else(Vec3::zero);
        self.law
            .evaluate(&(target.state().position - origin), target.mass())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn inverse_square_points_at_attractor() {
        let law = ForceLaw::gravity(2.0);
        let p = Vec3::new(3.0, 0.0, 4.0);
        let sample = law.evaluate(&p, 1.5);
        assert!(!sample.clamped);
        let expected = p * (-2.0 * 1.5 / 125.0);
        assert_relative_eq!(sample.wrench.force.x, expected.x, epsilon = 1e-12);
        assert_relative_eq!(sample.wrench.force.z, expected.z, epsilon = 1e-12);
        assert_eq!(sample.wrench.torque, Vec3::zero());
    }

    #[test]
    fn close_range_is_clamped_and_origin_is_zero() {
        let law = ForceLaw::gravity(1.0).with_min_distance(0.1);
        let near = law.evaluate(&Vec3::new(0.0, 1e-6, 0.0), 1.0);
        assert!(near.clamped);
        assert_relative_eq!(near.wrench.force.y, -100.0, epsilon = 1e-9);

        let at_origin = law.evaluate(&Vec3::zero(), 1.0);
        assert!(at_origin.clamped);
        assert_eq!(at_origin.wrench, Wrench::zero());
    }

    #[test]
    fn rejects_non_positive_min_distance() {
        assert!(ForceLaw::gravity(1.0).with_min_distance(0.0).validate().is_err());
        assert!(ForceLaw::gravity(f64::NAN).validate().is_err());
        assert!(ForceLaw::gravity(1.0).validate().is_ok());
    }
}
