use crate::error::{SimError, SimResult};
use crate::math::{Pose, Quat, Vec3};
use crate::physics::contact::{CollisionShape, ContactMaterial};
use crate::physics::force::Wrench;
use nalgebra as na;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Below this norm an orientation cannot be renormalized.
const MIN_ORIENTATION_NORM: f64 = 1e-10;

/// Handle of a body inside one `World`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyId(pub(crate) usize);

impl BodyId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kinematic state. Angular velocity is expressed in the world frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BodyState {
    pub position: Vec3,
    pub velocity: Vec3,
    pub orientation: Quat,
    pub angular_velocity: Vec3,
}

impl BodyState {
    pub fn new() -> Self {
        Self {
            position: Vec3::zero(),
            velocity: Vec3::zero(),
            orientation: Quat::identity(),
            angular_velocity: Vec3::zero(),
        }
    }

    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.orientation)
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite()
            && self.velocity.is_finite()
            && self.orientation.is_finite()
            && self.angular_velocity.is_finite()
    }

    /// Velocity of a world point rigidly attached to the body.
    pub fn point_velocity(&self, world_point: &Vec3) -> Vec3 {
        self.velocity + self.angular_velocity.cross(&(*world_point - self.position))
    }

    /// Free rigid-body dynamics under a constant wrench (world frame).
    ///
    /// Euler's equations are solved in the body frame, where the inertia
    /// tensor is constant; the angular acceleration is rotated back so the
    /// stored angular velocity stays in world coordinates.
    pub fn derivative(
        &self,
        wrench: &Wrench,
        mass: f64,
        inertia: &na::Matrix3<f64>,
        inertia_inv: &na::Matrix3<f64>,
    ) -> StateDerivative {
        let omega_body = self.orientation.inverse_rotate_vector(&self.angular_velocity);
        let torque_body = self.orientation.inverse_rotate_vector(&wrench.torque);

        let gyroscopic = omega_body.cross(&Vec3::from_na(&(inertia * omega_body.to_na())));
        let alpha_body = Vec3::from_na(&(inertia_inv * (torque_body - gyroscopic).to_na()));

        StateDerivative {
            position_dot: self.velocity,
            velocity_dot: wrench.force * (1.0 / mass),
            orientation_dot: self.orientation.derivative(&omega_body),
            angular_velocity_dot: self.orientation.rotate_vector(&alpha_body),
        }
    }

    /// `self + deriv * dt`, with the orientation renormalized.
    pub fn advanced(&self, deriv: &StateDerivative, dt: f64) -> BodyState {
        let mut orientation = self.orientation + deriv.orientation_dot * dt;
        orientation.renormalize();
        BodyState {
            position: self.position + deriv.position_dot * dt,
            velocity: self.velocity + deriv.velocity_dot * dt,
            orientation,
            angular_velocity: self.angular_velocity + deriv.angular_velocity_dot * dt,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StateDerivative {
    pub position_dot: Vec3,
    pub velocity_dot: Vec3,
    pub orientation_dot: Quat,
    pub angular_velocity_dot: Vec3,
}

impl StateDerivative {
    /// Classical RK4 weighting of four stage derivatives.
    pub fn rk4_blend(k: [&StateDerivative; 4]) -> StateDerivative {
        let [k1, k2, k3, k4] = k;
        let sixth = 1.0 / 6.0;
        StateDerivative {
            position_dot: (k1.position_dot + k2.position_dot * 2.0 + k3.position_dot * 2.0 + k4.position_dot)
                * sixth,
            velocity_dot: (k1.velocity_dot + k2.velocity_dot * 2.0 + k3.velocity_dot * 2.0 + k4.velocity_dot)
                * sixth,
            orientation_dot: (k1.orientation_dot
                + k2.orientation_dot * 2.0
                + k3.orientation_dot * 2.0
                + k4.orientation_dot)
                * sixth,
            angular_velocity_dot: (k1.angular_velocity_dot
                + k2.angular_velocity_dot * 2.0
                + k3.angular_velocity_dot * 2.0
                + k4.angular_velocity_dot)
                * sixth,
        }
    }
}

/// Everything needed to create a body; validated by `World::add_body`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyDesc {
    pub name: String,
    pub mass: f64,
    /// Principal moments of inertia, body frame.
    pub inertia: Vec3,
    pub state: BodyState,
    pub fixed: bool,
    pub shape: Option<CollisionShape>,
    pub material: ContactMaterial,
}

impl BodyDesc {
    pub fn new(name: impl Into<String>, mass: f64, inertia: Vec3) -> Self {
        Self {
            name: name.into(),
            mass,
            inertia,
            state: BodyState::new(),
            fixed: false,
            shape: None,
            material: ContactMaterial::default(),
        }
    }

    pub fn point(name: impl Into<String>, mass: f64) -> Self {
        Self::new(name, mass, Vec3::new(1.0, 1.0, 1.0) * (mass * 0.1))
    }

    /// Solid cuboid with edge lengths `a`, `b`, `c` along local X, Y, Z.
    pub fn cuboid(name: impl Into<String>, mass: f64, a: f64, b: f64, c: f64) -> Self {
        let ixx = mass * (b * b + c * c) / 12.0;
        let iyy = mass * (a * a + c * c) / 12.0;
        let izz = mass * (a * a + b * b) / 12.0;
        Self::new(name, mass, Vec3::new(ixx, iyy, izz))
    }

    /// Solid cylinder whose axis is local Z.
    pub fn cylinder(name: impl Into<String>, mass: f64, radius: f64, length: f64) -> Self {
        let axial = 0.5 * mass * radius * radius;
        let radial = mass * (3.0 * radius * radius + length * length) / 12.0;
        Self::new(name, mass, Vec3::new(radial, radial, axial))
    }

    pub fn at(mut self, position: Vec3) -> Self {
        self.state.position = position;
        self
    }

    pub fn with_orientation(mut self, orientation: Quat) -> Self {
        self.state.orientation = orientation;
        self
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.state.velocity = velocity;
        self
    }

    pub fn with_angular_velocity(mut self, angular_velocity: Vec3) -> Self {
        self.state.angular_velocity = angular_velocity;
        self
    }

    pub fn with_shape(mut self, shape: CollisionShape, material: ContactMaterial) -> Self {
        self.shape = Some(shape);
        self.material = material;
        self
    }

    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Body {
    pub(crate) id: BodyId,
    pub(crate) name: String,
    pub(crate) mass: f64,
    pub(crate) inertia: na::Matrix3<f64>,
    inv_inertia_local: na::Matrix3<f64>,
    pub(crate) state: BodyState,
    pub(crate) fixed: bool,
    pub(crate) shape: Option<CollisionShape>,
    pub(crate) material: ContactMaterial,
}

impl Body {
    pub(crate) fn from_desc(id: BodyId, desc: BodyDesc) -> SimResult<Self> {
        if !desc.state.is_finite() {
            return Err(SimError::NonFinite { what: "body state" });
        }
        if desc.state.orientation.magnitude() < MIN_ORIENTATION_NORM {
            return Err(SimError::DegenerateOrientation { name: desc.name });
        }
        let inertia_ok = [desc.inertia.x, desc.inertia.y, desc.inertia.z]
            .iter()
            .all(|i| i.is_finite() && *i > 0.0);

        // A fixed body only needs a sane mass; the solver treats it as infinite.
        if !desc.fixed {
            if !(desc.mass.is_finite() && desc.mass > 0.0) {
                return Err(SimError::InvalidMass {
                    name: desc.name,
                    mass: desc.mass,
                });
            }
            if !inertia_ok {
                return Err(SimError::InvalidInertia { name: desc.name });
            }
        } else if !(desc.mass.is_finite() && desc.mass >= 0.0) {
            return Err(SimError::InvalidMass {
                name: desc.name,
                mass: desc.mass,
            });
        }

        let inertia = na::Matrix3::from_diagonal(&desc.inertia.to_na());
        let inv_inertia_local = if desc.fixed || !inertia_ok {
            na::Matrix3::zeros()
        } else {
            na::Matrix3::from_diagonal(&na::Vector3::new(
                1.0 / desc.inertia.x,
                1.0 / desc.inertia.y,
                1.0 / desc.inertia.z,
            ))
        };

        let mut state = desc.state;
        state.orientation.renormalize();
        if desc.fixed {
            state.velocity = Vec3::zero();
            state.angular_velocity = Vec3::zero();
        }

        Ok(Self {
            id,
            name: desc.name,
            mass: desc.mass,
            inertia,
            inv_inertia_local,
            state,
            fixed: desc.fixed,
            shape: desc.shape,
            material: desc.material,
        })
    }

    pub fn id(&self) -> BodyId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn inertia(&self) -> &na::Matrix3<f64> {
        &self.inertia
    }

    pub(crate) fn inverse_inertia_local(&self) -> &na::Matrix3<f64> {
        &self.inv_inertia_local
    }

    pub fn state(&self) -> &BodyState {
        &self.state
    }

    pub fn pose(&self) -> Pose {
        self.state.pose()
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    pub fn shape(&self) -> Option<&CollisionShape> {
        self.shape.as_ref()
    }

    pub fn material(&self) -> &ContactMaterial {
        &self.material
    }

    pub fn inverse_mass(&self) -> f64 {
        if self.fixed {
            0.0
        } else {
            1.0 / self.mass
        }
    }

    /// Inverse inertia tensor rotated into the world frame.
    pub fn inverse_inertia_world(&self) -> na::Matrix3<f64> {
        if self.fixed {
            return na::Matrix3::zeros();
        }
        let r = self.state.orientation.to_rotation_matrix();
        r * self.inv_inertia_local * r.transpose()
    }

    pub fn inertia_world(&self) -> na::Matrix3<f64> {
        let r = self.state.orientation.to_rotation_matrix();
        r * self.inertia * r.transpose()
    }

    /// Inverse mass seen by a positional correction along `n` at `arm` from the centre.
    pub fn generalized_inverse_mass(&self, arm: &Vec3, n: &Vec3) -> f64 {
        if self.fixed {
            return 0.0;
        }
        let rn = arm.cross(n).to_na();
        self.inverse_mass() + rn.dot(&(self.inverse_inertia_world() * rn))
    }

    pub fn kinetic_energy(&self) -> f64 {
        if self.fixed {
            return 0.0;
        }
        let w = self.state.angular_velocity.to_na();
        0.5 * self.mass * self.state.velocity.magnitude_squared()
            + 0.5 * w.dot(&(self.inertia_world() * w))
    }

    pub(crate) fn state_mut(&mut self) -> &mut BodyState {
        &mut self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn cuboid_inertia_matches_box_formula() {
        let desc = BodyDesc::cuboid("slab", 10.0, 0.3, 0.03, 0.08);
        assert_relative_eq!(desc.inertia.x, 10.0 * (0.03 * 0.03 + 0.08 * 0.08) / 12.0);
        assert_relative_eq!(desc.inertia.y, 10.0 * (0.3 * 0.3 + 0.08 * 0.08) / 12.0);
        assert_relative_eq!(desc.inertia.z, 10.0 * (0.3 * 0.3 + 0.03 * 0.03) / 12.0);
    }

    #[test]
    fn cylinder_axis_is_local_z() {
        let desc = BodyDesc::cylinder("wheel", 0.5, 0.1, 0.2);
        assert_relative_eq!(desc.inertia.z, 0.5 * 0.5 * 0.01);
        assert_relative_eq!(desc.inertia.x, 0.5 * (0.03 + 0.04) / 12.0);
        assert_relative_eq!(desc.inertia.x, desc.inertia.y);
    }

    #[test]
    fn fixed_body_drops_velocity() {
        let desc = BodyDesc::point("ground", 1e6)
            .with_velocity(Vec3::new(1.0, 0.0, 0.0))
            .fixed();
        let body = Body::from_desc(BodyId(0), desc).unwrap();
        assert_eq!(body.state().velocity, Vec3::zero());
        assert_eq!(body.inverse_mass(), 0.0);
        assert_eq!(body.inverse_inertia_world(), na::Matrix3::zeros());
    }

    #[test]
    fn movable_body_needs_positive_mass_and_inertia() {
        let err = Body::from_desc(BodyId(0), BodyDesc::point("p", 0.0)).unwrap_err();
        assert!(matches!(err, SimError::InvalidMass { .. }));

        let err = Body::from_desc(
            BodyId(0),
            BodyDesc::new("flat", 1.0, Vec3::new(1.0, 0.0, 1.0)),
        )
        .unwrap_err();
        assert!(matches!(err, SimError::InvalidInertia { .. }));
    }

    #[test]
    fn zero_orientation_is_rejected() {
        let desc = BodyDesc::point("p", 1.0).with_orientation(Quat::new(0.0, 0.0, 0.0, 0.0));
        let err = Body::from_desc(BodyId(0), desc).unwrap_err();
        assert_eq!(err, SimError::DegenerateOrientation { name: "p".to_string() });

        let scaled = BodyDesc::point("q", 1.0).with_orientation(Quat::new(2.0, 0.0, 0.0, 0.0));
        let body = Body::from_desc(BodyId(0), scaled).unwrap();
        assert_relative_eq!(body.state().orientation.magnitude(), 1.0, epsilon = 1e-12);
        assert!(body.pose().rotation_matrix().iter().all(|v| v.is_finite()));
    }
}
