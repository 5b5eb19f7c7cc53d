use crate::error::{SimError, SimResult};
use crate::physics::body::{Body, BodyState, StateDerivative};
use crate::physics::force::Wrench;
use crate::physics::joint::Joint;

/// Advances every movable body of a world by one step.
///
/// `wrenches` is indexed like `bodies` and already contains the uniform
/// gravity contribution. Fixed bodies must be left untouched.
pub trait Integrator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether joints and ground contacts are enforced.
    fn supports_constraints(&self) -> bool;

    fn step(
        &mut self,
        bodies: &mut [Body],
        joints: &[Joint],
        wrenches: &[Wrench],
        dt: f64,
    ) -> SimResult<()>;
}

/// Classical fourth-order Runge-Kutta for unconstrained bodies.
///
/// External wrenches are held constant across the four stages.
#[derive(Debug, Clone, Copy, Default)]
pub struct RungeKutta4;

impl RungeKutta4 {
    pub fn new() -> Self {
        Self
    }

    fn integrate(body: &Body, wrench: &Wrench, dt: f64) -> BodyState {
        let state = body.state();
        let inertia = body.inertia();
        let inertia_inv = body.inverse_inertia_local();
        let deriv = |s: &BodyState| -> StateDerivative {
            s.derivative(wrench, body.mass(), inertia, inertia_inv)
        };

        let k1 = deriv(state);
        let k2 = deriv(&state.advanced(&k1, dt * 0.5));
        let k3 = deriv(&state.advanced(&k2, dt * 0.5));
        let k4 = deriv(&state.advanced(&k3, dt));

        state.advanced(&StateDerivative::rk4_blend([&k1, &k2, &k3, &k4]), dt)
    }
}

impl Integrator for RungeKutta4 {
    fn name(&self) -> &'static str {
        "rk4"
    }

    fn supports_constraints(&self) -> bool {
        false
    }

    fn step(
        &mut self,
        bodies: &mut [Body],
        joints: &[Joint],
        wrenches: &[Wrench],
        dt: f64,
    ) -> SimResult<()> {
        if !joints.is_empty() {
            return Err(SimError::UnsupportedIntegrator {
                integrator: self.name(),
                feature: "joints",
            });
        }
        for (body, wrench) in bodies.iter_mut().zip(wrenches) {
            if body.is_fixed() {
                continue;
            }
            let next = Self::integrate(body, wrench, dt);
            *body.state_mut() = next;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;
    use crate::physics::body::{BodyDesc, BodyId};
    use approx::assert_relative_eq;

    #[test]
    fn constant_force_matches_closed_form() {
        let desc = BodyDesc::point("p", 2.0).with_velocity(Vec3::new(1.0, 0.0, 0.0));
        let mut bodies = vec![Body::from_desc(BodyId(0), desc).unwrap()];
        let wrenches = [Wrench::from_force(Vec3::new(0.0, -4.0, 0.0))];
        let mut rk4 = RungeKutta4::new();
        for _ in 0..10 {
            rk4.step(&mut bodies, &[], &wrenches, 0.1).unwrap();
        }
        let s = bodies[0].state();
        assert_relative_eq!(s.position.x, 1.0, epsilon = 1e-12);
        assert_relative_eq!(s.position.y, -1.0, epsilon = 1e-12);
        assert_relative_eq!(s.velocity.y, -2.0, epsilon = 1e-12);
    }

    #[test]
    fn torque_free_spin_conserves_energy() {
        let desc = BodyDesc::cuboid("slab", 10.0, 0.3, 0.03, 0.08)
            .with_angular_velocity(Vec3::new(0.05, 0.0, 3.0));
        let mut bodies = vec![Body::from_desc(BodyId(0), desc).unwrap()];
        let start = bodies[0].kinetic_energy();
        let mut rk4 = RungeKutta4::new();
        for _ in 0..500 {
            rk4.step(&mut bodies, &[], &[Wrench::zero()], 0.002).unwrap();
        }
        assert_relative_eq!(bodies[0].kinetic_energy(), start, max_relative = 1e-4);
    }
}
