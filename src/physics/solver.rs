//! Substepping XPBD solver.
//!
//! Each call to `step` splits `dt` into `substeps` substeps. A substep predicts
//! unconstrained motion, projects joint and contact position constraints,
//! derives velocities from the position change and finally runs a velocity
//! pass for contact restitution and sliding friction.

use crate::error::SimResult;
use crate::math::Vec3;
use crate::physics::body::{Body, BodyState};
use crate::physics::contact::{self, Contact};
use crate::physics::force::Wrench;
use crate::physics::integrator::Integrator;
use crate::physics::joint::{Joint, PrismaticJoint, SpringDamper};
use tracing::trace;

pub const DEFAULT_SUBSTEPS: usize = 16;
pub const DEFAULT_ITERATIONS: usize = 2;

#[derive(Debug, Clone)]
pub struct Xpbd {
    substeps: usize,
    iterations: usize,
    contacts: Vec<Contact>,
    previous: Vec<BodyState>,
    spring_lambdas: Vec<f64>,
}

impl Default for Xpbd {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSTEPS, DEFAULT_ITERATIONS)
    }
}

impl Xpbd {
    /// Zero counts are raised to one.
    pub fn new(substeps: usize, iterations: usize) -> Self {
        Self {
            substeps: substeps.max(1),
            iterations: iterations.max(1),
            contacts: Vec::new(),
            previous: Vec::new(),
            spring_lambdas: Vec::new(),
        }
    }

    pub fn substeps(&self) -> usize {
        self.substeps
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    fn predict(bodies: &mut [Body], wrenches: &[Wrench], h: f64) {
        for (body, wrench) in bodies.iter_mut().zip(wrenches) {
            if body.is_fixed() {
                continue;
            }
            let inv_mass = body.inverse_mass();
            let inv_inertia = body.inverse_inertia_world();
            let inertia = body.inertia_world();
            let state = body.state_mut();

            state.velocity += wrench.force * (h * inv_mass);
            state.position += state.velocity * h;

            let omega = state.angular_velocity.to_na();
            let gyroscopic = omega.cross(&(inertia * omega));
            let alpha = inv_inertia * (wrench.torque.to_na() - gyroscopic);
            state.angular_velocity += Vec3::from_na(&alpha) * h;
            state.orientation = state
                .orientation
                .rotated_by_world(&(state.angular_velocity * h));
        }
    }

    fn update_velocities(bodies: &mut [Body], previous: &[BodyState], h: f64) {
        for (body, prev) in bodies.iter_mut().zip(previous) {
            if body.is_fixed() {
                continue;
            }
            let state = body.state_mut();
            state.velocity = (state.position - prev.position) * (1.0 / h);
            state.angular_velocity = state.orientation.angle_difference(&prev.orientation) * (1.0 / h);
        }
    }

    fn solve_prismatic(bodies: &mut [Body], joint: &PrismaticJoint) {
        let (a, b) = (joint.body_a.index(), joint.body_b.index());

        // Relative orientation lock.
        let correction = joint.angular_error(&bodies[a].pose(), &bodies[b].pose());
        if let Some((n, angle)) = correction.normalize_with_length() {
            let inv_a = bodies[a].inverse_inertia_world();
            let inv_b = bodies[b].inverse_inertia_world();
            let nn = n.to_na();
            let w = nn.dot(&(inv_a * nn)) + nn.dot(&(inv_b * nn));
            if w > 0.0 {
                let impulse = n * (angle / w);
                apply_rotation(&mut bodies[a], &impulse, -1.0);
                apply_rotation(&mut bodies[b], &impulse, 1.0);
            }
        }

        // Lateral translation lock.
        let pose_a = bodies[a].pose();
        let pose_b = bodies[b].pose();
        let lateral = joint.lateral_error(&pose_a, &pose_b);
        if let Some((n, c)) = lateral.normalize_with_length() {
            let pa = pose_a.transform_point(&joint.local_anchor_a);
            let pb = pose_b.transform_point(&joint.local_anchor_b);
            let w = bodies[a].generalized_inverse_mass(&(pa - pose_a.position), &n)
                + bodies[b].generalized_inverse_mass(&(pb - pose_b.position), &n);
            if w > 0.0 {
                let p = n * (c / w);
                apply_position_impulse(&mut bodies[a], -p, pa);
                apply_position_impulse(&mut bodies[b], p, pb);
            }
        }
    }

    fn solve_spring(
        bodies: &mut [Body],
        previous: &[BodyState],
        spring: &SpringDamper,
        lambda: &mut f64,
        h: f64,
    ) {
        let (a, b) = (spring.body_a.index(), spring.body_b.index());
        let pose_a = bodies[a].pose();
        let pose_b = bodies[b].pose();
        let pa = pose_a.transform_point(&spring.local_anchor_a);
        let pb = pose_b.transform_point(&spring.local_anchor_b);
        let Some((n, length)) = (pa - pb).normalize_with_length() else {
            return;
        };
        let c = length - spring.rest_length;

        let w = bodies[a].generalized_inverse_mass(&(pa - pose_a.position), &n)
            + bodies[b].generalized_inverse_mass(&(pb - pose_b.position), &n);
        if w <= 0.0 {
            return;
        }

        let alpha = 1.0 / (spring.stiffness * h * h);
        let gamma = spring.damping / (spring.stiffness * h);
        let moved_a = pa - previous[a].pose().transform_point(&spring.local_anchor_a);
        let moved_b = pb - previous[b].pose().transform_point(&spring.local_anchor_b);
        let rate = n.dot(&(moved_a - moved_b));

        let delta = (c - alpha * *lambda + gamma * rate) / ((1.0 + gamma) * w + alpha);
        *lambda += delta;

        let p = n * delta;
        apply_position_impulse(&mut bodies[a], -p, pa);
        apply_position_impulse(&mut bodies[b], p, pb);
    }

    fn solve_contact(bodies: &mut [Body], previous: &[BodyState], contact: &mut Contact) {
        let body = &bodies[contact.body];
        let pose = body.pose();
        let depth = contact.depth(&pose);
        if depth <= 0.0 {
            return;
        }
        let point = pose.transform_point(&contact.local_point);
        let arm = point - pose.position;
        let w = body.generalized_inverse_mass(&arm, &contact.normal);
        if w <= 0.0 {
            return;
        }
        let delta = depth / w;
        contact.normal_lambda += delta;
        apply_position_impulse(&mut bodies[contact.body], contact.normal * delta, point);

        // Static friction: undo tangential slip while it stays inside the cone.
        let pose = bodies[contact.body].pose();
        let point = pose.transform_point(&contact.local_point);
        let start = previous[contact.body]
            .pose()
            .transform_point(&contact.local_point);
        let slip = (point - start).reject_from(&contact.normal);
        let Some((dir, c)) = slip.normalize_with_length() else {
            return;
        };
        let t = -dir;
        let w = bodies[contact.body].generalized_inverse_mass(&(point - pose.position), &t);
        if w <= 0.0 {
            return;
        }
        let delta_t = c / w;
        if contact.tangent_lambda + delta_t < contact.material.static_friction * contact.normal_lambda {
            contact.tangent_lambda += delta_t;
            apply_position_impulse(&mut bodies[contact.body], t * delta_t, point);
        }
    }

    fn solve_contact_velocity(bodies: &mut [Body], wrenches: &[Wrench], contact: &Contact, h: f64) {
        if contact.normal_lambda <= 0.0 {
            return;
        }
        let body = &bodies[contact.body];
        let pose = body.pose();
        let point = pose.transform_point(&contact.local_point);
        let v = body.state().point_velocity(&point);
        let vn = v.dot(&contact.normal);
        let vt = v - contact.normal * vn;

        let mut dv = Vec3::zero();
        if let Some((dir, speed)) = vt.normalize_with_length() {
            let normal_force = contact.normal_lambda / (h * h);
            dv -= dir * (h * contact.material.sliding_friction * normal_force).min(speed);
        }

        // Slow impacts come to rest instead of bouncing forever.
        let accel = wrenches[contact.body].force.magnitude() * body.inverse_mass();
        let restitution = if contact.pre_normal_velocity.abs() <= 2.0 * accel * h {
            0.0
        } else {
            contact.material.restitution
        };
        dv += contact.normal * (-vn + (-restitution * contact.pre_normal_velocity).max(0.0));

        let Some((dir, magnitude)) = dv.normalize_with_length() else {
            return;
        };
        let arm = point - pose.position;
        let w = body.generalized_inverse_mass(&arm, &dir);
        if w <= 0.0 {
            return;
        }
        let impulse = dir * (magnitude / w);
        let inv_mass = body.inverse_mass();
        let spin = body.inverse_inertia_world() * arm.cross(&impulse).to_na();
        let state = bodies[contact.body].state_mut();
        state.velocity += impulse * inv_mass;
        state.angular_velocity += Vec3::from_na(&spin);
    }
}

/// Move `body` by the positional impulse `p` applied at world point `point`.
fn apply_position_impulse(body: &mut Body, p: Vec3, point: Vec3) {
    if body.is_fixed() {
        return;
    }
    let inv_mass = body.inverse_mass();
    let inv_inertia = body.inverse_inertia_world();
    let state = body.state_mut();
    let arm = point - state.position;
    let rotation = Vec3::from_na(&(inv_inertia * arm.cross(&p).to_na()));
    state.position += p * inv_mass;
    state.orientation = state.orientation.rotated_by_world(&rotation);
}

/// Rotate `body` by the angular impulse `impulse`, scaled by `sign`.
fn apply_rotation(body: &mut Body, impulse: &Vec3, sign: f64) {
    if body.is_fixed() {
        return;
    }
    let rotation = Vec3::from_na(&(body.inverse_inertia_world() * impulse.to_na())) * sign;
    let state = body.state_mut();
    state.orientation = state.orientation.rotated_by_world(&rotation);
}

impl Integrator for Xpbd {
    fn name(&self) -> &'static str {
        "xpbd"
    }

    fn supports_constraints(&self) -> bool {
        true
    }

    fn step(
        &mut self,
        bodies: &mut [Body],
        joints: &[Joint],
        wrenches: &[Wrench],
        dt: f64,
    ) -> SimResult<()> {
        let h = dt / self.substeps as f64;
        self.spring_lambdas.resize(joints.len(), 0.0);

        for _ in 0..self.substeps {
            self.previous.clear();
            self.previous.extend(bodies.iter().map(|b| *b.state()));

            Self::predict(bodies, wrenches, h);
            contact::ground_contacts(bodies, &mut self.contacts);
            self.spring_lambdas.iter_mut().for_each(|l| *l = 0.0);

            for _ in 0..self.iterations {
                for (joint, lambda) in joints.iter().zip(self.spring_lambdas.iter_mut()) {
                    match joint {
                        Joint::Prismatic(j) => Self::solve_prismatic(bodies, j),
                        Joint::SpringDamper(s) => {
                            Self::solve_spring(bodies, &self.previous, s, lambda, h)
                        }
                    }
                }
                for contact in self.contacts.iter_mut() {
                    Self::solve_contact(bodies, &self.previous, contact);
                }
            }

            Self::update_velocities(bodies, &self.previous, h);
            for contact in &self.contacts {
                Self::solve_contact_velocity(bodies, wrenches, contact, h);
            }
        }

        trace!(
            substeps = self.substeps,
            contacts = self.contacts.len(),
            "xpbd step"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::body::{BodyDesc, BodyId};
    use crate::physics::contact::{CollisionShape, ContactMaterial};
    use crate::math::Pose;
    use crate::physics::joint::JointSpec;
    use approx::assert_relative_eq;

    fn poses(bodies: &[Body]) -> Vec<Pose> {
        bodies.iter().map(|b| b.pose()).collect()
    }

    fn build(descs: Vec<BodyDesc>) -> Vec<Body> {
        descs
            .into_iter()
            .enumerate()
            .map(|(i, d)| Body::from_desc(BodyId(i), d).unwrap())
            .collect()
    }

    fn gravity(bodies: &[Body], g: f64) -> Vec<Wrench> {
        bodies
            .iter()
            .map(|b| {
                if b.is_fixed() {
                    Wrench::zero()
                } else {
                    Wrench::from_force(Vec3::new(0.0, g * b.mass(), 0.0))
                }
            })
            .collect()
    }

    #[test]
    fn free_fall_matches_semi_implicit_euler() {
        let mut bodies = build(vec![BodyDesc::point("p", 1.0)]);
        let wrenches = gravity(&bodies, -1.0);
        let mut solver = Xpbd::new(10, 1);
        solver.step(&mut bodies, &[], &wrenches, 1.0).unwrap();
        assert_relative_eq!(bodies[0].state().velocity.y, -1.0, epsilon = 1e-12);
        // Sum of k*h^2 for k = 1..10 with h = 0.1.
        assert_relative_eq!(bodies[0].state().position.y, -0.55, epsilon = 1e-12);
    }

    #[test]
    fn prismatic_keeps_lateral_offset_under_sideways_push() {
        let mut bodies = build(vec![
            BodyDesc::cuboid("chassis", 10.0, 0.8, 0.1, 0.4).fixed(),
            BodyDesc::cylinder("wheel", 0.2, 0.1, 0.05).at(Vec3::new(0.3, -0.15, 0.25)),
        ]);
        let spec = JointSpec::prismatic(BodyId(0), BodyId(1), Vec3::new(0.3, -0.15, 0.25), Vec3::unit_y());
        let joints = vec![Joint::assemble(&spec, &bodies[0], &bodies[1]).unwrap()];
        let mut wrenches = gravity(&bodies, -0.25);
        wrenches[1].force += Vec3::new(0.05, 0.0, -0.05);
        wrenches[1].torque = Vec3::new(0.0, 0.01, 0.0);

        let mut solver = Xpbd::default();
        for _ in 0..200 {
            solver.step(&mut bodies, &joints, &wrenches, 0.01).unwrap();
        }
        let poses = poses(&bodies);
        let Joint::Prismatic(j) = &joints[0] else { unreachable!() };
        assert!(j.lateral_error(&poses[0], &poses[1]).magnitude() < 1e-6);
        assert!(j.angular_error(&poses[0], &poses[1]).magnitude() < 1e-6);
        assert!(j.travel(&poses[0], &poses[1]) < 0.0);
    }

    #[test]
    fn box_settles_on_ground() {
        let mut bodies = build(vec![
            BodyDesc::point("ground", 0.0)
                .at(Vec3::new(0.0, -0.5, 0.0))
                .with_shape(CollisionShape::Box { a: 2.0, b: 0.2, c: 2.0 }, ContactMaterial::default())
                .fixed(),
            BodyDesc::cuboid("block", 1.0, 0.2, 0.2, 0.2)
                .at(Vec3::new(0.0, 0.0, 0.0))
                .with_shape(CollisionShape::Box { a: 0.2, b: 0.2, c: 0.2 }, ContactMaterial::default()),
        ]);
        let wrenches = gravity(&bodies, -1.0);
        let mut solver = Xpbd::default();
        for _ in 0..600 {
            solver.step(&mut bodies, &[], &wrenches, 1.0 / 60.0).unwrap();
        }
        let state = bodies[1].state();
        assert_relative_eq!(state.position.y, -0.3, epsilon = 1e-3);
        assert!(state.velocity.magnitude() < 1e-2);
    }
}
