use crate::error::{SimError, SimResult};
use crate::math::{Pose, Vec3};
use crate::physics::body::{Body, BodyDesc, BodyId, BodyState};
use crate::physics::contact;
use crate::physics::force::{ForceGenerator, Wrench};
use crate::physics::integrator::Integrator;
use crate::physics::joint::{Joint, JointId, JointSpec};
use crate::physics::solver::Xpbd;
use tracing::{debug, error, info, trace, warn};

/// Residual above which a step is reported as unconverged.
pub const DEFAULT_RESIDUAL_TOLERANCE: f64 = 1e-3;

/// Outcome of one successful `World::step`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub dt: f64,
    /// Simulated time after the step.
    pub time: f64,
    /// Largest joint violation or contact penetration after the step.
    pub residual: f64,
    /// Force generators whose distance guard was active this step.
    pub clamped_forces: usize,
}

/// Rate-limits solver residual warnings.
///
/// Warns on the first bad step and then whenever the run of consecutive bad
/// steps reaches a power of two.
#[derive(Debug, Clone)]
pub struct ResidualMonitor {
    tolerance: f64,
    consecutive: u64,
}

impl ResidualMonitor {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            consecutive: 0,
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn consecutive(&self) -> u64 {
        self.consecutive
    }

    /// Returns true when this observation produced a warning.
    pub fn observe(&mut self, residual: f64, time: f64) -> bool {
        if residual > self.tolerance {
            self.consecutive += 1;
            if self.consecutive.is_power_of_two() {
                warn!(
                    residual,
                    tolerance = self.tolerance,
                    consecutive = self.consecutive,
                    time,
                    "solver residual above tolerance"
                );
                return true;
            }
        } else if self.consecutive > 0 {
            info!(
                steps = self.consecutive,
                time, "solver residual back within tolerance"
            );
            self.consecutive = 0;
        }
        false
    }
}

struct GeneratorSlot {
    generator: ForceGenerator,
    clamp_reported: bool,
}

/// Owns every body, joint and force generator of one mechanism.
pub struct World {
    bodies: Vec<Body>,
    joints: Vec<Joint>,
    generators: Vec<GeneratorSlot>,
    gravity: Vec3,
    time: f64,
    integrator: Box<dyn Integrator>,
    monitor: ResidualMonitor,
    wrenches: Vec<Wrench>,
    snapshot: Vec<BodyState>,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Empty world without uniform gravity, stepped by the default XPBD solver.
    pub fn new() -> Self {
        Self {
            bodies: Vec::new(),
            joints: Vec::new(),
            generators: Vec::new(),
            gravity: Vec3::zero(),
            time: 0.0,
            integrator: Box::new(Xpbd::default()),
            monitor: ResidualMonitor::new(DEFAULT_RESIDUAL_TOLERANCE),
            wrenches: Vec::new(),
            snapshot: Vec::new(),
        }
    }

    pub fn with_gravity(mut self, gravity: Vec3) -> SimResult<Self> {
        self.set_gravity(gravity)?;
        Ok(self)
    }

    pub fn with_integrator(mut self, integrator: impl Integrator + 'static) -> SimResult<Self> {
        self.set_integrator(Box::new(integrator))?;
        Ok(self)
    }

    pub fn with_residual_tolerance(mut self, tolerance: f64) -> Self {
        self.monitor = ResidualMonitor::new(tolerance);
        self
    }

    pub fn set_gravity(&mut self, gravity: Vec3) -> SimResult<()> {
        if !gravity.is_finite() {
            return Err(SimError::NonFinite { what: "gravity" });
        }
        self.gravity = gravity;
        Ok(())
    }

    pub fn set_integrator(&mut self, integrator: Box<dyn Integrator>) -> SimResult<()> {
        if !integrator.supports_constraints() {
            if !self.joints.is_empty() {
                return Err(SimError::UnsupportedIntegrator {
                    integrator: integrator.name(),
                    feature: "joints",
                });
            }
            if contact::has_contact_pairs(&self.bodies) {
                return Err(SimError::UnsupportedIntegrator {
                    integrator: integrator.name(),
                    feature: "contacts",
                });
            }
        }
        debug!(integrator = integrator.name(), "integrator selected");
        self.integrator = integrator;
        Ok(())
    }

    pub fn add_body(&mut self, desc: BodyDesc) -> SimResult<BodyId> {
        let id = BodyId(self.bodies.len());
        let body = Body::from_desc(id, desc)?;
        self.bodies.push(body);
        if !self.integrator.supports_constraints() && contact::has_contact_pairs(&self.bodies) {
            self.bodies.pop();
            return Err(SimError::UnsupportedIntegrator {
                integrator: self.integrator.name(),
                feature: "contacts",
            });
        }
        let body = &self.bodies[id.index()];
        debug!(
            body = %id,
            name = body.name(),
            mass = body.mass(),
            fixed = body.is_fixed(),
            "body added"
        );
        Ok(id)
    }

    pub fn add_joint(&mut self, spec: JointSpec) -> SimResult<JointId> {
        if !self.integrator.supports_constraints() {
            return Err(SimError::UnsupportedIntegrator {
                integrator: self.integrator.name(),
                feature: "joints",
            });
        }
        let (a, b) = spec.bodies();
        let body_a = self.bodies.get(a.index()).ok_or(SimError::UnknownBody(a))?;
        let body_b = self.bodies.get(b.index()).ok_or(SimError::UnknownBody(b))?;
        let joint = Joint::assemble(&spec, body_a, body_b)?;

        let id = JointId(self.joints.len());
        debug!(joint = %id, kind = joint.kind(), body_a = %a, body_b = %b, "joint added");
        self.joints.push(joint);
        Ok(id)
    }

    pub fn add_force_generator(&mut self, generator: ForceGenerator) -> SimResult<()> {
        generator.law.validate()?;
        if generator.body.index() >= self.bodies.len() {
            return Err(SimError::UnknownBody(generator.body));
        }
        if let Some(attractor) = generator.attractor {
            if attractor.index() >= self.bodies.len() {
                return Err(SimError::UnknownBody(attractor));
            }
            if attractor == generator.body {
                return Err(SimError::SameBody(attractor));
            }
        }
        debug!(
            body = %generator.body,
            law = generator.law.name(),
            "force generator added"
        );
        self.generators.push(GeneratorSlot {
            generator,
            clamp_reported: false,
        });
        Ok(())
    }

    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(id.index())
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub fn joint(&self, id: JointId) -> Option<&Joint> {
        self.joints.get(id.index())
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn force_generators(&self) -> impl Iterator<Item = &ForceGenerator> {
        self.generators.iter().map(|slot| &slot.generator)
    }

    pub fn pose(&self, id: BodyId) -> Option<Pose> {
        self.body(id).map(Body::pose)
    }

    pub fn state(&self, id: BodyId) -> Option<&BodyState> {
        self.body(id).map(Body::state)
    }

    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn integrator_name(&self) -> &'static str {
        self.integrator.name()
    }

    /// Whether the current integrator accepts joints and contacts.
    pub fn supports_constraints(&self) -> bool {
        self.integrator.supports_constraints()
    }

    /// Drop every body and joint added after the first `bodies` / `joints`.
    ///
    /// Used to undo a partial assembly; force generators must not refer to
    /// the removed bodies.
    pub(crate) fn truncate(&mut self, bodies: usize, joints: usize) {
        self.bodies.truncate(bodies);
        self.joints.truncate(joints);
    }

    pub fn residual_monitor(&self) -> &ResidualMonitor {
        &self.monitor
    }

    /// Largest hard-constraint violation or ground penetration right now.
    pub fn residual(&self) -> f64 {
        let joints = self
            .joints
            .iter()
            .map(|j| j.violation(&self.bodies))
            .fold(0.0, f64::max);
        joints.max(contact::max_penetration(&self.bodies))
    }

    pub fn kinetic_energy(&self) -> f64 {
        self.bodies.iter().map(Body::kinetic_energy).sum()
    }

    /// Advance the whole mechanism by `dt` seconds.
    ///
    /// `dt == 0` changes nothing. A step that produces a non-finite state is
    /// rolled back and reported as `SimError::NonFiniteState`.
    pub fn step(&mut self, dt: f64) -> SimResult<StepReport> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(SimError::InvalidTimestep(dt));
        }
        if dt == 0.0 {
            return Ok(StepReport {
                dt,
                time: self.time,
                residual: self.residual(),
                clamped_forces: 0,
            });
        }

        let clamped_forces = self.accumulate_wrenches();

        self.snapshot.clear();
        self.snapshot.extend(self.bodies.iter().map(|b| *b.state()));

        let stepped = self
            .integrator
            .step(&mut self.bodies, &self.joints, &self.wrenches, dt);
        let failed = self.bodies.iter().find(|b| !b.state().is_finite()).map(Body::id);
        if let Err(e) = stepped {
            self.restore_snapshot();
            return Err(e);
        }
        if let Some(body) = failed {
            self.restore_snapshot();
            error!(body = %body, dt, time = self.time, "non-finite state, step rolled back");
            return Err(SimError::NonFiniteState { body });
        }

        self.time += dt;
        let residual = self.residual();
        self.monitor.observe(residual, self.time);
        trace!(dt, time = self.time, residual, "world step");

        Ok(StepReport {
            dt,
            time: self.time,
            residual,
            clamped_forces,
        })
    }

    fn accumulate_wrenches(&mut self) -> usize {
        self.wrenches.clear();
        self.wrenches.resize(self.bodies.len(), Wrench::zero());

        let mut clamped = 0;
        for slot in &mut self.generators {
            let sample = slot.generator.evaluate(&self.bodies);
            if sample.clamped {
                clamped += 1;
                if !slot.clamp_reported {
                    warn!(
                        body = %slot.generator.body,
                        law = slot.generator.law.name(),
                        "force law distance clamped"
                    );
                    slot.clamp_reported = true;
                }
            }
            self.wrenches[slot.generator.body.index()] += sample.wrench;
        }

        for (body, wrench) in self.bodies.iter().zip(self.wrenches.iter_mut()) {
            if body.is_fixed() {
                *wrench = Wrench::zero();
            } else {
                wrench.force += self.gravity * body.mass();
            }
        }
        clamped
    }

    fn restore_snapshot(&mut self) {
        for (body, state) in self.bodies.iter_mut().zip(&self.snapshot) {
            *body.state_mut() = *state;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::force::ForceLaw;
    use crate::physics::integrator::RungeKutta4;
    use approx::assert_relative_eq;

    #[test]
    fn rejects_bad_timesteps() {
        let mut world = World::new();
        assert_eq!(world.step(-0.1), Err(SimError::InvalidTimestep(-0.1)));
        assert!(matches!(world.step(f64::NAN), Err(SimError::InvalidTimestep(_))));
        assert_eq!(world.time(), 0.0);
    }

    #[test]
    fn uniform_gravity_skips_fixed_bodies() {
        let mut world = World::new().with_gravity(Vec3::new(0.0, -1.0, 0.0)).unwrap();
        let anchor = world.add_body(BodyDesc::point("anchor", 1.0).fixed()).unwrap();
        let ball = world.add_body(BodyDesc::point("ball", 1.0)).unwrap();
        world.step(0.5).unwrap();
        assert_eq!(world.pose(anchor).unwrap().position, Vec3::zero());
        assert!(world.pose(ball).unwrap().position.y < 0.0);
        assert_relative_eq!(world.time(), 0.5);
    }

    #[test]
    fn rk4_world_refuses_joints() {
        let mut world = World::new().with_integrator(RungeKutta4::new()).unwrap();
        let a = world.add_body(BodyDesc::point("a", 1.0)).unwrap();
        let b = world.add_body(BodyDesc::point("b", 1.0).at(Vec3::unit_y())).unwrap();
        let err = world
            .add_joint(JointSpec::prismatic(a, b, Vec3::zero(), Vec3::unit_y()))
            .unwrap_err();
        assert!(matches!(err, SimError::UnsupportedIntegrator { feature: "joints", .. }));
    }

    #[test]
    fn generator_validation() {
        let mut world = World::new();
        let a = world.add_body(BodyDesc::point("a", 1.0)).unwrap();
        let missing = BodyId(7);
        assert_eq!(
            world.add_force_generator(ForceGenerator::new(missing, ForceLaw::gravity(1.0))),
            Err(SimError::UnknownBody(missing))
        );
        assert_eq!(
            world.add_force_generator(ForceGenerator::new(a, ForceLaw::gravity(1.0)).towards(a)),
            Err(SimError::SameBody(a))
        );
    }

    #[test]
    fn clamped_generator_is_counted_and_stays_finite() {
        let mut world = World::new();
        let p = world.add_body(BodyDesc::point("p", 1.0)).unwrap();
        world
            .add_force_generator(ForceGenerator::new(p, ForceLaw::gravity(1.0)))
            .unwrap();
        let report = world.step(0.01).unwrap();
        assert_eq!(report.clamped_forces, 1);
        assert!(world.state(p).unwrap().is_finite());
    }

    #[test]
    fn monitor_warns_on_powers_of_two() {
        let mut monitor = ResidualMonitor::new(0.1);
        let warned: Vec<bool> = (0..9).map(|i| monitor.observe(1.0, i as f64)).collect();
        assert_eq!(
            warned,
            vec![true, true, false, true, false, false, false, true, false]
        );
        assert!(!monitor.observe(0.0, 9.0));
        assert_eq!(monitor.consecutive(), 0);
    }
}
