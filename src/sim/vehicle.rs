//! Chassis + N wheels, each on a prismatic joint with a parallel spring-damper.

use crate::config::VehicleConfig;
use crate::error::{SimError, SimResult};
use crate::math::Vec3;
use crate::physics::{BodyDesc, BodyId, CollisionShape, JointId, JointSpec, World};
use crate::sim::mesh::MeshKind;
use crate::sim::render::RenderItem;
use tracing::{debug, info, warn};

const WHEEL_SEGMENTS: u32 = 24;

#[derive(Debug, Clone, PartialEq)]
pub struct Wheel {
    pub body: BodyId,
    pub label: String,
    pub prismatic: JointId,
    pub spring: JointId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vehicle {
    pub chassis: BodyId,
    pub wheels: Vec<Wheel>,
}

/// Human-readable position of wheel `index` out of `count`.
pub fn wheel_label(index: usize, count: usize) -> String {
    let axles = (count / 2).max(1);
    let axle = index / 2;
    let side = if index % 2 == 0 { "left" } else { "right" };
    let position = match axle {
        0 => "front".to_string(),
        a if a + 1 == axles => "rear".to_string(),
        a => format!("middle{a}"),
    };
    format!("wheel-{position}-{side}")
}

impl Vehicle {
    /// Add the chassis, its wheels and their suspension joints to `world`.
    ///
    /// The mechanism is checked before anything is added, and a body or
    /// joint rejected midway is rolled back, so an error leaves `world`
    /// untouched.
    pub fn assemble(world: &mut World, config: &VehicleConfig) -> SimResult<Self> {
        Self::check_geometry(config)?;
        if !world.supports_constraints() {
            return Err(SimError::UnsupportedIntegrator {
                integrator: world.integrator_name(),
                feature: "joints",
            });
        }

        let (bodies, joints) = (world.bodies().len(), world.joints().len());
        let assembled = Self::mount(world, config);
        if let Err(e) = &assembled {
            world.truncate(bodies, joints);
            warn!(vehicle = %config.name, error = %e, "vehicle assembly rolled back");
        }
        assembled
    }

    fn mount(world: &mut World, config: &VehicleConfig) -> SimResult<Self> {
        let size = config.chassis.size;
        let chassis_position = Vec3::from_array(config.chassis.position);
        let chassis = world.add_body(
            BodyDesc::cuboid(
                format!("{}-chassis", config.name),
                config.chassis.mass,
                size[0],
                size[1],
                size[2],
            )
            .at(chassis_position)
            .with_shape(
                CollisionShape::Box {
                    a: size[0],
                    b: size[1],
                    c: size[2],
                },
                config.material,
            ),
        )?;

        let axis = Vec3::from_array(config.suspension.axis);
        let anchor_offset = Vec3::from_array(config.suspension.anchor_offset);
        let mut wheels = Vec::with_capacity(config.wheel_count);
        for index in 0..config.wheel_count {
            let label = wheel_label(index, config.wheel_count);
            let center = chassis_position + config.wheel_offset(index);
            let body = world.add_body(
                BodyDesc::cylinder(
                    format!("{}-{label}", config.name),
                    config.wheel.mass,
                    config.wheel.radius,
                    config.wheel.width,
                )
                .at(center)
                .with_shape(
                    CollisionShape::Cylinder {
                        radius: config.wheel.radius,
                        length: config.wheel.width,
                    },
                    config.material,
                ),
            )?;
            let prismatic = world.add_joint(JointSpec::prismatic(chassis, body, center, axis))?;
            let spring = world.add_joint(JointSpec::spring_damper(
                chassis,
                body,
                center + anchor_offset,
                center,
                config.suspension.stiffness,
                config.suspension.damping,
            ))?;
            debug!(wheel = %label, body = %body, "wheel mounted");
            wheels.push(Wheel {
                body,
                label,
                prismatic,
                spring,
            });
        }

        info!(
            vehicle = %config.name,
            wheels = wheels.len(),
            stiffness = config.suspension.stiffness,
            damping = config.suspension.damping,
            "vehicle assembled"
        );
        Ok(Self { chassis, wheels })
    }

    fn check_geometry(config: &VehicleConfig) -> SimResult<()> {
        let inconsistent = |reason| SimError::InconsistentMechanism {
            mechanism: config.name.clone(),
            reason,
        };
        if config.wheel_count < 2 || config.wheel_count % 2 != 0 {
            return Err(inconsistent("wheel count must be even and at least two"));
        }
        let Some((axis, _)) = Vec3::from_array(config.suspension.axis).normalize_with_length() else {
            return Err(SimError::DegenerateJoint {
                reason: "prismatic axis has zero length",
            });
        };
        let Some((spring, _)) = Vec3::from_array(config.suspension.anchor_offset).normalize_with_length()
        else {
            return Err(inconsistent("spring anchors coincide"));
        };
        if spring.dot(&axis).abs() < 1e-6 {
            return Err(inconsistent(
                "spring has no component along the suspension axis",
            ));
        }
        Ok(())
    }

    pub fn render_items(&self, config: &VehicleConfig) -> Vec<RenderItem> {
        let size = config.chassis.size;
        let mut items = vec![RenderItem::new(
            self.chassis,
            format!("{}-chassis", config.name),
            MeshKind::Cuboid {
                a: size[0] as f32,
                b: size[1] as f32,
                c: size[2] as f32,
            },
        )];
        items.extend(self.wheels.iter().map(|w| {
            RenderItem::new(
                w.body,
                format!("{}-{}", config.name, w.label),
                MeshKind::Cylinder {
                    radius: config.wheel.radius as f32,
                    length: config.wheel.width as f32,
                    segments: WHEEL_SEGMENTS,
                },
            )
        }));
        items
    }

    /// Height of the chassis centre above the world origin.
    pub fn chassis_height(&self, world: &World) -> Option<f64> {
        world.pose(self.chassis).map(|p| p.position.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{Joint, RungeKutta4};

    #[test]
    fn four_wheeler_has_two_joints_per_wheel() {
        let mut world = World::new();
        let config = VehicleConfig::four_wheeler();
        let vehicle = Vehicle::assemble(&mut world, &config).unwrap();
        assert_eq!(vehicle.wheels.len(), 4);
        assert_eq!(world.bodies().len(), 5);
        assert_eq!(world.joints().len(), 8);

        let labels: Vec<&str> = vehicle.wheels.iter().map(|w| w.label.as_str()).collect();
        assert_eq!(
            labels,
            ["wheel-front-left", "wheel-front-right", "wheel-rear-left", "wheel-rear-right"]
        );
        for wheel in &vehicle.wheels {
            let Some(Joint::SpringDamper(spring)) = world.joint(wheel.spring) else {
                panic!("expected a spring-damper");
            };
            assert!((spring.rest_length - 0.15).abs() < 1e-12);
        }
    }

    #[test]
    fn horizontal_spring_is_rejected_before_assembly() {
        let mut world = World::new();
        let mut config = VehicleConfig::four_wheeler();
        config.suspension.anchor_offset = [0.1, 0.0, 0.0];
        let err = Vehicle::assemble(&mut world, &config).unwrap_err();
        assert!(matches!(err, SimError::InconsistentMechanism { .. }));
        assert!(world.bodies().is_empty());
    }

    #[test]
    fn failed_wheel_is_rolled_back() {
        let mut world = World::new();
        let mut config = VehicleConfig::four_wheeler();
        config.wheel.mass = 0.0;
        let err = Vehicle::assemble(&mut world, &config).unwrap_err();
        assert!(matches!(err, SimError::InvalidMass { .. }));
        assert!(world.bodies().is_empty());
        assert!(world.joints().is_empty());

        // The world stays usable for a valid assembly afterwards.
        let vehicle = Vehicle::assemble(&mut world, &VehicleConfig::four_wheeler()).unwrap();
        assert_eq!(vehicle.chassis.index(), 0);
        assert_eq!(world.bodies().len(), 5);
    }

    #[test]
    fn rk4_world_is_rejected_before_assembly() {
        let mut world = World::new().with_integrator(RungeKutta4::new()).unwrap();
        let err = Vehicle::assemble(&mut world, &VehicleConfig::four_wheeler()).unwrap_err();
        assert!(matches!(err, SimError::UnsupportedIntegrator { feature: "joints", .. }));
        assert!(world.bodies().is_empty());
    }

    #[test]
    fn odd_wheel_count_is_rejected() {
        let mut world = World::new();
        let mut config = VehicleConfig::four_wheeler();
        config.wheel_count = 3;
        assert!(Vehicle::assemble(&mut world, &config).is_err());
    }

    #[test]
    fn render_items_cover_every_body() {
        let mut world = World::new();
        let config = VehicleConfig::six_wheeler();
        let vehicle = Vehicle::assemble(&mut world, &config).unwrap();
        let items = vehicle.render_items(&config);
        assert_eq!(items.len(), 7);
        assert_eq!(wheel_label(2, 6), "wheel-middle1-left");
    }
}
