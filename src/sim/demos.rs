use crate::config::{SimulationConfig, VehicleConfig};
use crate::error::SimResult;
use crate::math::Vec3;
use crate::physics::{
    BodyDesc, CollisionShape, ContactMaterial, ForceGenerator, ForceLaw, JointSpec, RungeKutta4,
};
use crate::sim::mesh::MeshKind;
use crate::sim::scene::{Scene, SceneBuilder};
use crate::sim::vehicle::Vehicle;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Height of the ground slab centre shared by the contact demos.
pub const GROUND_Y: f64 = -0.5;
pub const GROUND_THICKNESS: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Demo {
    /// Particle orbiting a fixed attractor under an inverse-square law.
    Orbit,
    /// Cuboid spinning close to its intermediate principal axis.
    Tumble,
    /// Two blocks on a vertical prismatic joint with a spring-damper.
    Spring,
    /// Cylinder rolling along a long ground slab.
    Wheel,
    /// Chassis on four sprung wheels resting on the ground.
    Vehicle,
}

impl Demo {
    pub const ALL: [Demo; 5] = [Demo::Orbit, Demo::Tumble, Demo::Spring, Demo::Wheel, Demo::Vehicle];

    pub fn name(&self) -> &'static str {
        match self {
            Demo::Orbit => "orbit",
            Demo::Tumble => "tumble",
            Demo::Spring => "spring",
            Demo::Wheel => "wheel",
            Demo::Vehicle => "vehicle",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Demo::Orbit => "Orbiting mass",
            Demo::Tumble => "Tumbling cuboid",
            Demo::Spring => "Spring-damper system",
            Demo::Wheel => "Rolling wheel",
            Demo::Vehicle => "Vehicle suspension",
        }
    }

    pub fn build(&self, config: &SimulationConfig) -> SimResult<Scene> {
        self.build_with(config, &VehicleConfig::default())
    }

    pub fn build_with(&self, config: &SimulationConfig, vehicle: &VehicleConfig) -> SimResult<Scene> {
        let builder = SceneBuilder::new(self.name(), config)?;
        let builder = if config.window.title.is_none() {
            builder.title(self.title())
        } else {
            builder
        };
        match self {
            Demo::Orbit => orbit(builder),
            Demo::Tumble => tumble(builder),
            Demo::Spring => spring(builder),
            Demo::Wheel => wheel(builder),
            Demo::Vehicle => vehicle_scene(builder, vehicle),
        }
    }
}

impl fmt::Display for Demo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn ground(builder: &mut SceneBuilder, width: f64, depth: f64, material: ContactMaterial) -> SimResult<()> {
    builder.scenery(
        BodyDesc::new("ground", 1e6, Vec3::new(1e5, 1e5, 1e5))
            .at(Vec3::new(0.0, GROUND_Y, 0.0))
            .with_shape(
                CollisionShape::Box {
                    a: width,
                    b: GROUND_THICKNESS,
                    c: depth,
                },
                material,
            )
            .fixed(),
        MeshKind::Cuboid {
            a: width as f32,
            b: GROUND_THICKNESS as f32,
            c: depth as f32,
        },
    )?;
    Ok(())
}

fn orbit(mut builder: SceneBuilder) -> SimResult<Scene> {
    let g = 1.0;
    let radius = 0.5;
    let sun = builder.scenery(BodyDesc::point("attractor", 1.0).fixed(), MeshKind::Point { size: 0.04 })?;
    let planet = builder.body(
        BodyDesc::point("planet", 1.0)
            .at(Vec3::new(radius, 0.0, 0.0))
            .with_velocity(Vec3::new(0.0, (g / radius).sqrt(), 0.0)),
        MeshKind::Point { size: 0.02 },
    )?;
    builder.force(ForceGenerator::new(planet, ForceLaw::gravity(g).with_min_distance(0.01)).towards(sun))?;
    Ok(builder.build())
}

fn tumble(builder: SceneBuilder) -> SimResult<Scene> {
    let (a, b, c) = (0.3, 0.03, 0.08);
    let mut builder = builder.integrator(RungeKutta4::new())?;
    builder.body(
        BodyDesc::cuboid("cuboid", 10.0, a, b, c).with_angular_velocity(Vec3::new(0.05, 0.0, 3.0)),
        MeshKind::Cuboid {
            a: a as f32,
            b: b as f32,
            c: c as f32,
        },
    )?;
    Ok(builder.build())
}

fn spring(builder: SceneBuilder) -> SimResult<Scene> {
    let side = 0.1;
    let material = ContactMaterial::default();
    let mut builder = builder.gravity(Vec3::new(0.0, -0.4, 0.0))?;
    let cube = MeshKind::Cuboid {
        a: side as f32,
        b: side as f32,
        c: side as f32,
    };

    let upper = builder.body(
        BodyDesc::cuboid("upper", 1000.0, side, side, side).at(Vec3::new(0.0, 0.6, 0.0)),
        cube,
    )?;
    let lower = builder.body(
        BodyDesc::cuboid("lower", 10.0, side, side, side)
            .at(Vec3::new(0.0, 0.3, 0.0))
            .with_shape(CollisionShape::Box { a: side, b: side, c: side }, material),
        cube,
    )?;
    let upper_pos = Vec3::new(0.0, 0.6, 0.0);
    let lower_pos = Vec3::new(0.0, 0.3, 0.0);
    builder.joint(JointSpec::spring_damper(upper, lower, upper_pos, lower_pos, 10_000.0, 1_000.0))?;
    builder.joint(JointSpec::prismatic(upper, lower, upper_pos, Vec3::unit_y()))?;
    ground(&mut builder, 2.0, 2.0, material)?;
    Ok(builder.build())
}

fn wheel(builder: SceneBuilder) -> SimResult<Scene> {
    let (mass, radius, length) = (0.5, 0.1, 0.2);
    let material = ContactMaterial::default();
    let mut builder = builder.gravity(Vec3::new(0.0, -0.8, 0.0))?;
    let body = builder.body(
        BodyDesc::cylinder("wheel", mass, radius, length)
            .at(Vec3::new(0.0, 0.2, 0.0))
            .with_velocity(Vec3::new(5.0, 0.0, 0.0))
            .with_shape(CollisionShape::Cylinder { radius, length }, material),
        MeshKind::Cylinder {
            radius: radius as f32,
            length: length as f32,
            segments: 32,
        },
    )?;
    builder.wrap_x(body, 1.0);
    ground(&mut builder, 200.0, 2.0, material)?;
    Ok(builder.build())
}

fn vehicle_scene(builder: SceneBuilder, config: &VehicleConfig) -> SimResult<Scene> {
    let mut builder = builder.gravity(Vec3::new(0.0, -0.25, 0.0))?;
    let vehicle = Vehicle::assemble(builder.world_mut(), config)?;
    for item in vehicle.render_items(config) {
        builder.item(item);
    }
    ground(&mut builder, 4.0, 2.0, config.material)?;
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_demo_builds() {
        let config = SimulationConfig::headless(1);
        for demo in Demo::ALL {
            let scene = demo.build(&config).unwrap();
            assert!(!scene.items.is_empty(), "{demo} has nothing to draw");
            assert_eq!(scene.window.title.as_deref(), Some(demo.title()));
        }
    }

    #[test]
    fn configured_title_is_kept_even_when_it_matches_the_default() {
        let mut config = SimulationConfig::headless(1);
        config.window.title = Some("mechsim".to_string());
        let scene = Demo::Spring.build(&config).unwrap();
        assert_eq!(scene.window.title.as_deref(), Some("mechsim"));
        assert_eq!(scene.window.title_or_default(), "mechsim");
    }

    #[test]
    fn tumble_uses_rk4_and_vehicle_uses_xpbd() {
        let config = SimulationConfig::headless(1);
        assert_eq!(Demo::Tumble.build(&config).unwrap().world.integrator_name(), "rk4");
        assert_eq!(Demo::Vehicle.build(&config).unwrap().world.integrator_name(), "xpbd");
    }

    #[test]
    fn wheel_is_wrapped_and_ground_is_scenery() {
        let scene = Demo::Wheel.build(&SimulationConfig::headless(1)).unwrap();
        let wheel = scene.items.iter().find(|i| i.label == "wheel").unwrap();
        assert_eq!(wheel.wrap_x, Some(1.0));
        let ground = scene.items.iter().find(|i| i.label == "ground").unwrap();
        assert!(ground.scenery);
    }
}
