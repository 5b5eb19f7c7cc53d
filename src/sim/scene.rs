use crate::config::{SimulationConfig, WindowConfig};
use crate::error::SimResult;
use crate::math::Vec3;
use crate::physics::{BodyDesc, BodyId, ForceGenerator, Integrator, JointId, JointSpec, World};
use crate::sim::frame_loop::{Clock, FrameLoop};
use crate::sim::mesh::MeshKind;
use crate::sim::render::RenderItem;
use tracing::info;

/// An assembled mechanism plus what to draw of it.
pub struct Scene {
    pub name: String,
    pub window: WindowConfig,
    pub world: World,
    pub items: Vec<RenderItem>,
}

impl Scene {
    pub fn body_id(&self, label: &str) -> Option<BodyId> {
        self.items.iter().find(|i| i.label == label).map(|i| i.body)
    }

    pub fn into_frame_loop(self, config: &SimulationConfig) -> FrameLoop {
        FrameLoop::new(self.world, self.items, config.timestep)
    }

    pub fn into_frame_loop_with_clock<C: Clock>(self, config: &SimulationConfig, clock: C) -> FrameLoop<C> {
        FrameLoop::with_clock(self.world, self.items, config.timestep, clock)
    }
}

/// Collects bodies, joints and force laws together with their render spec.
pub struct SceneBuilder {
    name: String,
    window: WindowConfig,
    world: World,
    items: Vec<RenderItem>,
}

impl SceneBuilder {
    /// Starts from the solver, residual tolerance and window of `config`.
    pub fn new(name: impl Into<String>, config: &SimulationConfig) -> SimResult<Self> {
        let world = World::new()
            .with_integrator(config.solver.xpbd())?
            .with_residual_tolerance(config.solver.residual_tolerance);
        Ok(Self {
            name: name.into(),
            window: config.window.clone(),
            world,
            items: Vec::new(),
        })
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.window.title = Some(title.into());
        self
    }

    pub fn gravity(mut self, gravity: Vec3) -> SimResult<Self> {
        self.world.set_gravity(gravity)?;
        Ok(self)
    }

    pub fn integrator(mut self, integrator: impl Integrator + 'static) -> SimResult<Self> {
        self.world.set_integrator(Box::new(integrator))?;
        Ok(self)
    }

    /// Add a body drawn with `mesh` and updated every frame.
    pub fn body(&mut self, desc: BodyDesc, mesh: MeshKind) -> SimResult<BodyId> {
        let label = desc.name.clone();
        let id = self.world.add_body(desc)?;
        self.items.push(RenderItem::new(id, label, mesh));
        Ok(id)
    }

    /// Add a body drawn once as static scenery.
    pub fn scenery(&mut self, desc: BodyDesc, mesh: MeshKind) -> SimResult<BodyId> {
        let label = desc.name.clone();
        let id = self.world.add_body(desc)?;
        self.items.push(RenderItem::new(id, label, mesh).scenery());
        Ok(id)
    }

    pub fn item(&mut self, item: RenderItem) {
        self.items.push(item);
    }

    pub fn joint(&mut self, spec: JointSpec) -> SimResult<JointId> {
        self.world.add_joint(spec)
    }

    pub fn force(&mut self, generator: ForceGenerator) -> SimResult<()> {
        self.world.add_force_generator(generator)
    }

    /// Wrap the drawn x coordinate of `body` into `[-half_width, half_width)`.
    pub fn wrap_x(&mut self, body: BodyId, half_width: f32) {
        for item in self.items.iter_mut().filter(|i| i.body == body) {
            item.wrap_x = Some(half_width);
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn build(self) -> Scene {
        info!(
            scene = %self.name,
            bodies = self.world.bodies().len(),
            joints = self.world.joints().len(),
            generators = self.world.force_generators().count(),
            integrator = self.world.integrator_name(),
            "scene assembled"
        );
        Scene {
            name: self.name,
            window: self.window,
            world: self.world,
            items: self.items,
        }
    }
}
