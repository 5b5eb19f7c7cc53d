//! Rigid-body mechanism demos: a world of bodies, joints and force laws,
//! stepped by an integrator and shown through a render bridge.

pub mod config;
pub mod error;
pub mod logging;
pub mod math;
pub mod physics;
pub mod sim;

pub use config::{SimulationConfig, TimestepPolicy, VehicleConfig};
pub use error::{ConfigError, LoopError, RenderError, SimError, SimResult};
pub use physics::{BodyDesc, BodyId, JointSpec, World};
pub use sim::{Demo, FrameLoop, HeadlessRenderer, RenderBridge, Scene};
