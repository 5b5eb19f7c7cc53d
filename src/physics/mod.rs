pub mod body;
pub mod contact;
pub mod force;
pub mod integrator;
pub mod joint;
pub mod solver;
pub mod world;

pub use body::{Body, BodyDesc, BodyId, BodyState};
pub use contact::{CollisionShape, ContactMaterial};
pub use force::{ForceGenerator, ForceLaw, Wrench};
pub use integrator::{Integrator, RungeKutta4};
pub use joint::{Joint, JointId, JointSpec};
pub use solver::Xpbd;
pub use world::{ResidualMonitor, StepReport, World};
