pub mod demos;
pub mod frame_loop;
pub mod mesh;
pub mod render;
pub mod scene;
pub mod telemetry;
pub mod vehicle;
pub mod visualization;

pub use demos::Demo;
pub use frame_loop::{Clock, FrameLoop, LoopState, ManualClock, RunSummary, WallClock};
pub use mesh::{Mesh, MeshKind};
pub use render::{Frame, HeadlessRenderer, LocalAxis, PoseSample, RenderBridge, RenderItem};
pub use scene::{Scene, SceneBuilder};
pub use telemetry::{TelemetryLog, TelemetryRecord};
pub use vehicle::{Vehicle, Wheel};
pub use visualization::{Visualization, WindowBridge};
