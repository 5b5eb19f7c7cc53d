pub mod simulation;
pub mod vehicle;

pub use simulation::{SimulationConfig, SolverConfig, TimestepPolicy, WindowConfig};
pub use vehicle::{ChassisConfig, SuspensionConfig, VehicleConfig, WheelConfig};
