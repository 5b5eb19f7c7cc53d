use crate::physics::{BodyId, JointId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("unknown body {0}")]
    UnknownBody(BodyId),

    #[error("joint endpoints must be two different bodies, got {0} twice")]
    SameBody(BodyId),

    #[error("body '{name}' has invalid mass {mass}")]
    InvalidMass { name: String, mass: f64 },

    #[error("body '{name}' has a non-positive or non-finite inertia diagonal")]
    InvalidInertia { name: String },

    #[error("body '{name}' has a zero-length orientation quaternion")]
    DegenerateOrientation { name: String },

    #[error("non-finite value in {what}")]
    NonFinite { what: &'static str },

    #[error("invalid timestep {0}")]
    InvalidTimestep(f64),

    #[error("step produced a non-finite state for body {body}; step rolled back")]
    NonFiniteState { body: BodyId },

    #[error("degenerate joint: {reason}")]
    DegenerateJoint { reason: &'static str },

    #[error("force law parameter out of range: {reason}")]
    InvalidForceLaw { reason: &'static str },

    #[error("{integrator} integrator cannot handle {feature}")]
    UnsupportedIntegrator {
        integrator: &'static str,
        feature: &'static str,
    },

    #[error("unknown joint {0}")]
    UnknownJoint(JointId),

    #[error("mechanism '{mechanism}' is inconsistent: {reason}")]
    InconsistentMechanism {
        mechanism: String,
        reason: &'static str,
    },
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("mesh '{mesh}' is invalid: {reason}")]
    InvalidMesh { mesh: String, reason: String },

    #[error("render pipeline failed to build: {0}")]
    Pipeline(String),

    #[error("render backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

/// Failure while driving the frame loop.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error(transparent)]
    Sim(#[from] SimError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

pub type SimResult<T> = Result<T, SimError>;
