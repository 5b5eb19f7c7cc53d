use crate::error::ConfigError;
use crate::physics::solver::{DEFAULT_ITERATIONS, DEFAULT_SUBSTEPS};
use crate::physics::world::DEFAULT_RESIDUAL_TOLERANCE;
use crate::physics::Xpbd;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How the frame loop turns elapsed wall time into world steps.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TimestepPolicy {
    /// One step per frame with the measured, unclamped frame time.
    #[default]
    WallClock,
    /// Fixed ticks drawn from an accumulator of elapsed time.
    Fixed { tick: f64, max_steps_per_frame: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub substeps: usize,
    pub iterations: usize,
    pub residual_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            substeps: DEFAULT_SUBSTEPS,
            iterations: DEFAULT_ITERATIONS,
            residual_tolerance: DEFAULT_RESIDUAL_TOLERANCE,
        }
    }
}

impl SolverConfig {
    pub fn xpbd(&self) -> Xpbd {
        Xpbd::new(self.substeps, self.iterations)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title; demos supply their own when unset.
    pub title: Option<String>,
    pub width: u32,
    pub height: u32,
}

/// Title used when neither the config nor the scene names the window.
pub const DEFAULT_WINDOW_TITLE: &str = "mechsim";

impl WindowConfig {
    pub fn title_or_default(&self) -> &str {
        self.title.as_deref().unwrap_or(DEFAULT_WINDOW_TITLE)
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: None,
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub timestep: TimestepPolicy,
    pub solver: SolverConfig,
    pub window: WindowConfig,
    /// Headless runs close after this many frames.
    pub max_frames: Option<u64>,
    /// Headless frame pacing in seconds, standing in for the display refresh.
    pub frame_interval: Option<f64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            timestep: TimestepPolicy::WallClock,
            solver: SolverConfig::default(),
            window: WindowConfig::default(),
            max_frames: None,
            frame_interval: None,
        }
    }
}

impl SimulationConfig {
    /// Real-time coupling to the display, as the demos run in a window.
    pub fn interactive() -> Self {
        Self::default()
    }

    /// Deterministic offscreen run: fixed 60 Hz ticks, no pacing.
    pub fn headless(frames: u64) -> Self {
        Self {
            timestep: TimestepPolicy::Fixed {
                tick: 1.0 / 60.0,
                max_steps_per_frame: 4,
            },
            max_frames: Some(frames),
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let TimestepPolicy::Fixed {
            tick,
            max_steps_per_frame,
        } = self.timestep
        {
            if !(tick.is_finite() && tick > 0.0) {
                return Err(ConfigError::Invalid {
                    field: "timestep.tick",
                    reason: format!("must be a positive number of seconds, got {tick}"),
                });
            }
            if max_steps_per_frame == 0 {
                return Err(ConfigError::Invalid {
                    field: "timestep.max_steps_per_frame",
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        if self.solver.substeps == 0 || self.solver.iterations == 0 {
            return Err(ConfigError::Invalid {
                field: "solver",
                reason: "substeps and iterations must be at least 1".to_string(),
            });
        }
        if !(self.solver.residual_tolerance.is_finite() && self.solver.residual_tolerance > 0.0) {
            return Err(ConfigError::Invalid {
                field: "solver.residual_tolerance",
                reason: format!("must be positive, got {}", self.solver.residual_tolerance),
            });
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid {
                field: "window",
                reason: "width and height must be non-zero".to_string(),
            });
        }
        if let Some(interval) = self.frame_interval {
            if !(interval.is_finite() && interval >= 0.0) {
                return Err(ConfigError::Invalid {
                    field: "frame_interval",
                    reason: format!("must be non-negative, got {interval}"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_toml_over_defaults() {
        let config = SimulationConfig::from_toml_str(
            r#"
            max_frames = 120

            [timestep]
            mode = "fixed"
            tick = 0.005
            max_steps_per_frame = 8

            [window]
            title = "suspension"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.timestep,
            TimestepPolicy::Fixed {
                tick: 0.005,
                max_steps_per_frame: 8
            }
        );
        assert_eq!(config.max_frames, Some(120));
        assert_eq!(config.window.title.as_deref(), Some("suspension"));
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.solver, SolverConfig::default());
    }

    #[test]
    fn rejects_zero_tick() {
        let err = SimulationConfig::from_toml_str(
            r#"
            [timestep]
            mode = "fixed"
            tick = 0.0
            max_steps_per_frame = 1
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "timestep.tick", .. }));
    }

    #[test]
    fn presets_are_valid() {
        SimulationConfig::interactive().validate().unwrap();
        SimulationConfig::headless(10).validate().unwrap();
    }
}
