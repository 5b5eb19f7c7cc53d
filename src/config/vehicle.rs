use crate::error::ConfigError;
use crate::math::Vec3;
use crate::physics::ContactMaterial;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChassisConfig {
    pub mass: f64,
    /// Box edge lengths along X, Y, Z.
    pub size: [f64; 3],
    pub position: [f64; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WheelConfig {
    pub mass: f64,
    pub radius: f64,
    pub width: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuspensionConfig {
    pub stiffness: f64,
    pub damping: f64,
    /// Spring top anchor on the chassis, relative to the wheel centre.
    pub anchor_offset: [f64; 3],
    /// Suspension travel direction in the chassis frame.
    pub axis: [f64; 3],
}

/// Chassis with `wheel_count` wheels on prismatic, sprung suspension.
///
/// Wheels are laid out in `wheel_count / 2` axles evenly spaced over
/// `wheelbase`, each axle carrying one wheel per side at `±track / 2`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleConfig {
    pub name: String,
    pub chassis: ChassisConfig,
    pub wheel: WheelConfig,
    pub suspension: SuspensionConfig,
    pub wheel_count: usize,
    pub wheelbase: f64,
    pub track: f64,
    /// Wheel centre height below the chassis centre.
    pub wheel_drop: f64,
    pub material: ContactMaterial,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self::four_wheeler()
    }
}

impl VehicleConfig {
    pub fn four_wheeler() -> Self {
        Self {
            name: "vehicle".to_string(),
            chassis: ChassisConfig {
                mass: 10.0,
                size: [0.8, 0.1, 0.4],
                position: [0.0, -0.14, 0.0],
            },
            wheel: WheelConfig {
                mass: 0.2,
                radius: 0.1,
                width: 0.05,
            },
            suspension: SuspensionConfig {
                stiffness: 100.0,
                damping: 10.0,
                anchor_offset: [0.0, 0.15, 0.0],
                axis: [0.0, 1.0, 0.0],
            },
            wheel_count: 4,
            wheelbase: 0.6,
            track: 0.5,
            wheel_drop: 0.15,
            material: ContactMaterial::default(),
        }
    }

    pub fn six_wheeler() -> Self {
        Self {
            name: "six-wheeler".to_string(),
            chassis: ChassisConfig {
                mass: 15.0,
                size: [1.2, 0.1, 0.4],
                position: [0.0, -0.14, 0.0],
            },
            wheel_count: 6,
            wheelbase: 1.0,
            ..Self::four_wheeler()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Wheel centre relative to the chassis centre, by wheel index.
    ///
    /// Even indices are on the left (`-z`), odd on the right; index / 2 counts
    /// axles from the front (`+x`).
    pub fn wheel_offset(&self, index: usize) -> Vec3 {
        let axles = (self.wheel_count / 2).max(1);
        let axle = index / 2;
        let x = if axles == 1 {
            0.0
        } else {
            0.5 * self.wheelbase - self.wheelbase * axle as f64 / (axles - 1) as f64
        };
        let side = if index % 2 == 0 { -0.5 } else { 0.5 };
        Vec3::new(x, -self.wheel_drop, side * self.track)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("chassis.mass", self.chassis.mass),
            ("wheel.mass", self.wheel.mass),
            ("wheel.radius", self.wheel.radius),
            ("wheel.width", self.wheel.width),
            ("suspension.stiffness", self.suspension.stiffness),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("must be positive, got {value}"),
                });
            }
        }
        if !(self.suspension.damping.is_finite() && self.suspension.damping >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "suspension.damping",
                reason: format!("must be non-negative, got {}", self.suspension.damping),
            });
        }
        if self.chassis.size.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(ConfigError::Invalid {
                field: "chassis.size",
                reason: "edge lengths must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn four_wheel_layout_is_front_back_left_right() {
        let config = VehicleConfig::four_wheeler();
        let expected = [(0.3, -0.25), (0.3, 0.25), (-0.3, -0.25), (-0.3, 0.25)];
        for (index, (x, z)) in expected.iter().enumerate() {
            let offset = config.wheel_offset(index);
            assert_relative_eq!(offset.x, *x, epsilon = 1e-12);
            assert_relative_eq!(offset.y, -0.15, epsilon = 1e-12);
            assert_relative_eq!(offset.z, *z, epsilon = 1e-12);
        }
    }

    #[test]
    fn six_wheeler_has_a_middle_axle() {
        let config = VehicleConfig::six_wheeler();
        assert_relative_eq!(config.wheel_offset(2).x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(config.wheel_offset(5).x, -0.5, epsilon = 1e-12);
    }

    #[test]
    fn rejects_negative_damping() {
        let mut config = VehicleConfig::default();
        config.suspension.damping = -1.0;
        assert!(config.validate().is_err());
    }
}
