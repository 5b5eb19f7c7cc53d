use super::{Quat, Vec3};
use nalgebra as na;
use serde::{Deserialize, Serialize};

/// Position and orientation of a rigid body, or of a frame attached to one.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Pose {
    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub fn identity() -> Self {
        Self {
            position: Vec3::zero(),
            orientation: Quat::identity(),
        }
    }

    pub fn transform_point(&self, point: &Vec3) -> Vec3 {
        self.orientation.rotate_vector(point) + self.position
    }

    pub fn transform_vector(&self, vector: &Vec3) -> Vec3 {
        self.orientation.rotate_vector(vector)
    }

    /// World point expressed in this frame.
    pub fn inverse_transform_point(&self, point: &Vec3) -> Vec3 {
        self.orientation.inverse_rotate_vector(&(*point - self.position))
    }

    pub fn inverse_transform_vector(&self, vector: &Vec3) -> Vec3 {
        self.orientation.inverse_rotate_vector(vector)
    }

    pub fn inverse(&self) -> Self {
        let inv_orientation = self.orientation.conjugate();
        let inv_position = inv_orientation.rotate_vector(&self.position) * -1.0;
        Self::new(inv_position, inv_orientation)
    }

    pub fn rotation_matrix(&self) -> na::Matrix3<f64> {
        self.orientation.to_rotation_matrix()
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.orientation.is_finite()
    }
}
