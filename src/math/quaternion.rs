use super::Vec3;
use nalgebra as na;
use serde::{Deserialize, Serialize};

/// Rotation quaternion, scalar first. Orientations are kept at unit length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Quat {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quat {
    pub const fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    pub const fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation of `angle` radians about `axis` (need not be unit length).
    pub fn from_axis_angle(axis: &Vec3, angle: f64) -> Self {
        let axis = axis.normalize();
        let (s, c) = (angle * 0.5).sin_cos();
        Self::new(c, axis.x * s, axis.y * s, axis.z * s)
    }

    /// Rotation described by a rotation vector (axis scaled by angle).
    pub fn from_scaled_axis(v: &Vec3) -> Self {
        match v.normalize_with_length() {
            Some((axis, angle)) => Self::from_axis_angle(&axis, angle),
            None => Self::identity(),
        }
    }

    pub fn normalize(&self) -> Self {
        let mag = self.magnitude();
        Self::new(self.w / mag, self.x / mag, self.y / mag, self.z / mag)
    }

    pub fn magnitude(&self) -> f64 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn conjugate(&self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    pub fn vector_part(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    pub fn is_finite(&self) -> bool {
        self.w.is_finite() && self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn rotate_vector(&self, v: &Vec3) -> Vec3 {
        let qv = Self::new(0.0, v.x, v.y, v.z);
        let result = *self * qv * self.conjugate();
        Vec3::new(result.x, result.y, result.z)
    }

    pub fn inverse_rotate_vector(&self, v: &Vec3) -> Vec3 {
        self.conjugate().rotate_vector(v)
    }

    /// Time derivative for an angular velocity given in the body frame.
    pub fn derivative(&self, omega_body: &Vec3) -> Self {
        let omega_quat = Self::new(0.0, omega_body.x, omega_body.y, omega_body.z);
        (*self * omega_quat) * 0.5
    }

    /// First-order update by a world-frame rotation vector, renormalized.
    pub fn rotated_by_world(&self, rotation: &Vec3) -> Self {
        let dq = Self::new(0.0, rotation.x, rotation.y, rotation.z) * *self;
        let mut q = *self + dq * 0.5;
        q.renormalize();
        q
    }

    /// Smallest rotation vector taking `other` onto `self` (world frame).
    pub fn angle_difference(&self, other: &Quat) -> Vec3 {
        let dq = *self * other.conjugate();
        let v = dq.vector_part() * 2.0;
        if dq.w < 0.0 {
            -v
        } else {
            v
        }
    }

    pub fn renormalize(&mut self) {
        let mag = self.magnitude();
        if mag > 1e-10 {
            self.w /= mag;
            self.x /= mag;
            self.y /= mag;
            self.z /= mag;
        }
    }

    /// Rotation matrix whose columns are the local X/Y/Z axes in world frame.
    pub fn to_rotation_matrix(&self) -> na::Matrix3<f64> {
        let q = self.normalize();
        na::Matrix3::new(
            1.0 - 2.0 * (q.y * q.y + q.z * q.z),
            2.0 * (q.x * q.y - q.w * q.z),
            2.0 * (q.x * q.z + q.w * q.y),
            2.0 * (q.x * q.y + q.w * q.z),
            1.0 - 2.0 * (q.x * q.x + q.z * q.z),
            2.0 * (q.y * q.z - q.w * q.x),
            2.0 * (q.x * q.z - q.w * q.y),
            2.0 * (q.y * q.z + q.w * q.x),
            1.0 - 2.0 * (q.x * q.x + q.y * q.y),
        )
    }
}

impl std::ops::Mul for Quat {
    type Output = Self;
    fn mul(self, other: Self) -> Self {
        Self::new(
            self.w * other.w - self.x * other.x - self.y * other.y - self.z * other.z,
            self.w * other.x + self.x * other.w + self.y * other.z - self.z * other.y,
            self.w * other.y - self.x * other.z + self.y * other.w + self.z * other.x,
            self.w * other.z + self.x * other.y - self.y * other.x + self.z * other.w,
        )
    }
}

impl std::ops::Mul<f64> for Quat {
    type Output = Self;
    fn mul(self, scalar: f64) -> Self {
        Self::new(self.w * scalar, self.x * scalar, self.y * scalar, self.z * scalar)
    }
}

impl std::ops::Add for Quat {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self::new(
            self.w + other.w,
            self.x + other.x,
            self.y + other.y,
            self.z + other.z,
        )
    }
}
