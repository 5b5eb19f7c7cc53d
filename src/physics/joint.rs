use crate::error::{SimError, SimResult};
use crate::math::{Pose, Quat, Vec3};
use crate::physics::body::{Body, BodyId};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JointId(pub(crate) usize);

impl JointId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for JointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "joint#{}", self.0)
    }
}

/// Joint description in world coordinates, taken at assembly time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JointSpec {
    /// Body B may only translate along `axis` relative to body A.
    Prismatic {
        body_a: BodyId,
        body_b: BodyId,
        anchor: Vec3,
        axis: Vec3,
    },
    /// Translational spring-damper between two world anchor points.
    SpringDamper {
        body_a: BodyId,
        body_b: BodyId,
        anchor_a: Vec3,
        anchor_b: Vec3,
        stiffness: f64,
        damping: f64,
        /// Defaults to the anchor distance at assembly.
        rest_length: Option<f64>,
    },
}

impl JointSpec {
    pub fn prismatic(body_a: BodyId, body_b: BodyId, anchor: Vec3, axis: Vec3) -> Self {
        Self::Prismatic {
            body_a,
            body_b,
            anchor,
            axis,
        }
    }

    pub fn spring_damper(
        body_a: BodyId,
        body_b: BodyId,
        anchor_a: Vec3,
        anchor_b: Vec3,
        stiffness: f64,
        damping: f64,
    ) -> Self {
        Self::SpringDamper {
            body_a,
            body_b,
            anchor_a,
            anchor_b,
            stiffness,
            damping,
            rest_length: None,
        }
    }

    pub fn with_rest_length(mut self, length: f64) -> Self {
        if let Self::SpringDamper { rest_length, .. } = &mut self {
            *rest_length = Some(length);
        }
        self
    }

    pub fn bodies(&self) -> (BodyId, BodyId) {
        match *self {
            Self::Prismatic { body_a, body_b, .. } => (body_a, body_b),
            Self::SpringDamper { body_a, body_b, .. } => (body_a, body_b),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrismaticJoint {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub local_anchor_a: Vec3,
    pub local_anchor_b: Vec3,
    /// Unit travel axis in the frame of body A.
    pub local_axis: Vec3,
    /// Orientation of B relative to A at assembly.
    pub rest_relative: Quat,
}

impl PrismaticJoint {
    pub fn world_axis(&self, pose_a: &Pose) -> Vec3 {
        pose_a.transform_vector(&self.local_axis)
    }

    /// Anchor separation (A minus B) in world coordinates.
    pub fn separation(&self, pose_a: &Pose, pose_b: &Pose) -> Vec3 {
        pose_a.transform_point(&self.local_anchor_a) - pose_b.transform_point(&self.local_anchor_b)
    }

    /// Offset of B along the travel axis, positive in the axis direction.
    pub fn travel(&self, pose_a: &Pose, pose_b: &Pose) -> f64 {
        -self.separation(pose_a, pose_b).dot(&self.world_axis(pose_a))
    }

    /// Part of the anchor separation the joint forbids.
    pub fn lateral_error(&self, pose_a: &Pose, pose_b: &Pose) -> Vec3 {
        let axis = self.world_axis(pose_a);
        self.separation(pose_a, pose_b).reject_from(&axis)
    }

    /// Rotation vector taking B's orientation onto its locked target.
    pub fn angular_error(&self, pose_a: &Pose, pose_b: &Pose) -> Vec3 {
        let target = pose_a.orientation * self.rest_relative;
        target.angle_difference(&pose_b.orientation)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpringDamper {
    pub body_a: BodyId,
    pub body_b: BodyId,
    pub local_anchor_a: Vec3,
    pub local_anchor_b: Vec3,
    pub rest_length: f64,
    pub stiffness: f64,
    pub damping: f64,
}

impl SpringDamper {
    pub fn length(&self, pose_a: &Pose, pose_b: &Pose) -> f64 {
        (pose_a.transform_point(&self.local_anchor_a) - pose_b.transform_point(&self.local_anchor_b))
            .magnitude()
    }

    pub fn extension(&self, pose_a: &Pose, pose_b: &Pose) -> f64 {
        self.length(pose_a, pose_b) - self.rest_length
    }
}

/// An assembled joint. Anchors are frozen in the body frames.
#[derive(Debug, Clone, PartialEq)]
pub enum Joint {
    Prismatic(PrismaticJoint),
    SpringDamper(SpringDamper),
}

impl Joint {
    pub(crate) fn assemble(spec: &JointSpec, a: &Body, b: &Body) -> SimResult<Self> {
        if a.id() == b.id() {
            return Err(SimError::SameBody(a.id()));
        }
        let pose_a = a.pose();
        let pose_b = b.pose();

        match *spec {
            JointSpec::Prismatic { anchor, axis, .. } => {
                if !anchor.is_finite() || !axis.is_finite() {
                    return Err(SimError::NonFinite { what: "prismatic joint" });
                }
                let Some((axis, _)) = axis.normalize_with_length() else {
                    return Err(SimError::DegenerateJoint {
                        reason: "prismatic axis has zero length",
                    });
                };
                Ok(Joint::Prismatic(PrismaticJoint {
                    body_a: a.id(),
                    body_b: b.id(),
                    local_anchor_a: pose_a.inverse_transform_point(&anchor),
                    local_anchor_b: pose_b.inverse_transform_point(&anchor),
                    local_axis: pose_a.inverse_transform_vector(&axis),
                    rest_relative: pose_a.orientation.conjugate() * pose_b.orientation,
                }))
            }
            JointSpec::SpringDamper {
                anchor_a,
                anchor_b,
                stiffness,
                damping,
                rest_length,
                ..
            } => {
                if !anchor_a.is_finite() || !anchor_b.is_finite() {
                    return Err(SimError::NonFinite { what: "spring-damper anchors" });
                }
                if !(stiffness.is_finite() && stiffness > 0.0) {
                    return Err(SimError::DegenerateJoint {
                        reason: "spring stiffness must be positive",
                    });
                }
                if !(damping.is_finite() && damping >= 0.0) {
                    return Err(SimError::DegenerateJoint {
                        reason: "spring damping must be non-negative",
                    });
                }
                let rest_length = rest_length.unwrap_or_else(|| (anchor_a - anchor_b).magnitude());
                if !(rest_length.is_finite() && rest_length >= 0.0) {
                    return Err(SimError::DegenerateJoint {
                        reason: "spring rest length must be non-negative",
                    });
                }
                Ok(Joint::SpringDamper(SpringDamper {
                    body_a: a.id(),
                    body_b: b.id(),
                    local_anchor_a: pose_a.inverse_transform_point(&anchor_a),
                    local_anchor_b: pose_b.inverse_transform_point(&anchor_b),
                    rest_length,
                    stiffness,
                    damping,
                }))
            }
        }
    }

    pub fn bodies(&self) -> (BodyId, BodyId) {
        match self {
            Joint::Prismatic(j) => (j.body_a, j.body_b),
            Joint::SpringDamper(j) => (j.body_a, j.body_b),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Joint::Prismatic(_) => "prismatic",
            Joint::SpringDamper(_) => "spring-damper",
        }
    }

    /// Violation of the hard constraints; compliant elements report zero.
    pub fn violation(&self, bodies: &[Body]) -> f64 {
        match self {
            Joint::Prismatic(j) => {
                let pa = bodies[j.body_a.0].pose();
                let pb = bodies[j.body_b.0].pose();
                let lateral = j.lateral_error(&pa, &pb).magnitude();
                let angular = j.angular_error(&pa, &pb).magnitude();
                lateral.max(angular)
            }
            Joint::SpringDamper(_) => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::body::BodyDesc;
    use approx::assert_relative_eq;

    fn body(index: usize, position: Vec3) -> Body {
        Body::from_desc(BodyId(index), BodyDesc::point(format!("b{index}"), 1.0).at(position)).unwrap()
    }

    #[test]
    fn prismatic_captures_local_frames() {
        let a = body(0, Vec3::new(0.0, 0.6, 0.0));
        let b = body(1, Vec3::new(0.0, 0.3, 0.0));
        let spec = JointSpec::prismatic(a.id(), b.id(), a.pose().position, Vec3::new(0.0, 2.0, 0.0));
        let Joint::Prismatic(j) = Joint::assemble(&spec, &a, &b).unwrap() else {
            panic!("expected prismatic");
        };
        assert_eq!(j.local_anchor_a, Vec3::zero());
        assert_relative_eq!(j.local_anchor_b.y, 0.3, epsilon = 1e-12);
        assert_relative_eq!(j.local_axis.y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(j.travel(&a.pose(), &b.pose()), -0.3, epsilon = 1e-12);
        assert!(j.lateral_error(&a.pose(), &b.pose()).magnitude() < 1e-12);
    }

    #[test]
    fn spring_rest_length_defaults_to_assembly_distance() {
        let a = body(0, Vec3::new(0.0, 0.6, 0.0));
        let b = body(1, Vec3::new(0.0, 0.3, 0.0));
        let spec = JointSpec::spring_damper(
            a.id(),
            b.id(),
            a.pose().position,
            b.pose().position,
            10_000.0,
            1_000.0,
        );
        let Joint::SpringDamper(s) = Joint::assemble(&spec, &a, &b).unwrap() else {
            panic!("expected spring-damper");
        };
        assert_relative_eq!(s.rest_length, 0.3, epsilon = 1e-12);
        assert_relative_eq!(s.extension(&a.pose(), &b.pose()), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn rejects_same_body_and_zero_axis() {
        let a = body(0, Vec3::zero());
        let b = body(1, Vec3::unit_y());
        let same = JointSpec::prismatic(a.id(), a.id(), Vec3::zero(), Vec3::unit_y());
        assert_eq!(Joint::assemble(&same, &a, &a), Err(SimError::SameBody(a.id())));

        let flat = JointSpec::prismatic(a.id(), b.id(), Vec3::zero(), Vec3::zero());
        assert!(matches!(
            Joint::assemble(&flat, &a, &b),
            Err(SimError::DegenerateJoint { .. })
        ));

        let limp = JointSpec::spring_damper(a.id(), b.id(), Vec3::zero(), Vec3::unit_y(), 0.0, 1.0);
        assert!(matches!(
            Joint::assemble(&limp, &a, &b),
            Err(SimError::DegenerateJoint { .. })
        ));
    }
}
