//! Collision shapes, contact materials and ground contacts.
//!
//! Only contacts between a movable shaped body and the top face of a fixed
//! `Box` are generated. That covers every mechanism resting on a ground slab;
//! movable bodies do not collide with each other.

use crate::math::{Pose, Vec3};
use crate::physics::body::Body;
use serde::{Deserialize, Serialize};

/// Contact geometry in the body frame. Dimensions are full edge lengths.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CollisionShape {
    Box { a: f64, b: f64, c: f64 },
    /// Axis along local Z.
    Cylinder { radius: f64, length: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContactMaterial {
    pub static_friction: f64,
    pub sliding_friction: f64,
    pub restitution: f64,
}

impl Default for ContactMaterial {
    fn default() -> Self {
        Self {
            static_friction: 0.9,
            sliding_friction: 0.5,
            restitution: 0.3,
        }
    }
}

impl ContactMaterial {
    pub fn combine(&self, other: &ContactMaterial) -> ContactMaterial {
        ContactMaterial {
            static_friction: 0.5 * (self.static_friction + other.static_friction),
            sliding_friction: 0.5 * (self.sliding_friction + other.sliding_friction),
            restitution: 0.5 * (self.restitution + other.restitution),
        }
    }
}

/// A point of a movable body below the top face of a fixed box.
#[derive(Debug, Clone, Copy)]
pub struct Contact {
    pub body: usize,
    /// Contact point in the body frame.
    pub local_point: Vec3,
    /// Surface normal pointing out of the ground.
    pub normal: Vec3,
    /// Any point on the ground surface.
    pub surface: Vec3,
    pub material: ContactMaterial,
    pub normal_lambda: f64,
    pub tangent_lambda: f64,
    /// Normal velocity of the point at the start of the substep.
    pub pre_normal_velocity: f64,
}

impl Contact {
    pub fn depth(&self, pose: &Pose) -> f64 {
        let p = pose.transform_point(&self.local_point);
        (self.surface - p).dot(&self.normal)
    }
}

struct GroundFace {
    index: usize,
    pose: Pose,
    normal: Vec3,
    surface: Vec3,
    half_a: f64,
    half_c: f64,
}

impl GroundFace {
    fn from_body(index: usize, body: &Body) -> Option<Self> {
        if !body.is_fixed() {
            return None;
        }
        let Some(CollisionShape::Box { a, b, c }) = body.shape() else {
            return None;
        };
        let pose = body.pose();
        let normal = pose.transform_vector(&Vec3::unit_y());
        let surface = pose.transform_point(&Vec3::new(0.0, 0.5 * b, 0.0));
        Some(Self {
            index,
            pose,
            normal,
            surface,
            half_a: 0.5 * a,
            half_c: 0.5 * c,
        })
    }

    fn covers(&self, world_point: &Vec3) -> bool {
        let local = self.pose.inverse_transform_point(world_point);
        local.x.abs() <= self.half_a && local.z.abs() <= self.half_c
    }

    fn depth(&self, world_point: &Vec3) -> f64 {
        (self.surface - *world_point).dot(&self.normal)
    }
}

/// Candidate points of `shape` that could touch a plane with normal `normal`.
fn support_points(shape: &CollisionShape, pose: &Pose, normal: &Vec3, out: &mut Vec<Vec3>) {
    match *shape {
        CollisionShape::Box { a, b, c } => {
            for sx in [-0.5, 0.5] {
                for sy in [-0.5, 0.5] {
                    for sz in [-0.5, 0.5] {
                        out.push(Vec3::new(sx * a, sy * b, sz * c));
                    }
                }
            }
        }
        CollisionShape::Cylinder { radius, length } => {
            // Deepest rim point along -normal, found in the body frame.
            let down = pose.inverse_transform_vector(&(-*normal));
            let radial = Vec3::new(down.x, down.y, 0.0);
            for z in [-0.5 * length, 0.5 * length] {
                match radial.normalize_with_length() {
                    Some((dir, len)) if len > 1e-6 => {
                        out.push(Vec3::new(dir.x * radius, dir.y * radius, z));
                    }
                    _ => {
                        // Standing on a cap: use four rim points.
                        out.push(Vec3::new(radius, 0.0, z));
                        out.push(Vec3::new(-radius, 0.0, z));
                        out.push(Vec3::new(0.0, radius, z));
                        out.push(Vec3::new(0.0, -radius, z));
                    }
                }
            }
        }
    }
}

/// Collect penetrating contacts of every movable shaped body against fixed boxes.
pub(crate) fn ground_contacts(bodies: &[Body], out: &mut Vec<Contact>) {
    out.clear();
    let grounds: Vec<GroundFace> = bodies
        .iter()
        .enumerate()
        .filter_map(|(i, b)| GroundFace::from_body(i, b))
        .collect();
    if grounds.is_empty() {
        return;
    }

    let mut points = Vec::with_capacity(8);
    for (index, body) in bodies.iter().enumerate() {
        if body.is_fixed() {
            continue;
        }
        let Some(shape) = body.shape() else {
            continue;
        };
        let pose = body.pose();
        for ground in &grounds {
            points.clear();
            support_points(shape, &pose, &ground.normal, &mut points);
            for local_point in &points {
                let world_point = pose.transform_point(local_point);
                if ground.depth(&world_point) <= 0.0 || !ground.covers(&world_point) {
                    continue;
                }
                let velocity = body.state().point_velocity(&world_point);
                out.push(Contact {
                    body: index,
                    local_point: *local_point,
                    normal: ground.normal,
                    surface: ground.surface,
                    material: body.material().combine(bodies[ground.index].material()),
                    normal_lambda: 0.0,
                    tangent_lambda: 0.0,
                    pre_normal_velocity: velocity.dot(&ground.normal),
                });
            }
        }
    }
}

/// True when at least one movable shaped body could touch a fixed box.
pub(crate) fn has_contact_pairs(bodies: &[Body]) -> bool {
    let ground = bodies
        .iter()
        .any(|b| b.is_fixed() && matches!(b.shape(), Some(CollisionShape::Box { .. })));
    ground && bodies.iter().any(|b| !b.is_fixed() && b.shape().is_some())
}

/// Deepest penetration of any movable shaped body into a fixed box.
pub(crate) fn max_penetration(bodies: &[Body]) -> f64 {
    let mut contacts = Vec::new();
    ground_contacts(bodies, &mut contacts);
    contacts
        .iter()
        .map(|c| c.depth(&bodies[c.body].pose()))
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::body::{BodyDesc, BodyId};

    fn ground() -> Body {
        let desc = BodyDesc::point("ground", 1e6)
            .at(Vec3::new(0.0, -0.5, 0.0))
            .with_shape(
                CollisionShape::Box { a: 2.0, b: 0.2, c: 2.0 },
                ContactMaterial::default(),
            )
            .fixed();
        Body::from_desc(BodyId(0), desc).unwrap()
    }

    #[test]
    fn resting_cylinder_touches_at_rim_bottom() {
        let wheel = BodyDesc::cylinder("wheel", 0.5, 0.1, 0.2)
            .at(Vec3::new(0.0, -0.31, 0.0))
            .with_shape(
                CollisionShape::Cylinder { radius: 0.1, length: 0.2 },
                ContactMaterial::default(),
            );
        let bodies = vec![ground(), Body::from_desc(BodyId(1), wheel).unwrap()];
        let mut contacts = Vec::new();
        ground_contacts(&bodies, &mut contacts);

        assert_eq!(contacts.len(), 2);
        for c in &contacts {
            assert!((c.local_point.y + 0.1).abs() < 1e-12);
            assert!((c.depth(&bodies[1].pose()) - 0.01).abs() < 1e-9);
        }
        assert!((max_penetration(&bodies) - 0.01).abs() < 1e-9);
    }

    #[test]
    fn box_outside_ground_footprint_has_no_contact() {
        let block = BodyDesc::cuboid("block", 1.0, 0.1, 0.1, 0.1)
            .at(Vec3::new(5.0, -0.42, 0.0))
            .with_shape(
                CollisionShape::Box { a: 0.1, b: 0.1, c: 0.1 },
                ContactMaterial::default(),
            );
        let bodies = vec![ground(), Body::from_desc(BodyId(1), block).unwrap()];
        let mut contacts = Vec::new();
        ground_contacts(&bodies, &mut contacts);
        assert!(contacts.is_empty());
    }
}
