//! Static geometry uploaded once per renderable body.

use crate::error::RenderError;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

/// Shape of a renderable body, in its own frame. Edge lengths are full lengths.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MeshKind {
    Cuboid { a: f32, b: f32, c: f32 },
    /// Axis along local Z, matching `CollisionShape::Cylinder`.
    Cylinder { radius: f32, length: f32, segments: u32 },
    /// Small marker for point masses.
    Point { size: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

/// Indexed triangle list.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn build(name: impl Into<String>, kind: &MeshKind) -> Result<Self, RenderError> {
        let name = name.into();
        let invalid = |reason: String| RenderError::InvalidMesh {
            mesh: name.clone(),
            reason,
        };
        let mesh = match *kind {
            MeshKind::Cuboid { a, b, c } => {
                if !(a > 0.0 && b > 0.0 && c > 0.0) {
                    return Err(invalid(format!("cuboid edges must be positive, got {a}x{b}x{c}")));
                }
                Self::cuboid(&name, a, b, c)
            }
            MeshKind::Cylinder {
                radius,
                length,
                segments,
            } => {
                if segments < 3 {
                    return Err(invalid(format!("cylinder needs at least 3 segments, got {segments}")));
                }
                if !(radius > 0.0 && length > 0.0) {
                    return Err(invalid("cylinder radius and length must be positive".to_string()));
                }
                Self::cylinder(&name, radius, length, segments)
            }
            MeshKind::Point { size } => {
                if !(size > 0.0) {
                    return Err(invalid(format!("marker size must be positive, got {size}")));
                }
                Self::octahedron(&name, 0.5 * size)
            }
        };
        mesh.validate()?;
        Ok(mesh)
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn validate(&self) -> Result<(), RenderError> {
        let fail = |reason: String| {
            Err(RenderError::InvalidMesh {
                mesh: self.name.clone(),
                reason,
            })
        };
        if self.vertices.is_empty() || self.indices.is_empty() {
            return fail("mesh is empty".to_string());
        }
        if self.indices.len() % 3 != 0 {
            return fail(format!("{} indices do not form triangles", self.indices.len()));
        }
        if let Some(bad) = self.indices.iter().find(|&&i| i as usize >= self.vertices.len()) {
            return fail(format!("index {bad} out of range for {} vertices", self.vertices.len()));
        }
        let finite = self
            .vertices
            .iter()
            .flat_map(|v| v.position.iter().chain(v.normal.iter()))
            .all(|x| x.is_finite());
        if !finite {
            return fail("non-finite vertex data".to_string());
        }
        Ok(())
    }

    fn cuboid(name: &str, a: f32, b: f32, c: f32) -> Self {
        let (hx, hy, hz) = (0.5 * a, 0.5 * b, 0.5 * c);
        // Per face: outward normal and four corners, counter-clockwise from outside.
        let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
            ([1.0, 0.0, 0.0], [[hx, -hy, -hz], [hx, hy, -hz], [hx, hy, hz], [hx, -hy, hz]]),
            ([-1.0, 0.0, 0.0], [[-hx, -hy, hz], [-hx, hy, hz], [-hx, hy, -hz], [-hx, -hy, -hz]]),
            ([0.0, 1.0, 0.0], [[-hx, hy, -hz], [-hx, hy, hz], [hx, hy, hz], [hx, hy, -hz]]),
            ([0.0, -1.0, 0.0], [[-hx, -hy, hz], [-hx, -hy, -hz], [hx, -hy, -hz], [hx, -hy, hz]]),
            ([0.0, 0.0, 1.0], [[-hx, -hy, hz], [hx, -hy, hz], [hx, hy, hz], [-hx, hy, hz]]),
            ([0.0, 0.0, -1.0], [[hx, -hy, -hz], [-hx, -hy, -hz], [-hx, hy, -hz], [hx, hy, -hz]]),
        ];
        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, corners) in faces {
            let base = vertices.len() as u32;
            vertices.extend(corners.iter().map(|&position| Vertex { position, normal }));
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        Self {
            name: name.to_string(),
            vertices,
            indices,
        }
    }

    fn cylinder(name: &str, radius: f32, length: f32, segments: u32) -> Self {
        let hz = 0.5 * length;
        let mut vertices = Vec::new();
        let mut indices = Vec::new();

        // Side wall: a bottom and a top vertex per segment boundary.
        for i in 0..=segments {
            let (s, c) = (TAU * i as f32 / segments as f32).sin_cos();
            let normal = [c, s, 0.0];
            vertices.push(Vertex {
                position: [radius * c, radius * s, -hz],
                normal,
            });
            vertices.push(Vertex {
                position: [radius * c, radius * s, hz],
                normal,
            });
        }
        for i in 0..segments {
            let k = 2 * i;
            indices.extend_from_slice(&[k, k + 2, k + 3, k, k + 3, k + 1]);
        }

        // Caps as triangle fans.
        for (z, nz) in [(-hz, -1.0f32), (hz, 1.0f32)] {
            let center = vertices.len() as u32;
            vertices.push(Vertex {
                position: [0.0, 0.0, z],
                normal: [0.0, 0.0, nz],
            });
            for i in 0..segments {
                let (s, c) = (TAU * i as f32 / segments as f32).sin_cos();
                vertices.push(Vertex {
                    position: [radius * c, radius * s, z],
                    normal: [0.0, 0.0, nz],
                });
            }
            for i in 0..segments {
                let a = center + 1 + i;
                let b = center + 1 + (i + 1) % segments;
                if nz > 0.0 {
                    indices.extend_from_slice(&[center, a, b]);
                } else {
                    indices.extend_from_slice(&[center, b, a]);
                }
            }
        }
        Self {
            name: name.to_string(),
            vertices,
            indices,
        }
    }

    fn octahedron(name: &str, r: f32) -> Self {
        let tips = [
            [r, 0.0, 0.0],
            [-r, 0.0, 0.0],
            [0.0, r, 0.0],
            [0.0, -r, 0.0],
            [0.0, 0.0, r],
            [0.0, 0.0, -r],
        ];
        let vertices = tips
            .iter()
            .map(|&position| Vertex {
                position,
                normal: [position[0] / r, position[1] / r, position[2] / r],
            })
            .collect();
        let indices = vec![
            0, 2, 4, 2, 1, 4, 1, 3, 4, 3, 0, 4, 2, 0, 5, 1, 2, 5, 3, 1, 5, 0, 3, 5,
        ];
        Self {
            name: name.to_string(),
            vertices,
            indices,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cuboid_has_six_quads() {
        let mesh = Mesh::build("box", &MeshKind::Cuboid { a: 0.3, b: 0.03, c: 0.08 }).unwrap();
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.triangle_count(), 12);
    }

    #[test]
    fn cylinder_counts_follow_segments() {
        let mesh = Mesh::build(
            "wheel",
            &MeshKind::Cylinder {
                radius: 0.1,
                length: 0.2,
                segments: 16,
            },
        )
        .unwrap();
        assert_eq!(mesh.vertices.len(), 2 * 17 + 2 * 17);
        assert_eq!(mesh.triangle_count(), 2 * 16 + 2 * 16);
        assert!(mesh
            .vertices
            .iter()
            .all(|v| v.position[2].abs() <= 0.1 + 1e-6));
    }

    #[test]
    fn degenerate_shapes_are_rejected() {
        let err = Mesh::build(
            "wheel",
            &MeshKind::Cylinder {
                radius: 0.1,
                length: 0.2,
                segments: 2,
            },
        )
        .unwrap_err();
        assert!(matches!(err, RenderError::InvalidMesh { .. }));
        assert!(Mesh::build("flat", &MeshKind::Cuboid { a: 1.0, b: 0.0, c: 1.0 }).is_err());
    }

    #[test]
    fn validate_catches_dangling_index() {
        let mut mesh = Mesh::build("dot", &MeshKind::Point { size: 0.02 }).unwrap();
        mesh.indices[0] = 99;
        assert!(mesh.validate().is_err());
    }
}
