//! Decoded mesh data.

use crate::error::{Error, Result};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// A single vertex as consumed by the mesh pipeline.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable, Serialize, Deserialize)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub tex_coord: [f32; 2],
}

impl Vertex {
    /// Create a vertex.
    pub const fn new(position: [f32; 3], color: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            color,
            tex_coord,
        }
    }

    /// Bit-exact key used for deduplication (f32 is not `Hash`).
    fn key(&self) -> [u32; 8] {
        bytemuck::cast(*self)
    }
}

/// Host-side mesh: a vertex list plus a flat triangle index list.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Create a mesh, checking that every index refers to an existing vertex.
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Result<Self> {
        let mesh = Self { vertices, indices };
        mesh.validate()?;
        Ok(mesh)
    }

    /// Build a mesh from a triangle soup, merging bit-identical vertices.
    pub fn deduplicated(soup: impl IntoIterator<Item = Vertex>) -> Self {
        let mut unique: HashMap<[u32; 8], u32> = HashMap::new();
        let mut vertices = Vec::new();
        let mut indices = Vec::new();

        for vertex in soup {
            let index = *unique.entry(vertex.key()).or_insert_with(|| {
                vertices.push(vertex);
                (vertices.len() - 1) as u32
            });
            indices.push(index);
        }

        Self { vertices, indices }
    }

    /// Check index bounds.
    pub fn validate(&self) -> Result<()> {
        if let Some(&index) = self
            .indices
            .iter()
            .find(|&&i| i as usize >= self.vertices.len())
        {
            return Err(Error::IndexOutOfRange {
                index,
                vertex_count: self.vertices.len(),
            });
        }
        Ok(())
    }

    /// Number of indices (what an indexed draw consumes).
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Size of the vertex list in bytes.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Size of the index list in bytes.
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// A unit cube centred on the origin with per-face texture coordinates.
    pub fn cube() -> Self {
        const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            // normal, u axis, v axis
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);

        for (normal, u, v) in FACES {
            let n = glam::Vec3::from(normal);
            let u = glam::Vec3::from(u);
            let v = glam::Vec3::from(v);
            let base = vertices.len() as u32;
            let color = (n.abs() * 0.5 + 0.5).to_array();

            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let p = (n + u * su + v * sv) * 0.5;
                vertices.push(Vertex::new(
                    p.to_array(),
                    color,
                    [(su + 1.0) * 0.5, 1.0 - (sv + 1.0) * 0.5],
                ));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }

        Self { vertices, indices }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn vertex_layout_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
    }

    #[test]
    fn deduplication_merges_identical_vertices() {
        let a = Vertex::new([0.0, 0.0, 0.0], [1.0; 3], [0.0, 0.0]);
        let b = Vertex::new([1.0, 0.0, 0.0], [1.0; 3], [1.0, 0.0]);
        let c = Vertex::new([0.0, 1.0, 0.0], [1.0; 3], [0.0, 1.0]);
        let d = Vertex::new([1.0, 1.0, 0.0], [1.0; 3], [1.0, 1.0]);

        let mesh = MeshData::deduplicated([a, b, c, c, b, d]);
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 2, 1, 3]);
    }

    #[test]
    fn out_of_range_index_rejected() {
        let err = MeshData::new(vec![Vertex::default(); 3], vec![0, 1, 3]).unwrap_err();
        assert!(matches!(
            err,
            Error::IndexOutOfRange {
                index: 3,
                vertex_count: 3
            }
        ));
    }

    #[test]
    fn byte_views_match_counts() {
        let mesh = MeshData::cube();
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.index_count(), 36);
        assert_eq!(mesh.vertex_bytes().len(), 24 * std::mem::size_of::<Vertex>());
        assert_eq!(mesh.index_bytes().len(), 36 * 4);
        mesh.validate().unwrap();
    }

    #[test]
    fn cube_fits_unit_box() {
        let mesh = MeshData::cube();
        for v in &mesh.vertices {
            for c in v.position {
                assert_relative_eq!(c.abs(), 0.5);
            }
        }
    }
}
