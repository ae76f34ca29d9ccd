//! Face triangulation.
//!
//! Room faces reach the engine as triangles only. Triangles pass through,
//! quads are split with the fan 0-1-2 / 2-3-0, anything else is rejected.

use glam::{Mat4, Vec3};

use crate::scene::{FaceData, MeshData};

/// A world-space triangle with the material slot of the face it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub vertices: [Vec3; 3],
    pub material_index: usize,
}

impl Triangle {
    /// Flatten to `x0 y0 z0 x1 y1 z1 x2 y2 z2`.
    pub fn to_xyz(&self) -> Vec<f32> {
        self.vertices.iter().flat_map(|v| v.to_array()).collect()
    }
}

/// Reasons a face cannot be triangulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceError {
    /// Face does not have 3 or 4 vertices.
    VertexCount(usize),
    /// Face references a vertex the mesh does not have.
    VertexIndex(usize),
}

/// Split one face into triangles as vertex index triples.
pub fn triangulate_indices(indices: &[usize]) -> Result<Vec<[usize; 3]>, FaceError> {
    match indices {
        [a, b, c] => Ok(vec![[*a, *b, *c]]),
        [a, b, c, d] => Ok(vec![[*a, *b, *c], [*c, *d, *a]]),
        other => Err(FaceError::VertexCount(other.len())),
    }
}

/// Triangulate one face and move its vertices to world space.
pub fn triangulate_face(face: &FaceData, vertices: &[Vec3], world: &Mat4) -> Result<Vec<Triangle>, FaceError> {
    triangulate_indices(&face.indices)?
        .into_iter()
        .map(|tri| -> Result<Triangle, FaceError> {
            let mut out = [Vec3::ZERO; 3];
            for (slot, &index) in out.iter_mut().zip(tri.iter()) {
                let v = vertices.get(index).ok_or(FaceError::VertexIndex(index))?;
                *slot = world.transform_point3(*v);
            }
            Ok(Triangle {
                vertices: out,
                material_index: face.material_index,
            })
        })
        .collect()
}

/// Triangulate a whole mesh, stopping at the first bad face.
pub fn triangulate_mesh(mesh: &MeshData, world: &Mat4) -> Result<Vec<Triangle>, FaceError> {
    let mut triangles = Vec::with_capacity(mesh.faces.len() * 2);
    for face in &mesh.faces {
        triangles.extend(triangulate_face(face, &mesh.vertices, world)?);
    }
    Ok(triangles)
}
