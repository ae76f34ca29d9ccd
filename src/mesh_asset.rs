//! Room mesh loading from Wavefront OBJ.
//!
//! Meshes are loaded without triangulation so that quads reach the room
//! serializer intact and are split by its fixed fan rule. All models in a
//! file are merged into a single [`MeshData`].
//!
//! ## Material slots
//!
//! When the file's MTL library can be read, each distinct `usemtl` name
//! becomes a material slot in order of first use. Models without a resolved
//! material use slot 0, which the scene description may fill in.

use std::io::Cursor;
use std::path::Path;

use glam::Vec3;

use crate::scene::{FaceData, MeshData};

/// A mesh loaded from OBJ along with the material slot names it declared.
#[derive(Debug, Clone, Default)]
pub struct MeshAsset {
    pub mesh: MeshData,
    pub material_slots: Vec<String>,
}

impl MeshAsset {
    /// Load an OBJ file, resolving `mtllib` references relative to it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_obj_with_base(&content, base_dir)
    }

    /// Parse OBJ content that has no material library.
    pub fn from_obj(obj_content: &str) -> Result<Self, String> {
        Self::from_obj_with_base(obj_content, Path::new("."))
    }

    fn from_obj_with_base(obj_content: &str, base_dir: &Path) -> Result<Self, String> {
        let mut cursor = Cursor::new(obj_content.as_bytes());

        let load_options = tobj::LoadOptions {
            triangulate: false,
            single_index: false,
            ..Default::default()
        };

        let (models, materials) = tobj::load_obj_buf(&mut cursor, &load_options, |mtl_path| {
            tobj::load_mtl(base_dir.join(mtl_path))
        })
        .map_err(|e| format!("Failed to parse OBJ: {}", e))?;

        let materials = materials.unwrap_or_else(|e| {
            log::debug!("OBJ material library unavailable ({}), using declared slots", e);
            Vec::new()
        });

        if models.is_empty() {
            return Err("OBJ file contains no models".to_string());
        }

        let mut vertices: Vec<Vec3> = Vec::new();
        let mut faces: Vec<FaceData> = Vec::new();
        let mut material_slots: Vec<String> = Vec::new();

        for model in &models {
            let mesh = &model.mesh;
            if mesh.positions.is_empty() {
                continue;
            }

            let vertex_offset = vertices.len();
            vertices.extend(
                mesh.positions
                    .chunks_exact(3)
                    .map(|p| Vec3::new(p[0], p[1], p[2])),
            );

            let material_index = mesh
                .material_id
                .and_then(|id| materials.get(id))
                .map(|material| slot_index(&mut material_slots, &material.name))
                .unwrap_or(0);

            // Empty arities means every face is a triangle
            let arities: Vec<usize> = if mesh.face_arities.is_empty() {
                vec![3; mesh.indices.len() / 3]
            } else {
                mesh.face_arities.iter().map(|&a| a as usize).collect()
            };

            let mut cursor = 0;
            for arity in arities {
                let Some(face_indices) = mesh.indices.get(cursor..cursor + arity) else {
                    return Err(format!("OBJ model '{}' has truncated face data", model.name));
                };
                cursor += arity;
                faces.push(FaceData::new(
                    face_indices
                        .iter()
                        .map(|&i| vertex_offset + i as usize)
                        .collect(),
                    material_index,
                ));
            }
        }

        if vertices.is_empty() {
            return Err("OBJ file contains no vertices".to_string());
        }

        Ok(Self {
            mesh: MeshData::new(vertices, faces),
            material_slots,
        })
    }

    pub fn face_count(&self) -> usize {
        self.mesh.faces.len()
    }
}

/// Find or append a slot for a material name.
fn slot_index(slots: &mut Vec<String>, name: &str) -> usize {
    if let Some(pos) = slots.iter().position(|s| s == name) {
        return pos;
    }
    slots.push(name.to_string());
    slots.len() - 1
}
