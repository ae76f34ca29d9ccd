//! In-memory scene graph.
//!
//! Implements [`SceneProvider`] for hosts without a scene of their own (the
//! command-line front end, tests). Objects are stored by name; every setter
//! that changes an object notifies the subscribed callbacks.
//!
//! A scene can be described in JSON:
//!
//! ```json
//! {
//!   "groups": { "Room": ["Walls", "Floor"] },
//!   "objects": {
//!     "Walls":  { "obj": "walls.obj", "materials": ["Brick"] },
//!     "Floor":  { "mesh": { "vertices": [[0,0,0],[4,0,0],[4,4,0],[0,4,0]],
//!                           "faces": [{ "indices": [0,1,2,3] }] },
//!                 "materials": ["Carpet"] },
//!     "Source": { "position": [1, 2, 1.5] },
//!     "Listener": { "position": [3, 2, 1.7], "rotation": [0, 0, 90] }
//!   }
//! }
//! ```
//!
//! Rotations are XYZ Euler angles in degrees. Relative `obj` paths resolve
//! against the description file's directory.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use glam::{EulerRot, Mat4, Quat, Vec3};
use serde::Deserialize;

use crate::mesh_asset::MeshAsset;
use crate::scene::{
    FaceData, MeshData, MutationCallback, ObjectHandle, SceneMutation, SceneProvider,
    SubscriptionHandle,
};

/// Position, Euler rotation (degrees) and scale of an object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Builder: set the rotation in degrees.
    pub fn with_rotation(mut self, rotation_degrees: Vec3) -> Self {
        self.rotation = rotation_degrees;
        self
    }

    /// Builder: set the scale.
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Object-to-world matrix. Rotation applies X, then Y, then Z.
    pub fn to_matrix(&self) -> Mat4 {
        let rotation = Quat::from_euler(
            EulerRot::ZYX,
            self.rotation.z.to_radians(),
            self.rotation.y.to_radians(),
            self.rotation.x.to_radians(),
        );
        Mat4::from_scale_rotation_translation(self.scale, rotation, self.position)
    }
}

/// A named object in the scene.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneObject {
    pub transform: Transform,
    pub mesh: Option<MeshData>,
    pub material_slots: Vec<String>,
}

impl SceneObject {
    /// An object without geometry (a source or listener).
    pub fn empty(transform: Transform) -> Self {
        Self {
            transform,
            mesh: None,
            material_slots: Vec::new(),
        }
    }

    /// An object with geometry and material slots.
    pub fn with_mesh(transform: Transform, mesh: MeshData, material_slots: Vec<String>) -> Self {
        Self {
            transform,
            mesh: Some(mesh),
            material_slots,
        }
    }
}

/// The in-memory scene.
#[derive(Default)]
pub struct MemoryScene {
    objects: HashMap<ObjectHandle, SceneObject>,
    groups: HashMap<String, Vec<ObjectHandle>>,
    subscribers: Vec<(SubscriptionHandle, MutationCallback)>,
    next_subscription: u64,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a scene from a JSON description file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut scene = Self::new();
        scene.reload(path)?;
        Ok(scene)
    }

    /// Re-read a description file and apply the differences.
    ///
    /// Changed objects go through the regular setters, so subscribers see
    /// the same mutations an interactive edit would produce. Returns the
    /// number of mutations emitted.
    pub fn reload(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading scene description {}", path.display()))?;
        let description: SceneDescription = serde_json::from_str(&contents)
            .with_context(|| format!("parsing scene description {}", path.display()))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        self.apply_description(description, base_dir)
    }

    fn apply_description(&mut self, description: SceneDescription, base_dir: &Path) -> Result<usize> {
        let mut mutations = 0;

        for (name, object_desc) in description.objects {
            let object = object_desc
                .into_object(base_dir)
                .with_context(|| format!("building scene object '{}'", name))?;
            let handle = ObjectHandle::new(name);

            let Some(existing) = self.objects.get(&handle).cloned() else {
                self.objects.insert(handle, object);
                continue;
            };

            if existing.transform != object.transform {
                self.set_transform(&handle, object.transform);
                mutations += 1;
            }
            if existing.mesh != object.mesh {
                self.set_mesh(&handle, object.mesh);
                mutations += 1;
            }
            if existing.material_slots != object.material_slots {
                self.set_material_slots(&handle, object.material_slots);
                mutations += 1;
            }
        }

        self.groups = description
            .groups
            .into_iter()
            .map(|(name, members)| (name, members.into_iter().map(ObjectHandle::new).collect()))
            .collect();

        Ok(mutations)
    }

    /// Insert or replace an object without notifying subscribers.
    pub fn add_object(&mut self, name: impl Into<String>, object: SceneObject) -> ObjectHandle {
        let handle = ObjectHandle::new(name);
        self.objects.insert(handle.clone(), object);
        handle
    }

    /// Define (or redefine) a named group of objects.
    pub fn add_group(&mut self, name: impl Into<String>, members: Vec<ObjectHandle>) {
        self.groups.insert(name.into(), members);
    }

    pub fn object(&self, handle: &ObjectHandle) -> Option<&SceneObject> {
        self.objects.get(handle)
    }

    /// Move an object. Returns false if it does not exist.
    pub fn set_transform(&mut self, handle: &ObjectHandle, transform: Transform) -> bool {
        let Some(object) = self.objects.get_mut(handle) else {
            return false;
        };
        object.transform = transform;
        self.notify(&SceneMutation::Transform(handle.clone()));
        true
    }

    /// Replace an object's geometry. Returns false if it does not exist.
    pub fn set_mesh(&mut self, handle: &ObjectHandle, mesh: Option<MeshData>) -> bool {
        let Some(object) = self.objects.get_mut(handle) else {
            return false;
        };
        object.mesh = mesh;
        self.notify(&SceneMutation::Geometry(handle.clone()));
        true
    }

    /// Replace an object's material slots. Returns false if it does not exist.
    pub fn set_material_slots(&mut self, handle: &ObjectHandle, slots: Vec<String>) -> bool {
        let Some(object) = self.objects.get_mut(handle) else {
            return false;
        };
        object.material_slots = slots;
        self.notify(&SceneMutation::Materials(handle.clone()));
        true
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn notify(&self, mutation: &SceneMutation) {
        for (_, callback) in &self.subscribers {
            callback(mutation);
        }
    }
}

impl SceneProvider for MemoryScene {
    fn resolve_group(&self, name: &str) -> Option<Vec<ObjectHandle>> {
        if let Some(members) = self.groups.get(name) {
            return Some(members.clone());
        }
        // A single mesh object can stand in for a one-member group
        let handle = ObjectHandle::new(name);
        self.objects
            .get(&handle)
            .filter(|object| object.mesh.is_some())
            .map(|_| vec![handle])
    }

    fn resolve_object(&self, name: &str) -> Option<ObjectHandle> {
        let handle = ObjectHandle::new(name);
        self.objects.contains_key(&handle).then_some(handle)
    }

    fn world_transform(&self, object: &ObjectHandle) -> Option<Mat4> {
        self.objects.get(object).map(|o| o.transform.to_matrix())
    }

    fn mesh(&self, object: &ObjectHandle) -> Option<MeshData> {
        self.objects.get(object).and_then(|o| o.mesh.clone())
    }

    fn material_slots(&self, object: &ObjectHandle) -> Vec<String> {
        self.objects
            .get(object)
            .map(|o| o.material_slots.clone())
            .unwrap_or_default()
    }

    fn subscribe(&mut self, on_mutate: MutationCallback) -> SubscriptionHandle {
        let handle = SubscriptionHandle(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((handle, on_mutate));
        handle
    }

    fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(h, _)| *h != handle);
        self.subscribers.len() != before
    }
}

#[derive(Debug, Deserialize)]
struct SceneDescription {
    #[serde(default)]
    groups: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    objects: BTreeMap<String, ObjectDescription>,
}

#[derive(Debug, Deserialize)]
struct ObjectDescription {
    #[serde(default)]
    position: [f32; 3],
    #[serde(default)]
    rotation: [f32; 3],
    #[serde(default = "unit_scale")]
    scale: [f32; 3],
    #[serde(default)]
    obj: Option<String>,
    #[serde(default)]
    mesh: Option<MeshDescription>,
    #[serde(default)]
    materials: Vec<String>,
}

fn unit_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

#[derive(Debug, Deserialize)]
struct MeshDescription {
    vertices: Vec<[f32; 3]>,
    faces: Vec<FaceDescription>,
}

#[derive(Debug, Deserialize)]
struct FaceDescription {
    indices: Vec<usize>,
    #[serde(default)]
    material: usize,
}

impl ObjectDescription {
    fn into_object(self, base_dir: &Path) -> Result<SceneObject> {
        let transform = Transform {
            position: Vec3::from_array(self.position),
            rotation: Vec3::from_array(self.rotation),
            scale: Vec3::from_array(self.scale),
        };

        let (mesh, obj_slots) = match (self.obj, self.mesh) {
            (Some(_), Some(_)) => anyhow::bail!("both 'obj' and 'mesh' given"),
            (Some(obj), None) => {
                let asset = MeshAsset::load(base_dir.join(obj)).map_err(anyhow::Error::msg)?;
                (Some(asset.mesh), asset.material_slots)
            }
            (None, Some(mesh)) => {
                let vertices = mesh.vertices.into_iter().map(Vec3::from_array).collect();
                let faces = mesh
                    .faces
                    .into_iter()
                    .map(|f| FaceData::new(f.indices, f.material))
                    .collect();
                (Some(MeshData::new(vertices, faces)), Vec::new())
            }
            (None, None) => (None, Vec::new()),
        };

        // Declared slots override whatever the OBJ material library named
        let material_slots = if self.materials.is_empty() {
            obj_slots
        } else {
            self.materials
        };

        Ok(SceneObject {
            transform,
            mesh,
            material_slots,
        })
    }
}
