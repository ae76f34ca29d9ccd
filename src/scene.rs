//! Scene provider interface.
//!
//! The bridge does not own the scene: a host (an editor, a game engine, or
//! [`MemoryScene`](crate::memory_scene::MemoryScene)) exposes its objects
//! through [`SceneProvider`] and reports edits through subscribed callbacks.

use std::fmt;

use glam::{Mat4, Vec3};

/// Opaque reference to a scene object, stable for the object's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(pub String);

impl ObjectHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One polygon of a mesh: vertex indices plus a material slot index.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceData {
    pub indices: Vec<usize>,
    pub material_index: usize,
}

impl FaceData {
    pub fn new(indices: Vec<usize>, material_index: usize) -> Self {
        Self {
            indices,
            material_index,
        }
    }
}

/// Object-space polygon mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vec3>,
    pub faces: Vec<FaceData>,
}

impl MeshData {
    pub fn new(vertices: Vec<Vec3>, faces: Vec<FaceData>) -> Self {
        Self { vertices, faces }
    }
}

/// What changed on a tracked object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneMutation {
    Transform(ObjectHandle),
    Geometry(ObjectHandle),
    Materials(ObjectHandle),
}

impl SceneMutation {
    pub fn object(&self) -> &ObjectHandle {
        match self {
            SceneMutation::Transform(h) | SceneMutation::Geometry(h) | SceneMutation::Materials(h) => h,
        }
    }
}

/// Token returned by [`SceneProvider::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// Callback invoked by the provider for every mutation.
pub type MutationCallback = Box<dyn Fn(&SceneMutation) + Send + Sync>;

/// Read access to the host scene plus mutation notifications.
pub trait SceneProvider {
    /// Resolve a named group of room objects.
    fn resolve_group(&self, name: &str) -> Option<Vec<ObjectHandle>>;

    /// Resolve a single named object.
    fn resolve_object(&self, name: &str) -> Option<ObjectHandle>;

    /// Current object-to-world transform.
    fn world_transform(&self, object: &ObjectHandle) -> Option<Mat4>;

    /// Current object-space mesh, if the object has geometry.
    fn mesh(&self, object: &ObjectHandle) -> Option<MeshData>;

    /// Material names indexed by [`FaceData::material_index`].
    fn material_slots(&self, object: &ObjectHandle) -> Vec<String>;

    fn subscribe(&mut self, on_mutate: MutationCallback) -> SubscriptionHandle;

    /// Remove a subscription. Returns false if the handle was unknown.
    fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool;
}
