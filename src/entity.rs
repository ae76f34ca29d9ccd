//! Synchronized scene entities.
//!
//! One [`Entity`] type covers the room, sources and listeners. What an entity
//! does is decided by the capabilities it carries: a [`MovementTracker`]
//! makes it send its pose when it moves, a [`GeometryTracker`] makes it
//! resend the room definition when the geometry or materials change.

use std::collections::HashSet;
use std::sync::atomic::Ordering;

use glam::Mat4;

use crate::error::{EntityKind, Error, Result};
use crate::geometry::{self, FaceError};
use crate::osc::OscArg;
use crate::scene::{ObjectHandle, SceneMutation, SceneProvider, SubscriptionHandle};
use crate::tracker::{GeometryTracker, MovementTracker};

/// Sub-address (relative to the entity header) and arguments of one message.
pub type StateMessage = (String, Vec<OscArg>);

#[derive(Debug)]
pub struct Entity {
    kind: EntityKind,
    id: Option<u32>,
    objects: Vec<ObjectHandle>,
    movement: Option<MovementTracker>,
    geometry: Option<GeometryTracker>,
    subscription: Option<SubscriptionHandle>,
}

impl Entity {
    /// The room: a set of mesh objects resent as a whole when they change.
    pub fn room(objects: Vec<ObjectHandle>, update_interval: f64) -> Self {
        Self {
            kind: EntityKind::Room,
            id: None,
            objects,
            movement: None,
            geometry: Some(GeometryTracker::new(update_interval)),
            subscription: None,
        }
    }

    /// A source or listener following one scene object.
    pub fn movable(kind: EntityKind, id: u32, object: ObjectHandle, movement: MovementTracker) -> Self {
        Self {
            kind,
            id: Some(id),
            objects: vec![object],
            movement: Some(movement),
            geometry: None,
            subscription: None,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn objects(&self) -> &[ObjectHandle] {
        &self.objects
    }

    pub fn movement(&self) -> Option<&MovementTracker> {
        self.movement.as_ref()
    }

    pub fn geometry(&self) -> Option<&GeometryTracker> {
        self.geometry.as_ref()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Address prefix, e.g. `/room` or `/source/1`.
    pub fn header(&self) -> String {
        match self.id {
            Some(id) => format!("/{}/{}", self.kind, id),
            None => format!("/{}", self.kind),
        }
    }

    /// Full address of a sub-address under this entity.
    pub fn address(&self, sub_address: &str) -> String {
        format!("{}/{}", self.header(), sub_address)
    }

    /// Hook geometry tracking into the scene's mutation notifications and
    /// take the initial material snapshot.
    pub fn attach(&mut self, scene: &mut dyn SceneProvider) {
        let Some(tracker) = self.geometry.as_mut() else {
            return;
        };

        tracker.observe_materials(self.objects.iter().map(|o| scene.material_slots(o)).collect());

        let pending = tracker.pending_flag();
        let watched: HashSet<ObjectHandle> = self.objects.iter().cloned().collect();
        let handle = scene.subscribe(Box::new(move |mutation: &SceneMutation| {
            if watched.contains(mutation.object()) {
                pending.store(true, Ordering::SeqCst);
            }
        }));
        self.subscription = Some(handle);
    }

    /// Remove the mutation subscription, if any.
    pub fn detach(&mut self, scene: &mut dyn SceneProvider) {
        if let Some(handle) = self.subscription.take() {
            if !scene.unsubscribe(handle) {
                log::warn!("{} subscription was already gone", self.header());
            }
        }
    }

    /// Current full state of the entity.
    pub fn serialize_state(&self, scene: &dyn SceneProvider) -> Result<Vec<StateMessage>> {
        if self.geometry.is_some() {
            return serialize_room(scene, &self.objects);
        }
        let world = self.world_transform(scene)?;
        Ok(vec![transform_message(&world)])
    }

    /// State messages for whatever changed since the last call, if anything.
    pub fn poll_changes(&mut self, scene: &dyn SceneProvider, now: f64) -> Result<Option<Vec<StateMessage>>> {
        if let Some(tracker) = self.geometry.as_mut() {
            tracker.observe_materials(self.objects.iter().map(|o| scene.material_slots(o)).collect());
            if !(tracker.poll(now) && tracker.take_confirmed()) {
                return Ok(None);
            }
            return self.serialize_state(scene).map(Some);
        }

        let world = self.world_transform(scene)?;
        let moved = match self.movement.as_mut() {
            Some(tracker) => tracker.has_moved(world),
            None => false,
        };
        Ok(moved.then(|| vec![transform_message(&world)]))
    }

    fn world_transform(&self, scene: &dyn SceneProvider) -> Result<Mat4> {
        let object = &self.objects[0];
        scene.world_transform(object).ok_or_else(|| Error::MissingEntity {
            kind: self.kind,
            name: Some(object.name().to_string()),
        })
    }
}

/// `transform/matrix` with scale removed, as 16 column-ordered floats.
pub fn transform_message(world: &Mat4) -> StateMessage {
    let (_scale, rotation, translation) = world.to_scale_rotation_translation();
    let normalized = Mat4::from_rotation_translation(rotation, translation);
    let args = normalized
        .to_cols_array()
        .into_iter()
        .map(OscArg::Float)
        .collect();
    ("transform/matrix".to_string(), args)
}

/// Full room definition: `definestart`, one face block per triangle, `defineover`.
///
/// Face ids restart at 1 on every call.
pub fn serialize_room(scene: &dyn SceneProvider, objects: &[ObjectHandle]) -> Result<Vec<StateMessage>> {
    let mut messages = vec![("definestart".to_string(), Vec::new())];
    let mut face_id: i32 = 1;

    for object in objects {
        let Some(mesh) = scene.mesh(object) else {
            log::warn!("room object '{}' has no geometry, skipped", object);
            continue;
        };
        let slots = scene.material_slots(object);
        let Some(world) = scene.world_transform(object) else {
            log::warn!("room object '{}' has no transform, skipped", object);
            continue;
        };

        let triangles = geometry::triangulate_mesh(&mesh, &world).map_err(|e| face_error(object, e))?;
        for triangle in triangles {
            let material = slot_material(object, &slots, triangle.material_index)?;
            messages.push(("face".to_string(), vec![OscArg::Int(face_id)]));
            messages.push((
                format!("face/{}/material", face_id),
                vec![OscArg::Str(material.to_string())],
            ));
            messages.push((
                format!("face/{}/triangles/xyz", face_id),
                triangle.to_xyz().into_iter().map(OscArg::Float).collect(),
            ));
            face_id += 1;
        }
    }

    messages.push(("defineover".to_string(), Vec::new()));
    Ok(messages)
}

pub(crate) fn face_error(object: &ObjectHandle, error: FaceError) -> Error {
    match error {
        FaceError::VertexCount(vertex_count) => Error::InvalidFace {
            object: object.name().to_string(),
            vertex_count,
        },
        FaceError::VertexIndex(index) => Error::InvalidVertexIndex {
            object: object.name().to_string(),
            index,
        },
    }
}

pub(crate) fn slot_material<'a>(object: &ObjectHandle, slots: &'a [String], index: usize) -> Result<&'a str> {
    if slots.is_empty() {
        return Err(Error::NoMaterial {
            object: object.name().to_string(),
        });
    }
    slots
        .get(index)
        .map(|s| s.as_str())
        .ok_or_else(|| Error::UnknownMaterial {
            object: object.name().to_string(),
            material: format!("<slot {}>", index),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_scene::{MemoryScene, SceneObject, Transform};
    use crate::scene::{FaceData, MeshData, MutationCallback};
    use glam::Vec3;

    /// Wraps a scene but reports no transform for one object.
    struct Untransformed {
        inner: MemoryScene,
        hidden: ObjectHandle,
    }

    impl SceneProvider for Untransformed {
        fn resolve_group(&self, name: &str) -> Option<Vec<ObjectHandle>> {
            self.inner.resolve_group(name)
        }

        fn resolve_object(&self, name: &str) -> Option<ObjectHandle> {
            self.inner.resolve_object(name)
        }

        fn world_transform(&self, object: &ObjectHandle) -> Option<Mat4> {
            if *object == self.hidden {
                return None;
            }
            self.inner.world_transform(object)
        }

        fn mesh(&self, object: &ObjectHandle) -> Option<MeshData> {
            self.inner.mesh(object)
        }

        fn material_slots(&self, object: &ObjectHandle) -> Vec<String> {
            self.inner.material_slots(object)
        }

        fn subscribe(&mut self, on_mutate: MutationCallback) -> SubscriptionHandle {
            self.inner.subscribe(on_mutate)
        }

        fn unsubscribe(&mut self, handle: SubscriptionHandle) -> bool {
            self.inner.unsubscribe(handle)
        }
    }

    fn quad_room() -> (MemoryScene, ObjectHandle) {
        let mut scene = MemoryScene::new();
        let mesh = MeshData::new(
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            vec![FaceData::new(vec![0, 1, 2, 3], 0)],
        );
        let walls = scene.add_object(
            "Walls",
            SceneObject::with_mesh(Transform::default(), mesh, vec!["Brick".to_string()]),
        );
        (scene, walls)
    }

    #[test]
    fn test_headers() {
        let room = Entity::room(vec![], 0.1);
        assert_eq!(room.header(), "/room");
        assert_eq!(room.address("definestart"), "/room/definestart");

        let source = Entity::movable(EntityKind::Source, 1, ObjectHandle::new("S"), MovementTracker::default());
        assert_eq!(source.header(), "/source/1");
        assert_eq!(source.address("spawn"), "/source/1/spawn");
    }

    #[test]
    fn test_room_quad_becomes_two_faces() {
        let (scene, walls) = quad_room();
        let messages = serialize_room(&scene, &[walls]).unwrap();

        let subs: Vec<&str> = messages.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(
            subs,
            vec![
                "definestart",
                "face",
                "face/1/material",
                "face/1/triangles/xyz",
                "face",
                "face/2/material",
                "face/2/triangles/xyz",
                "defineover",
            ]
        );
        assert_eq!(messages[1].1, vec![OscArg::Int(1)]);
        assert_eq!(messages[2].1, vec![OscArg::Str("Brick".to_string())]);
        assert_eq!(messages[3].1.len(), 9);
    }

    #[test]
    fn test_room_face_ids_restart() {
        let (scene, walls) = quad_room();
        let first = serialize_room(&scene, &[walls.clone()]).unwrap();
        let second = serialize_room(&scene, &[walls]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_room_with_pentagon_fails() {
        let (mut scene, walls) = quad_room();
        let mut mesh = scene.mesh(&walls).unwrap();
        mesh.vertices.push(Vec3::Z);
        mesh.faces[0].indices.push(4);
        scene.set_mesh(&walls, Some(mesh));

        let err = serialize_room(&scene, &[walls]).unwrap_err();
        assert!(matches!(err, Error::InvalidFace { vertex_count: 5, .. }));
    }

    #[test]
    fn test_room_object_without_transform_is_skipped() {
        let (mut inner, walls) = quad_room();
        let floor_mesh = inner.mesh(&walls).unwrap();
        let floor = inner.add_object(
            "Floor",
            SceneObject::with_mesh(Transform::default(), floor_mesh, vec!["Tile".to_string()]),
        );
        let scene = Untransformed { inner, hidden: walls.clone() };

        let messages = serialize_room(&scene, &[walls, floor]).unwrap();
        let materials: Vec<&OscArg> = messages
            .iter()
            .filter(|(sub, _)| sub.ends_with("/material"))
            .flat_map(|(_, args)| args)
            .collect();
        assert_eq!(materials, vec![&OscArg::Str("Tile".to_string()); 2]);
        assert_eq!(messages[1], ("face".to_string(), vec![OscArg::Int(1)]));
    }

    #[test]
    fn test_serialize_state_room() {
        let (scene, walls) = quad_room();
        let room = Entity::room(vec![walls], 0.1);

        let messages = room.serialize_state(&scene).unwrap();
        assert_eq!(messages.first().map(|(s, _)| s.as_str()), Some("definestart"));
        assert_eq!(messages.last().map(|(s, _)| s.as_str()), Some("defineover"));
        assert_eq!(messages.iter().filter(|(s, _)| s == "face").count(), 2);
    }

    #[test]
    fn test_serialize_state_movable() {
        let mut scene = MemoryScene::new();
        let handle = scene.add_object("Head", SceneObject::empty(Transform::from_position(Vec3::new(0.0, 1.0, 2.0))));
        let listener = Entity::movable(EntityKind::Listener, 1, handle, MovementTracker::default());

        let messages = listener.serialize_state(&scene).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, "transform/matrix");
        assert_eq!(messages[0].1.len(), 16);
        assert_eq!(messages[0].1[13], OscArg::Float(1.0));
        assert_eq!(messages[0].1[14], OscArg::Float(2.0));

        // Stateless: the movement tracker is not consulted
        assert_eq!(listener.serialize_state(&scene).unwrap(), messages);

        let gone = Entity::movable(EntityKind::Source, 1, ObjectHandle::new("Gone"), MovementTracker::default());
        assert!(matches!(
            gone.serialize_state(&scene),
            Err(Error::MissingEntity { kind: EntityKind::Source, .. })
        ));
    }

    #[test]
    fn test_transform_message_drops_scale() {
        let world = Mat4::from_scale_rotation_translation(
            Vec3::splat(2.0),
            glam::Quat::IDENTITY,
            Vec3::new(1.0, 2.0, 3.0),
        );
        let (sub, args) = transform_message(&world);
        assert_eq!(sub, "transform/matrix");
        assert_eq!(args.len(), 16);

        let values: Vec<f32> = args.iter().filter_map(|a| a.as_f32()).collect();
        assert!((values[0] - 1.0).abs() < 1e-6);
        assert!((values[5] - 1.0).abs() < 1e-6);
        // Translation sits in the last column
        assert_eq!(&values[12..15], &[1.0, 2.0, 3.0]);
        assert_eq!(values[15], 1.0);
    }

    #[test]
    fn test_movable_polls_only_when_moved() {
        let mut scene = MemoryScene::new();
        let handle = scene.add_object("Source", SceneObject::empty(Transform::default()));
        let mut source = Entity::movable(EntityKind::Source, 1, handle.clone(), MovementTracker::new(0.1, 1.0));

        assert!(source.poll_changes(&scene, 0.0).unwrap().is_some());
        assert!(source.poll_changes(&scene, 0.1).unwrap().is_none());

        scene.set_transform(&handle, Transform::from_position(Vec3::new(0.5, 0.0, 0.0)));
        let messages = source.poll_changes(&scene, 0.2).unwrap().unwrap();
        assert_eq!(messages[0].0, "transform/matrix");
    }

    #[test]
    fn test_movable_missing_object_is_an_error() {
        let scene = MemoryScene::new();
        let mut source = Entity::movable(EntityKind::Listener, 1, ObjectHandle::new("Gone"), MovementTracker::default());
        assert!(matches!(
            source.poll_changes(&scene, 0.0),
            Err(Error::MissingEntity { kind: EntityKind::Listener, .. })
        ));
    }

    #[test]
    fn test_room_attach_and_detach() {
        let (mut scene, walls) = quad_room();
        let mut room = Entity::room(vec![walls.clone()], 1.0);

        room.attach(&mut scene);
        assert!(room.is_subscribed());
        assert_eq!(scene.subscriber_count(), 1);

        // Initial definition
        assert!(room.poll_changes(&scene, 0.0).unwrap().is_some());
        assert!(room.poll_changes(&scene, 0.1).unwrap().is_none());

        // Mutation is captured immediately but released by the gate at t = 1.0
        scene.set_transform(&walls, Transform::from_position(Vec3::Z));
        assert!(room.geometry().unwrap().is_pending());
        assert!(room.poll_changes(&scene, 0.5).unwrap().is_none());
        assert!(room.poll_changes(&scene, 1.0).unwrap().is_some());

        room.detach(&mut scene);
        assert!(!room.is_subscribed());
        assert_eq!(scene.subscriber_count(), 0);
    }

    #[test]
    fn test_room_material_change_detected_without_callback() {
        let (mut scene, walls) = quad_room();
        let mut room = Entity::room(vec![walls.clone()], 0.0);
        room.attach(&mut scene);
        room.detach(&mut scene);

        room.poll_changes(&scene, 0.0).unwrap();
        scene.set_material_slots(&walls, vec!["Carpet".to_string()]);

        let messages = room.poll_changes(&scene, 0.1).unwrap().unwrap();
        assert!(messages.contains(&("face/1/material".to_string(), vec![OscArg::Str("Carpet".to_string())])));
    }
}
