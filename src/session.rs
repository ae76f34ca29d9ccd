//! Session controller.
//!
//! A [`Session`] owns the entities, the outbound sink, the optional path
//! receiver and the path store. It moves through
//! `Idle -> Configured -> Running -> Idle`; a failed `setup` leaves the
//! session where it was.
//!
//! The caller drives it: `update` is called from an external periodic tick
//! and never blocks.

use std::fmt;
use std::net::SocketAddr;

use glam::{Mat4, Vec3};

use crate::config::SessionConfig;
use crate::entity::{self, Entity, StateMessage};
use crate::error::{EntityKind, Error, Result};
use crate::geometry;
use crate::material::MaterialLibrary;
use crate::osc::OscArg;
use crate::paths::PathStore;
use crate::scene::{ObjectHandle, SceneProvider};
use crate::sink::MessageSink;
use crate::tracker::MovementTracker;
use crate::transport::{MessageSource, UdpReceiver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Configured,
    Running,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Configured => "configured",
            SessionState::Running => "running",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct Session {
    sink: Box<dyn MessageSink>,
    state: SessionState,
    config: SessionConfig,
    materials: Option<MaterialLibrary>,
    /// Sources, then listeners, then the room.
    entities: Vec<Entity>,
    receiver: Option<Box<dyn MessageSource>>,
    paths: PathStore,
}

impl Session {
    pub fn new(sink: Box<dyn MessageSink>) -> Self {
        Self {
            sink,
            state: SessionState::Idle,
            config: SessionConfig::default(),
            materials: None,
            entities: Vec::new(),
            receiver: None,
            paths: PathStore::new(),
        }
    }

    /// Cache a material library. It takes precedence over `material_file`.
    pub fn set_materials(&mut self, materials: MaterialLibrary) {
        self.materials = Some(materials);
    }

    pub fn materials(&self) -> Option<&MaterialLibrary> {
        self.materials.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn paths(&self) -> &PathStore {
        &self.paths
    }

    /// Stored paths up to the configured `draw_order_max`.
    pub fn visible_paths(&self) -> impl Iterator<Item = &[Vec3]> {
        self.paths.paths_with_order_at_most(self.config.draw_order_max)
    }

    /// Address the path receiver is bound to while running.
    pub fn receiver_addr(&self) -> Option<SocketAddr> {
        self.receiver.as_ref().and_then(|r| r.bound_addr())
    }

    pub fn flush_sink(&mut self) -> std::io::Result<()> {
        self.sink.flush()
    }

    /// Resolve and validate everything named in `config`, then build the
    /// entities.
    ///
    /// Entities are checked in room, source, listener order and the first
    /// missing one is reported. Nothing is committed unless every check
    /// passes.
    pub fn setup(&mut self, config: SessionConfig, scene: &dyn SceneProvider) -> Result<()> {
        if self.state == SessionState::Running {
            return Err(Error::InvalidState {
                operation: "setup",
                state: self.state.as_str(),
            });
        }
        config.validate()?;

        let room_objects = resolve_room(&config, scene)?;
        let source = resolve_movable(EntityKind::Source, config.source_object.as_deref(), scene)?;
        let listener = resolve_movable(EntityKind::Listener, config.listener_object.as_deref(), scene)?;

        let materials = match self.materials.take() {
            Some(cached) => cached,
            None => match &config.material_file {
                Some(path) => MaterialLibrary::load(path)?,
                None => {
                    return Err(Error::MaterialFile {
                        path: None,
                        reason: "no material definitions loaded".to_string(),
                    })
                }
            },
        };
        let checked = validate_room(scene, &room_objects, &materials);
        self.materials = Some(materials);
        checked?;

        let movement = MovementTracker::new(config.update_thresh_loc, config.update_thresh_rot);
        self.entities = vec![
            Entity::movable(EntityKind::Source, 1, source, movement.clone()),
            Entity::movable(EntityKind::Listener, 1, listener, movement),
            Entity::room(room_objects, config.update_thresh_time),
        ];
        self.config = config;
        self.state = SessionState::Configured;
        log::info!(
            "session configured: {} room objects, engine at {}:{}",
            self.entities.last().map_or(0, |room| room.objects().len()),
            self.config.ip_remote,
            self.config.port_write
        );
        Ok(())
    }

    /// Start streaming. Binds the path receiver first when `draw_rays` is set.
    pub fn start(&mut self, scene: &mut dyn SceneProvider) -> Result<()> {
        self.expect_configured("start")?;
        let receiver: Option<Box<dyn MessageSource>> = if self.config.draw_rays {
            let addr = (self.config.ip_local.as_str(), self.config.port_read);
            Some(Box::new(UdpReceiver::bind(addr)?))
        } else {
            None
        };
        self.begin(scene, receiver);
        Ok(())
    }

    /// Start streaming with an already constructed path source.
    pub fn start_with_source(&mut self, scene: &mut dyn SceneProvider, source: Box<dyn MessageSource>) -> Result<()> {
        self.expect_configured("start")?;
        self.begin(scene, Some(source));
        Ok(())
    }

    fn expect_configured(&self, operation: &'static str) -> Result<()> {
        if self.state != SessionState::Configured {
            return Err(Error::InvalidState {
                operation,
                state: self.state.as_str(),
            });
        }
        Ok(())
    }

    fn begin(&mut self, scene: &mut dyn SceneProvider, receiver: Option<Box<dyn MessageSource>>) {
        // Receiver goes live before anything is sent so no early path is lost
        self.receiver = receiver;

        self.sink.send("/dsp", &[OscArg::Int(1)]);
        self.sink.send("/order", &[OscArg::Int(self.config.ism_max_order)]);
        self.sink.send("/air", &[OscArg::Int(self.config.air_absorption as i32)]);
        self.sink.send("/soundvelocity", &[OscArg::Float(self.config.sound_velocity)]);

        for entity in &mut self.entities {
            self.sink.send(&entity.address("spawn"), &[]);
            entity.attach(scene);
        }

        self.state = SessionState::Running;
        log::info!("session started");
    }

    /// One tick: resend whatever changed, then drain one inbound datagram.
    ///
    /// Errors are logged and swallowed. Does nothing unless running.
    pub fn update(&mut self, scene: &dyn SceneProvider, now: f64) {
        if self.state != SessionState::Running {
            return;
        }

        for entity in &mut self.entities {
            match entity.poll_changes(scene, now) {
                Ok(Some(messages)) => {
                    if entity.kind() == EntityKind::Room {
                        // Runtime edits must keep referencing known materials
                        if let Some(materials) = &self.materials {
                            if let Err(e) = validate_room(scene, entity.objects(), materials) {
                                log::warn!("{} resend skipped: {}", entity.header(), e);
                                continue;
                            }
                        }
                        log::info!("room resynchronized: {} faces", face_count(&messages));
                    }
                    send_all(self.sink.as_mut(), entity, &messages);
                }
                Ok(None) => {}
                Err(e) => log::warn!("{} update skipped: {}", entity.header(), e),
            }
        }

        let Some(receiver) = self.receiver.as_mut() else {
            return;
        };
        if let Some(decoded) = receiver.poll_once() {
            match self.paths.apply(&decoded.message) {
                Ok(update) if update.is_change() => {
                    log::debug!("path store updated ({})", self.paths.summary())
                }
                Ok(_) => {}
                Err(e) => log::warn!("{}", e),
            }
        }
    }

    /// Stop streaming and return to idle. A no-op unless running.
    ///
    /// The mutation subscription and the receiver are released before this
    /// returns.
    pub fn stop(&mut self, scene: &mut dyn SceneProvider) {
        if self.state != SessionState::Running {
            log::debug!("stop ignored, session is {}", self.state);
            return;
        }

        self.sink.send("/dsp", &[OscArg::Int(0)]);
        for entity in &mut self.entities {
            self.sink.send(&entity.address("destroy"), &[]);
            entity.detach(scene);
        }
        self.receiver = None;

        if self.config.clear_paths_on_stop {
            self.paths.clear();
        }
        self.entities.clear();
        self.state = SessionState::Idle;
        log::info!("session stopped");
    }
}

fn send_all(sink: &mut dyn MessageSink, entity: &Entity, messages: &[StateMessage]) {
    for (sub_address, args) in messages {
        sink.send(&entity.address(sub_address), args);
    }
}

fn face_count(messages: &[StateMessage]) -> usize {
    messages.iter().filter(|(sub, _)| sub == "face").count()
}

fn resolve_room(config: &SessionConfig, scene: &dyn SceneProvider) -> Result<Vec<ObjectHandle>> {
    let name = config.room_group.as_deref().ok_or(Error::MissingEntity {
        kind: EntityKind::Room,
        name: None,
    })?;
    scene
        .resolve_group(name)
        .filter(|objects| !objects.is_empty())
        .ok_or_else(|| Error::MissingEntity {
            kind: EntityKind::Room,
            name: Some(name.to_string()),
        })
}

fn resolve_movable(kind: EntityKind, name: Option<&str>, scene: &dyn SceneProvider) -> Result<ObjectHandle> {
    let name = name.ok_or(Error::MissingEntity { kind, name: None })?;
    scene.resolve_object(name).ok_or_else(|| Error::MissingEntity {
        kind,
        name: Some(name.to_string()),
    })
}

/// Every room face must be a triangle or quad and reference a known material.
fn validate_room(scene: &dyn SceneProvider, objects: &[ObjectHandle], materials: &MaterialLibrary) -> Result<()> {
    for object in objects {
        let Some(mesh) = scene.mesh(object) else {
            log::warn!("room object '{}' has no geometry", object);
            continue;
        };
        let slots = scene.material_slots(object);
        if slots.is_empty() {
            return Err(Error::NoMaterial {
                object: object.name().to_string(),
            });
        }
        for face in &mesh.faces {
            geometry::triangulate_face(face, &mesh.vertices, &Mat4::IDENTITY)
                .map_err(|e| entity::face_error(object, e))?;
            let material = entity::slot_material(object, &slots, face.material_index)?;
            if !materials.contains(material) {
                return Err(Error::UnknownMaterial {
                    object: object.name().to_string(),
                    material: material.to_string(),
                });
            }
        }
    }
    Ok(())
}
