//! Error taxonomy for the bridge.
//!
//! Setup-time variants (`MissingEntity`, `MaterialFile`, `UnknownMaterial`, ...)
//! are returned to the caller and abort the transition. The runtime variants
//! (`MalformedMessage`, `MalformedPath`, `UnrecognizedAddress`,
//! `TransportUnreachable`) only ever reach the log: the offending message is
//! dropped and the session keeps ticking.

use std::fmt;
use std::path::PathBuf;

/// Which scene entity a setup error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Room,
    Source,
    Listener,
}

impl EntityKind {
    /// OSC address header for this kind of entity.
    pub fn header(&self) -> &'static str {
        match self {
            EntityKind::Room => "room",
            EntityKind::Source => "source",
            EntityKind::Listener => "listener",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Room, source or listener is not named in the config or cannot be found in the scene.
    #[error("missing {kind}: {}", name.as_deref().map(|n| format!("'{}' not found in scene", n)).unwrap_or_else(|| "none defined".to_string()))]
    MissingEntity {
        kind: EntityKind,
        name: Option<String>,
    },

    /// No material definitions cached and none could be loaded.
    #[error("material file error ({}): {reason}", path.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "no material file configured".to_string()))]
    MaterialFile {
        path: Option<PathBuf>,
        reason: String,
    },

    /// A material definition violates the frequency/coefficient invariants.
    #[error("invalid material '{name}': {reason}")]
    InvalidMaterial { name: String, reason: String },

    /// A room object carries no material slot at all.
    #[error("room object '{object}' has no material")]
    NoMaterial { object: String },

    /// A room face references a material the library does not define.
    #[error("room object '{object}' material '{material}': not an acoustic material")]
    UnknownMaterial { object: String, material: String },

    /// A face that cannot be split into triangles.
    #[error("room object '{object}' has a face with {vertex_count} vertices (only triangles and quads are supported)")]
    InvalidFace { object: String, vertex_count: usize },

    #[error("room object '{object}' has a face referencing missing vertex {index}")]
    InvalidVertexIndex { object: String, index: usize },

    #[error("malformed OSC message: {0}")]
    MalformedMessage(String),

    /// Path point payload whose value count is not a multiple of 3.
    #[error("malformed path {solution}/{path}: {value_count} coordinates is not a multiple of 3, update ignored")]
    MalformedPath {
        solution: String,
        path: String,
        value_count: usize,
    },

    #[error("unrecognized OSC address: {0}")]
    UnrecognizedAddress(String),

    #[error("no route to {target}: {reason}")]
    TransportUnreachable { target: String, reason: String },

    /// Lifecycle call made from a state that does not allow it.
    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
