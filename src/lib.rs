pub mod error;
pub mod osc;
pub mod transport;
pub mod sink;

// Scene side
pub mod scene;
pub mod memory_scene;
pub mod mesh_asset;
pub mod geometry;
pub mod material;

// Synchronization
pub mod tracker;
pub mod entity;
pub mod paths;
pub mod config;
pub mod session;
pub mod export;

pub mod cli;

pub use config::SessionConfig;
pub use error::{EntityKind, Error, Result};
pub use session::{Session, SessionState};
