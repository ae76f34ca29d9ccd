use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Everything a session needs to know about the engine, the scene entities
/// and the throttling policy.
///
/// Every field has a default so a config file only needs to name what differs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Engine host.
    #[serde(default = "SessionConfig::default_ip")]
    pub ip_remote: String,
    /// Engine port, outbound messages go here.
    #[serde(default = "SessionConfig::default_port_write")]
    pub port_write: u16,
    /// Local address the path receiver binds to.
    #[serde(default = "SessionConfig::default_ip")]
    pub ip_local: String,
    #[serde(default = "SessionConfig::default_port_read")]
    pub port_read: u16,

    /// Scene group holding the room meshes.
    #[serde(default)]
    pub room_group: Option<String>,
    #[serde(default)]
    pub source_object: Option<String>,
    #[serde(default)]
    pub listener_object: Option<String>,

    /// Maximum image-source reflection order computed by the engine.
    #[serde(default = "SessionConfig::default_ism_max_order")]
    pub ism_max_order: i32,
    #[serde(default = "SessionConfig::default_air_absorption")]
    pub air_absorption: bool,
    /// Speed of sound in m/s.
    #[serde(default = "SessionConfig::default_sound_velocity")]
    pub sound_velocity: f32,

    /// Translation threshold in meters.
    #[serde(default = "SessionConfig::default_update_thresh_loc")]
    pub update_thresh_loc: f32,
    /// Rotation threshold in degrees.
    #[serde(default = "SessionConfig::default_update_thresh_rot")]
    pub update_thresh_rot: f32,
    /// Minimum seconds between two room resynchronizations.
    #[serde(default = "SessionConfig::default_update_thresh_time")]
    pub update_thresh_time: f64,

    /// Receive and store acoustic paths from the engine.
    #[serde(default)]
    pub draw_rays: bool,
    #[serde(default = "SessionConfig::default_draw_order_max")]
    pub draw_order_max: i32,
    /// Drop every stored solution when the session stops.
    #[serde(default)]
    pub clear_paths_on_stop: bool,

    #[serde(default)]
    pub material_file: Option<PathBuf>,

    #[serde(default)]
    pub debug_logs: bool,
}

impl SessionConfig {
    fn default_ip() -> String {
        "127.0.0.1".to_string()
    }
    fn default_port_write() -> u16 {
        3858
    }
    fn default_port_read() -> u16 {
        3860
    }
    fn default_ism_max_order() -> i32 {
        2
    }
    fn default_air_absorption() -> bool {
        true
    }
    fn default_sound_velocity() -> f32 {
        343.0
    }
    fn default_update_thresh_loc() -> f32 {
        0.1
    }
    fn default_update_thresh_rot() -> f32 {
        1.0
    }
    fn default_update_thresh_time() -> f64 {
        0.1
    }
    fn default_draw_order_max() -> i32 {
        2
    }

    /// Read and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config = Self::from_json(&contents)
            .map_err(|e| Error::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        log::info!("loaded session config from {}", path.display());
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.update_thresh_loc >= 0.0) || !(self.update_thresh_rot >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "movement thresholds must be non-negative numbers (loc {}, rot {})",
                self.update_thresh_loc, self.update_thresh_rot
            )));
        }
        if !(self.update_thresh_time >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "update_thresh_time must be a non-negative number, got {}",
                self.update_thresh_time
            )));
        }
        if !(self.sound_velocity > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "sound_velocity must be positive, got {}",
                self.sound_velocity
            )));
        }
        if self.port_write == 0 {
            return Err(Error::InvalidConfig("port_write must not be 0".to_string()));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ip_remote: Self::default_ip(),
            port_write: Self::default_port_write(),
            ip_local: Self::default_ip(),
            port_read: Self::default_port_read(),
            room_group: None,
            source_object: None,
            listener_object: None,
            ism_max_order: Self::default_ism_max_order(),
            air_absorption: Self::default_air_absorption(),
            sound_velocity: Self::default_sound_velocity(),
            update_thresh_loc: Self::default_update_thresh_loc(),
            update_thresh_rot: Self::default_update_thresh_rot(),
            update_thresh_time: Self::default_update_thresh_time(),
            draw_rays: false,
            draw_order_max: Self::default_draw_order_max(),
            clear_paths_on_stop: false,
            material_file: None,
            debug_logs: false,
        }
    }
}
