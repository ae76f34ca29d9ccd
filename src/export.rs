//! Export mode: one full session cycle written to a text file instead of
//! the network.

use std::path::Path;

use crate::config::SessionConfig;
use crate::error::Result;
use crate::material::MaterialLibrary;
use crate::scene::SceneProvider;
use crate::session::Session;
use crate::sink::FileDumpSink;

/// Run setup, start, one update and stop against a file dump at `out_path`.
///
/// The file is truncated first. Ray reception is always off in this mode.
pub fn export_scene(
    config: &SessionConfig,
    materials: Option<MaterialLibrary>,
    scene: &mut dyn SceneProvider,
    out_path: impl AsRef<Path>,
) -> Result<()> {
    let out_path = out_path.as_ref();
    let sink = FileDumpSink::create(out_path)?;

    let mut session = Session::new(Box::new(sink));
    if let Some(materials) = materials {
        session.set_materials(materials);
    }

    let mut config = config.clone();
    config.draw_rays = false;

    session.setup(config, scene)?;
    session.start(scene)?;
    session.update(scene, 0.0);
    session.stop(scene);
    session.flush_sink()?;

    log::info!("exported scene to {}", out_path.display());
    Ok(())
}
