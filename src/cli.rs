use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use crate::config::SessionConfig;
use crate::export::export_scene;
use crate::memory_scene::MemoryScene;
use crate::paths::PathStore;
use crate::session::Session;
use crate::sink::UdpSink;
use crate::transport::{MessageSource, UdpReceiver};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a scene to the acoustic engine
    Run {
        /// Session config (JSON)
        #[arg(long)]
        config: PathBuf,

        /// Scene description (JSON), reloaded when it changes on disk
        #[arg(long)]
        scene: PathBuf,

        /// Stop after this many seconds (runs until killed otherwise)
        #[arg(long)]
        duration: Option<f64>,

        /// Update tick in milliseconds
        #[arg(long, default_value_t = 75)]
        tick_ms: u64,

        /// Log every message sent and received
        #[arg(long)]
        verbose: bool,
    },
    /// Write the messages of one session cycle to a text file
    Export {
        #[arg(long)]
        config: PathBuf,

        #[arg(long)]
        scene: PathBuf,

        /// Output file, truncated first
        #[arg(long)]
        out: PathBuf,
    },
    /// Receive acoustic paths and report what arrives
    Listen {
        #[arg(long)]
        port: u16,

        #[arg(long, default_value = "127.0.0.1")]
        ip: String,

        /// Highest reflection order counted in reports
        #[arg(long, default_value_t = 2)]
        max_order: i32,

        #[arg(long)]
        duration: Option<f64>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { config, scene, duration, tick_ms, verbose } => {
            run_session(&config, &scene, duration, tick_ms, verbose)
        }
        Commands::Export { config, scene, out } => export_command(&config, &scene, &out),
        Commands::Listen { port, ip, max_order, duration } => {
            init_logging(false);
            listen(&ip, port, max_order, duration)
        }
    };
    if let Err(e) = &result {
        log::error!("{}", error_report(e));
    }
    result
}

/// The full error chain on one line, outermost context first.
pub fn error_report(error: &anyhow::Error) -> String {
    format!("{:#}", error)
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    // Ignore a second init (tests, embedding)
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).try_init();
}

fn load_config(path: &Path) -> Result<SessionConfig> {
    SessionConfig::load(path).with_context(|| format!("loading config {}", path.display()))
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn export_command(config_path: &Path, scene_path: &Path, out: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    init_logging(config.debug_logs);
    let mut scene = MemoryScene::load(scene_path)?;
    export_scene(&config, None, &mut scene, out)
        .with_context(|| format!("exporting to {}", out.display()))?;
    println!("Exported scene to {}", out.display());
    Ok(())
}

fn run_session(config_path: &Path, scene_path: &Path, duration: Option<f64>, tick_ms: u64, verbose: bool) -> Result<()> {
    let config = load_config(config_path)?;
    init_logging(verbose || config.debug_logs);

    let mut scene = MemoryScene::load(scene_path)?;
    let sink = UdpSink::new(config.ip_remote.clone(), config.port_write)?;
    let draw_rays = config.draw_rays;

    let mut session = Session::new(Box::new(sink));
    session.setup(config, &scene).context("session setup failed")?;
    session.start(&mut scene).context("session start failed")?;

    println!(
        "Streaming to {}:{} (tick {} ms)...",
        session.config().ip_remote,
        session.config().port_write,
        tick_ms
    );

    let tick = Duration::from_millis(tick_ms.max(1));
    let started = Instant::now();
    let mut scene_modified = modified_time(scene_path);

    loop {
        let now = started.elapsed().as_secs_f64();
        if duration.is_some_and(|limit| now >= limit) {
            break;
        }

        let modified = modified_time(scene_path);
        if modified != scene_modified {
            scene_modified = modified;
            match scene.reload(scene_path) {
                Ok(count) => log::info!("scene reloaded, {} changes", count),
                Err(e) => log::warn!("scene reload failed: {:#}", e),
            }
        }

        session.update(&scene, now);
        thread::sleep(tick);
    }

    session.stop(&mut scene);
    if draw_rays {
        println!("Received {}", session.paths().summary());
    }
    Ok(())
}

fn listen(ip: &str, port: u16, max_order: i32, duration: Option<f64>) -> Result<()> {
    let mut receiver = UdpReceiver::bind((ip, port)).with_context(|| format!("binding {}:{}", ip, port))?;
    let mut store = PathStore::new();
    println!("Listening on {}:{}...", ip, port);

    let started = Instant::now();
    while duration.map_or(true, |limit| started.elapsed().as_secs_f64() < limit) {
        let mut changed = false;
        while let Some(decoded) = receiver.poll_once() {
            match store.apply(&decoded.message) {
                Ok(update) => changed |= update.is_change(),
                Err(e) => log::warn!("{}", e),
            }
        }
        if changed {
            log::info!(
                "{}, {} up to order {}",
                store.summary(),
                store.paths_with_order_at_most(max_order).count(),
                max_order
            );
        }
        thread::sleep(Duration::from_millis(10));
    }

    println!("Received {}", store.summary());
    Ok(())
}
