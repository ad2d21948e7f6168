//! Backdrop - a generative animated background
//! Built with iced, wgpu and tiny-skia

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod app;
mod config;
mod engine;
mod layers;
mod render;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::{ConfigError, SceneConfig};

#[derive(Parser)]
#[command(name = "backdrop")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Generative animated background", long_about = None)]
struct Cli {
    /// Scene file; defaults to scene.json in the user config directory
    scene: Option<PathBuf>,

    /// Do not reload the scene when the file changes
    #[arg(long)]
    no_watch: bool,

    /// Initial window width in logical pixels
    #[arg(long, default_value_t = 1280.0)]
    width: f32,

    /// Initial window height in logical pixels
    #[arg(long, default_value_t = 800.0)]
    height: f32,
}

/// Read the scene file, writing the default scene if it does not exist yet
fn load_or_create(path: &Path) -> Result<SceneConfig> {
    if !path.exists() {
        let scene = SceneConfig::default();
        scene
            .save_to_file(path)
            .with_context(|| format!("Failed to write default scene to {}", path.display()))?;
        tracing::info!("Wrote default scene to {}", path.display());
        return Ok(scene);
    }

    match SceneConfig::load_from_file(path) {
        Ok(scene) => Ok(scene),
        Err(ConfigError::Parse(e)) => {
            tracing::warn!("Invalid scene file {}: {}; using defaults", path.display(), e);
            Ok(SceneConfig::default())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

fn main() -> Result<()> {
    // Initialize tracing for logging, honoring RUST_LOG
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let scene_path = match cli.scene {
        Some(path) => path,
        None => SceneConfig::file_path().context("No config directory for this platform")?,
    };
    let scene = load_or_create(&scene_path)?;

    let boot = app::Boot {
        scene_path,
        scene,
        window_size: iced::Size::new(cli.width.max(1.0), cli.height.max(1.0)),
        watch: !cli.no_watch,
    };

    // Run as a daemon so the window can be closed only after the layers are torn down
    iced::daemon(move || app::App::new(boot.clone()), app::App::update, app::App::view)
        .title(app::App::title)
        .theme(app::App::theme)
        .subscription(app::App::subscription)
        .run()
        .context("Application error")?;

    Ok(())
}
