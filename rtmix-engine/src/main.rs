//! rtmix engine - command-line entry point
//!
//! Lists output devices and drivers, or plays registered sounds through the
//! mixer until they finish or the process is asked to stop.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rtmix_common::config::{resolve_config_path, TomlConfig};
use rtmix_common::sound_defs::load_definitions;
use rtmix_engine::{AudioManager, PlaybackHandle, ResourceKey};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often `play` checks whether all sounds have finished
const FINISH_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Command-line arguments for rtmix-engine
#[derive(Parser, Debug)]
#[command(name = "rtmix-engine")]
#[command(about = "Streaming audio resources and real-time mixer")]
#[command(version, long_version = long_version())]
struct Args {
    /// Configuration file (overrides RTMIX_CONFIG and the default locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Sound definition file (overrides `sound_definitions` in the config)
    #[arg(short, long, global = true)]
    definitions: Option<PathBuf>,

    /// Output device name (overrides `[audio] device`)
    #[arg(long, global = true)]
    device: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List audio output devices
    Devices,

    /// List audio drivers and the one in use
    Drivers,

    /// Play sounds given as category:id (e.g. music:1 game:3)
    Play {
        /// Restart each sound when it reaches its end
        #[arg(long = "loop")]
        looping: bool,

        /// Volume for all sounds (1.0 = source level, max 4.0)
        #[arg(long, default_value_t = 1.0)]
        volume: f32,

        #[arg(required = true)]
        sounds: Vec<ResourceKey>,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (",
        env!("GIT_HASH"),
        ", built ",
        env!("BUILD_TIMESTAMP"),
        ", ",
        env!("BUILD_PROFILE"),
        ")"
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let mut config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing; RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("rtmix-engine {}", long_version());
    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: built-in defaults"),
    }

    if let Some(device) = args.device {
        config.audio.device = Some(device);
    }

    match args.command {
        Command::Devices => {
            let devices = AudioManager::devices().context("Failed to enumerate output devices")?;
            if devices.is_empty() {
                println!("No output devices");
            }
            for device in devices {
                println!("{}", device);
            }
        }
        Command::Drivers => {
            let current = AudioManager::current_driver();
            for driver in AudioManager::drivers() {
                let marker = if driver == current { "*" } else { " " };
                println!("{} {}", marker, driver);
            }
        }
        Command::Play {
            looping,
            volume,
            sounds,
        } => {
            let definitions = args
                .definitions
                .or_else(|| config.sound_definitions.clone())
                .context("No sound definition file; pass --definitions or set sound_definitions")?;

            play(&config, &definitions, &sounds, looping, volume).await?;
        }
    }

    Ok(())
}

async fn play(
    config: &TomlConfig,
    definitions: &std::path::Path,
    sounds: &[ResourceKey],
    looping: bool,
    volume: f32,
) -> Result<()> {
    let defs = load_definitions(definitions, config.asset_root.as_deref())
        .with_context(|| format!("Failed to load sound definitions from {}", definitions.display()))?;

    let mut manager = AudioManager::new(config).context("Failed to initialize audio output")?;
    manager.load_resources(&defs);

    let mut handles = Vec::with_capacity(sounds.len());
    for key in sounds {
        let handle = match manager.get_sound(key.category, key.id) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("{}", e);
                continue;
            }
        };

        handle.set_looping(looping);
        handle.set_volume(volume);
        handle
            .play()
            .with_context(|| format!("Failed to start {}", key))?;
        info!("Playing {}", key);
        handles.push(handle);
    }

    if handles.is_empty() {
        bail!("None of the requested sounds are registered");
    }

    tokio::select! {
        _ = shutdown_signal() => {},
        _ = wait_until_finished(&manager, &handles) => {
            info!("All sounds finished");
        },
    }

    for handle in &handles {
        handle.stop();
    }

    let stats = manager.stats();
    info!(
        "Mixer stats: callbacks={}, stalled_reads={}, finished_sounds={}, pool_exhaustions={}",
        stats.callbacks, stats.stalled_reads, stats.finished_sounds, stats.pool_exhaustions
    );

    manager.shutdown();
    Ok(())
}

async fn wait_until_finished(manager: &AudioManager, handles: &[PlaybackHandle]) {
    while handles.iter().any(PlaybackHandle::is_playing) {
        manager.collect_finished();
        tokio::time::sleep(FINISH_POLL_INTERVAL).await;
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
