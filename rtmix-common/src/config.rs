//! Configuration loading and config file resolution
//!
//! Bootstrap configuration comes from a TOML file. The file is located by
//! priority:
//! 1. Command-line argument (highest priority)
//! 2. `RTMIX_CONFIG` environment variable
//! 3. User config directory (`<config dir>/rtmix/config.toml`)
//! 4. System config file (`/etc/rtmix/config.toml`, Linux only)
//! 5. Built-in defaults (no file)
//!
//! A missing file is never fatal: startup continues with defaults and a warning.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "RTMIX_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Sound definition file (optional; may also be given on the command line)
    pub sound_definitions: Option<PathBuf>,

    /// Directory relative sound paths resolve against.
    /// Defaults to the directory holding the definition file.
    pub asset_root: Option<PathBuf>,

    pub logging: LoggingConfig,
    pub audio: AudioConfig,
    pub streaming: StreamingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides it
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Output device settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device name (None = default device)
    pub device: Option<String>,

    /// Desired output sample rate in Hz
    pub sample_rate: u32,

    /// Desired frames per device callback
    pub buffer_frames: u32,

    /// Number of background decode worker threads
    pub decode_workers: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: 48_000,
            buffer_frames: 4096,
            decode_workers: 2,
        }
    }
}

/// Chunk streaming parameters for streaming resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Interleaved stereo samples per chunk (must be even)
    pub chunk_size: usize,

    /// Chunks per streaming resource (pool size)
    pub max_chunks: usize,

    /// Number of chunks kept scheduled ahead of the read position
    pub preload_window: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 16_384,
            max_chunks: 8,
            preload_window: 4,
        }
    }
}

impl StreamingConfig {
    /// Reject parameters the chunk pool cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size % 2 != 0 {
            return Err(Error::Config(format!(
                "streaming.chunk_size must be a positive even number, got {}",
                self.chunk_size
            )));
        }
        if self.max_chunks == 0 {
            return Err(Error::Config("streaming.max_chunks must be at least 1".to_string()));
        }
        if self.preload_window == 0 || self.preload_window > self.max_chunks {
            return Err(Error::Config(format!(
                "streaming.preload_window must be in 1..={}, got {}",
                self.max_chunks, self.preload_window
            )));
        }
        Ok(())
    }
}

impl TomlConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Resolve the config file by priority and load it.
    ///
    /// Falls back to defaults (with a warning) when no file is found, including
    /// an explicit path that does not exist. A file that exists but does not
    /// parse is an error.
    pub fn load(cli_arg: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_arg) {
            Some(path) if !path.exists() => {
                warn!(
                    "Configuration file {} does not exist, using built-in defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Self::from_file(&path)
            }
            None => {
                warn!("No configuration file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Validate all sections
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("audio.sample_rate must be positive".to_string()));
        }
        if self.audio.buffer_frames == 0 {
            return Err(Error::Config("audio.buffer_frames must be positive".to_string()));
        }
        if self.audio.decode_workers == 0 {
            return Err(Error::Config("audio.decode_workers must be at least 1".to_string()));
        }
        self.streaming.validate()
    }
}

/// Config file resolution following the documented priority order.
///
/// Returns `None` when no candidate exists.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: User config directory
    if let Some(path) = dirs::config_dir().map(|d| d.join("rtmix").join("config.toml")) {
        if path.exists() {
            return Some(path);
        }
    }

    // Priority 4: System-wide config
    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/rtmix/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}
