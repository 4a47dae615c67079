//! Sound definition records
//!
//! A sound definition names one audio resource: its playback category, its
//! integer id (unique within the category), the file it is decoded from, the
//! codec format of that file, and whether it is decoded up front or streamed
//! in chunks.
//!
//! Definitions are usually kept in a TOML file next to the assets:
//!
//! ```toml
//! [[sound]]
//! category = "game"
//! id = 3
//! path = "sounds/horn.wav"
//! format = "wav"
//! loader = "in_memory"
//!
//! [[sound]]
//! category = "music"
//! id = 1
//! path = "music/theme.ogg"
//! format = "vorbis"
//! ```

use crate::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Playback category. Each category has its own playing list in the mixer.
///
/// Categories only group sounds; they carry no priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Ambient and unit sounds of the running game
    Game,
    /// Menu and interface feedback
    Interface,
    /// Background music
    Music,
    /// Spoken lines and taunts
    #[serde(alias = "taunt")]
    Voice,
}

impl Category {
    /// All categories, in mixing order
    pub const ALL: [Category; 4] = [
        Category::Game,
        Category::Interface,
        Category::Music,
        Category::Voice,
    ];

    /// Number of categories
    pub const COUNT: usize = Self::ALL.len();

    /// Dense index for per-category tables
    pub fn index(self) -> usize {
        match self {
            Category::Game => 0,
            Category::Interface => 1,
            Category::Music => 2,
            Category::Voice => 3,
        }
    }

    /// Lowercase name as used in definition files
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Game => "game",
            Category::Interface => "interface",
            Category::Music => "music",
            Category::Voice => "voice",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "game" => Ok(Category::Game),
            "interface" => Ok(Category::Interface),
            "music" => Ok(Category::Music),
            "voice" | "taunt" => Ok(Category::Voice),
            other => Err(Error::InvalidInput(format!("Unknown category '{}'", other))),
        }
    }
}

/// Codec/container format of a sound file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundFormat {
    Wav,
    Flac,
    Mp3,
    /// Vorbis in an Ogg container
    #[serde(alias = "ogg")]
    Vorbis,
    /// AAC in an MP4/M4A container
    #[serde(alias = "m4a")]
    Aac,
}

impl SoundFormat {
    /// File extension used as the format detection hint
    pub fn extension(self) -> &'static str {
        match self {
            SoundFormat::Wav => "wav",
            SoundFormat::Flac => "flac",
            SoundFormat::Mp3 => "mp3",
            SoundFormat::Vorbis => "ogg",
            SoundFormat::Aac => "m4a",
        }
    }
}

/// How a resource is made available to the mixer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderPolicy {
    /// Decode the whole file once, keep it resident
    InMemory,
    /// Decode chunks on demand in the background
    #[default]
    Streaming,
}

/// One sound definition record
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResourceDef {
    pub category: Category,
    pub id: i32,
    /// Path to the sound file, relative to the asset root unless absolute
    pub path: PathBuf,
    pub format: SoundFormat,
    #[serde(default, rename = "loader")]
    pub policy: LoaderPolicy,
}

impl ResourceDef {
    /// Resolve `path` against an asset root. Absolute paths are kept.
    pub fn resolve_path(&self, asset_root: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            asset_root.join(&self.path)
        }
    }
}

#[derive(Debug, Deserialize)]
struct DefinitionFile {
    #[serde(default, rename = "sound")]
    sounds: Vec<ResourceDef>,
}

/// Parse sound definitions from a TOML document.
///
/// Relative paths are resolved against `asset_root`.
pub fn parse_definitions(content: &str, asset_root: &Path) -> Result<Vec<ResourceDef>> {
    let file: DefinitionFile = toml::from_str(content)?;

    let mut defs = Vec::with_capacity(file.sounds.len());
    for mut def in file.sounds {
        if def.path.as_os_str().is_empty() {
            return Err(Error::InvalidInput(format!(
                "Sound {}:{} has an empty path",
                def.category, def.id
            )));
        }
        def.path = def.resolve_path(asset_root);
        defs.push(def);
    }

    Ok(defs)
}

/// Load sound definitions from a TOML file.
///
/// When `asset_root` is `None`, paths resolve against the directory holding
/// the definition file.
pub fn load_definitions(path: &Path, asset_root: Option<&Path>) -> Result<Vec<ResourceDef>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(format!("Sound definition file {}", path.display()))
        } else {
            Error::Io(e)
        }
    })?;

    let root = match asset_root {
        Some(root) => root.to_path_buf(),
        None => path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    let defs = parse_definitions(&content, &root)?;
    debug!("Loaded {} sound definitions from {}", defs.len(), path.display());
    Ok(defs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_definitions_resolves_relative_paths() {
        let doc = r#"
            [[sound]]
            category = "game"
            id = 3
            path = "sounds/horn.wav"
            format = "wav"
            loader = "in_memory"

            [[sound]]
            category = "taunt"
            id = 11
            path = "/abs/taunt.ogg"
            format = "ogg"
        "#;

        let defs = parse_definitions(doc, Path::new("/assets")).unwrap();
        assert_eq!(defs.len(), 2);

        assert_eq!(defs[0].category, Category::Game);
        assert_eq!(defs[0].path, PathBuf::from("/assets/sounds/horn.wav"));
        assert_eq!(defs[0].policy, LoaderPolicy::InMemory);

        assert_eq!(defs[1].category, Category::Voice);
        assert_eq!(defs[1].format, SoundFormat::Vorbis);
        assert_eq!(defs[1].path, PathBuf::from("/abs/taunt.ogg"));
        assert_eq!(defs[1].policy, LoaderPolicy::Streaming);
    }

    #[test]
    fn test_parse_definitions_rejects_unknown_category() {
        let doc = r#"
            [[sound]]
            category = "weather"
            id = 1
            path = "rain.wav"
            format = "wav"
        "#;

        assert!(matches!(
            parse_definitions(doc, Path::new(".")),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_category_index_is_dense() {
        for (i, category) in Category::ALL.iter().enumerate() {
            assert_eq!(category.index(), i);
        }
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!("Music".parse::<Category>().unwrap(), Category::Music);
        assert_eq!("taunt".parse::<Category>().unwrap(), Category::Voice);
        assert!("nope".parse::<Category>().is_err());
    }
}
