//! # rtmix Common Library
//!
//! Shared code for the rtmix crates:
//! - Sound definition records (category, id, path, format, loader policy)
//! - Configuration loading
//! - Common error type

pub mod config;
pub mod error;
pub mod sound_defs;

pub use error::{Error, Result};
pub use sound_defs::{Category, LoaderPolicy, ResourceDef, SoundFormat};
