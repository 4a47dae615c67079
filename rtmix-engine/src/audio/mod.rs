//! Audio I/O: decoding and device output

pub mod format;
pub mod loader;
pub mod output;

pub use format::{AudioFormat, OUTPUT_CHANNELS};
pub use loader::{open_loader, upmix_mono_in_place, Loader, SymphoniaLoader};
pub use output::{CpalOutput, NullOutput, OutputDevice, RenderCallback};
