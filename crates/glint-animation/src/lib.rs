//! Glint Animation - keyframe tracks that drive emitter and generator settings
//!
//! One engine covers every animated value in the particle system:
//! - `KeyframeTrack`: N-channel keyframes with a monotonic playback cursor
//! - `LoopPolicy`: disabled / infinite / counted wrap behavior
//! - `Interpolation`: linear, step or sinusoidal blending per segment
//! - `WriteMode`: absolute overwrite or relative (additive) write-back
//! - `TrackDef`: TOML track definitions

pub mod interpolation;
pub mod loader;
pub mod track;

pub use interpolation::Interpolation;
pub use loader::{load_track_from_file, load_track_from_str, TrackDef};
pub use track::{KeyframeTrack, LoopPolicy, WriteMode, MIN_SEGMENT_LENGTH};
