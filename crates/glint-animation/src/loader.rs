//! TOML-based keyframe track definitions

use crate::interpolation::Interpolation;
use crate::track::{KeyframeTrack, LoopPolicy, WriteMode};
use glint_core::{GlintError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Serializable description of a keyframe track.
///
/// ```toml
/// name = "emit_color"
/// channels = 4
/// loop_count = -1        # 0 = disabled, -1 = infinite, N = counted
/// relative = false
/// times = [0.0, 2.0, 4.0]
/// values = [1, 0, 0, 1,  0, 0, 1, 1,  1, 0, 0, 1]
///
/// [interpolation]
/// type = "Linear"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackDef {
    #[serde(default)]
    pub name: String,
    pub times: Vec<f32>,
    pub values: Vec<f32>,
    #[serde(default = "default_channels")]
    pub channels: usize,
    #[serde(default)]
    pub loop_count: i64,
    #[serde(default)]
    pub interpolation: Interpolation,
    #[serde(default)]
    pub relative: bool,
}

fn default_channels() -> usize {
    1
}

impl TrackDef {
    /// Validate the definition and build a playable track.
    pub fn build(&self) -> Result<KeyframeTrack> {
        let loop_policy = LoopPolicy::from_count(self.loop_count)?;
        let write_mode = if self.relative {
            WriteMode::Relative
        } else {
            WriteMode::Absolute
        };
        let track = KeyframeTrack::new(self.times.clone(), self.values.clone(), self.channels)
            .map_err(|e| self.named(e))?
            .with_interpolation(self.interpolation)
            .map_err(|e| self.named(e))?
            .with_loop_policy(loop_policy)
            .with_write_mode(write_mode);
        Ok(track)
    }

    /// Parse a definition from an already-parsed TOML value (e.g. a sub-table
    /// of a larger configuration file).
    pub fn from_toml(value: &toml::Value) -> Result<Self> {
        let def: TrackDef = value.clone().try_into()?;
        def.build()?;
        Ok(def)
    }

    fn named(&self, err: GlintError) -> GlintError {
        match err {
            GlintError::InvalidTrack(msg) if !self.name.is_empty() => {
                GlintError::InvalidTrack(format!("'{}': {}", self.name, msg))
            }
            other => other,
        }
    }
}

/// Load and validate a track definition from a `.track.toml` file.
pub fn load_track_from_file(path: &Path) -> Result<TrackDef> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        GlintError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
    })?;
    load_track_from_str(&content, path)
}

/// Parse and validate a track definition from a TOML string.
pub fn load_track_from_str(content: &str, path: &Path) -> Result<TrackDef> {
    let def: TrackDef = toml::from_str(content).map_err(|e| {
        GlintError::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
    })?;

    // Fail at load time rather than on first use
    def.build()?;
    Ok(def)
}
