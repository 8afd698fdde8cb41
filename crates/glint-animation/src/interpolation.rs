//! Interpolation strategies for keyframe segments

use glint_core::{GlintError, Result};
use serde::{Deserialize, Serialize};

/// How to blend between the two keyframes of the active segment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "type")]
pub enum Interpolation {
    /// Jump to the next value only once the segment is complete
    Step,
    /// Linear interpolation
    #[default]
    Linear,
    /// Linear interpolation modulated by a sine wave over track time
    Sinusoidal { amplitude: f32, frequency: f32 },
}

impl Interpolation {
    /// Reject parameters that would leak NaN/Inf into sampled values.
    pub fn validate(&self) -> Result<()> {
        if let Interpolation::Sinusoidal {
            amplitude,
            frequency,
        } = *self
        {
            if !amplitude.is_finite() || !frequency.is_finite() {
                return Err(GlintError::InvalidTrack(format!(
                    "sinusoidal interpolation needs finite parameters, got amplitude={amplitude} frequency={frequency}"
                )));
            }
        }
        Ok(())
    }

    /// Blend one channel.
    ///
    /// `factor` is the normalized position inside the segment and `time` is
    /// the absolute track time (only the sinusoidal strategy reads it).
    #[inline]
    pub fn blend(&self, a: f32, b: f32, factor: f32, time: f32) -> f32 {
        match *self {
            Interpolation::Step => {
                if factor >= 1.0 {
                    b
                } else {
                    a
                }
            }
            Interpolation::Linear => lerp(a, b, factor),
            Interpolation::Sinusoidal {
                amplitude,
                frequency,
            } => {
                let phase = std::f32::consts::TAU * frequency * time;
                lerp(a, b, factor) + amplitude * phase.sin()
            }
        }
    }
}

/// Linear interpolation between two floats
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + t * (b - a)
}
