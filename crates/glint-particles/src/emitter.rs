//! Particle emission: the emitter seam and the randomized default emitter

use crate::buffer::ParticleBuffer;
use crate::particle::ParticleRecord;
use glint_animation::KeyframeTrack;
use glint_core::{GlintError, RandomSource, Result};

/// Writes freshly emitted particles into a buffer.
pub trait ParticleEmitter {
    /// Write `count` particles starting at slot `write_offset`, wrapping to
    /// slot 0 whenever the cursor reaches `wrap_limit`. Every record is
    /// stamped with `sim_time`. Returns how many particles were written.
    fn emit(
        &mut self,
        buffer: &mut ParticleBuffer,
        count: usize,
        write_offset: usize,
        wrap_limit: usize,
        sim_time: f64,
    ) -> usize;

    /// Base particle size, forwarded to the renderer as a uniform
    fn global_size(&self) -> f32 {
        1.0
    }
}

/// Base values and jitter scales for the default emitter
#[derive(Debug, Clone, PartialEq)]
pub struct EmitterSettings {
    pub base_position: [f32; 3],
    /// Per-axis jitter: each axis gets `uniform(-0.5, 0.5) * scale`
    pub position_random: [f32; 3],
    /// xyz = direction, w = speed
    pub base_velocity: [f32; 4],
    pub velocity_random: [f32; 4],
    pub emit_color: [f32; 4],
    pub color_add: [f32; 4],
    /// Sizes land in `[global_size * 1.2, global_size * 2.2)`
    pub global_size: f32,
}

impl Default for EmitterSettings {
    fn default() -> Self {
        Self {
            base_position: [0.0; 3],
            position_random: [0.0; 3],
            base_velocity: [0.0, 1.0, 0.0, 1.0],
            velocity_random: [0.0; 4],
            emit_color: [1.0; 4],
            color_add: [0.0; 4],
            global_size: 1.0,
        }
    }
}

impl EmitterSettings {
    pub fn validate(&self) -> Result<()> {
        check_finite("base_position", &self.base_position)?;
        check_finite("position_random", &self.position_random)?;
        check_finite("base_velocity", &self.base_velocity)?;
        check_finite("velocity_random", &self.velocity_random)?;
        check_finite("emit_color", &self.emit_color)?;
        check_finite("color_add", &self.color_add)?;
        check_non_negative("position_random", &self.position_random)?;
        check_non_negative("velocity_random", &self.velocity_random)?;
        if !(self.global_size.is_finite() && self.global_size > 0.0) {
            return Err(GlintError::InvalidEmitter(format!(
                "global_size must be positive, got {}",
                self.global_size
            )));
        }
        Ok(())
    }
}

fn check_finite(field: &str, values: &[f32]) -> Result<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(GlintError::InvalidEmitter(format!(
            "{field} must be finite, got {values:?}"
        )))
    }
}

fn check_non_negative(field: &str, values: &[f32]) -> Result<()> {
    if values.iter().all(|&v| v >= 0.0) {
        Ok(())
    } else {
        Err(GlintError::InvalidEmitter(format!(
            "{field} scales must be non-negative, got {values:?}"
        )))
    }
}

/// Emits particles at a base position/velocity with uniform jitter.
///
/// The emit color can be cycled by a 4-channel keyframe track, which is
/// advanced on every `emit` call by the simulation time elapsed since the
/// previous call, including calls that emit nothing.
pub struct DefaultParticleEmitter<R: RandomSource> {
    settings: EmitterSettings,
    rng: R,
    color_cycle: Option<KeyframeTrack>,
    last_emit_time: Option<f64>,
    emitted_total: u64,
}

impl<R: RandomSource> DefaultParticleEmitter<R> {
    pub fn new(settings: EmitterSettings, rng: R) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            rng,
            color_cycle: None,
            last_emit_time: None,
            emitted_total: 0,
        })
    }

    pub fn settings(&self) -> &EmitterSettings {
        &self.settings
    }

    /// Current emit color (possibly mid-cycle)
    pub fn emit_color(&self) -> [f32; 4] {
        self.settings.emit_color
    }

    pub fn color_cycle(&self) -> Option<&KeyframeTrack> {
        self.color_cycle.as_ref()
    }

    /// Particles written since creation
    pub fn emitted_total(&self) -> u64 {
        self.emitted_total
    }

    pub fn set_base_position(&mut self, position: [f32; 3]) -> Result<()> {
        check_finite("base_position", &position)?;
        self.settings.base_position = position;
        Ok(())
    }

    pub fn set_position_random(&mut self, scale: [f32; 3]) -> Result<()> {
        check_finite("position_random", &scale)?;
        check_non_negative("position_random", &scale)?;
        self.settings.position_random = scale;
        Ok(())
    }

    pub fn set_base_velocity(&mut self, velocity: [f32; 4]) -> Result<()> {
        check_finite("base_velocity", &velocity)?;
        self.settings.base_velocity = velocity;
        Ok(())
    }

    pub fn set_velocity_random(&mut self, scale: [f32; 4]) -> Result<()> {
        check_finite("velocity_random", &scale)?;
        check_non_negative("velocity_random", &scale)?;
        self.settings.velocity_random = scale;
        Ok(())
    }

    pub fn set_emit_color(&mut self, color: [f32; 4]) -> Result<()> {
        check_finite("emit_color", &color)?;
        self.settings.emit_color = color;
        Ok(())
    }

    pub fn set_color_add(&mut self, delta: [f32; 4]) -> Result<()> {
        check_finite("color_add", &delta)?;
        self.settings.color_add = delta;
        Ok(())
    }

    pub fn set_global_size(&mut self, size: f32) -> Result<()> {
        if !(size.is_finite() && size > 0.0) {
            return Err(GlintError::InvalidEmitter(format!(
                "global_size must be positive, got {size}"
            )));
        }
        self.settings.global_size = size;
        Ok(())
    }

    /// Drive the emit color from a 4-channel track, or stop cycling with `None`.
    pub fn set_emit_color_cycle(&mut self, track: Option<KeyframeTrack>) -> Result<()> {
        if let Some(track) = &track {
            if track.stride() != 4 {
                return Err(GlintError::InvalidEmitter(format!(
                    "emit color cycle needs 4 channels, got {}",
                    track.stride()
                )));
            }
        }
        self.color_cycle = track;
        Ok(())
    }

    fn write_particle(&mut self, record: &mut ParticleRecord, sim_time: f32) {
        let s = &self.settings;
        for axis in 0..3 {
            record.position[axis] =
                s.base_position[axis] + self.rng.centered() * s.position_random[axis];
        }
        for axis in 0..4 {
            record.velocity[axis] =
                s.base_velocity[axis] + self.rng.centered() * s.velocity_random[axis];
        }
        let size = s.global_size * (self.rng.next_f32() + 1.2);
        record.color = s.emit_color;
        record.set_packed(size, sim_time, 1.0);
        record.color_add = s.color_add;
    }
}

impl<R: RandomSource> ParticleEmitter for DefaultParticleEmitter<R> {
    /// Always writes the full `count` unless `wrap_limit` leaves no slot to
    /// write into, in which case nothing is written.
    fn emit(
        &mut self,
        buffer: &mut ParticleBuffer,
        count: usize,
        write_offset: usize,
        wrap_limit: usize,
        sim_time: f64,
    ) -> usize {
        let elapsed = self
            .last_emit_time
            .map(|last| (sim_time - last).max(0.0) as f32)
            .unwrap_or(0.0);
        self.last_emit_time = Some(sim_time);
        if let Some(track) = self.color_cycle.as_mut() {
            track.animate(elapsed, &mut self.settings.emit_color);
        }

        let limit = wrap_limit.min(buffer.capacity());
        if count == 0 || limit == 0 {
            return 0;
        }

        let stamp = sim_time as f32;
        let records = buffer.records_mut();
        let mut slot = if write_offset >= limit { 0 } else { write_offset };
        for _ in 0..count {
            self.write_particle(&mut records[slot], stamp);
            slot += 1;
            if slot == limit {
                slot = 0;
            }
        }

        self.emitted_total += count as u64;
        count
    }

    fn global_size(&self) -> f32 {
        self.settings.global_size
    }
}
