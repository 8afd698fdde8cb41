//! TOML description of a complete particle system
//!
//! ```toml
//! capacity = 2000
//! active_count = 1500
//! particle_type = "unlit"
//!
//! [generator]
//! emit_rate = 0.5            # particles per millisecond
//! max_emit_rate = 1.0
//! gravity = [0, -9.8, 0]
//! viewport = [1280, 720]
//!
//! [generator.offscreen]
//! enabled = true
//! blur_radius = 2.0
//!
//! [emitter]
//! velocity = [0, 1, 0, 4]
//! velocity_random = [0.5, 0, 0.5, 1]
//! color = [1.0, 0.6, 0.2, 1.0]
//!
//! [emitter.color_cycle]
//! channels = 4
//! loop_count = -1
//! times = [0, 2]
//! values = [1, 0.6, 0.2, 1,  0.2, 0.4, 1, 1]
//! ```

use crate::buffer::{ParticleBuffer, MAX_CAPACITY};
use crate::emitter::{DefaultParticleEmitter, EmitterSettings};
use crate::generator::{GeneratorSettings, ImageSource, OffscreenSettings, ParticleGenerator};
use glint_animation::TrackDef;
use glint_core::{GlintError, RandomSource, Result};
use glint_render::{FramebufferFormat, FramebufferProvider, ParticleType, TextureHandle};
use std::path::Path;
use toml::value::Table;

const DEFAULT_CAPACITY: usize = 1000;

/// Everything needed to build one generator + buffer + default emitter
#[derive(Debug, Clone)]
pub struct SystemConfig {
    pub capacity: usize,
    /// Defaults to `capacity`
    pub active_count: Option<usize>,
    pub particle_type: ParticleType,
    pub generator: GeneratorSettings,
    pub emitter: EmitterSettings,
    pub background_cycle: Option<TrackDef>,
    pub rate_cycle: Option<TrackDef>,
    pub color_cycle: Option<TrackDef>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            active_count: None,
            particle_type: ParticleType::default(),
            generator: GeneratorSettings::default(),
            emitter: EmitterSettings::default(),
            background_cycle: None,
            rate_cycle: None,
            color_cycle: None,
        }
    }
}

impl SystemConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GlintError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let table: Table = toml::from_str(content)?;
        Self::from_toml(&table)
    }

    /// Parse and validate. Missing keys take defaults; present keys with the
    /// wrong type or shape are errors.
    pub fn from_toml(table: &Table) -> Result<Self> {
        let mut config = SystemConfig {
            capacity: get_usize(table, "capacity")?.unwrap_or(DEFAULT_CAPACITY),
            active_count: get_usize(table, "active_count")?,
            ..Default::default()
        };
        if let Some(name) = get_str(table, "particle_type")? {
            config.particle_type = ParticleType::parse(name)?;
        }

        if let Some(gen) = get_table(table, "generator")? {
            config.generator = parse_generator(gen)?;
            config.background_cycle = get_track(gen, "background_cycle")?;
            config.rate_cycle = get_track(gen, "rate_cycle")?;
        }
        if let Some(em) = get_table(table, "emitter")? {
            config.emitter = parse_emitter(em)?;
            config.color_cycle = get_track(em, "color_cycle")?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 || self.capacity > MAX_CAPACITY {
            return Err(GlintError::ValueOutOfRange {
                field: "capacity".into(),
                min: 1.0,
                max: MAX_CAPACITY as f64,
                value: self.capacity as f64,
            });
        }
        if let Some(active) = self.active_count {
            if active > self.capacity {
                return Err(GlintError::ValueOutOfRange {
                    field: "active_count".into(),
                    min: 0.0,
                    max: self.capacity as f64,
                    value: active as f64,
                });
            }
        }
        if self.particle_type.requires_texture() && self.generator.image.is_none() {
            return Err(GlintError::ConfigError(format!(
                "particle_type '{}' needs a [generator.image] table",
                self.particle_type.name()
            )));
        }
        self.generator.validate()?;
        self.emitter.validate()
    }

    /// Build the buffer, emitter and generator this configuration describes.
    pub fn build<R, P>(
        &self,
        rng: R,
        device: &mut P,
    ) -> Result<ParticleGenerator<DefaultParticleEmitter<R>>>
    where
        R: RandomSource,
        P: FramebufferProvider,
    {
        let background_cycle = self.background_cycle.as_ref().map(TrackDef::build).transpose()?;
        let rate_cycle = self.rate_cycle.as_ref().map(TrackDef::build).transpose()?;
        let color_cycle = self.color_cycle.as_ref().map(TrackDef::build).transpose()?;

        let mut buffer = ParticleBuffer::new(self.capacity, self.particle_type)?;
        if let Some(active) = self.active_count {
            buffer.set_active_count(active)?;
        }
        let mut emitter = DefaultParticleEmitter::new(self.emitter.clone(), rng)?;
        emitter.set_emit_color_cycle(color_cycle)?;

        let mut generator = ParticleGenerator::new(buffer, emitter, self.generator.clone(), device)?;
        let cycles = generator
            .set_background_cycle(background_cycle)
            .and_then(|_| generator.set_rate_cycle(rate_cycle));
        if let Err(err) = cycles {
            generator.destroy(device);
            return Err(err);
        }
        Ok(generator)
    }
}

fn parse_generator(table: &Table) -> Result<GeneratorSettings> {
    let defaults = GeneratorSettings::default();
    let image = match get_table(table, "image")? {
        Some(img) => Some(ImageSource {
            texture: TextureHandle(require(get_u32(img, "texture")?, "image.texture")?),
            width: require(get_u32(img, "width")?, "image.width")?,
            height: require(get_u32(img, "height")?, "image.height")?,
        }),
        None => None,
    };
    Ok(GeneratorSettings {
        emit_rate: get_f64(table, "emit_rate")?.unwrap_or(defaults.emit_rate),
        max_emit_rate: get_f64(table, "max_emit_rate")?,
        max_frame_millis: get_f64(table, "max_frame_ms")?.unwrap_or(defaults.max_frame_millis),
        gravity: get_vec::<3>(table, "gravity")?
            .map(glam::Vec3::from_array)
            .unwrap_or(defaults.gravity),
        background_color: get_vec(table, "background_color")?
            .unwrap_or(defaults.background_color),
        depth_test: get_bool(table, "depth_test")?.unwrap_or(defaults.depth_test),
        viewport: match table.get("viewport") {
            Some(v) => {
                let [w, h] = vec_of::<2>(v, "viewport")?;
                [to_u32(w, "viewport")?, to_u32(h, "viewport")?]
            }
            None => defaults.viewport,
        },
        offscreen: match get_table(table, "offscreen")? {
            Some(off) => parse_offscreen(off)?,
            None => defaults.offscreen,
        },
        image,
    })
}

fn parse_offscreen(table: &Table) -> Result<OffscreenSettings> {
    let defaults = OffscreenSettings::default();
    let format = match get_str(table, "format")? {
        Some(name) => parse_format(name)?,
        None => defaults.format,
    };
    Ok(OffscreenSettings {
        enabled: get_bool(table, "enabled")?.unwrap_or(true),
        width: get_i32(table, "width")?.unwrap_or(defaults.width),
        height: get_i32(table, "height")?.unwrap_or(defaults.height),
        format,
        blur_radius: get_f32(table, "blur_radius")?.unwrap_or(defaults.blur_radius),
        blur_intensity: get_f32(table, "blur_intensity")?.unwrap_or(defaults.blur_intensity),
        composite_opacity: get_f32(table, "composite_opacity")?
            .unwrap_or(defaults.composite_opacity),
    })
}

fn parse_emitter(table: &Table) -> Result<EmitterSettings> {
    let defaults = EmitterSettings::default();
    Ok(EmitterSettings {
        base_position: get_vec(table, "position")?.unwrap_or(defaults.base_position),
        position_random: get_vec(table, "position_random")?.unwrap_or(defaults.position_random),
        base_velocity: get_vec(table, "velocity")?.unwrap_or(defaults.base_velocity),
        velocity_random: get_vec(table, "velocity_random")?.unwrap_or(defaults.velocity_random),
        emit_color: get_vec(table, "color")?.unwrap_or(defaults.emit_color),
        color_add: get_vec(table, "color_add")?.unwrap_or(defaults.color_add),
        global_size: get_f32(table, "global_size")?.unwrap_or(defaults.global_size),
    })
}

fn parse_format(name: &str) -> Result<FramebufferFormat> {
    match name {
        "rgba8" => Ok(FramebufferFormat::Rgba8),
        "rgba16f" => Ok(FramebufferFormat::Rgba16Float),
        other => Err(GlintError::invalid_enum(other, &["rgba8", "rgba16f"])),
    }
}

// ── TOML helpers (integer/float coercion, strict shapes) ──

fn wrong_type(key: &str, expected: &str, v: &toml::Value) -> GlintError {
    GlintError::ConfigError(format!(
        "'{key}' must be {expected}, got {}",
        v.type_str()
    ))
}

fn number(v: &toml::Value, key: &str) -> Result<f64> {
    v.as_float()
        .or_else(|| v.as_integer().map(|i| i as f64))
        .ok_or_else(|| wrong_type(key, "a number", v))
}

fn integer(v: &toml::Value, key: &str) -> Result<i64> {
    v.as_integer().ok_or_else(|| wrong_type(key, "an integer", v))
}

fn to_u32(v: i64, key: &str) -> Result<u32> {
    u32::try_from(v).map_err(|_| GlintError::ValueOutOfRange {
        field: key.into(),
        min: 0.0,
        max: u32::MAX as f64,
        value: v as f64,
    })
}

fn require<T>(value: Option<T>, key: &str) -> Result<T> {
    value.ok_or_else(|| GlintError::ConfigError(format!("missing required key '{key}'")))
}

fn get_f64(table: &Table, key: &str) -> Result<Option<f64>> {
    table.get(key).map(|v| number(v, key)).transpose()
}

fn get_f32(table: &Table, key: &str) -> Result<Option<f32>> {
    Ok(get_f64(table, key)?.map(|f| f as f32))
}

fn get_i32(table: &Table, key: &str) -> Result<Option<i32>> {
    table
        .get(key)
        .map(|v| {
            let i = integer(v, key)?;
            i32::try_from(i).map_err(|_| GlintError::ValueOutOfRange {
                field: key.into(),
                min: i32::MIN as f64,
                max: i32::MAX as f64,
                value: i as f64,
            })
        })
        .transpose()
}

fn get_u32(table: &Table, key: &str) -> Result<Option<u32>> {
    table
        .get(key)
        .map(|v| to_u32(integer(v, key)?, key))
        .transpose()
}

fn get_usize(table: &Table, key: &str) -> Result<Option<usize>> {
    table
        .get(key)
        .map(|v| {
            let i = integer(v, key)?;
            usize::try_from(i).map_err(|_| GlintError::ValueOutOfRange {
                field: key.into(),
                min: 0.0,
                max: MAX_CAPACITY as f64,
                value: i as f64,
            })
        })
        .transpose()
}

fn get_bool(table: &Table, key: &str) -> Result<Option<bool>> {
    table
        .get(key)
        .map(|v| v.as_bool().ok_or_else(|| wrong_type(key, "a boolean", v)))
        .transpose()
}

fn get_str<'a>(table: &'a Table, key: &str) -> Result<Option<&'a str>> {
    table
        .get(key)
        .map(|v| v.as_str().ok_or_else(|| wrong_type(key, "a string", v)))
        .transpose()
}

fn get_table<'a>(table: &'a Table, key: &str) -> Result<Option<&'a Table>> {
    table
        .get(key)
        .map(|v| v.as_table().ok_or_else(|| wrong_type(key, "a table", v)))
        .transpose()
}

fn vec_of<const N: usize>(v: &toml::Value, key: &str) -> Result<[i64; N]> {
    let arr = v
        .as_array()
        .ok_or_else(|| wrong_type(key, "an array", v))?;
    if arr.len() != N {
        return Err(GlintError::ConfigError(format!(
            "'{key}' needs {N} elements, got {}",
            arr.len()
        )));
    }
    let mut out = [0i64; N];
    for (slot, item) in out.iter_mut().zip(arr) {
        *slot = integer(item, key)?;
    }
    Ok(out)
}

fn get_vec<const N: usize>(table: &Table, key: &str) -> Result<Option<[f32; N]>> {
    let Some(v) = table.get(key) else {
        return Ok(None);
    };
    let arr = v
        .as_array()
        .ok_or_else(|| wrong_type(key, "an array", v))?;
    if arr.len() != N {
        return Err(GlintError::ConfigError(format!(
            "'{key}' needs {N} numbers, got {}",
            arr.len()
        )));
    }
    let mut out = [0.0f32; N];
    for (slot, item) in out.iter_mut().zip(arr) {
        *slot = number(item, key)? as f32;
    }
    Ok(Some(out))
}

fn get_track(table: &Table, key: &str) -> Result<Option<TrackDef>> {
    table
        .get(key)
        .map(|v| {
            let mut def = TrackDef::from_toml(v)?;
            if def.name.is_empty() {
                def.name = key.to_string();
            }
            Ok(def)
        })
        .transpose()
}
