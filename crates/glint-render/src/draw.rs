//! Draw data and uniform blocks handed to a `RenderDevice`

use crate::device::TextureHandle;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use glint_core::{GlintError, Result};

/// Which record fields the downstream shader interprets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParticleType {
    /// Position, velocity, color and size/time
    SimpleUnlit,
    /// SimpleUnlit plus the per-unit-time color delta
    #[default]
    Unlit,
    /// Unlit with color looked up from a bound image
    Image,
    /// Position and time only
    Position,
}

impl ParticleType {
    pub const NAMES: [&'static str; 4] = ["simple_unlit", "unlit", "image", "position"];

    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "simple_unlit" => Ok(ParticleType::SimpleUnlit),
            "unlit" => Ok(ParticleType::Unlit),
            "image" => Ok(ParticleType::Image),
            "position" => Ok(ParticleType::Position),
            other => Err(GlintError::invalid_enum(other, &Self::NAMES)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ParticleType::SimpleUnlit => "simple_unlit",
            ParticleType::Unlit => "unlit",
            ParticleType::Image => "image",
            ParticleType::Position => "position",
        }
    }

    /// Needs a bound texture and the `1/width, 1/height` uniform
    pub fn requires_texture(&self) -> bool {
        matches!(self, ParticleType::Image)
    }
}

/// One particle draw: the raw record bytes plus how to read them.
#[derive(Debug, Clone, Copy)]
pub struct ParticleDrawData<'a> {
    pub particle_type: ParticleType,
    /// Packed records `[0, count)`
    pub records: &'a [u8],
    /// Bytes per record
    pub stride: usize,
    pub count: usize,
    /// Image lookup texture, bound for `ParticleType::Image`
    pub texture: Option<TextureHandle>,
}

/// Per-draw particle uniforms. 96 bytes, 16-byte multiple.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct ParticleUniforms {
    pub view_proj: [[f32; 4]; 4],
    /// xyz = gravity, w unused
    pub gravity: [f32; 4],
    /// Current simulation clock; shaders age records by `time - record.time`
    pub time: f32,
    pub global_size: f32,
    /// `1/width, 1/height` of the image texture (zero when unused)
    pub inv_image_size: [f32; 2],
}

impl ParticleUniforms {
    pub fn new(view_proj: Mat4, gravity: Vec3, time: f32, global_size: f32) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            gravity: gravity.extend(0.0).to_array(),
            time,
            global_size,
            inv_image_size: [0.0; 2],
        }
    }
}

/// Blur pass uniforms
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct BlurUniforms {
    pub texel_size: [f32; 2],
    pub radius: f32,
    pub intensity: f32,
}

/// Final composite uniforms
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct CompositeUniforms {
    pub opacity: f32,
    pub _pad: [f32; 3],
}

impl CompositeUniforms {
    pub fn new(opacity: f32) -> Self {
        Self {
            opacity,
            _pad: [0.0; 3],
        }
    }
}

/// Material for a full-screen quad pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuadMaterial {
    Blur(BlurUniforms),
    Composite(CompositeUniforms),
}
