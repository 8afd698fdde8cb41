//! Capability traits the particle core renders through
//!
//! The core never talks to a graphics API directly. Everything it needs is
//! expressed as two narrow capability sets: `RenderDevice` (state + draw
//! submission) and `FramebufferProvider` (offscreen target lifetime and
//! texture binding).

use crate::draw::{ParticleDrawData, ParticleUniforms, QuadMaterial};
use glint_core::Result;

/// Opaque handle to an offscreen framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub u32);

/// Opaque handle to a sampleable texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// Where draw calls land
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferTarget {
    /// The visible surface
    Default,
    Offscreen(FramebufferHandle),
}

/// Color format of an offscreen target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramebufferFormat {
    #[default]
    Rgba8,
    Rgba16Float,
}

/// A texture-backed offscreen framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framebuffer {
    pub handle: FramebufferHandle,
    /// The color attachment, sampleable by later passes
    pub texture: TextureHandle,
    pub width: u32,
    pub height: u32,
    pub format: FramebufferFormat,
}

impl Framebuffer {
    /// `1/width, 1/height` for blur kernels
    pub fn texel_size(&self) -> [f32; 2] {
        [1.0 / self.width.max(1) as f32, 1.0 / self.height.max(1) as f32]
    }
}

/// Draw submission and pipeline state.
pub trait RenderDevice {
    fn set_viewport(&mut self, x: i32, y: i32, width: u32, height: u32);

    /// Fails when an offscreen target is unknown or incomplete.
    fn bind_framebuffer(&mut self, target: FramebufferTarget) -> Result<()>;

    fn clear(&mut self, color: [f32; 4]);

    /// Draw the live records of a particle buffer.
    fn submit_particles(
        &mut self,
        draw: &ParticleDrawData<'_>,
        uniforms: &ParticleUniforms,
    ) -> Result<()>;

    /// Draw `texture` over the whole bound target.
    fn submit_fullscreen_quad(&mut self, texture: TextureHandle, material: &QuadMaterial)
        -> Result<()>;

    fn enable_depth_test(&mut self);

    fn disable_depth_test(&mut self);
}

/// Offscreen target lifetime and texture binding.
pub trait FramebufferProvider {
    fn create_framebuffer(
        &mut self,
        width: u32,
        height: u32,
        format: FramebufferFormat,
    ) -> Result<Framebuffer>;

    fn destroy_framebuffer(&mut self, handle: FramebufferHandle);

    fn bind_texture_for_sampling(&mut self, texture: TextureHandle, unit: u32) -> Result<()>;
}
