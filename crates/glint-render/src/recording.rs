//! Headless backend that records every capability call
//!
//! Used by tests and by the `glint simulate` command: it keeps the same
//! bookkeeping a GPU backend would (live framebuffers, bound target, depth
//! state) and can be told to fail so error paths are reachable.

use crate::device::{
    Framebuffer, FramebufferFormat, FramebufferHandle, FramebufferProvider, FramebufferTarget,
    RenderDevice, TextureHandle,
};
use crate::draw::{ParticleDrawData, ParticleType, ParticleUniforms, QuadMaterial};
use glint_core::{GlintError, Result};
use std::collections::{HashMap, HashSet};

/// One recorded capability call
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    SetViewport {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
    BindFramebuffer(FramebufferTarget),
    Clear([f32; 4]),
    SubmitParticles {
        particle_type: ParticleType,
        count: usize,
        stride: usize,
        texture: Option<TextureHandle>,
        uniforms: ParticleUniforms,
    },
    SubmitFullscreenQuad {
        texture: TextureHandle,
        material: QuadMaterial,
    },
    EnableDepthTest,
    DisableDepthTest,
    CreateFramebuffer(Framebuffer),
    DestroyFramebuffer(FramebufferHandle),
    BindTexture {
        texture: TextureHandle,
        unit: u32,
    },
}

/// Recording implementation of both capability traits
#[derive(Debug, Default)]
pub struct RecordingDevice {
    commands: Vec<RenderCommand>,
    framebuffers: HashMap<FramebufferHandle, Framebuffer>,
    incomplete: HashSet<FramebufferHandle>,
    next_id: u32,
    bound: Option<FramebufferTarget>,
    depth_test: bool,
    fail_next_create: bool,
    draw_calls: usize,
    particles_submitted: usize,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    /// Drain recorded commands (e.g. once per frame)
    pub fn take_commands(&mut self) -> Vec<RenderCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn framebuffer(&self, handle: FramebufferHandle) -> Option<&Framebuffer> {
        self.framebuffers.get(&handle)
    }

    pub fn bound_target(&self) -> Option<FramebufferTarget> {
        self.bound
    }

    pub fn depth_test_enabled(&self) -> bool {
        self.depth_test
    }

    /// Particle + quad draw calls since creation
    pub fn draw_calls(&self) -> usize {
        self.draw_calls
    }

    /// Sum of particle counts over every particle draw
    pub fn particles_submitted(&self) -> usize {
        self.particles_submitted
    }

    /// Make the next `create_framebuffer` fail
    pub fn fail_next_framebuffer(&mut self) {
        self.fail_next_create = true;
    }

    /// Make binding `handle` fail from now on
    pub fn mark_incomplete(&mut self, handle: FramebufferHandle) {
        self.incomplete.insert(handle);
    }

    fn next_handle(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

impl RenderDevice for RecordingDevice {
    fn set_viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.commands.push(RenderCommand::SetViewport {
            x,
            y,
            width,
            height,
        });
    }

    fn bind_framebuffer(&mut self, target: FramebufferTarget) -> Result<()> {
        if let FramebufferTarget::Offscreen(handle) = target {
            if !self.framebuffers.contains_key(&handle) {
                return Err(GlintError::FramebufferError(format!(
                    "framebuffer {} does not exist",
                    handle.0
                )));
            }
            if self.incomplete.contains(&handle) {
                return Err(GlintError::FramebufferError(format!(
                    "framebuffer {} is incomplete",
                    handle.0
                )));
            }
        }
        self.bound = Some(target);
        self.commands.push(RenderCommand::BindFramebuffer(target));
        Ok(())
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.commands.push(RenderCommand::Clear(color));
    }

    fn submit_particles(
        &mut self,
        draw: &ParticleDrawData<'_>,
        uniforms: &ParticleUniforms,
    ) -> Result<()> {
        if self.bound.is_none() {
            return Err(GlintError::RenderError(
                "particles submitted with no framebuffer bound".into(),
            ));
        }
        if draw.records.len() < draw.count * draw.stride {
            return Err(GlintError::RenderError(format!(
                "{} records of {} bytes need {} bytes, got {}",
                draw.count,
                draw.stride,
                draw.count * draw.stride,
                draw.records.len()
            )));
        }
        self.draw_calls += 1;
        self.particles_submitted += draw.count;
        self.commands.push(RenderCommand::SubmitParticles {
            particle_type: draw.particle_type,
            count: draw.count,
            stride: draw.stride,
            texture: draw.texture,
            uniforms: *uniforms,
        });
        Ok(())
    }

    fn submit_fullscreen_quad(
        &mut self,
        texture: TextureHandle,
        material: &QuadMaterial,
    ) -> Result<()> {
        if self.bound.is_none() {
            return Err(GlintError::RenderError(
                "quad submitted with no framebuffer bound".into(),
            ));
        }
        self.draw_calls += 1;
        self.commands.push(RenderCommand::SubmitFullscreenQuad {
            texture,
            material: *material,
        });
        Ok(())
    }

    fn enable_depth_test(&mut self) {
        self.depth_test = true;
        self.commands.push(RenderCommand::EnableDepthTest);
    }

    fn disable_depth_test(&mut self) {
        self.depth_test = false;
        self.commands.push(RenderCommand::DisableDepthTest);
    }
}

impl FramebufferProvider for RecordingDevice {
    fn create_framebuffer(
        &mut self,
        width: u32,
        height: u32,
        format: FramebufferFormat,
    ) -> Result<Framebuffer> {
        if std::mem::take(&mut self.fail_next_create) {
            return Err(GlintError::FramebufferError(format!(
                "could not allocate {width}x{height} framebuffer"
            )));
        }
        if width == 0 || height == 0 {
            return Err(GlintError::FramebufferError(format!(
                "framebuffer size must be non-zero, got {width}x{height}"
            )));
        }
        let handle = FramebufferHandle(self.next_handle());
        let texture = TextureHandle(self.next_handle());
        let framebuffer = Framebuffer {
            handle,
            texture,
            width,
            height,
            format,
        };
        self.framebuffers.insert(handle, framebuffer);
        self.commands.push(RenderCommand::CreateFramebuffer(framebuffer));
        log::debug!("recording device: created framebuffer {} ({width}x{height})", handle.0);
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&mut self, handle: FramebufferHandle) {
        self.framebuffers.remove(&handle);
        self.incomplete.remove(&handle);
        if self.bound == Some(FramebufferTarget::Offscreen(handle)) {
            self.bound = None;
        }
        self.commands.push(RenderCommand::DestroyFramebuffer(handle));
    }

    fn bind_texture_for_sampling(&mut self, texture: TextureHandle, unit: u32) -> Result<()> {
        self.commands.push(RenderCommand::BindTexture { texture, unit });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_bind_destroy() {
        let mut dev = RecordingDevice::new();
        let fb = dev.create_framebuffer(64, 32, FramebufferFormat::Rgba8).unwrap();
        assert_eq!(dev.live_framebuffers(), 1);
        assert_ne!(fb.handle.0, fb.texture.0);

        dev.bind_framebuffer(FramebufferTarget::Offscreen(fb.handle)).unwrap();
        assert_eq!(dev.bound_target(), Some(FramebufferTarget::Offscreen(fb.handle)));

        dev.destroy_framebuffer(fb.handle);
        assert_eq!(dev.live_framebuffers(), 0);
        assert!(dev.bound_target().is_none());
        assert!(dev
            .bind_framebuffer(FramebufferTarget::Offscreen(fb.handle))
            .is_err());
    }

    #[test]
    fn injected_failures() {
        let mut dev = RecordingDevice::new();
        dev.fail_next_framebuffer();
        assert!(dev.create_framebuffer(8, 8, FramebufferFormat::Rgba8).is_err());
        let fb = dev.create_framebuffer(8, 8, FramebufferFormat::Rgba8).unwrap();
        dev.mark_incomplete(fb.handle);
        let err = dev
            .bind_framebuffer(FramebufferTarget::Offscreen(fb.handle))
            .unwrap_err();
        assert!(matches!(err, GlintError::FramebufferError(_)));
    }

    #[test]
    fn submit_requires_bound_target() {
        let mut dev = RecordingDevice::new();
        let bytes = [0u8; 8];
        let draw = ParticleDrawData {
            particle_type: ParticleType::Unlit,
            records: &bytes,
            stride: 4,
            count: 2,
            texture: None,
        };
        let uniforms = ParticleUniforms::new(glam::Mat4::IDENTITY, glam::Vec3::ZERO, 0.0, 1.0);
        assert!(dev.submit_particles(&draw, &uniforms).is_err());

        dev.bind_framebuffer(FramebufferTarget::Default).unwrap();
        dev.submit_particles(&draw, &uniforms).unwrap();
        assert_eq!(dev.draw_calls(), 1);
        assert_eq!(dev.particles_submitted(), 2);
    }

    #[test]
    fn short_record_slice_rejected() {
        let mut dev = RecordingDevice::new();
        dev.bind_framebuffer(FramebufferTarget::Default).unwrap();
        let bytes = [0u8; 4];
        let draw = ParticleDrawData {
            particle_type: ParticleType::Unlit,
            records: &bytes,
            stride: 4,
            count: 2,
            texture: None,
        };
        let uniforms = ParticleUniforms::new(glam::Mat4::IDENTITY, glam::Vec3::ZERO, 0.0, 1.0);
        assert!(dev.submit_particles(&draw, &uniforms).is_err());
    }

    #[test]
    fn depth_state_tracked() {
        let mut dev = RecordingDevice::new();
        dev.enable_depth_test();
        assert!(dev.depth_test_enabled());
        dev.disable_depth_test();
        assert!(!dev.depth_test_enabled());
        assert_eq!(
            dev.take_commands(),
            vec![RenderCommand::EnableDepthTest, RenderCommand::DisableDepthTest]
        );
        assert!(dev.commands().is_empty());
    }
}
