//! Per-frame orchestration: emission budget, write cursor and render submission

use crate::buffer::ParticleBuffer;
use crate::emitter::ParticleEmitter;
use glam::{Mat4, Vec3};
use glint_animation::KeyframeTrack;
use glint_core::{GlintError, Result};
use glint_render::{
    BlurUniforms, CompositeUniforms, Framebuffer, FramebufferFormat, FramebufferProvider,
    FramebufferTarget, ParticleUniforms, QuadMaterial, RenderDevice, TextureHandle,
};
use std::time::Duration;

/// Longest frame the budget will account for, in milliseconds
pub const DEFAULT_MAX_FRAME_MILLIS: f64 = 100.0;

/// Absorbs float noise when flooring the budget (e.g. 9.999999999 -> 10)
const BUDGET_EPSILON: f64 = 1e-9;

const TRANSPARENT: [f32; 4] = [0.0; 4];

/// Texture sampled by `ParticleType::Image` particles
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageSource {
    pub texture: TextureHandle,
    pub width: u32,
    pub height: u32,
}

/// Two-pass offscreen compositing
#[derive(Debug, Clone, PartialEq)]
pub struct OffscreenSettings {
    pub enabled: bool,
    /// Target size; 0 means "use the viewport size", negative is rejected
    pub width: i32,
    pub height: i32,
    pub format: FramebufferFormat,
    pub blur_radius: f32,
    pub blur_intensity: f32,
    pub composite_opacity: f32,
}

impl Default for OffscreenSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            width: 0,
            height: 0,
            format: FramebufferFormat::Rgba8,
            blur_radius: 1.0,
            blur_intensity: 1.0,
            composite_opacity: 1.0,
        }
    }
}

impl OffscreenSettings {
    fn validate(&self) -> Result<()> {
        if self.width < 0 || self.height < 0 {
            return Err(GlintError::InvalidGenerator(format!(
                "offscreen size must not be negative, got {}x{}",
                self.width, self.height
            )));
        }
        validate_blur(self.blur_radius, self.blur_intensity)?;
        validate_opacity(self.composite_opacity)
    }

    fn size(&self, viewport: [u32; 2]) -> [u32; 2] {
        let pick = |configured: i32, fallback: u32| {
            if configured == 0 {
                fallback
            } else {
                configured.unsigned_abs()
            }
        };
        [pick(self.width, viewport[0]), pick(self.height, viewport[1])]
    }
}

fn validate_blur(radius: f32, intensity: f32) -> Result<()> {
    if !(radius.is_finite() && radius >= 0.0 && intensity.is_finite() && intensity >= 0.0) {
        return Err(GlintError::InvalidGenerator(format!(
            "blur radius and intensity must be non-negative, got {radius} / {intensity}"
        )));
    }
    Ok(())
}

fn validate_opacity(opacity: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&opacity) {
        return Err(GlintError::ValueOutOfRange {
            field: "composite_opacity".into(),
            min: 0.0,
            max: 1.0,
            value: opacity as f64,
        });
    }
    Ok(())
}

fn validate_rate(field: &str, rate: f64) -> Result<()> {
    if !(rate.is_finite() && rate >= 0.0) {
        return Err(GlintError::ValueOutOfRange {
            field: field.into(),
            min: 0.0,
            max: f64::MAX,
            value: rate,
        });
    }
    Ok(())
}

/// Generator configuration
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorSettings {
    /// Particles owed per millisecond of simulated time
    pub emit_rate: f64,
    /// Optional ceiling on particles released per millisecond
    pub max_emit_rate: Option<f64>,
    /// Per-frame elapsed time cap
    pub max_frame_millis: f64,
    pub gravity: Vec3,
    pub background_color: [f32; 4],
    pub depth_test: bool,
    /// Default framebuffer size
    pub viewport: [u32; 2],
    pub offscreen: OffscreenSettings,
    pub image: Option<ImageSource>,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            emit_rate: 0.0,
            max_emit_rate: None,
            max_frame_millis: DEFAULT_MAX_FRAME_MILLIS,
            gravity: Vec3::ZERO,
            background_color: [0.0, 0.0, 0.0, 1.0],
            depth_test: true,
            viewport: [800, 600],
            offscreen: OffscreenSettings::default(),
            image: None,
        }
    }
}

impl GeneratorSettings {
    pub fn validate(&self) -> Result<()> {
        validate_rate("emit_rate", self.emit_rate)?;
        if let Some(max) = self.max_emit_rate {
            validate_rate("max_emit_rate", max)?;
        }
        if !(self.max_frame_millis.is_finite() && self.max_frame_millis > 0.0) {
            return Err(GlintError::InvalidGenerator(format!(
                "max_frame_millis must be positive, got {}",
                self.max_frame_millis
            )));
        }
        if !self.gravity.is_finite() || !self.background_color.iter().all(|c| c.is_finite()) {
            return Err(GlintError::InvalidGenerator(
                "gravity and background color must be finite".into(),
            ));
        }
        if self.viewport[0] == 0 || self.viewport[1] == 0 {
            return Err(GlintError::InvalidGenerator(format!(
                "viewport must be non-empty, got {}x{}",
                self.viewport[0], self.viewport[1]
            )));
        }
        if let Some(image) = &self.image {
            if image.width == 0 || image.height == 0 {
                return Err(GlintError::InvalidGenerator(format!(
                    "image size must be non-empty, got {}x{}",
                    image.width, image.height
                )));
            }
        }
        self.offscreen.validate()
    }
}

/// Circular write position plus the fractional particle debt carried across ticks
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EmissionCursor {
    pub write_offset: usize,
    pub fractional_budget: f64,
}

/// What one tick did
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickStats {
    pub frame: u64,
    /// Elapsed time accounted for, after capping
    pub elapsed_millis: f64,
    /// Whole particles owed before the rate cap
    pub requested: usize,
    pub released: usize,
    pub write_offset: usize,
    /// Simulation clock after the tick, in seconds
    pub sim_time: f64,
    pub offscreen: bool,
    /// The frame's elapsed time hit `max_frame_millis`
    pub frame_capped: bool,
    /// Emission hit `max_emit_rate`
    pub rate_capped: bool,
}

#[derive(Debug)]
struct OffscreenTargets {
    framebuffers: [Framebuffer; 2],
    /// Index of the target particles render into this frame
    front: usize,
}

impl OffscreenTargets {
    fn create(
        settings: &OffscreenSettings,
        viewport: [u32; 2],
        device: &mut impl FramebufferProvider,
    ) -> Result<Self> {
        let [width, height] = settings.size(viewport);
        let first = device.create_framebuffer(width, height, settings.format)?;
        let second = match device.create_framebuffer(width, height, settings.format) {
            Ok(fb) => fb,
            Err(err) => {
                device.destroy_framebuffer(first.handle);
                return Err(err);
            }
        };
        log::debug!("offscreen targets created ({width}x{height})");
        Ok(Self {
            framebuffers: [first, second],
            front: 0,
        })
    }

    fn pair(&self) -> (Framebuffer, Framebuffer) {
        (self.framebuffers[self.front], self.framebuffers[1 - self.front])
    }

    fn destroy(self, device: &mut impl FramebufferProvider) {
        for fb in self.framebuffers {
            device.destroy_framebuffer(fb.handle);
        }
    }
}

/// Drives one particle system: turns elapsed time into emitted particles and
/// submits the buffer through the render capabilities, once per frame.
///
/// A generator that failed a tick is faulted: every later tick errors, and
/// the owner is expected to `destroy` it and build a new one.
pub struct ParticleGenerator<E: ParticleEmitter> {
    buffer: ParticleBuffer,
    emitter: E,
    settings: GeneratorSettings,
    cursor: EmissionCursor,
    sim_time: f64,
    perspective: Mat4,
    /// Color the next frame clears to; trails `settings.background_color` by one frame
    clear_color: [f32; 4],
    background_cycle: Option<KeyframeTrack>,
    rate_cycle: Option<KeyframeTrack>,
    offscreen: Option<OffscreenTargets>,
    faulted: bool,
    frame: u64,
}

impl<E: ParticleEmitter> ParticleGenerator<E> {
    pub fn new(
        buffer: ParticleBuffer,
        emitter: E,
        settings: GeneratorSettings,
        device: &mut impl FramebufferProvider,
    ) -> Result<Self> {
        settings.validate()?;
        if buffer.particle_type().requires_texture() && settings.image.is_none() {
            return Err(GlintError::InvalidGenerator(format!(
                "{} particles need an image source",
                buffer.particle_type().name()
            )));
        }
        let offscreen = if settings.offscreen.enabled {
            Some(OffscreenTargets::create(
                &settings.offscreen,
                settings.viewport,
                device,
            )?)
        } else {
            None
        };
        log::debug!(
            "particle generator: {} {} particles, {} per ms",
            buffer.capacity(),
            buffer.particle_type().name(),
            settings.emit_rate
        );
        Ok(Self {
            buffer,
            emitter,
            clear_color: settings.background_color,
            settings,
            cursor: EmissionCursor::default(),
            sim_time: 0.0,
            perspective: Mat4::IDENTITY,
            background_cycle: None,
            rate_cycle: None,
            offscreen,
            faulted: false,
            frame: 0,
        })
    }

    /// Run one frame. A failure faults the generator.
    pub fn tick<D>(&mut self, device: &mut D, elapsed: Duration) -> Result<TickStats>
    where
        D: RenderDevice + FramebufferProvider,
    {
        if self.faulted {
            return Err(GlintError::InvalidGenerator(
                "generator faulted on an earlier frame; destroy and rebuild it".into(),
            ));
        }
        match self.step(device, elapsed) {
            Ok(stats) => Ok(stats),
            Err(err) => {
                self.faulted = true;
                log::error!("particle generator faulted on frame {}: {err}", self.frame);
                Err(err)
            }
        }
    }

    fn step<D>(&mut self, device: &mut D, elapsed: Duration) -> Result<TickStats>
    where
        D: RenderDevice + FramebufferProvider,
    {
        self.frame += 1;

        let raw_millis = elapsed.as_nanos() as f64 / 1_000_000.0;
        let frame_capped = raw_millis > self.settings.max_frame_millis;
        let millis = if frame_capped {
            log::warn!(
                "frame {} took {raw_millis:.1}ms, capping to {}ms",
                self.frame,
                self.settings.max_frame_millis
            );
            self.settings.max_frame_millis
        } else {
            raw_millis
        };
        let seconds = (millis / 1000.0) as f32;

        if let Some(cycle) = self.rate_cycle.as_mut() {
            let mut rate = [self.settings.emit_rate as f32];
            cycle.animate(seconds, &mut rate);
            self.settings.emit_rate = rate[0].max(0.0) as f64;
        }

        let active = self.buffer.active_count();
        if active > 0 {
            self.cursor.fractional_budget += self.settings.emit_rate * millis;
        }
        let requested = (self.cursor.fractional_budget + BUDGET_EPSILON).floor().max(0.0) as usize;
        let mut release = requested;
        let mut rate_capped = false;
        if let Some(max) = self.settings.max_emit_rate {
            let cap = (max * millis + BUDGET_EPSILON).floor() as usize;
            if release > cap {
                release = cap;
                rate_capped = true;
            }
        }

        let offset = if active == 0 {
            0
        } else {
            self.cursor.write_offset % active
        };
        let released = self
            .emitter
            .emit(&mut self.buffer, release, offset, active, self.sim_time);
        self.cursor.fractional_budget =
            (self.cursor.fractional_budget - released as f64).clamp(0.0, self.budget_ceiling());
        self.cursor.write_offset = if active == 0 {
            0
        } else {
            (offset + released) % active
        };
        log::trace!(
            "frame {}: released {released}/{requested}, offset {}",
            self.frame,
            self.cursor.write_offset
        );

        self.sim_time += millis / 1000.0;

        if self.offscreen.is_some() {
            self.render_offscreen(device)?;
        } else {
            self.render_direct(device)?;
        }

        if let Some(cycle) = self.background_cycle.as_mut() {
            cycle.animate(seconds, &mut self.settings.background_color);
        }
        self.clear_color = self.settings.background_color;

        Ok(TickStats {
            frame: self.frame,
            elapsed_millis: millis,
            requested,
            released,
            write_offset: self.cursor.write_offset,
            sim_time: self.sim_time,
            offscreen: self.offscreen.is_some(),
            frame_capped,
            rate_capped,
        })
    }

    /// Most debt carried into the next frame: one capped frame's worth, and
    /// never less than the sub-particle fraction.
    fn budget_ceiling(&self) -> f64 {
        (self.settings.emit_rate * self.settings.max_frame_millis).max(1.0)
    }

    fn apply_depth_state(&self, device: &mut impl RenderDevice) {
        if self.settings.depth_test {
            device.enable_depth_test();
        } else {
            device.disable_depth_test();
        }
    }

    fn submit_particles<D>(&self, device: &mut D) -> Result<()>
    where
        D: RenderDevice + FramebufferProvider,
    {
        let mut uniforms = ParticleUniforms::new(
            self.perspective,
            self.settings.gravity,
            self.sim_time as f32,
            self.emitter.global_size(),
        );
        let texture = match self.settings.image {
            Some(image) if self.buffer.particle_type().requires_texture() => {
                device.bind_texture_for_sampling(image.texture, 0)?;
                uniforms.inv_image_size = [1.0 / image.width as f32, 1.0 / image.height as f32];
                Some(image.texture)
            }
            _ => None,
        };
        device.submit_particles(&self.buffer.draw_data(texture), &uniforms)
    }

    fn render_direct<D>(&self, device: &mut D) -> Result<()>
    where
        D: RenderDevice + FramebufferProvider,
    {
        let [width, height] = self.settings.viewport;
        device.bind_framebuffer(FramebufferTarget::Default)?;
        device.set_viewport(0, 0, width, height);
        self.apply_depth_state(device);
        device.clear(self.clear_color);
        self.submit_particles(device)
    }

    fn render_offscreen<D>(&mut self, device: &mut D) -> Result<()>
    where
        D: RenderDevice + FramebufferProvider,
    {
        let Some(targets) = self.offscreen.as_ref() else {
            return self.render_direct(device);
        };
        let (scene, blurred) = targets.pair();
        let passes = &self.settings.offscreen;

        // Particles into the front target
        device.bind_framebuffer(FramebufferTarget::Offscreen(scene.handle))?;
        device.set_viewport(0, 0, scene.width, scene.height);
        self.apply_depth_state(device);
        device.clear(self.clear_color);
        self.submit_particles(device)?;

        // Front target, blurred, into the back target
        device.disable_depth_test();
        device.bind_framebuffer(FramebufferTarget::Offscreen(blurred.handle))?;
        device.set_viewport(0, 0, blurred.width, blurred.height);
        device.clear(TRANSPARENT);
        device.bind_texture_for_sampling(scene.texture, 0)?;
        let blur = BlurUniforms {
            texel_size: scene.texel_size(),
            radius: passes.blur_radius,
            intensity: passes.blur_intensity,
        };
        device.submit_fullscreen_quad(scene.texture, &QuadMaterial::Blur(blur))?;

        // Back target onto the visible surface
        let [width, height] = self.settings.viewport;
        device.bind_framebuffer(FramebufferTarget::Default)?;
        device.set_viewport(0, 0, width, height);
        device.clear(self.clear_color);
        device.bind_texture_for_sampling(blurred.texture, 0)?;
        let composite = CompositeUniforms::new(passes.composite_opacity);
        device.submit_fullscreen_quad(blurred.texture, &QuadMaterial::Composite(composite))?;

        if self.settings.depth_test {
            device.enable_depth_test();
        }

        if let Some(targets) = self.offscreen.as_mut() {
            targets.front = 1 - targets.front;
        }
        Ok(())
    }

    /// Release the offscreen targets. Dropping a generator that still owns
    /// them leaks them on the device.
    pub fn destroy(mut self, device: &mut impl FramebufferProvider) {
        if let Some(targets) = self.offscreen.take() {
            targets.destroy(device);
        }
        log::debug!("particle generator destroyed after {} frames", self.frame);
    }

    // --- configuration surface ---

    pub fn set_emit_rate(&mut self, per_millis: f64) -> Result<()> {
        validate_rate("emit_rate", per_millis)?;
        self.settings.emit_rate = per_millis;
        Ok(())
    }

    pub fn set_max_emit_rate(&mut self, per_millis: Option<f64>) -> Result<()> {
        if let Some(max) = per_millis {
            validate_rate("max_emit_rate", max)?;
        }
        self.settings.max_emit_rate = per_millis;
        Ok(())
    }

    pub fn set_max_frame_millis(&mut self, millis: f64) -> Result<()> {
        if !(millis.is_finite() && millis > 0.0) {
            return Err(GlintError::InvalidGenerator(format!(
                "max_frame_millis must be positive, got {millis}"
            )));
        }
        self.settings.max_frame_millis = millis;
        Ok(())
    }

    pub fn set_gravity(&mut self, gravity: Vec3) -> Result<()> {
        if !gravity.is_finite() {
            return Err(GlintError::InvalidGenerator(format!(
                "gravity must be finite, got {gravity}"
            )));
        }
        self.settings.gravity = gravity;
        Ok(())
    }

    /// Takes effect on the next frame's clear.
    pub fn set_background_color(&mut self, color: [f32; 4]) -> Result<()> {
        if !color.iter().all(|c| c.is_finite()) {
            return Err(GlintError::InvalidGenerator(format!(
                "background color must be finite, got {color:?}"
            )));
        }
        self.settings.background_color = color;
        self.clear_color = color;
        Ok(())
    }

    /// Cycle the background with a 4-channel track, or stop with `None`.
    pub fn set_background_cycle(&mut self, track: Option<KeyframeTrack>) -> Result<()> {
        check_channels("background cycle", track.as_ref(), 4)?;
        self.background_cycle = track;
        Ok(())
    }

    /// Drive the emit rate with a 1-channel track, or stop with `None`.
    pub fn set_rate_cycle(&mut self, track: Option<KeyframeTrack>) -> Result<()> {
        check_channels("emit rate cycle", track.as_ref(), 1)?;
        self.rate_cycle = track;
        Ok(())
    }

    pub fn set_depth_test(&mut self, enabled: bool) {
        self.settings.depth_test = enabled;
    }

    pub fn set_perspective(&mut self, view_proj: Mat4) -> Result<()> {
        if !view_proj.is_finite() {
            return Err(GlintError::InvalidGenerator(
                "perspective matrix must be finite".into(),
            ));
        }
        self.perspective = view_proj;
        Ok(())
    }

    /// Resize the visible surface. Offscreen targets sized from the viewport
    /// are recreated.
    pub fn set_viewport(
        &mut self,
        width: u32,
        height: u32,
        device: &mut impl FramebufferProvider,
    ) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(GlintError::InvalidGenerator(format!(
                "viewport must be non-empty, got {width}x{height}"
            )));
        }
        self.settings.viewport = [width, height];
        let follows_viewport =
            self.settings.offscreen.width == 0 || self.settings.offscreen.height == 0;
        if follows_viewport {
            if let Some(old) = self.offscreen.take() {
                old.destroy(device);
                match OffscreenTargets::create(&self.settings.offscreen, [width, height], device) {
                    Ok(targets) => self.offscreen = Some(targets),
                    Err(err) => {
                        self.faulted = true;
                        log::error!("particle generator faulted resizing to {width}x{height}: {err}");
                        return Err(err);
                    }
                }
            }
        }
        Ok(())
    }

    /// Shrink or grow the live window; the write cursor is folded back into it.
    pub fn set_active_count(&mut self, count: usize) -> Result<()> {
        self.buffer.set_active_count(count)?;
        self.cursor.write_offset = if count == 0 {
            0
        } else {
            self.cursor.write_offset % count
        };
        Ok(())
    }

    /// Turn two-pass offscreen compositing on or off, creating or releasing
    /// the targets as needed.
    pub fn set_fbo_enabled(
        &mut self,
        enabled: bool,
        device: &mut impl FramebufferProvider,
    ) -> Result<()> {
        match (enabled, self.offscreen.take()) {
            (true, None) => {
                self.offscreen = Some(OffscreenTargets::create(
                    &self.settings.offscreen,
                    self.settings.viewport,
                    device,
                )?);
            }
            (true, existing @ Some(_)) => self.offscreen = existing,
            (false, Some(targets)) => targets.destroy(device),
            (false, None) => {}
        }
        self.settings.offscreen.enabled = enabled;
        Ok(())
    }

    pub fn set_blur(&mut self, radius: f32, intensity: f32) -> Result<()> {
        validate_blur(radius, intensity)?;
        self.settings.offscreen.blur_radius = radius;
        self.settings.offscreen.blur_intensity = intensity;
        Ok(())
    }

    pub fn set_composite_opacity(&mut self, opacity: f32) -> Result<()> {
        validate_opacity(opacity)?;
        self.settings.offscreen.composite_opacity = opacity;
        Ok(())
    }

    // --- accessors ---

    pub fn buffer(&self) -> &ParticleBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut ParticleBuffer {
        &mut self.buffer
    }

    pub fn emitter(&self) -> &E {
        &self.emitter
    }

    pub fn emitter_mut(&mut self) -> &mut E {
        &mut self.emitter
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    pub fn cursor(&self) -> EmissionCursor {
        self.cursor
    }

    pub fn write_offset(&self) -> usize {
        self.cursor.write_offset
    }

    pub fn fractional_budget(&self) -> f64 {
        self.cursor.fractional_budget
    }

    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    pub fn perspective(&self) -> Mat4 {
        self.perspective
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    pub fn background_color(&self) -> [f32; 4] {
        self.settings.background_color
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    /// Offscreen targets, the one particles render into next first
    pub fn offscreen_framebuffers(&self) -> Option<[Framebuffer; 2]> {
        self.offscreen.as_ref().map(|t| {
            let (front, back) = t.pair();
            [front, back]
        })
    }
}

impl<E: ParticleEmitter> Drop for ParticleGenerator<E> {
    fn drop(&mut self) {
        if self.offscreen.is_some() {
            log::warn!("particle generator dropped with live offscreen targets; call destroy()");
        }
    }
}

fn check_channels(what: &str, track: Option<&KeyframeTrack>, channels: usize) -> Result<()> {
    match track {
        Some(track) if track.stride() != channels => Err(GlintError::InvalidGenerator(format!(
            "{what} needs {channels} channel(s), got {}",
            track.stride()
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::{DefaultParticleEmitter, EmitterSettings};
    use glint_core::ParticleRng;
    use glint_render::{ParticleType, RecordingDevice, RenderCommand};

    type Generator = ParticleGenerator<DefaultParticleEmitter<ParticleRng>>;

    fn still_emitter() -> DefaultParticleEmitter<ParticleRng> {
        let settings = EmitterSettings {
            base_velocity: [1.0, 0.0, 0.0, 10.0],
            ..Default::default()
        };
        DefaultParticleEmitter::new(settings, ParticleRng::new(7)).unwrap()
    }

    fn build(
        capacity: usize,
        settings: GeneratorSettings,
        device: &mut RecordingDevice,
    ) -> Generator {
        let buffer = ParticleBuffer::new(capacity, ParticleType::Unlit).unwrap();
        ParticleGenerator::new(buffer, still_emitter(), settings, device).unwrap()
    }

    fn ms(millis: f64) -> Duration {
        Duration::from_nanos((millis * 1_000_000.0).round() as u64)
    }

    fn clears(commands: &[RenderCommand]) -> Vec<[f32; 4]> {
        commands
            .iter()
            .filter_map(|c| match c {
                RenderCommand::Clear(color) => Some(*color),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn one_second_releases_ten_particles() {
        let mut device = RecordingDevice::new();
        let settings = GeneratorSettings {
            emit_rate: 0.01,
            max_frame_millis: 1000.0,
            ..Default::default()
        };
        let mut gen = build(100, settings, &mut device);

        let stats = gen.tick(&mut device, Duration::from_millis(1000)).unwrap();
        assert_eq!(stats.released, 10);
        assert_eq!(stats.write_offset, 10);
        assert_eq!(gen.write_offset(), 10);

        for r in &gen.buffer().records()[..10] {
            assert_eq!(r.position, [0.0, 0.0, 0.0]);
            assert_eq!(r.velocity, [1.0, 0.0, 0.0, 10.0]);
            assert!(r.size() >= 1.2 && r.size() < 2.2);
            assert_eq!(r.time(), 0.0);
        }
        assert_eq!(gen.buffer().records()[10].size(), 0.0);
        assert!((gen.sim_time() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn budget_carries_across_tick_splits() {
        let rate = 0.37;
        let settings = GeneratorSettings {
            emit_rate: rate,
            max_frame_millis: 1000.0,
            ..Default::default()
        };

        let splits: [&[f64]; 3] = [
            &[100.0],
            &[16.0, 3.5, 40.0, 7.25, 33.25],
            &[1.0; 100],
        ];
        for split in splits {
            let mut device = RecordingDevice::new();
            let mut gen = build(64, settings.clone(), &mut device);
            let mut total = 0usize;
            for &t in split {
                total += gen.tick(&mut device, ms(t)).unwrap().released;
            }
            let expected = (rate * split.iter().sum::<f64>()).floor() as i64;
            assert!(
                (total as i64 - expected).abs() <= 1,
                "split {split:?}: emitted {total}, expected {expected}"
            );
            assert!(gen.fractional_budget() < 1.0 + 1e-6);
        }
    }

    #[test]
    fn write_offset_wraps_within_active_window() {
        let mut device = RecordingDevice::new();
        let settings = GeneratorSettings {
            emit_rate: 1.0,
            ..Default::default()
        };
        let mut gen = build(10, settings, &mut device);
        gen.set_active_count(7).unwrap();
        gen.buffer_mut()
            .init_particles(|_, r| r.set_packed(0.0, -1.0, 0.0));

        let mut offset = 0;
        let mut total = 0;
        for _ in 0..5 {
            let stats = gen.tick(&mut device, ms(3.0)).unwrap();
            assert_eq!(stats.released, 3);
            assert_eq!(stats.write_offset, (offset + stats.released) % 7);
            offset = stats.write_offset;
            total += stats.released;
        }
        assert_eq!(gen.write_offset(), total % 7);
        for r in &gen.buffer().records()[..7] {
            assert!(r.time() >= 0.0);
        }
        for r in &gen.buffer().records()[7..] {
            assert_eq!(r.time(), -1.0);
        }
    }

    #[test]
    fn shrinking_active_count_folds_cursor() {
        let mut device = RecordingDevice::new();
        let settings = GeneratorSettings {
            emit_rate: 1.0,
            ..Default::default()
        };
        let mut gen = build(20, settings, &mut device);
        gen.tick(&mut device, ms(9.0)).unwrap();
        assert_eq!(gen.write_offset(), 9);
        gen.set_active_count(4).unwrap();
        assert_eq!(gen.write_offset(), 1);
        assert!(gen.set_active_count(21).is_err());

        gen.set_active_count(0).unwrap();
        let stats = gen.tick(&mut device, ms(5.0)).unwrap();
        assert_eq!(stats.released, 0);
        assert_eq!(stats.write_offset, 0);
    }

    #[test]
    fn elapsed_time_is_capped() {
        let mut device = RecordingDevice::new();
        let settings = GeneratorSettings {
            emit_rate: 0.1,
            ..Default::default()
        };
        let mut gen = build(100, settings, &mut device);
        let stats = gen.tick(&mut device, Duration::from_millis(5000)).unwrap();
        assert!(stats.frame_capped);
        assert_eq!(stats.elapsed_millis, DEFAULT_MAX_FRAME_MILLIS);
        assert_eq!(stats.released, 10);
        assert!((gen.sim_time() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn max_emit_rate_limits_release_and_keeps_debt() {
        let mut device = RecordingDevice::new();
        let settings = GeneratorSettings {
            emit_rate: 2.0,
            max_emit_rate: Some(0.5),
            ..Default::default()
        };
        let mut gen = build(100, settings, &mut device);
        let stats = gen.tick(&mut device, ms(10.0)).unwrap();
        assert_eq!(stats.requested, 20);
        assert_eq!(stats.released, 5);
        assert!(stats.rate_capped);
        assert!((gen.fractional_budget() - 15.0).abs() < 1e-6);
    }

    #[test]
    fn rate_cycle_applies_before_budget() {
        let mut device = RecordingDevice::new();
        let mut gen = build(100, GeneratorSettings::default(), &mut device);
        let cycle = KeyframeTrack::linear(&[0.0], &[1.0], 1.0).unwrap();
        gen.set_rate_cycle(Some(cycle)).unwrap();

        let stats = gen.tick(&mut device, ms(100.0)).unwrap();
        assert!((gen.settings().emit_rate - 0.1).abs() < 1e-6);
        assert_eq!(stats.released, 10);

        let four = KeyframeTrack::linear(&[0.0; 4], &[1.0; 4], 1.0).unwrap();
        assert!(gen.set_rate_cycle(Some(four)).is_err());
    }

    #[test]
    fn direct_frame_command_order() {
        let mut device = RecordingDevice::new();
        let settings = GeneratorSettings {
            emit_rate: 0.5,
            background_color: [0.2, 0.3, 0.4, 1.0],
            viewport: [320, 240],
            ..Default::default()
        };
        let mut gen = build(16, settings, &mut device);
        gen.tick(&mut device, ms(10.0)).unwrap();

        let cmds = device.take_commands();
        assert_eq!(cmds.len(), 5);
        assert_eq!(cmds[0], RenderCommand::BindFramebuffer(FramebufferTarget::Default));
        assert_eq!(
            cmds[1],
            RenderCommand::SetViewport {
                x: 0,
                y: 0,
                width: 320,
                height: 240
            }
        );
        assert_eq!(cmds[2], RenderCommand::EnableDepthTest);
        assert_eq!(cmds[3], RenderCommand::Clear([0.2, 0.3, 0.4, 1.0]));
        match &cmds[4] {
            RenderCommand::SubmitParticles {
                count,
                stride,
                uniforms,
                ..
            } => {
                assert_eq!(*count, 16);
                assert_eq!(*stride, crate::particle::RECORD_BYTES);
                assert!((uniforms.time - 0.01).abs() < 1e-6);
                assert_eq!(uniforms.global_size, 1.0);
            }
            other => panic!("expected particle draw, got {other:?}"),
        }
    }

    #[test]
    fn offscreen_frame_runs_two_passes_and_ping_pongs() {
        let mut device = RecordingDevice::new();
        let settings = GeneratorSettings {
            offscreen: OffscreenSettings {
                enabled: true,
                width: 64,
                height: 32,
                blur_radius: 2.0,
                composite_opacity: 0.5,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut gen = build(8, settings, &mut device);
        assert_eq!(device.live_framebuffers(), 2);
        let [a, b] = gen.offscreen_framebuffers().unwrap();
        assert_eq!((a.width, a.height), (64, 32));
        device.take_commands();

        let stats = gen.tick(&mut device, ms(16.0)).unwrap();
        assert!(stats.offscreen);
        let cmds = device.take_commands();
        assert_eq!(
            cmds[0],
            RenderCommand::BindFramebuffer(FramebufferTarget::Offscreen(a.handle))
        );
        assert!(matches!(cmds[4], RenderCommand::SubmitParticles { .. }));
        assert_eq!(cmds[5], RenderCommand::DisableDepthTest);
        assert_eq!(
            cmds[6],
            RenderCommand::BindFramebuffer(FramebufferTarget::Offscreen(b.handle))
        );
        assert_eq!(
            cmds[9],
            RenderCommand::BindTexture {
                texture: a.texture,
                unit: 0
            }
        );
        match cmds[10] {
            RenderCommand::SubmitFullscreenQuad {
                texture,
                material: QuadMaterial::Blur(blur),
            } => {
                assert_eq!(texture, a.texture);
                assert_eq!(blur.radius, 2.0);
                assert_eq!(blur.texel_size, [1.0 / 64.0, 1.0 / 32.0]);
            }
            ref other => panic!("expected blur pass, got {other:?}"),
        }
        assert_eq!(cmds[11], RenderCommand::BindFramebuffer(FramebufferTarget::Default));
        match cmds[15] {
            RenderCommand::SubmitFullscreenQuad {
                texture,
                material: QuadMaterial::Composite(composite),
            } => {
                assert_eq!(texture, b.texture);
                assert_eq!(composite.opacity, 0.5);
            }
            ref other => panic!("expected composite pass, got {other:?}"),
        }
        assert_eq!(cmds.last(), Some(&RenderCommand::EnableDepthTest));
        assert!(device.depth_test_enabled());

        // Roles swap on the next frame
        gen.tick(&mut device, ms(16.0)).unwrap();
        let cmds = device.take_commands();
        assert_eq!(
            cmds[0],
            RenderCommand::BindFramebuffer(FramebufferTarget::Offscreen(b.handle))
        );
        gen.destroy(&mut device);
        assert_eq!(device.live_framebuffers(), 0);
    }

    #[test]
    fn offscreen_without_depth_test_leaves_it_off() {
        let mut device = RecordingDevice::new();
        let settings = GeneratorSettings {
            depth_test: false,
            offscreen: OffscreenSettings {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut gen = build(8, settings, &mut device);
        let [a, _] = gen.offscreen_framebuffers().unwrap();
        assert_eq!((a.width, a.height), (800, 600));
        device.take_commands();
        gen.tick(&mut device, ms(16.0)).unwrap();
        let cmds = device.take_commands();
        assert!(!cmds.contains(&RenderCommand::EnableDepthTest));
        assert!(!device.depth_test_enabled());
        gen.destroy(&mut device);
    }

    #[test]
    fn background_cycle_lags_one_frame() {
        let mut device = RecordingDevice::new();
        let mut gen = build(4, GeneratorSettings::default(), &mut device);
        let cycle = KeyframeTrack::linear(&[0.0, 0.0, 0.0, 1.0], &[1.0, 0.0, 0.0, 1.0], 1.0).unwrap();
        gen.set_background_cycle(Some(cycle)).unwrap();

        gen.tick(&mut device, ms(100.0)).unwrap();
        gen.tick(&mut device, ms(100.0)).unwrap();
        gen.tick(&mut device, ms(100.0)).unwrap();

        let reds: Vec<f32> = clears(device.commands()).iter().map(|c| c[0]).collect();
        assert_eq!(reds.len(), 3);
        assert_eq!(reds[0], 0.0);
        assert!((reds[1] - 0.1).abs() < 1e-5);
        assert!((reds[2] - 0.2).abs() < 1e-5);
        assert!((gen.background_color()[0] - 0.3).abs() < 1e-5);
    }

    #[test]
    fn background_color_setter_applies_next_clear() {
        let mut device = RecordingDevice::new();
        let mut gen = build(4, GeneratorSettings::default(), &mut device);
        gen.set_background_color([0.5, 0.5, 0.5, 1.0]).unwrap();
        gen.tick(&mut device, ms(16.0)).unwrap();
        assert_eq!(clears(device.commands()), vec![[0.5, 0.5, 0.5, 1.0]]);
        assert!(gen.set_background_color([f32::NAN; 4]).is_err());
    }

    #[test]
    fn incomplete_target_faults_generator() {
        let mut device = RecordingDevice::new();
        let settings = GeneratorSettings {
            offscreen: OffscreenSettings {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut gen = build(8, settings, &mut device);
        let [a, _] = gen.offscreen_framebuffers().unwrap();
        device.mark_incomplete(a.handle);

        let err = gen.tick(&mut device, ms(16.0)).unwrap_err();
        assert!(matches!(err, GlintError::FramebufferError(_)));
        assert!(gen.is_faulted());
        let err = gen.tick(&mut device, ms(16.0)).unwrap_err();
        assert!(matches!(err, GlintError::InvalidGenerator(_)));
        gen.destroy(&mut device);
        assert_eq!(device.live_framebuffers(), 0);
    }

    #[test]
    fn negative_offscreen_size_rejected_at_setup() {
        let mut device = RecordingDevice::new();
        let settings = GeneratorSettings {
            offscreen: OffscreenSettings {
                enabled: true,
                width: -1,
                height: 16,
                ..Default::default()
            },
            ..Default::default()
        };
        let buffer = ParticleBuffer::new(4, ParticleType::Unlit).unwrap();
        let err = ParticleGenerator::new(buffer, still_emitter(), settings, &mut device)
            .err()
            .unwrap();
        assert!(matches!(err, GlintError::InvalidGenerator(_)));
        assert_eq!(device.live_framebuffers(), 0);
    }

    #[test]
    fn framebuffer_failure_at_setup_propagates() {
        let mut device = RecordingDevice::new();
        device.fail_next_framebuffer();
        let settings = GeneratorSettings {
            offscreen: OffscreenSettings {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let buffer = ParticleBuffer::new(4, ParticleType::Unlit).unwrap();
        let result = ParticleGenerator::new(buffer, still_emitter(), settings, &mut device);
        assert!(matches!(result, Err(GlintError::FramebufferError(_))));
    }

    #[test]
    fn image_particles_need_and_bind_a_texture() {
        let mut device = RecordingDevice::new();
        let buffer = ParticleBuffer::new(4, ParticleType::Image).unwrap();
        let missing =
            ParticleGenerator::new(buffer, still_emitter(), GeneratorSettings::default(), &mut device);
        assert!(matches!(missing, Err(GlintError::InvalidGenerator(_))));

        let settings = GeneratorSettings {
            image: Some(ImageSource {
                texture: TextureHandle(42),
                width: 256,
                height: 128,
            }),
            ..Default::default()
        };
        let buffer = ParticleBuffer::new(4, ParticleType::Image).unwrap();
        let mut gen = ParticleGenerator::new(buffer, still_emitter(), settings, &mut device).unwrap();
        gen.tick(&mut device, ms(16.0)).unwrap();

        let cmds = device.take_commands();
        assert!(cmds.contains(&RenderCommand::BindTexture {
            texture: TextureHandle(42),
            unit: 0
        }));
        let draw = cmds
            .iter()
            .find_map(|c| match c {
                RenderCommand::SubmitParticles {
                    texture, uniforms, ..
                } => Some((*texture, *uniforms)),
                _ => None,
            })
            .unwrap();
        assert_eq!(draw.0, Some(TextureHandle(42)));
        assert_eq!(draw.1.inv_image_size, [1.0 / 256.0, 1.0 / 128.0]);
    }

    #[test]
    fn fbo_toggle_creates_and_releases_targets() {
        let mut device = RecordingDevice::new();
        let mut gen = build(4, GeneratorSettings::default(), &mut device);
        assert!(gen.offscreen_framebuffers().is_none());

        gen.set_fbo_enabled(true, &mut device).unwrap();
        assert_eq!(device.live_framebuffers(), 2);
        gen.set_fbo_enabled(true, &mut device).unwrap();
        assert_eq!(device.live_framebuffers(), 2);
        assert!(gen.tick(&mut device, ms(16.0)).unwrap().offscreen);

        gen.set_viewport(1024, 768, &mut device).unwrap();
        let [a, _] = gen.offscreen_framebuffers().unwrap();
        assert_eq!((a.width, a.height), (1024, 768));
        assert_eq!(device.live_framebuffers(), 2);

        gen.set_fbo_enabled(false, &mut device).unwrap();
        assert_eq!(device.live_framebuffers(), 0);
        assert!(!gen.tick(&mut device, ms(16.0)).unwrap().offscreen);
    }

    #[test]
    fn failed_resize_faults_generator() {
        let mut device = RecordingDevice::new();
        let settings = GeneratorSettings {
            offscreen: OffscreenSettings {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut gen = build(4, settings, &mut device);
        device.fail_next_framebuffer();

        let err = gen.set_viewport(1024, 768, &mut device).unwrap_err();
        assert!(matches!(err, GlintError::FramebufferError(_)));
        assert!(gen.is_faulted());
        assert!(gen.offscreen_framebuffers().is_none());
        let err = gen.tick(&mut device, ms(16.0)).unwrap_err();
        assert!(matches!(err, GlintError::InvalidGenerator(_)));
        gen.destroy(&mut device);
        assert_eq!(device.live_framebuffers(), 0);
    }

    #[test]
    fn inactive_window_does_not_build_a_backlog() {
        let mut device = RecordingDevice::new();
        let settings = GeneratorSettings {
            emit_rate: 1.0,
            ..Default::default()
        };
        let mut gen = build(10, settings, &mut device);
        gen.set_active_count(0).unwrap();
        for _ in 0..1000 {
            assert_eq!(gen.tick(&mut device, ms(100.0)).unwrap().released, 0);
        }
        assert!(gen.fractional_budget() < 1.0);

        gen.set_active_count(10).unwrap();
        let stats = gen.tick(&mut device, ms(1.0)).unwrap();
        assert_eq!(stats.released, 1);
        assert_eq!(gen.emitter().emitted_total(), 1);
    }

    #[test]
    fn rate_cap_debt_is_bounded_by_one_frame() {
        let mut device = RecordingDevice::new();
        let settings = GeneratorSettings {
            emit_rate: 2.0,
            max_emit_rate: Some(0.5),
            ..Default::default()
        };
        let mut gen = build(100, settings, &mut device);
        for _ in 0..50 {
            gen.tick(&mut device, ms(10.0)).unwrap();
        }
        let ceiling = 2.0 * DEFAULT_MAX_FRAME_MILLIS;
        assert!((gen.fractional_budget() - ceiling).abs() < 1e-6);

        gen.set_max_emit_rate(None).unwrap();
        let stats = gen.tick(&mut device, ms(10.0)).unwrap();
        assert_eq!(stats.released, 220);
        assert!(gen.fractional_budget() < 1.0);
    }

    #[test]
    fn sim_time_does_not_drift_over_long_runs() {
        let mut device = RecordingDevice::new();
        let mut gen = build(4, GeneratorSettings::default(), &mut device);
        for _ in 0..10_000 {
            gen.tick(&mut device, ms(16.0)).unwrap();
            device.take_commands();
        }
        assert!((gen.sim_time() - 160.0).abs() < 1e-9);
    }

    #[test]
    fn setters_reject_invalid_values() {
        let mut device = RecordingDevice::new();
        let mut gen = build(4, GeneratorSettings::default(), &mut device);
        assert!(gen.set_emit_rate(-1.0).is_err());
        assert!(gen.set_emit_rate(f64::NAN).is_err());
        assert!(gen.set_max_emit_rate(Some(-0.1)).is_err());
        assert!(gen.set_max_frame_millis(0.0).is_err());
        assert!(gen.set_gravity(Vec3::new(0.0, f32::INFINITY, 0.0)).is_err());
        assert!(gen.set_blur(-1.0, 1.0).is_err());
        assert!(gen.set_composite_opacity(1.5).is_err());
        assert!(gen.set_viewport(0, 10, &mut device).is_err());
        assert!(gen.set_perspective(Mat4::from_cols_array(&[f32::NAN; 16])).is_err());

        gen.set_gravity(Vec3::new(0.0, -9.8, 0.0)).unwrap();
        gen.set_emit_rate(0.25).unwrap();
        assert_eq!(gen.settings().emit_rate, 0.25);
        assert_eq!(gen.settings().gravity, Vec3::new(0.0, -9.8, 0.0));
    }

    #[test]
    fn perspective_and_gravity_reach_uniforms() {
        let mut device = RecordingDevice::new();
        let mut gen = build(4, GeneratorSettings::default(), &mut device);
        let proj = Mat4::perspective_rh(1.0, 4.0 / 3.0, 0.1, 100.0);
        gen.set_perspective(proj).unwrap();
        gen.set_gravity(Vec3::new(0.0, -1.0, 0.0)).unwrap();
        gen.tick(&mut device, ms(16.0)).unwrap();

        let uniforms = device
            .commands()
            .iter()
            .find_map(|c| match c {
                RenderCommand::SubmitParticles { uniforms, .. } => Some(*uniforms),
                _ => None,
            })
            .unwrap();
        assert_eq!(uniforms.view_proj, proj.to_cols_array_2d());
        assert_eq!(uniforms.gravity, [0.0, -1.0, 0.0, 0.0]);
    }
}
