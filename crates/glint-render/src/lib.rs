//! Glint Render - the render capabilities the particle core is written against
//!
//! The particle core submits work through the `RenderDevice` and
//! `FramebufferProvider` traits defined here. Concrete graphics backends
//! live outside this workspace; `RecordingDevice` is the headless backend
//! used for tests and command-line simulation.

mod device;
mod draw;
mod recording;

pub use device::{
    Framebuffer, FramebufferFormat, FramebufferHandle, FramebufferProvider, FramebufferTarget,
    RenderDevice, TextureHandle,
};
pub use draw::{
    BlurUniforms, CompositeUniforms, ParticleDrawData, ParticleType, ParticleUniforms,
    QuadMaterial,
};
pub use recording::{RecordingDevice, RenderCommand};
