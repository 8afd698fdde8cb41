//! Glint Particles - packed particle buffers and frame-stepped emission
//!
//! Provides:
//! - A fixed-capacity buffer of packed 19-float particle records
//! - Randomized emission through the `ParticleEmitter` seam
//! - `ParticleGenerator`, which turns elapsed time into emitted particles and
//!   submits them through the render capabilities once per frame
//! - TOML system configuration and a frame clock for owners driving it

pub mod buffer;
pub mod clock;
pub mod config;
pub mod emitter;
pub mod generator;
pub mod particle;

pub use buffer::{ParticleBuffer, MAX_CAPACITY};
pub use clock::FrameClock;
pub use config::SystemConfig;
pub use emitter::{DefaultParticleEmitter, EmitterSettings, ParticleEmitter};
pub use generator::{
    EmissionCursor, GeneratorSettings, ImageSource, OffscreenSettings, ParticleGenerator,
    TickStats, DEFAULT_MAX_FRAME_MILLIS,
};
pub use particle::{ParticleRecord, RECORD_BYTES, RECORD_STRIDE};
