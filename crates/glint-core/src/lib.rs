//! Glint Core - Foundational types for the Glint particle engine
//!
//! This crate provides the types that all other Glint crates depend on:
//! - `GlintError` / `Result` - the shared error taxonomy
//! - `RandomSource` - injectable uniform random source, with a seedable PRNG

mod error;
mod rand;

pub use error::{GlintError, Result};
pub use rand::{ConstantSource, ParticleRng, RandomSource};
