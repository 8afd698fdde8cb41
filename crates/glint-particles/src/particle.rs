//! Packed per-particle record layout
//!
//! Every particle is one fixed-stride group of floats. Field order is part of
//! the contract with the shaders that read the buffer: position, velocity,
//! color, packed size/time/intensity, color delta. Offsets below are in
//! floats relative to the start of one record.

use bytemuck::{Pod, Zeroable};

pub const POSITION: usize = 0;
pub const VELOCITY: usize = 3;
pub const COLOR: usize = 7;
pub const SIZE: usize = 11;
pub const TIME: usize = 12;
pub const INTENSITY: usize = 13;
/// Reserved slot completing the packed-data vec4
pub const RESERVED: usize = 14;
pub const COLOR_ADD: usize = 15;

/// Floats per record
pub const RECORD_STRIDE: usize = 19;
/// Bytes per record
pub const RECORD_BYTES: usize = RECORD_STRIDE * std::mem::size_of::<f32>();

/// One particle as it sits in the buffer. 76 bytes, tightly packed floats.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ParticleRecord {
    /// World-space origin at emission
    pub position: [f32; 3],
    /// xyz = direction, w = speed per time unit
    pub velocity: [f32; 4],
    /// Initial emitted color
    pub color: [f32; 4],
    /// x = size, y = emission time, z = intensity, w = reserved
    pub packed: [f32; 4],
    /// Color change per unit of lifetime
    pub color_add: [f32; 4],
}

impl ParticleRecord {
    pub fn size(&self) -> f32 {
        self.packed[0]
    }

    /// Emission timestamp on the simulation clock
    pub fn time(&self) -> f32 {
        self.packed[1]
    }

    pub fn intensity(&self) -> f32 {
        self.packed[2]
    }

    pub fn set_packed(&mut self, size: f32, time: f32, intensity: f32) {
        self.packed = [size, time, intensity, 0.0];
    }

    /// Lifetime elapsed at `now`, as the renderer computes it
    pub fn age(&self, now: f32) -> f32 {
        now - self.time()
    }

    /// Where the record's particle is at `now`: origin + direction * speed * age
    pub fn position_at(&self, now: f32) -> [f32; 3] {
        let travel = self.velocity[3] * self.age(now);
        [
            self.position[0] + self.velocity[0] * travel,
            self.position[1] + self.velocity[1] * travel,
            self.position[2] + self.velocity[2] * travel,
        ]
    }

    /// Color at `now`: initial color plus `color_add` per unit of age
    pub fn color_at(&self, now: f32) -> [f32; 4] {
        let age = self.age(now);
        [
            self.color[0] + self.color_add[0] * age,
            self.color[1] + self.color_add[1] * age,
            self.color[2] + self.color_add[2] * age,
            self.color[3] + self.color_add[3] * age,
        ]
    }
}
