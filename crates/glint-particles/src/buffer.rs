//! Fixed-capacity packed particle storage

use crate::particle::{ParticleRecord, RECORD_BYTES};
use glint_core::{GlintError, Result};
use glint_render::{ParticleDrawData, ParticleType, TextureHandle};

/// Upper bound on particles per buffer
pub const MAX_CAPACITY: usize = 1 << 22;

/// A fixed-capacity array of packed particle records.
///
/// Capacity is fixed at construction; growing requires a new buffer. Only
/// records `[0, active_count)` are emitted into and drawn.
#[derive(Debug, Clone)]
pub struct ParticleBuffer {
    records: Vec<ParticleRecord>,
    active_count: usize,
    particle_type: ParticleType,
}

impl ParticleBuffer {
    /// Allocate `capacity` zeroed records, all of them active.
    pub fn new(capacity: usize, particle_type: ParticleType) -> Result<Self> {
        if capacity == 0 || capacity > MAX_CAPACITY {
            return Err(GlintError::ValueOutOfRange {
                field: "capacity".into(),
                min: 1.0,
                max: MAX_CAPACITY as f64,
                value: capacity as f64,
            });
        }
        log::debug!(
            "particle buffer: {capacity} x {RECORD_BYTES} bytes ({})",
            particle_type.name()
        );
        Ok(Self {
            records: vec![ParticleRecord::default(); capacity],
            active_count: capacity,
            particle_type,
        })
    }

    pub fn capacity(&self) -> usize {
        self.records.len()
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn set_active_count(&mut self, count: usize) -> Result<()> {
        if count > self.capacity() {
            return Err(GlintError::InvalidBuffer(format!(
                "active count {count} exceeds capacity {}",
                self.capacity()
            )));
        }
        self.active_count = count;
        Ok(())
    }

    pub fn particle_type(&self) -> ParticleType {
        self.particle_type
    }

    pub fn record(&self, index: usize) -> Option<&ParticleRecord> {
        self.records.get(index)
    }

    pub fn record_mut(&mut self, index: usize) -> Option<&mut ParticleRecord> {
        self.records.get_mut(index)
    }

    /// Every record up to capacity
    pub fn records(&self) -> &[ParticleRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [ParticleRecord] {
        &mut self.records
    }

    /// Records `[0, active_count)`
    pub fn active_records(&self) -> &[ParticleRecord] {
        &self.records[..self.active_count]
    }

    /// Write every slot once, e.g. to pre-seed the buffer before the first frame.
    pub fn init_particles(&mut self, mut init: impl FnMut(usize, &mut ParticleRecord)) {
        for (i, record) in self.records.iter_mut().enumerate() {
            init(i, record);
        }
    }

    /// Flat float view, `RECORD_STRIDE` floats per record
    pub fn as_floats(&self) -> &[f32] {
        bytemuck::cast_slice(&self.records)
    }

    pub fn as_floats_mut(&mut self) -> &mut [f32] {
        bytemuck::cast_slice_mut(&mut self.records)
    }

    /// Raw bytes of every record, ready for upload
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.records)
    }

    /// Draw description covering the active records
    pub fn draw_data(&self, texture: Option<TextureHandle>) -> ParticleDrawData<'_> {
        ParticleDrawData {
            particle_type: self.particle_type,
            records: bytemuck::cast_slice(self.active_records()),
            stride: RECORD_BYTES,
            count: self.active_count,
            texture,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::{RECORD_STRIDE, TIME};

    #[test]
    fn allocates_capacity_records() {
        let buf = ParticleBuffer::new(16, ParticleType::Unlit).unwrap();
        assert_eq!(buf.capacity(), 16);
        assert_eq!(buf.active_count(), 16);
        assert_eq!(buf.as_floats().len(), 16 * RECORD_STRIDE);
        assert_eq!(buf.as_bytes().len(), 16 * RECORD_BYTES);
        assert!(buf.as_floats().iter().all(|&f| f == 0.0));
    }

    #[test]
    fn rejects_zero_capacity() {
        let err = ParticleBuffer::new(0, ParticleType::Unlit).unwrap_err();
        assert!(matches!(err, GlintError::ValueOutOfRange { .. }));
    }

    #[test]
    fn active_count_bounded_by_capacity() {
        let mut buf = ParticleBuffer::new(8, ParticleType::SimpleUnlit).unwrap();
        buf.set_active_count(3).unwrap();
        assert_eq!(buf.active_records().len(), 3);
        buf.set_active_count(0).unwrap();
        assert!(buf.active_records().is_empty());
        assert!(buf.set_active_count(9).is_err());
        assert_eq!(buf.active_count(), 0);
    }

    #[test]
    fn float_view_writes_land_in_records() {
        let mut buf = ParticleBuffer::new(4, ParticleType::Unlit).unwrap();
        buf.as_floats_mut()[2 * RECORD_STRIDE + TIME] = 7.5;
        assert_eq!(buf.record(2).unwrap().time(), 7.5);
        assert!(buf.record(4).is_none());
    }

    #[test]
    fn init_particles_visits_every_slot() {
        let mut buf = ParticleBuffer::new(5, ParticleType::Unlit).unwrap();
        buf.init_particles(|i, r| r.set_packed(1.0, -(i as f32), 1.0));
        for (i, r) in buf.records().iter().enumerate() {
            assert_eq!(r.time(), -(i as f32));
        }
    }

    #[test]
    fn draw_data_covers_active_records() {
        let mut buf = ParticleBuffer::new(10, ParticleType::Image).unwrap();
        buf.set_active_count(4).unwrap();
        let draw = buf.draw_data(Some(TextureHandle(3)));
        assert_eq!(draw.count, 4);
        assert_eq!(draw.stride, RECORD_BYTES);
        assert_eq!(draw.records.len(), 4 * RECORD_BYTES);
        assert_eq!(draw.particle_type, ParticleType::Image);
        assert_eq!(draw.texture, Some(TextureHandle(3)));
    }
}
