//! Keyframe track engine: cursor-based interpolation with loop policies
//!
//! A track stores strictly increasing keyframe times (`input`) and a flat
//! value array (`output`) holding `stride` channels per keyframe. Playback is
//! driven by `animate(dt, target)`, which advances a monotonic cursor and
//! writes the interpolated channels into a caller-owned slice.

use crate::interpolation::Interpolation;
use glint_core::{GlintError, Result};
use serde::{Deserialize, Serialize};

/// Lower bound for a segment's length when computing the blend factor.
pub const MIN_SEGMENT_LENGTH: f32 = 1e-6;

/// What happens when playback crosses the end of the track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoopPolicy {
    /// Stop and clamp at the last keyframe
    #[default]
    Disabled,
    /// Wrap forever
    Infinite,
    /// Wrap this many times, then stop and clamp
    Counted(u32),
}

impl LoopPolicy {
    /// Decode the integer form used in track files:
    /// `0` = disabled, `-1` = infinite, `N > 0` = counted N.
    pub fn from_count(count: i64) -> Result<Self> {
        match count {
            0 => Ok(LoopPolicy::Disabled),
            -1 => Ok(LoopPolicy::Infinite),
            n if n > 0 && n <= u32::MAX as i64 => Ok(LoopPolicy::Counted(n as u32)),
            other => Err(GlintError::ValueOutOfRange {
                field: "loop_count".into(),
                min: -1.0,
                max: u32::MAX as f64,
                value: other as f64,
            }),
        }
    }

    pub fn loops(&self) -> bool {
        !matches!(self, LoopPolicy::Disabled)
    }
}

/// How interpolated values reach the target array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WriteMode {
    /// Overwrite the target with the interpolated value
    #[default]
    Absolute,
    /// Add the interpolated value on top of whatever else wrote the target
    Relative,
}

/// A multi-channel keyframe track with its own playback cursor.
#[derive(Debug, Clone)]
pub struct KeyframeTrack {
    input: Vec<f32>,
    output: Vec<f32>,
    stride: usize,
    interpolation: Interpolation,
    loop_policy: LoopPolicy,
    write_mode: WriteMode,
    current_time: f32,
    current_index: usize,
    current_loop: u32,
    finished: bool,
    reversed: bool,
    /// Last interpolated value per channel
    values: Vec<f32>,
    /// Contribution currently added to the target (relative mode only)
    applied: Vec<f32>,
}

impl KeyframeTrack {
    /// Build a track from keyframe times and a flat value array with
    /// `stride` channels per keyframe.
    pub fn new(input: Vec<f32>, output: Vec<f32>, stride: usize) -> Result<Self> {
        validate_keyframes(&input, &output, stride)?;
        let mut track = Self {
            input,
            output,
            stride,
            interpolation: Interpolation::default(),
            loop_policy: LoopPolicy::default(),
            write_mode: WriteMode::default(),
            current_time: 0.0,
            current_index: 0,
            current_loop: 0,
            finished: false,
            reversed: false,
            values: vec![0.0; stride],
            applied: vec![0.0; stride],
        };
        track.reset();
        log::debug!(
            "keyframe track: {} keyframes x {} channels over {}s",
            track.input.len(),
            stride,
            track.duration()
        );
        Ok(track)
    }

    /// The common "from A to B over `duration` seconds" track.
    pub fn linear(from: &[f32], to: &[f32], duration: f32) -> Result<Self> {
        if from.len() != to.len() {
            return Err(GlintError::InvalidTrack(format!(
                "start has {} channels but end has {}",
                from.len(),
                to.len()
            )));
        }
        let mut output = Vec::with_capacity(from.len() * 2);
        output.extend_from_slice(from);
        output.extend_from_slice(to);
        Self::new(vec![0.0, duration], output, from.len())
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Result<Self> {
        interpolation.validate()?;
        self.interpolation = interpolation;
        self.interpolate();
        Ok(self)
    }

    pub fn with_loop_policy(mut self, loop_policy: LoopPolicy) -> Self {
        self.loop_policy = loop_policy;
        self
    }

    pub fn with_write_mode(mut self, write_mode: WriteMode) -> Self {
        self.write_mode = write_mode;
        self
    }

    /// Replace the keyframes and rewind. The relative-mode contribution
    /// is forgotten, so the next drive adds the full value again.
    pub fn setup(&mut self, input: Vec<f32>, output: Vec<f32>, stride: usize) -> Result<()> {
        validate_keyframes(&input, &output, stride)?;
        self.input = input;
        self.output = output;
        self.stride = stride;
        self.values = vec![0.0; stride];
        self.applied = vec![0.0; stride];
        self.reversed = false;
        self.reset();
        Ok(())
    }

    /// Rewind to the first keyframe and clear loop/finished state.
    pub fn reset(&mut self) {
        self.current_time = self.start_time();
        self.current_index = 0;
        self.current_loop = 0;
        self.finished = false;
        self.interpolate();
    }

    /// Advance playback by `delta` seconds and write the result into `target`.
    ///
    /// Returns `true` when this call wrapped around the end of the track.
    /// Zero, negative and NaN deltas are no-ops, as is any call on a
    /// finished track.
    pub fn animate(&mut self, delta: f32, target: &mut [f32]) -> bool {
        if !(delta > 0.0) || self.finished {
            return false;
        }

        let start = self.start_time();
        let end = self.end_time();
        let mut time = self.current_time + delta;
        let mut looped = false;

        match self.loop_policy {
            LoopPolicy::Disabled => {
                if time > end {
                    self.finish(target);
                    return false;
                }
            }
            LoopPolicy::Infinite | LoopPolicy::Counted(_) => {
                if time >= end {
                    let duration = (end - start).max(MIN_SEGMENT_LENGTH);
                    let crossed = ((time - start) / duration).floor().max(1.0);
                    let crossed = if crossed >= u32::MAX as f32 {
                        u32::MAX
                    } else {
                        crossed as u32
                    };

                    if let LoopPolicy::Counted(limit) = self.loop_policy {
                        if self.current_loop.saturating_add(crossed) > limit {
                            self.current_loop = limit;
                            self.finish(target);
                            return false;
                        }
                    }

                    self.current_loop = self.current_loop.saturating_add(crossed);
                    time = start + (time - start) % duration;
                    self.current_index = 0;
                    looped = true;
                }
            }
        }

        self.current_time = time;
        self.advance_index();
        self.interpolate();
        self.write(target);
        looped
    }

    /// Seek to `time` seconds past the track start: `reset` then `animate`.
    pub fn set_time(&mut self, time: f32, target: &mut [f32]) -> bool {
        self.reset();
        self.animate(time, target)
    }

    /// Play the track backwards from here on.
    ///
    /// Keyframe values are swapped end-for-end (one `stride`-sized group at
    /// a time), keyframe times are mirrored inside `[start, end]` and the
    /// cursor maps to `start + end - current_time`. Reversing twice restores
    /// the original track. A finished track stays finished until `reset`,
    /// which then rewinds it to the start of the reversed keyframes.
    pub fn reverse(&mut self) {
        let n = self.input.len();
        let start = self.start_time();
        let end = self.end_time();

        let mut mirrored: Vec<f32> = self.input.iter().rev().map(|&t| start + end - t).collect();
        mirrored[0] = start;
        mirrored[n - 1] = end;
        self.input = mirrored;

        for k in 0..n / 2 {
            let j = n - 1 - k;
            for c in 0..self.stride {
                self.output.swap(k * self.stride + c, j * self.stride + c);
            }
        }

        self.current_time = (start + end - self.current_time).clamp(start, end);
        self.reversed = !self.reversed;
        self.current_index = 0;
        self.advance_index();
        self.interpolate();
    }

    fn finish(&mut self, target: &mut [f32]) {
        self.current_time = self.end_time();
        self.current_index = self.input.len() - 2;
        self.finished = true;
        self.interpolate();
        self.write(target);
    }

    /// Move the segment cursor forward until it contains `current_time`.
    fn advance_index(&mut self) {
        let last_segment = self.input.len() - 2;
        while self.current_index < last_segment
            && self.current_time > self.input[self.current_index + 1]
        {
            self.current_index += 1;
        }
    }

    fn interpolate(&mut self) {
        let i = self.current_index;
        let t0 = self.input[i];
        let t1 = self.input[i + 1];
        let span = (t1 - t0).max(MIN_SEGMENT_LENGTH);
        let factor = ((self.current_time - t0) / span).clamp(0.0, 1.0);

        let from = &self.output[i * self.stride..(i + 1) * self.stride];
        let to = &self.output[(i + 1) * self.stride..(i + 2) * self.stride];
        for (c, value) in self.values.iter_mut().enumerate() {
            *value = self
                .interpolation
                .blend(from[c], to[c], factor, self.current_time);
        }
    }

    fn write(&mut self, target: &mut [f32]) {
        match self.write_mode {
            WriteMode::Absolute => {
                for (dst, &v) in target.iter_mut().zip(&self.values) {
                    *dst = v;
                }
            }
            WriteMode::Relative => {
                for ((dst, applied), &v) in target
                    .iter_mut()
                    .zip(self.applied.iter_mut())
                    .zip(&self.values)
                {
                    *dst += v - *applied;
                    *applied = v;
                }
            }
        }
    }

    /// Number of channels per keyframe
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn keyframe_count(&self) -> usize {
        self.input.len()
    }

    pub fn start_time(&self) -> f32 {
        self.input[0]
    }

    pub fn end_time(&self) -> f32 {
        self.input[self.input.len() - 1]
    }

    pub fn duration(&self) -> f32 {
        self.end_time() - self.start_time()
    }

    pub fn current_time(&self) -> f32 {
        self.current_time
    }

    /// Index of the active segment `[i, i + 1)`
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_loop(&self) -> u32 {
        self.current_loop
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    pub fn loop_policy(&self) -> LoopPolicy {
        self.loop_policy
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    /// Interpolated value of every channel at the current time
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn times(&self) -> &[f32] {
        &self.input
    }

    pub fn keyframe_values(&self) -> &[f32] {
        &self.output
    }
}

fn validate_keyframes(input: &[f32], output: &[f32], stride: usize) -> Result<()> {
    if stride == 0 {
        return Err(GlintError::InvalidTrack(
            "a track needs at least one channel".into(),
        ));
    }
    if input.len() < 2 {
        return Err(GlintError::InvalidTrack(format!(
            "a track needs at least two keyframes, got {}",
            input.len()
        )));
    }
    if output.len() != input.len() * stride {
        return Err(GlintError::InvalidTrack(format!(
            "{} keyframes x {} channels needs {} values, got {}",
            input.len(),
            stride,
            input.len() * stride,
            output.len()
        )));
    }
    if let Some(bad) = input.iter().chain(output).find(|v| !v.is_finite()) {
        return Err(GlintError::InvalidTrack(format!(
            "keyframe data must be finite, found {bad}"
        )));
    }
    if let Some(i) = input.windows(2).position(|w| w[1] <= w[0]) {
        return Err(GlintError::InvalidTrack(format!(
            "keyframe times must strictly increase: time[{}] = {} is not after time[{}] = {}",
            i + 1,
            input[i + 1],
            i,
            input[i]
        )));
    }
    Ok(())
}
