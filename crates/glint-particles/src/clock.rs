//! Frame clock feeding elapsed time to a generator

use std::time::{Duration, Instant};

/// Measures elapsed time between frames.
///
/// `wall()` reads the monotonic clock; `fixed(step)` reports the same step
/// every frame, for deterministic headless runs. Either way the first tick
/// reports zero.
pub struct FrameClock {
    /// Total time reported so far
    pub total: Duration,
    /// Time reported by the last tick
    pub delta: Duration,
    /// Ticks so far
    pub frames: u64,
    fixed_step: Option<Duration>,
    last_instant: Instant,
    first_tick: bool,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::wall()
    }
}

impl FrameClock {
    pub fn wall() -> Self {
        Self {
            total: Duration::ZERO,
            delta: Duration::ZERO,
            frames: 0,
            fixed_step: None,
            last_instant: Instant::now(),
            first_tick: true,
        }
    }

    pub fn fixed(step: Duration) -> Self {
        Self {
            fixed_step: Some(step),
            ..Self::wall()
        }
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed_step.is_some()
    }

    /// Advance one frame and return the elapsed time since the previous one.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        self.frames += 1;

        if self.first_tick {
            self.first_tick = false;
            self.last_instant = now;
            self.delta = Duration::ZERO;
            return self.delta;
        }

        self.delta = match self.fixed_step {
            Some(step) => step,
            None => now.duration_since(self.last_instant),
        };
        self.last_instant = now;
        self.total += self.delta;
        self.delta
    }
}
