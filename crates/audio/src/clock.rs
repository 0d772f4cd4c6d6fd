use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Monotonic time source in seconds. Every scheduled sound and every tap is
/// stamped against the same clock.
pub trait ClockSource: Send + Sync {
    fn now(&self) -> f64;
}

/// Clock driven by hand. Clones share the same time, which lets tests and
/// simulations advance the clock an engine already owns.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(start.max(0.0).to_bits())),
        }
    }

    /// Moves the clock to `time`. Earlier times are ignored.
    pub fn set(&self, time: f64) {
        let _ = self
            .bits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (time > f64::from_bits(current)).then(|| time.to_bits())
            });
    }

    pub fn advance(&self, seconds: f64) {
        if seconds > 0.0 {
            self.set(self.now() + seconds);
        }
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

/// Wall clock measured from construction.
#[derive(Clone, Debug)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for SystemClock {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Clock derived from frames rendered by an output stream.
#[derive(Clone, Debug, Default)]
pub struct FrameClock {
    frames: Arc<AtomicU64>,
    sample_rate: Arc<AtomicU32>,
}

impl FrameClock {
    pub fn new(sample_rate: u32) -> Self {
        let clock = Self::default();
        clock.set_sample_rate(sample_rate);
        clock
    }

    pub fn set_sample_rate(&self, sample_rate: u32) {
        self.sample_rate.store(sample_rate, Ordering::Release);
    }

    pub fn advance_frames(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::AcqRel);
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }
}

impl ClockSource for FrameClock {
    fn now(&self) -> f64 {
        let rate = self.sample_rate.load(Ordering::Acquire);
        if rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / rate as f64
    }
}
