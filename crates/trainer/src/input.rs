//! Tap capture off the trainer loop. Input threads stamp each tap with the
//! shared clock and push it through a single-producer ring buffer; the loop
//! drains it in order.

use metra_audio::ClockSource;
use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use tracing::warn;

pub const DEFAULT_TAP_CAPACITY: usize = 256;

pub struct TapSender {
    producer: HeapProducer<f64>,
    clock: Box<dyn ClockSource>,
}

impl TapSender {
    /// Records a tap at the current clock time. Returns false when the queue
    /// is full and the tap was dropped.
    pub fn tap_now(&mut self) -> bool {
        let now = self.clock.now();
        self.tap_at(now)
    }

    pub fn tap_at(&mut self, clock_time: f64) -> bool {
        if self.producer.push(clock_time).is_err() {
            warn!(clock_time, "tap queue full, dropping tap");
            return false;
        }
        true
    }
}

pub struct TapReceiver {
    consumer: HeapConsumer<f64>,
}

impl TapReceiver {
    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }

    pub fn len(&self) -> usize {
        self.consumer.len()
    }

    /// Every queued tap time, oldest first.
    pub fn drain(&mut self) -> Vec<f64> {
        let mut taps = Vec::with_capacity(self.consumer.len());
        while let Some(time) = self.consumer.pop() {
            taps.push(time);
        }
        taps
    }
}

/// A tap queue whose sender stamps taps with `clock`.
pub fn tap_channel(capacity: usize, clock: impl ClockSource + 'static) -> (TapSender, TapReceiver) {
    let (producer, consumer) = HeapRb::<f64>::new(capacity.max(1)).split();
    (
        TapSender {
            producer,
            clock: Box::new(clock),
        },
        TapReceiver { consumer },
    )
}
