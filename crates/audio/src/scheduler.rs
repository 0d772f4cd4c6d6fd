use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::engine::AudioEngine;

/// Bounds for the latency offset, in milliseconds.
pub const MAX_LATENCY_OFFSET_MS: f64 = 500.0;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How far ahead of `now` events are handed to the engine.
    pub lookahead_secs: f64,
    /// Wake-up period of the audio loop.
    pub tick_interval_secs: f64,
    /// Period of the visual sub-tick.
    pub visual_interval_secs: f64,
    pub latency_offset_ms: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lookahead_secs: 0.1,
            tick_interval_secs: 0.1,
            visual_interval_secs: 0.016,
            latency_offset_ms: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(u64);

/// Opaque payload carried with an event. The scheduler never interprets it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventData {
    pub lane: &'static str,
    pub index: usize,
}

impl EventData {
    pub fn new(lane: &'static str, index: usize) -> Self {
        Self { lane, index }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FiredEvent {
    pub id: EventId,
    /// Target time after latency compensation.
    pub time: f64,
    /// Target time as requested.
    pub requested_time: f64,
    pub fired_at: f64,
    pub data: EventData,
}

pub type EventCallback = Box<dyn FnOnce(&mut AudioEngine, &FiredEvent)>;

struct ScheduledEvent {
    id: EventId,
    time: f64,
    requested_time: f64,
    data: EventData,
    callback: EventCallback,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    // Reversed so the max-heap pops the earliest event, ties in insertion order.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// What one wake-up of the loop did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    pub now: f64,
    pub fired: Vec<FiredEvent>,
    /// True when the visual sub-tick is due on this wake-up.
    pub visual_frame: bool,
}

/// One-shot event queue drained ahead of the audio clock.
pub struct LookaheadScheduler {
    engine: AudioEngine,
    config: SchedulerConfig,
    queue: BinaryHeap<ScheduledEvent>,
    next_id: u64,
    running: bool,
    visual_enabled: bool,
    last_visual: Option<f64>,
}

impl LookaheadScheduler {
    pub fn new(engine: AudioEngine, config: SchedulerConfig) -> Self {
        let mut scheduler = Self {
            engine,
            config,
            queue: BinaryHeap::new(),
            next_id: 0,
            running: false,
            visual_enabled: true,
            last_visual: None,
        };
        scheduler.set_latency_offset_ms(config.latency_offset_ms);
        scheduler
    }

    pub fn engine(&self) -> &AudioEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut AudioEngine {
        &mut self.engine
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    pub fn now(&self) -> f64 {
        self.engine.now()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn pending_in_lane(&self, lane: &str) -> usize {
        self.queue.iter().filter(|e| e.data.lane == lane).count()
    }

    pub fn latency_offset_ms(&self) -> f64 {
        self.config.latency_offset_ms
    }

    pub fn set_latency_offset_ms(&mut self, offset_ms: f64) {
        self.config.latency_offset_ms = offset_ms.clamp(-MAX_LATENCY_OFFSET_MS, MAX_LATENCY_OFFSET_MS);
    }

    /// Enqueues a latency-compensated event. Returns `None`, and drops the
    /// callback, while the engine is not ready.
    pub fn schedule_at(
        &mut self,
        time: f64,
        data: EventData,
        callback: impl FnOnce(&mut AudioEngine, &FiredEvent) + 'static,
    ) -> Option<EventId> {
        let compensated = time + self.config.latency_offset_ms / 1000.0;
        self.enqueue(compensated, time, data, Box::new(callback))
    }

    /// Enqueues an event at exactly `time`.
    pub fn schedule_exact(
        &mut self,
        time: f64,
        data: EventData,
        callback: impl FnOnce(&mut AudioEngine, &FiredEvent) + 'static,
    ) -> Option<EventId> {
        self.enqueue(time, time, data, Box::new(callback))
    }

    fn enqueue(
        &mut self,
        time: f64,
        requested_time: f64,
        data: EventData,
        callback: EventCallback,
    ) -> Option<EventId> {
        if !self.engine.is_ready() {
            trace!(lane = data.lane, "engine not ready, event ignored");
            return None;
        }
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.queue.push(ScheduledEvent {
            id,
            time,
            requested_time,
            data,
            callback,
        });
        Some(id)
    }

    pub fn cancel(&mut self, id: EventId) -> bool {
        let before = self.queue.len();
        self.queue.retain(|event| event.id != id);
        before != self.queue.len()
    }

    /// Drops every unfired event in `lane`. Events already handed to the
    /// engine keep playing.
    pub fn cancel_lane(&mut self, lane: &str) -> usize {
        let before = self.queue.len();
        self.queue.retain(|event| event.data.lane != lane);
        let removed = before - self.queue.len();
        if removed > 0 {
            debug!(lane, removed, "cancelled pending events");
        }
        removed
    }

    /// Drops all unfired events.
    pub fn clear(&mut self) {
        if !self.queue.is_empty() {
            debug!(removed = self.queue.len(), "cleared scheduled events");
        }
        self.queue.clear();
    }

    /// Starts the loop. Returns false when the engine is not ready or the
    /// loop is already running.
    pub fn start(&mut self) -> bool {
        if !self.engine.is_ready() || self.running {
            return false;
        }
        self.running = true;
        self.last_visual = None;
        debug!("scheduler started");
        true
    }

    /// Stops the loop. Pending events stay queued.
    pub fn stop(&mut self) {
        if self.running {
            self.running = false;
            debug!(pending = self.queue.len(), "scheduler stopped");
        }
    }

    pub fn set_visual_enabled(&mut self, enabled: bool) {
        self.visual_enabled = enabled;
        if !enabled {
            self.last_visual = None;
        }
    }

    pub fn visual_enabled(&self) -> bool {
        self.visual_enabled
    }

    /// One wake-up: fires every event due within the lookahead window, in
    /// time order.
    pub fn tick(&mut self) -> TickReport {
        let now = self.engine.now();
        let mut report = TickReport {
            now,
            ..TickReport::default()
        };
        if !self.running {
            return report;
        }

        let horizon = now + self.config.lookahead_secs;
        while self.queue.peek().is_some_and(|event| event.time <= horizon) {
            let Some(event) = self.queue.pop() else {
                break;
            };
            let fired = FiredEvent {
                id: event.id,
                time: event.time,
                requested_time: event.requested_time,
                fired_at: now,
                data: event.data,
            };
            trace!(lane = fired.data.lane, index = fired.data.index, time = fired.time, "firing event");
            (event.callback)(&mut self.engine, &fired);
            report.fired.push(fired);
        }

        if self.visual_enabled {
            let due = self
                .last_visual
                .map_or(true, |last| now - last >= self.config.visual_interval_secs);
            if due {
                self.last_visual = Some(now);
                report.visual_frame = true;
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::synth::Voice;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn ready_scheduler() -> (LookaheadScheduler, ManualClock) {
        let clock = ManualClock::new(0.0);
        let mut engine = AudioEngine::offline(clock.clone());
        engine.unlock().unwrap();
        (LookaheadScheduler::new(engine, SchedulerConfig::default()), clock)
    }

    fn recorder(log: &Rc<RefCell<Vec<usize>>>) -> impl FnOnce(&mut AudioEngine, &FiredEvent) + 'static {
        let log = Rc::clone(log);
        move |_, event| log.borrow_mut().push(event.data.index)
    }

    #[test]
    fn fires_within_lookahead_in_time_order() {
        let (mut scheduler, clock) = ready_scheduler();
        let log = Rc::new(RefCell::new(Vec::new()));
        scheduler.schedule_at(0.30, EventData::new("t", 3), recorder(&log));
        scheduler.schedule_at(0.05, EventData::new("t", 1), recorder(&log));
        scheduler.schedule_at(0.08, EventData::new("t", 2), recorder(&log));
        assert!(scheduler.start());

        let report = scheduler.tick();
        assert_eq!(report.fired.len(), 2);
        assert_eq!(*log.borrow(), vec![1, 2]);

        clock.set(0.15);
        scheduler.tick();
        assert_eq!(*log.borrow(), vec![1, 2]);
        clock.set(0.2);
        scheduler.tick();
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn equal_times_fire_in_insertion_order() {
        let (mut scheduler, _) = ready_scheduler();
        let log = Rc::new(RefCell::new(Vec::new()));
        for index in 0..5 {
            scheduler.schedule_at(0.05, EventData::new("t", index), recorder(&log));
        }
        scheduler.start();
        scheduler.tick();
        assert_eq!(*log.borrow(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn ignored_until_engine_ready() {
        let clock = ManualClock::new(0.0);
        let mut scheduler =
            LookaheadScheduler::new(AudioEngine::offline(clock), SchedulerConfig::default());
        assert!(scheduler
            .schedule_at(0.0, EventData::new("t", 0), |_, _| {})
            .is_none());
        assert!(!scheduler.start());
        scheduler.engine_mut().unlock().unwrap();
        assert!(scheduler
            .schedule_at(0.0, EventData::new("t", 0), |_, _| {})
            .is_some());
    }

    #[test]
    fn stop_keeps_queue_and_clear_drops_it() {
        let (mut scheduler, _) = ready_scheduler();
        let log = Rc::new(RefCell::new(Vec::new()));
        scheduler.schedule_at(0.0, EventData::new("t", 7), recorder(&log));
        scheduler.start();
        scheduler.stop();
        assert!(scheduler.tick().fired.is_empty());
        assert_eq!(scheduler.pending(), 1);
        scheduler.start();
        scheduler.tick();
        assert_eq!(*log.borrow(), vec![7]);

        scheduler.schedule_at(1.0, EventData::new("t", 8), recorder(&log));
        scheduler.clear();
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn cancel_lane_leaves_other_lanes() {
        let (mut scheduler, _) = ready_scheduler();
        scheduler.schedule_at(1.0, EventData::new("metronome", 0), |_, _| {});
        scheduler.schedule_at(1.5, EventData::new("metronome", 1), |_, _| {});
        let id = scheduler
            .schedule_at(1.0, EventData::new("pattern", 0), |_, _| {})
            .unwrap();
        assert_eq!(scheduler.cancel_lane("metronome"), 2);
        assert_eq!(scheduler.pending_in_lane("pattern"), 1);
        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));
    }

    #[test]
    fn latency_offset_is_applied_and_clamped() {
        let (mut scheduler, _) = ready_scheduler();
        scheduler.set_latency_offset_ms(-2_000.0);
        assert_eq!(scheduler.latency_offset_ms(), -MAX_LATENCY_OFFSET_MS);
        scheduler.set_latency_offset_ms(40.0);
        scheduler.schedule_at(0.07, EventData::new("t", 0), |_, _| {});
        scheduler.start();
        let report = scheduler.tick();
        assert!(report.fired.is_empty());
        let id = scheduler
            .schedule_exact(0.07, EventData::new("t", 1), |_, _| {})
            .unwrap();
        let report = scheduler.tick();
        assert_eq!(report.fired.len(), 1);
        assert_eq!(report.fired[0].id, id);
    }

    #[test]
    fn callbacks_reach_the_engine() {
        let clock = ManualClock::new(0.0);
        let backend = crate::backend::OfflineBackend::new();
        let log = backend.log();
        let mut engine = AudioEngine::new(
            Box::new(clock.clone()),
            Box::new(backend),
            crate::backend::StreamConfig::default(),
        );
        engine.unlock().unwrap();
        let mut scheduler = LookaheadScheduler::new(engine, SchedulerConfig::default());
        scheduler.schedule_at(0.05, EventData::new("metronome", 0), |engine, event| {
            engine.play_at(event.time, &Voice::click(1_000.0, 0.3));
        });
        scheduler.start();
        scheduler.tick();
        let records = log.records();
        assert_eq!(records.len(), 1);
        assert!((records[0].start_time - 0.05).abs() < 1e-9);
    }

    #[test]
    fn visual_frames_follow_their_interval() {
        let (mut scheduler, clock) = ready_scheduler();
        scheduler.start();
        assert!(scheduler.tick().visual_frame);
        clock.advance(0.005);
        assert!(!scheduler.tick().visual_frame);
        clock.advance(0.02);
        assert!(scheduler.tick().visual_frame);
        scheduler.set_visual_enabled(false);
        clock.advance(0.05);
        assert!(!scheduler.tick().visual_frame);
    }
}
