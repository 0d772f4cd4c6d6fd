//! Continuous click track kept alive across trainer phases.
//!
//! Clicks are queued a short horizon ahead of the clock and pick up the
//! current voice when the scheduler fires them, so a voice change is heard on
//! the next uncommitted beat.

use std::cell::Cell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::scheduler::{EventData, LookaheadScheduler};
use crate::synth::Voice;

pub const METRONOME_LANE: &str = "metronome";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetronomeVoice {
    pub downbeat_hz: f32,
    pub beat_hz: f32,
    pub volume: f32,
}

impl MetronomeVoice {
    pub fn voice_for(&self, beat_in_measure: u32) -> Voice {
        let frequency = if beat_in_measure == 0 {
            self.downbeat_hz
        } else {
            self.beat_hz
        };
        Voice::click(frequency, self.volume)
    }
}

impl Default for MetronomeVoice {
    fn default() -> Self {
        Self {
            downbeat_hz: 700.0,
            beat_hz: 550.0,
            volume: 0.1,
        }
    }
}

pub struct BackgroundMetronome {
    voice: Rc<Cell<MetronomeVoice>>,
    horizon_secs: f64,
    origin: f64,
    beat_duration: f64,
    beats_per_measure: u32,
    next_beat: u64,
    running: bool,
}

impl BackgroundMetronome {
    pub fn new(horizon_secs: f64) -> Self {
        Self {
            voice: Rc::new(Cell::new(MetronomeVoice::default())),
            horizon_secs,
            origin: 0.0,
            beat_duration: 0.5,
            beats_per_measure: 4,
            next_beat: 0,
            running: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn origin(&self) -> f64 {
        self.origin
    }

    pub fn beat_duration(&self) -> f64 {
        self.beat_duration
    }

    pub fn measure_duration(&self) -> f64 {
        self.beat_duration * self.beats_per_measure as f64
    }

    pub fn voice(&self) -> MetronomeVoice {
        self.voice.get()
    }

    /// Applies to every click not yet handed to the engine.
    pub fn set_voice(&mut self, voice: MetronomeVoice) {
        self.voice.set(voice);
    }

    pub fn beat_time(&self, beat: u64) -> f64 {
        self.origin + beat as f64 * self.beat_duration
    }

    /// Starts clicking with beat 0 at `origin`. Returns false when the engine
    /// cannot play.
    pub fn start(
        &mut self,
        scheduler: &mut LookaheadScheduler,
        origin: f64,
        tempo_bpm: f64,
        beats_per_measure: u32,
    ) -> bool {
        if !scheduler.engine().is_ready() || tempo_bpm <= 0.0 {
            return false;
        }
        if self.running {
            scheduler.cancel_lane(METRONOME_LANE);
        }
        self.origin = origin;
        self.beat_duration = 60.0 / tempo_bpm;
        self.beats_per_measure = beats_per_measure.max(1);
        self.next_beat = 0;
        self.running = true;
        info!(origin, tempo_bpm, beats_per_measure, "metronome started");
        self.pump(scheduler);
        true
    }

    /// Queues every beat falling inside the horizon. Beats already in the
    /// past are skipped rather than played late.
    pub fn pump(&mut self, scheduler: &mut LookaheadScheduler) -> usize {
        if !self.running {
            return 0;
        }
        let now = scheduler.now();
        while self.beat_time(self.next_beat) < now {
            self.next_beat += 1;
        }
        let mut queued = 0;
        while self.beat_time(self.next_beat) <= now + self.horizon_secs {
            let beat = self.next_beat;
            let time = self.beat_time(beat);
            let beat_in_measure = (beat % self.beats_per_measure as u64) as u32;
            let voice = Rc::clone(&self.voice);
            let id = scheduler.schedule_at(
                time,
                EventData::new(METRONOME_LANE, beat as usize),
                move |engine, event| {
                    engine.play_at(event.time, &voice.get().voice_for(beat_in_measure));
                },
            );
            if id.is_none() {
                break;
            }
            self.next_beat += 1;
            queued += 1;
        }
        queued
    }

    /// Cancels future clicks only. Clicks already committed keep sounding.
    pub fn stop(&mut self, scheduler: &mut LookaheadScheduler) {
        if !self.running {
            return;
        }
        let cancelled = scheduler.cancel_lane(METRONOME_LANE);
        self.running = false;
        debug!(cancelled, "metronome stopped");
    }

    /// 1-based beat within the measure at `now`, for a visual indicator.
    pub fn beat_indicator(&self, now: f64) -> Option<u32> {
        if !self.running || now < self.origin {
            return None;
        }
        let beat = ((now - self.origin) / self.beat_duration).floor() as u64;
        Some((beat % self.beats_per_measure as u64) as u32 + 1)
    }
}
