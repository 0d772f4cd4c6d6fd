use std::sync::Arc;

/// A rendered voice placed on the clock.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedSound {
    pub label: &'static str,
    pub start_time: f64,
    pub samples: Arc<[f32]>,
}

impl RenderedSound {
    pub fn duration(&self, sample_rate: u32) -> f64 {
        self.samples.len() as f64 / sample_rate.max(1) as f64
    }
}

#[derive(Debug)]
struct ActiveSound {
    start_frame: u64,
    samples: Arc<[f32]>,
}

impl ActiveSound {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Sums placed sounds into interleaved output blocks.
#[derive(Debug)]
pub struct Mixer {
    sample_rate: u32,
    frame: u64,
    active: Vec<ActiveSound>,
}

impl Mixer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            frame: 0,
            active: Vec::new(),
        }
    }

    /// Frame index of the next frame to be rendered.
    pub fn position(&self) -> u64 {
        self.frame
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Sounds that start in the past play from the next rendered frame.
    pub fn add(&mut self, sound: RenderedSound) {
        let requested = (sound.start_time.max(0.0) * self.sample_rate as f64).round() as u64;
        self.active.push(ActiveSound {
            start_frame: requested.max(self.frame),
            samples: sound.samples,
        });
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }

    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        out.fill(0.0);
        let frames = (out.len() / channels) as u64;
        let block_start = self.frame;
        let block_end = block_start + frames;

        for sound in &self.active {
            let from = sound.start_frame.max(block_start);
            let to = sound.end_frame().min(block_end);
            for abs in from..to {
                let value = sound.samples[(abs - sound.start_frame) as usize];
                let offset = (abs - block_start) as usize * channels;
                for sample in &mut out[offset..offset + channels] {
                    *sample += value;
                }
            }
        }

        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
        self.frame = block_end;
        self.active.retain(|sound| sound.end_frame() > block_end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sound(start_time: f64, samples: Vec<f32>) -> RenderedSound {
        RenderedSound {
            label: "test",
            start_time,
            samples: samples.into(),
        }
    }

    #[test]
    fn places_sound_at_its_frame() {
        let mut mixer = Mixer::new(10);
        mixer.add(sound(1.0, vec![0.5, 0.5]));
        let mut out = vec![0.0; 8];
        mixer.render(&mut out, 1);
        assert!(out.iter().all(|&s| s == 0.0));
        mixer.render(&mut out, 1);
        assert_eq!(&out[..4], &[0.0, 0.0, 0.5, 0.5]);
        assert_eq!(mixer.active_count(), 0);
        assert_eq!(mixer.position(), 16);
    }

    #[test]
    fn sums_and_clamps_stereo() {
        let mut mixer = Mixer::new(4);
        mixer.add(sound(0.0, vec![0.8, 0.8]));
        mixer.add(sound(0.0, vec![0.8]));
        let mut out = vec![0.0; 4];
        mixer.render(&mut out, 2);
        assert_eq!(out, vec![1.0, 1.0, 0.8, 0.8]);
    }

    #[test]
    fn late_sound_starts_immediately() {
        let mut mixer = Mixer::new(10);
        let mut out = vec![0.0; 10];
        mixer.render(&mut out, 1);
        mixer.add(sound(0.2, vec![0.25]));
        mixer.render(&mut out, 1);
        assert_eq!(out[0], 0.25);
    }
}
