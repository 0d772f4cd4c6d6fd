use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{HeapProducer, HeapRb};
use tracing::{debug, error, info};

use crate::backend::{AudioBackend, StreamConfig};
use crate::clock::FrameClock;
use crate::error::AudioError;
use crate::mixer::{Mixer, RenderedSound};

/// Sounds that can wait between two audio callbacks.
const SUBMIT_QUEUE: usize = 256;

/// Output through the system audio device. The stream is opened on resume;
/// its rendered frame count drives the paired [`FrameClock`].
pub struct CpalBackend {
    device_name: Option<String>,
    clock: FrameClock,
    stream: Option<cpal::Stream>,
    producer: Option<HeapProducer<RenderedSound>>,
    sample_rate: u32,
}

impl CpalBackend {
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            clock: FrameClock::default(),
            stream: None,
            producer: None,
            sample_rate: 0,
        }
    }

    /// Clock advanced by the output callback.
    pub fn clock(&self) -> FrameClock {
        self.clock.clone()
    }

    pub fn output_devices() -> Vec<String> {
        let mut names = Vec::new();
        for host_id in cpal::available_hosts() {
            if let Ok(host) = cpal::host_from_id(host_id) {
                if let Ok(devices) = host.output_devices() {
                    names.extend(devices.filter_map(|d| d.name().ok()));
                }
            }
        }
        names
    }

    fn find_device(&self) -> Option<cpal::Device> {
        if let Some(target) = self.device_name.as_deref() {
            for host_id in cpal::available_hosts() {
                let Ok(host) = cpal::host_from_id(host_id) else {
                    continue;
                };
                let Ok(mut devices) = host.output_devices() else {
                    continue;
                };
                if let Some(device) =
                    devices.find(|d| d.name().map(|n| n == target).unwrap_or(false))
                {
                    return Some(device);
                }
            }
        }
        cpal::default_host().default_output_device()
    }
}

impl AudioBackend for CpalBackend {
    fn resume(&mut self, config: &StreamConfig) -> Result<u32, AudioError> {
        if let Some(stream) = self.stream.as_ref() {
            stream
                .play()
                .map_err(|err| AudioError::Stream(err.to_string()))?;
            return Ok(self.sample_rate);
        }

        let device = self
            .find_device()
            .ok_or_else(|| AudioError::Unavailable("no output device".into()))?;
        let supported = device
            .default_output_config()
            .map_err(|err| AudioError::Unavailable(err.to_string()))?;
        if supported.sample_format() != cpal::SampleFormat::F32 {
            return Err(AudioError::Stream(format!(
                "unsupported sample format {:?}",
                supported.sample_format()
            )));
        }
        let stream_config: cpal::StreamConfig = supported.config();
        let sample_rate = stream_config.sample_rate.0;
        let channels = stream_config.channels as usize;

        let (producer, mut consumer) = HeapRb::<RenderedSound>::new(SUBMIT_QUEUE).split();
        let mut mixer = Mixer::new(sample_rate);
        let clock = self.clock.clone();
        clock.set_sample_rate(sample_rate);

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _| {
                    while let Some(sound) = consumer.pop() {
                        mixer.add(sound);
                    }
                    mixer.render(data, channels);
                    clock.advance_frames((data.len() / channels.max(1)) as u64);
                },
                |err| error!(%err, "audio output stream error"),
                None,
            )
            .map_err(|err| AudioError::Stream(err.to_string()))?;
        stream
            .play()
            .map_err(|err| AudioError::Stream(err.to_string()))?;

        info!(
            device = %device.name().unwrap_or_else(|_| "Unknown".into()),
            sample_rate,
            channels,
            requested = ?config,
            "audio output opened"
        );
        self.stream = Some(stream);
        self.producer = Some(producer);
        self.sample_rate = sample_rate;
        Ok(sample_rate)
    }

    fn suspend(&mut self) {
        if let Some(stream) = self.stream.as_ref() {
            if let Err(err) = stream.pause() {
                debug!(%err, "pausing output stream failed");
            }
        }
    }

    fn submit(&mut self, sound: RenderedSound) -> Result<(), AudioError> {
        let producer = self.producer.as_mut().ok_or(AudioError::NotReady)?;
        producer
            .push(sound)
            .map_err(|_| AudioError::Stream("submit queue full".into()))
    }

    fn close(&mut self) {
        self.producer = None;
        self.stream = None;
    }
}
