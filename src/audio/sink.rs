//! Audio output sink
//!
//! `OutputDevice::open` starts a cpal output stream that drains a sample
//! ring and hands back the writing half as a `SinkWriter`. The stream stays
//! with the caller (it is not `Send` on every host); only the writer moves
//! to the playback thread.
//!
//! Writes block while the ring is full. That is the only backpressure the
//! playback loop gets, and it keeps the scheduler from running ahead of the
//! device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use super::buffer::{sample_ring, SampleConsumer, SampleProducer};

/// How long a blocked write sleeps before retrying
const WRITE_POLL: Duration = Duration::from_millis(1);

/// Errors from opening or writing to the audio output
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("No output device available")]
    NoDevice,

    #[error("Failed to get output config: {0}")]
    Config(String),

    #[error("Unsupported sink format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to build output stream: {0}")]
    BuildStream(String),

    #[error("Failed to start output stream: {0}")]
    Play(String),

    #[error("Audio output stream failed: {0}")]
    Stream(String),
}

/// Anything the playback scheduler can push frames into
pub trait AudioSink {
    /// Write one frame of interleaved s16le bytes, blocking until accepted
    fn write(&mut self, frame: &[u8]) -> Result<(), SinkError>;

    /// Abandon a blocked write once `stop` is raised
    fn watch_stop(&mut self, _stop: Arc<AtomicBool>) {}
}

/// Parameters the sink is opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub bytes_per_sample: usize,
    /// Ring size in bytes of source audio
    pub buffer_size: usize,
}

impl SinkConfig {
    /// Ring capacity in samples, a whole number of interleaved frames
    fn ring_capacity(&self) -> usize {
        let channels = (self.channels as usize).max(1);
        let samples = self.buffer_size / self.bytes_per_sample.max(1);
        (samples - samples % channels).max(channels)
    }

    fn validate(&self) -> Result<(), SinkError> {
        if self.channels != 2 {
            return Err(SinkError::UnsupportedFormat(format!(
                "{} channels (expected interleaved stereo)",
                self.channels
            )));
        }
        if self.bytes_per_sample != 2 {
            return Err(SinkError::UnsupportedFormat(format!(
                "{} bytes per sample (expected 16-bit)",
                self.bytes_per_sample
            )));
        }
        if self.sample_rate == 0 {
            return Err(SinkError::UnsupportedFormat("sample rate 0".to_string()));
        }
        Ok(())
    }
}

/// Shared slot the stream error callback reports into
#[derive(Clone, Default)]
struct StreamHealth {
    error: Arc<Mutex<Option<String>>>,
}

impl StreamHealth {
    fn report(&self, message: String) {
        let mut slot = self.error.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(message);
        }
    }

    fn check(&self) -> Result<(), SinkError> {
        match &*self.error.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(message) => Err(SinkError::Stream(message.clone())),
            None => Ok(()),
        }
    }
}

/// A running cpal output stream. Dropping it stops the audio.
pub struct OutputDevice {
    _stream: cpal::Stream,
    device_name: String,
    device_channels: u16,
}

impl OutputDevice {
    /// Open the default output device and start playing from a fresh ring
    pub fn open(config: SinkConfig) -> Result<(Self, SinkWriter), SinkError> {
        config.validate()?;

        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(SinkError::NoDevice)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported = device
            .default_output_config()
            .map_err(|e| SinkError::Config(e.to_string()))?;
        let device_channels = supported.channels();

        let stream_config = cpal::StreamConfig {
            channels: device_channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (producer, consumer) = sample_ring(config.ring_capacity());
        let health = StreamHealth::default();

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => {
                build_stream::<f32>(&device, &stream_config, consumer, health.clone())?
            }
            cpal::SampleFormat::I16 => {
                build_stream::<i16>(&device, &stream_config, consumer, health.clone())?
            }
            cpal::SampleFormat::U16 => {
                build_stream::<u16>(&device, &stream_config, consumer, health.clone())?
            }
            format => {
                return Err(SinkError::UnsupportedFormat(format!(
                    "device sample format {:?}",
                    format
                )))
            }
        };

        stream.play().map_err(|e| SinkError::Play(e.to_string()))?;

        log::info!(
            "Audio output: {} ({} Hz, {} channels, ring {} samples)",
            device_name,
            config.sample_rate,
            device_channels,
            config.ring_capacity()
        );

        Ok((
            Self {
                _stream: stream,
                device_name,
                device_channels,
            },
            SinkWriter::new(producer, config, health),
        ))
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn channels(&self) -> u16 {
        self.device_channels
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: SampleConsumer,
    health: StreamHealth,
) -> Result<cpal::Stream, SinkError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let (left, right) = consumer.pop_stereo();
                    if channels >= 2 {
                        frame[0] = T::from_sample(left);
                        frame[1] = T::from_sample(right);
                        for ch in frame.iter_mut().skip(2) {
                            *ch = T::from_sample(0.0f32);
                        }
                    } else {
                        frame[0] = T::from_sample((left + right) / 2.0);
                    }
                }
            },
            move |err| {
                log::error!("Audio output error: {}", err);
                health.report(err.to_string());
            },
            None,
        )
        .map_err(|e| SinkError::BuildStream(e.to_string()))
}

/// Writing half of the output, moved to the playback thread
pub struct SinkWriter {
    producer: SampleProducer,
    health: StreamHealth,
    bytes_per_sample: usize,
    scratch: Vec<f32>,
    stop: Option<Arc<AtomicBool>>,
}

impl SinkWriter {
    fn new(producer: SampleProducer, config: SinkConfig, health: StreamHealth) -> Self {
        Self {
            producer,
            health,
            bytes_per_sample: config.bytes_per_sample,
            scratch: Vec::new(),
            stop: None,
        }
    }

    /// Total samples handed to the device ring
    pub fn samples_written(&self) -> u64 {
        self.producer.samples_written()
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|stop| stop.load(Ordering::Relaxed))
    }
}

impl Drop for SinkWriter {
    fn drop(&mut self) {
        log::debug!(
            "Sink closed: {} samples written, {} underruns",
            self.samples_written(),
            self.producer.underruns()
        );
    }
}

impl AudioSink for SinkWriter {
    fn write(&mut self, frame: &[u8]) -> Result<(), SinkError> {
        if frame.is_empty() {
            return Ok(());
        }
        self.health.check()?;

        self.scratch.clear();
        self.scratch.extend(
            frame
                .chunks_exact(self.bytes_per_sample)
                .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0),
        );

        let mut remaining = &self.scratch[..];
        while !remaining.is_empty() {
            if self.producer.vacant_len() == 0 {
                self.health.check()?;
                // Rest of the frame is dropped; the caller is shutting down
                if self.stop_requested() {
                    return Ok(());
                }
                thread::sleep(WRITE_POLL);
                continue;
            }
            let pushed = self.producer.push_slice(remaining);
            remaining = &remaining[pushed..];
        }

        Ok(())
    }

    fn watch_stop(&mut self, stop: Arc<AtomicBool>) {
        self.stop = Some(stop);
    }
}
