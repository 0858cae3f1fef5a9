//! Native audio devices via cpal.
//!
//! [`CpalMicrophone`] opens the default input device and feeds a mono
//! [`SampleRing`](crate::listener::SampleRing) for the pitch listener.
//! [`OutputStream`] moves an [`Engine`] into the output callback and hands
//! back its command handle and event receiver.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, SampleFormat, Stream, StreamConfig};
use crossbeam_channel::Receiver;
use log::{debug, error};

use crate::config::EngineConfig;
use crate::engine::{Engine, EngineEvent, EngineHandle};
use crate::error::{EngineError, Result};
use crate::listener::{InputDevice, InputSource, RingInput, SampleRing};

/// Default microphone. Each [`open`](InputDevice::open) builds a fresh stream.
#[derive(Debug, Clone)]
pub struct CpalMicrophone {
    /// Ring capacity in mono samples.
    capacity: usize,
}

impl CpalMicrophone {
    pub fn new(config: &EngineConfig) -> Self {
        // Room for two analysis frames.
        CpalMicrophone {
            capacity: config.analysis_frame_size * 2,
        }
    }
}

/// Open microphone stream. Closing drops the cpal stream.
pub struct CpalInput {
    stream: Option<Stream>,
    input: RingInput,
}

impl InputSource for CpalInput {
    fn sample_rate(&self) -> f64 {
        self.input.sample_rate()
    }

    fn snapshot(&self, buf: &mut [f32]) -> usize {
        self.input.snapshot(buf)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            debug!(target: "engine::device", "input stream closed");
        }
        self.input.close();
    }
}

impl InputDevice for CpalMicrophone {
    type Source = CpalInput;

    fn open(&mut self) -> Result<CpalInput> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| EngineError::DeviceUnavailable("no default input device".into()))?;
        let supported = device
            .default_input_config()
            .map_err(|e| EngineError::StreamConfig(e.to_string()))?;

        let channels = supported.channels() as usize;
        let sample_rate = supported.sample_rate().0 as f64;
        let format = supported.sample_format();
        let stream_config: StreamConfig = supported.into();

        let input = RingInput::new(self.capacity, sample_rate);
        let ring = input.shared();
        let on_error = |err: cpal::StreamError| {
            error!(target: "engine::device", "input stream error: {err}");
        };

        let stream = match format {
            SampleFormat::F32 => {
                let mut scratch = Vec::new();
                device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        downmix(data, channels, |s| s, &mut scratch);
                        write_ring(&ring, &scratch);
                    },
                    on_error,
                    None,
                )
            }
            SampleFormat::I16 => {
                let mut scratch = Vec::new();
                device.build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        downmix(data, channels, |s| s as f32 / i16::MAX as f32, &mut scratch);
                        write_ring(&ring, &scratch);
                    },
                    on_error,
                    None,
                )
            }
            other => {
                return Err(EngineError::StreamConfig(format!(
                    "unsupported input sample format {other:?}"
                )));
            }
        }
        .map_err(build_error)?;

        stream.play().map_err(|e| EngineError::Stream(e.to_string()))?;
        debug!(
            target: "engine::device",
            "input stream open: {channels} ch @ {sample_rate} Hz"
        );
        Ok(CpalInput {
            stream: Some(stream),
            input,
        })
    }
}

/// Engine running inside the default output device's callback.
pub struct OutputStream {
    _stream: Stream,
    handle: EngineHandle,
    events: Receiver<EngineEvent>,
    sample_rate: f64,
}

impl OutputStream {
    /// Open the default output device and start rendering. The engine runs at
    /// the device's sample rate, whatever `config` says.
    pub fn open(config: EngineConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| EngineError::DeviceUnavailable("no default output device".into()))?;
        let supported = device
            .default_output_config()
            .map_err(|e| EngineError::StreamConfig(e.to_string()))?;
        if supported.sample_format() != SampleFormat::F32 {
            return Err(EngineError::StreamConfig(format!(
                "unsupported output sample format {:?}",
                supported.sample_format()
            )));
        }

        let channels = supported.channels() as usize;
        let sample_rate = supported.sample_rate().0 as f64;
        let stream_config: StreamConfig = supported.into();

        let mut engine = Engine::new(EngineConfig {
            sample_rate,
            ..config
        });
        let handle = engine.handle();
        let events = engine.events();
        let mut mono: Vec<f32> = Vec::with_capacity(4096);

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels.max(1);
                    mono.resize(frames, 0.0);
                    engine.process(&mut mono);
                    for (frame, &sample) in data.chunks_mut(channels.max(1)).zip(&mono) {
                        frame.fill(sample);
                    }
                },
                |err: cpal::StreamError| {
                    error!(target: "engine::device", "output stream error: {err}");
                },
                None,
            )
            .map_err(build_error)?;
        stream.play().map_err(|e| EngineError::Stream(e.to_string()))?;
        debug!(
            target: "engine::device",
            "output stream open: {channels} ch @ {sample_rate} Hz"
        );

        Ok(OutputStream {
            _stream: stream,
            handle,
            events,
            sample_rate,
        })
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub fn events(&self) -> Receiver<EngineEvent> {
        self.events.clone()
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

/// Average interleaved frames down to mono.
fn downmix<T: Copy>(data: &[T], channels: usize, to_f32: impl Fn(T) -> f32, out: &mut Vec<f32>) {
    let channels = channels.max(1);
    out.clear();
    out.extend(
        data.chunks(channels)
            .map(|frame| frame.iter().map(|&s| to_f32(s)).sum::<f32>() / frame.len() as f32),
    );
}

fn write_ring(ring: &Arc<Mutex<SampleRing>>, samples: &[f32]) {
    if let Ok(mut ring) = ring.lock() {
        ring.push(samples);
    }
}

fn build_error(err: BuildStreamError) -> EngineError {
    match err {
        BuildStreamError::DeviceNotAvailable => EngineError::DeviceUnavailable(err.to_string()),
        BuildStreamError::StreamConfigNotSupported | BuildStreamError::InvalidArgument => {
            EngineError::StreamConfig(err.to_string())
        }
        other => {
            let message = other.to_string();
            if message.to_lowercase().contains("permission") {
                EngineError::PermissionDenied
            } else {
                EngineError::Stream(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_is_averaged() {
        let mut out = Vec::new();
        downmix(&[1.0f32, 0.0, 0.5, 0.5, -1.0, 1.0], 2, |s| s, &mut out);
        assert_eq!(out, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn integer_samples_are_scaled() {
        let mut out = Vec::new();
        downmix(&[i16::MAX, 0], 1, |s| s as f32 / i16::MAX as f32, &mut out);
        assert_eq!(out, vec![1.0, 0.0]);
    }

    #[test]
    fn device_loss_maps_to_unavailable() {
        assert!(matches!(
            build_error(BuildStreamError::DeviceNotAvailable),
            EngineError::DeviceUnavailable(_)
        ));
        assert!(matches!(
            build_error(BuildStreamError::StreamConfigNotSupported),
            EngineError::StreamConfig(_)
        ));
    }
}
