//! Microphone pitch listener.
//!
//! Opening the input is the only fallible step and happens in
//! [`PitchListener::start`]; a failure leaves the listener idle. Once
//! listening, the host polls [`PitchListener::poll_frame`] from its display
//! callback and gets at most one [`PitchSample`] per frame interval.
//! [`PitchListener::stop`] flips the active flag, cancels the frame timer and
//! closes the input before it returns.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::dsp::tuner::PitchDetector;
use crate::error::{EngineError, Result};
use crate::note::{NoteName, NoteReading, frequency_to_note};
use crate::timer::Interval;

/// One analysis result, consumed by the display and then dropped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchSample {
    /// Detected fundamental in Hz, `None` for silence or noise.
    pub frequency: Option<f64>,
    pub cents: i32,
    pub note: NoteName,
    pub octave: i32,
}

impl PitchSample {
    pub fn from_frequency(frequency: Option<f64>) -> Self {
        let frequency = frequency.filter(|f| f.is_finite() && *f > 0.0);
        let reading = frequency.map_or(NoteReading::SILENT, frequency_to_note);
        PitchSample {
            frequency,
            cents: reading.cents,
            note: reading.note,
            octave: reading.octave,
        }
    }

    pub fn is_pitched(&self) -> bool {
        self.frequency.is_some()
    }
}

/// An open input stream the listener can read frames from.
pub trait InputSource {
    fn sample_rate(&self) -> f64;

    /// Copy the most recent samples into `buf`, oldest first. Returns how many
    /// were written, which is less than `buf.len()` until enough audio arrived.
    fn snapshot(&self, buf: &mut [f32]) -> usize;

    /// Release the underlying stream. No samples arrive afterwards.
    fn close(&mut self);
}

/// Something that can be asked for an input stream, e.g. the default microphone.
pub trait InputDevice {
    type Source: InputSource + 'static;

    fn open(&mut self) -> Result<Self::Source>;
}

/// Fixed-capacity mono sample ring that keeps the latest audio.
#[derive(Debug, Clone)]
pub struct SampleRing {
    buffer: Vec<f32>,
    write_pos: usize,
    filled: usize,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        SampleRing {
            buffer: vec![0.0; capacity.max(1)],
            write_pos: 0,
            filled: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Samples currently held.
    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn push(&mut self, samples: &[f32]) {
        let capacity = self.buffer.len();
        for &sample in samples {
            self.buffer[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % capacity;
        }
        self.filled = (self.filled + samples.len()).min(capacity);
    }

    pub fn snapshot(&self, buf: &mut [f32]) -> usize {
        let capacity = self.buffer.len();
        let n = buf.len().min(self.filled);
        let start = (self.write_pos + capacity - n) % capacity;
        for (i, slot) in buf[..n].iter_mut().enumerate() {
            *slot = self.buffer[(start + i) % capacity];
        }
        n
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
        self.filled = 0;
    }
}

/// Input source backed by a shared [`SampleRing`]. A capture callback (or a
/// test) pushes into the ring; the listener snapshots it.
#[derive(Debug, Clone)]
pub struct RingInput {
    ring: Arc<Mutex<SampleRing>>,
    sample_rate: f64,
}

impl RingInput {
    pub fn new(capacity: usize, sample_rate: f64) -> Self {
        Self::from_shared(Arc::new(Mutex::new(SampleRing::new(capacity))), sample_rate)
    }

    pub fn from_shared(ring: Arc<Mutex<SampleRing>>, sample_rate: f64) -> Self {
        RingInput { ring, sample_rate }
    }

    /// Handle for the writer side.
    pub fn shared(&self) -> Arc<Mutex<SampleRing>> {
        Arc::clone(&self.ring)
    }

    pub fn push(&self, samples: &[f32]) {
        if let Ok(mut ring) = self.ring.lock() {
            ring.push(samples);
        }
    }
}

impl InputSource for RingInput {
    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn snapshot(&self, buf: &mut [f32]) -> usize {
        match self.ring.lock() {
            Ok(ring) => ring.snapshot(buf),
            Err(_) => 0,
        }
    }

    fn close(&mut self) {
        if let Ok(mut ring) = self.ring.lock() {
            ring.clear();
        }
    }
}

pub struct PitchListener {
    source: Option<Box<dyn InputSource>>,
    active: bool,
    frame: Interval,
    detector: PitchDetector,
    buffer: Vec<f32>,
}

impl PitchListener {
    pub fn new(config: &EngineConfig) -> Self {
        PitchListener {
            source: None,
            active: false,
            frame: Interval::from_millis(config.frame_interval_ms),
            detector: PitchDetector::with_noise_floor(config.noise_floor),
            buffer: vec![0.0; config.analysis_frame_size],
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Open `device` and begin analysing frames from `now`.
    pub fn start<D: InputDevice>(&mut self, device: &mut D, now: Instant) -> Result<()> {
        if self.active {
            return Err(EngineError::AlreadyListening);
        }
        let source = device.open()?;
        debug!(target: "engine::listener", "listening at {} Hz", source.sample_rate());
        self.source = Some(Box::new(source));
        self.active = true;
        self.frame.start(now);
        Ok(())
    }

    /// Stop listening and release the input. Safe to call when idle.
    pub fn stop(&mut self) {
        let was_active = self.active;
        self.active = false;
        self.frame.cancel();
        if let Some(mut source) = self.source.take() {
            source.close();
        }
        if was_active {
            debug!(target: "engine::listener", "stopped listening");
        }
    }

    /// Run one analysis if a frame is due at `now`.
    pub fn poll_frame(&mut self, now: Instant) -> Option<PitchSample> {
        if !self.active || !self.frame.poll(now) {
            return None;
        }
        let source = self.source.as_ref()?;
        let n = source.snapshot(&mut self.buffer);
        let frequency = self.detector.detect(&self.buffer[..n], source.sample_rate());
        Some(PitchSample::from_frequency(frequency))
    }
}

impl Drop for PitchListener {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;
    use std::time::Duration;

    const SR: f64 = 44100.0;

    struct FakeMicrophone {
        ring: Arc<Mutex<SampleRing>>,
        deny: bool,
        opened: usize,
    }

    impl FakeMicrophone {
        fn new() -> Self {
            FakeMicrophone {
                ring: Arc::new(Mutex::new(SampleRing::new(4096))),
                deny: false,
                opened: 0,
            }
        }

        fn feed_sine(&self, freq: f64, len: usize) {
            let samples: Vec<f32> = (0..len)
                .map(|i| (0.5 * (2.0 * PI * freq * i as f64 / SR).sin()) as f32)
                .collect();
            self.ring.lock().unwrap().push(&samples);
        }
    }

    impl InputDevice for FakeMicrophone {
        type Source = RingInput;

        fn open(&mut self) -> Result<RingInput> {
            if self.deny {
                return Err(EngineError::PermissionDenied);
            }
            self.opened += 1;
            Ok(RingInput::from_shared(Arc::clone(&self.ring), SR))
        }
    }

    fn listener() -> PitchListener {
        PitchListener::new(&EngineConfig::default())
    }

    #[test]
    fn ring_keeps_latest_samples() {
        let mut ring = SampleRing::new(4);
        ring.push(&[1.0, 2.0, 3.0]);
        ring.push(&[4.0, 5.0]);
        let mut buf = [0.0; 4];
        assert_eq!(ring.snapshot(&mut buf), 4);
        assert_eq!(buf, [2.0, 3.0, 4.0, 5.0]);

        let mut short = [0.0; 2];
        assert_eq!(ring.snapshot(&mut short), 2);
        assert_eq!(short, [4.0, 5.0]);
    }

    #[test]
    fn partially_filled_ring() {
        let mut ring = SampleRing::new(8);
        ring.push(&[1.0, 2.0]);
        let mut buf = [0.0; 8];
        assert_eq!(ring.snapshot(&mut buf), 2);
        assert_eq!(&buf[..2], &[1.0, 2.0]);
    }

    #[test]
    fn permission_denied_leaves_listener_idle() {
        let mut mic = FakeMicrophone::new();
        mic.deny = true;
        let mut l = listener();
        let now = Instant::now();
        assert!(matches!(l.start(&mut mic, now), Err(EngineError::PermissionDenied)));
        assert!(!l.is_active());
        assert_eq!(l.poll_frame(now), None);
    }

    #[test]
    fn detects_microphone_pitch() {
        let mut mic = FakeMicrophone::new();
        mic.feed_sine(440.0, 4096);
        let mut l = listener();
        let now = Instant::now();
        l.start(&mut mic, now).unwrap();

        let sample = l.poll_frame(now).expect("frame due");
        let hz = sample.frequency.expect("pitched");
        assert!((hz - 440.0).abs() / 440.0 < 0.01, "got {hz}");
        assert_eq!(sample.note, NoteName::A);
        assert_eq!(sample.octave, 4);
    }

    #[test]
    fn silence_reports_no_pitch() {
        let mut mic = FakeMicrophone::new();
        mic.ring.lock().unwrap().push(&[0.0; 4096]);
        let mut l = listener();
        let now = Instant::now();
        l.start(&mut mic, now).unwrap();
        let sample = l.poll_frame(now).expect("frame due");
        assert!(!sample.is_pitched());
        assert_eq!(sample.note, NoteName::A);
    }

    #[test]
    fn one_sample_per_frame_interval() {
        let mut mic = FakeMicrophone::new();
        mic.feed_sine(220.0, 4096);
        let mut l = listener();
        let now = Instant::now();
        l.start(&mut mic, now).unwrap();
        assert!(l.poll_frame(now).is_some());
        assert!(l.poll_frame(now + Duration::from_millis(5)).is_none());
        assert!(l.poll_frame(now + Duration::from_millis(17)).is_some());
    }

    #[test]
    fn stop_halts_frames_and_closes_input() {
        let mut mic = FakeMicrophone::new();
        mic.feed_sine(330.0, 4096);
        let mut l = listener();
        let now = Instant::now();
        l.start(&mut mic, now).unwrap();
        l.stop();
        assert!(!l.is_active());
        assert_eq!(l.poll_frame(now + Duration::from_secs(1)), None);
        assert!(mic.ring.lock().unwrap().is_empty());
        l.stop();
    }

    #[test]
    fn second_start_is_rejected() {
        let mut mic = FakeMicrophone::new();
        let mut l = listener();
        let now = Instant::now();
        l.start(&mut mic, now).unwrap();
        assert!(matches!(l.start(&mut mic, now), Err(EngineError::AlreadyListening)));
        assert_eq!(mic.opened, 1);

        l.stop();
        l.start(&mut mic, now).unwrap();
        assert_eq!(mic.opened, 2);
    }

    #[test]
    fn invalid_frequency_is_unpitched() {
        let sample = PitchSample::from_frequency(Some(f64::NAN));
        assert_eq!(sample.frequency, None);
        assert_eq!(sample.cents, 0);
    }
}
