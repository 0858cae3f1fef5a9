//! Voice: one sounding pitch: oscillator + envelope.

use crate::note::midi_to_frequency;

use super::envelope::{Envelope, EnvelopeMode};
use super::oscillator::{Oscillator, Waveform};

/// Gain at the MIDI 60 anchor.
const ANCHOR_GAIN: f64 = 0.35;
const GAIN_PER_SEMITONE: f64 = 0.01;
pub const MIN_VOICE_GAIN: f64 = 0.1;
pub const MAX_VOICE_GAIN: f64 = 0.6;

/// Peak gain for a pitch: higher notes play quieter so loudness stays even
/// across the keyboard.
pub fn pitch_gain(midi: u8) -> f64 {
    let offset = midi as f64 - 60.0;
    (ANCHOR_GAIN - offset * GAIN_PER_SEMITONE).clamp(MIN_VOICE_GAIN, MAX_VOICE_GAIN)
}

#[derive(Debug, Clone)]
pub struct Voice {
    midi: u8,
    oscillator: Oscillator,
    envelope: Envelope,
    stopped: bool,
    /// Samples rendered since note-on.
    age: usize,
}

impl Voice {
    /// Create a voice and start its attack immediately.
    pub fn start(midi: u8, waveform: Waveform, mode: EnvelopeMode, sample_rate: f64) -> Self {
        let mut envelope = Envelope::new(mode, sample_rate);
        envelope.gate_on(pitch_gain(midi));
        Voice {
            midi,
            oscillator: Oscillator::new(waveform, midi_to_frequency(midi as i32), sample_rate),
            envelope,
            stopped: false,
            age: 0,
        }
    }

    pub fn midi(&self) -> u8 {
        self.midi
    }

    pub fn mode(&self) -> EnvelopeMode {
        self.envelope.mode()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn age_samples(&self) -> usize {
        self.age
    }

    /// Begin the fade-out. Calling again on a stopped voice does nothing.
    pub fn stop(&mut self, fade_secs: f64) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.envelope.release(fade_secs);
    }

    /// True once the fade has reached silence.
    pub fn is_silent(&self) -> bool {
        self.envelope.is_finished()
    }

    pub fn next_sample(&mut self) -> f64 {
        if self.envelope.is_finished() {
            return 0.0;
        }
        self.age += 1;
        self.oscillator.next_sample() * self.envelope.next_sample()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gain_is_anchored_at_middle_c() {
        assert!((pitch_gain(60) - ANCHOR_GAIN).abs() < 1e-12);
        assert!(pitch_gain(72) < pitch_gain(60));
        assert!(pitch_gain(48) > pitch_gain(60));
    }

    #[test]
    fn gain_is_clamped() {
        assert_eq!(pitch_gain(127), MIN_VOICE_GAIN);
        assert_eq!(pitch_gain(0), MAX_VOICE_GAIN);
    }

    #[test]
    fn voice_produces_sound() {
        let mut v = Voice::start(69, Waveform::Sine, EnvelopeMode::Sustain, 44100.0);
        let peak = (0..4410).map(|_| v.next_sample().abs()).fold(0.0, f64::max);
        assert!(peak > 0.1, "voice should be audible, peak {peak}");
        assert!(peak <= pitch_gain(69) + 1e-9);
    }

    #[test]
    fn stopped_voice_goes_silent() {
        let mut v = Voice::start(60, Waveform::Triangle, EnvelopeMode::Sustain, 44100.0);
        for _ in 0..2000 {
            v.next_sample();
        }
        v.stop(0.01);
        assert!(v.is_stopped());
        for _ in 0..500 {
            v.next_sample();
        }
        assert!(v.is_silent());
        assert_eq!(v.next_sample(), 0.0);
    }
}
