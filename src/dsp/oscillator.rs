//! Band-limited oscillators for voices and clicks.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

/// Supported waveform shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

/// A phase-accumulating oscillator with PolyBLEP edges on square and saw.
#[derive(Debug, Clone)]
pub struct Oscillator {
    waveform: Waveform,
    frequency: f64,
    phase: f64,
    /// Phase increment per sample, cached from frequency / sample rate.
    inc: f64,
    sample_rate: f64,
}

impl Oscillator {
    pub fn new(waveform: Waveform, frequency: f64, sample_rate: f64) -> Self {
        let mut osc = Oscillator {
            waveform,
            frequency: 0.0,
            phase: 0.0,
            inc: 0.0,
            sample_rate,
        };
        osc.set_frequency(frequency);
        osc
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Set the frequency, keeping it below Nyquist.
    pub fn set_frequency(&mut self, frequency: f64) {
        let nyquist = self.sample_rate * 0.5;
        self.frequency = frequency.clamp(0.0, nyquist);
        self.inc = self.frequency / self.sample_rate;
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn next_sample(&mut self) -> f64 {
        let t = self.phase;
        let dt = self.inc;
        let sample = match self.waveform {
            Waveform::Sine => (TAU * t).sin(),
            Waveform::Sawtooth => (2.0 * t - 1.0) - poly_blep(t, dt),
            Waveform::Square => {
                let naive = if t < 0.5 { 1.0 } else { -1.0 };
                naive + poly_blep(t, dt) - poly_blep((t + 0.5) % 1.0, dt)
            }
            Waveform::Triangle => {
                if t < 0.5 {
                    4.0 * t - 1.0
                } else {
                    3.0 - 4.0 * t
                }
            }
        };

        self.phase += dt;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        sample
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

/// PolyBLEP correction around a discontinuity.
///
/// `t` is the phase [0, 1), `dt` the phase increment per sample.
fn poly_blep(t: f64, dt: f64) -> f64 {
    if dt <= 0.0 {
        0.0
    } else if t < dt {
        let t = t / dt;
        2.0 * t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + 2.0 * t + 1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_starts_at_zero() {
        let mut osc = Oscillator::new(Waveform::Sine, 440.0, 44100.0);
        let sample = osc.next_sample();
        assert!(sample.abs() < 1e-10, "Sine should start near 0, got {sample}");
    }

    #[test]
    fn waveforms_stay_in_range() {
        for waveform in [
            Waveform::Sine,
            Waveform::Square,
            Waveform::Sawtooth,
            Waveform::Triangle,
        ] {
            let mut osc = Oscillator::new(waveform, 440.0, 44100.0);
            for _ in 0..44100 {
                let s = osc.next_sample();
                assert!(s.abs() <= 1.5, "{waveform:?} out of range: {s}");
            }
        }
    }

    #[test]
    fn sine_completes_expected_cycles() {
        let mut osc = Oscillator::new(Waveform::Sine, 100.0, 1000.0);
        let mut crossings = 0;
        let mut prev = osc.next_sample();
        for _ in 0..1000 {
            let s = osc.next_sample();
            if prev < 0.0 && s >= 0.0 {
                crossings += 1;
            }
            prev = s;
        }
        assert!((99..=100).contains(&crossings), "crossings {crossings}");
    }

    #[test]
    fn frequency_is_capped_at_nyquist() {
        let osc = Oscillator::new(Waveform::Sine, 30000.0, 44100.0);
        assert_eq!(osc.frequency(), 22050.0);
    }
}
