//! Metronome click: a short percussive sine burst.
//!
//! 5 ms linear rise to the peak, then an exponential fall to 0.001 at 55 ms
//! regardless of tempo. Pitch and level depend on the step intensity.

use crate::grid::StepIntensity;

use super::oscillator::{Oscillator, Waveform};

pub const CLICK_ATTACK_SECS: f64 = 0.005;
pub const CLICK_LENGTH_SECS: f64 = 0.055;
const CLICK_TAIL_LEVEL: f64 = 0.001;

pub const STRONG_HZ: f64 = 1000.0;
pub const WEAK_HZ: f64 = 800.0;
pub const POLY_A_HZ: f64 = 880.0;
pub const POLY_B_HZ: f64 = 660.0;

/// Tones and peak level for an audible step, or `None` for a muted one.
pub fn click_voicing(intensity: StepIntensity) -> Option<(&'static [f64], f64)> {
    match intensity {
        StepIntensity::Mute => None,
        StepIntensity::Strong => Some((&[STRONG_HZ], 0.9)),
        StepIntensity::Weak => Some((&[WEAK_HZ], 0.45)),
        StepIntensity::PolyA => Some((&[POLY_A_HZ], 0.7)),
        StepIntensity::PolyB => Some((&[POLY_B_HZ], 0.7)),
        StepIntensity::PolyBoth => Some((&[POLY_A_HZ, POLY_B_HZ], 0.5)),
    }
}

#[derive(Debug, Clone)]
pub struct Click {
    tones: Vec<Oscillator>,
    peak: f64,
    position: usize,
    attack_samples: usize,
    total_samples: usize,
    /// Per-sample multiplier taking the peak down to the tail level.
    decay_coeff: f64,
    level: f64,
}

impl Click {
    /// Build the click for a step. Muted steps produce nothing.
    pub fn for_step(intensity: StepIntensity, sample_rate: f64) -> Option<Self> {
        let (freqs, peak) = click_voicing(intensity)?;
        let tones = freqs
            .iter()
            .map(|&f| Oscillator::new(Waveform::Sine, f, sample_rate))
            .collect();
        let attack_samples = ((CLICK_ATTACK_SECS * sample_rate) as usize).max(1);
        let total_samples = (CLICK_LENGTH_SECS * sample_rate) as usize;
        let decay_samples = total_samples.saturating_sub(attack_samples).max(1);
        let decay_coeff = (CLICK_TAIL_LEVEL / peak).powf(1.0 / decay_samples as f64);
        Some(Click {
            tones,
            peak,
            position: 0,
            attack_samples,
            total_samples,
            decay_coeff,
            level: 0.0,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.total_samples
    }

    pub fn next_sample(&mut self) -> f64 {
        if self.is_finished() {
            return 0.0;
        }
        self.level = if self.position < self.attack_samples {
            self.peak * (self.position + 1) as f64 / self.attack_samples as f64
        } else {
            self.level * self.decay_coeff
        };
        self.position += 1;

        let sum: f64 = self.tones.iter_mut().map(|osc| osc.next_sample()).sum();
        sum * self.level
    }
}
