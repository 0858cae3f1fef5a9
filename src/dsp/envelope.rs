//! Voice amplitude envelope.
//!
//! Linear attack to a peak gain, then either an exponential decay toward
//! silence (struck/plucked instruments) or a held level until released.
//! Release is a linear fade whose length the caller picks per note-off.

use serde::{Deserialize, Serialize};

/// Starting level of the attack ramp. Ramps never start from exact zero.
pub const ENVELOPE_FLOOR: f64 = 0.0001;
pub const ATTACK_SECS: f64 = 0.02;
/// Time constant of the decay-mode exponential approach to silence.
pub const DECAY_TIME_CONSTANT: f64 = 0.8;

/// Envelope shape selected when a voice starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvelopeMode {
    /// Attack then exponential decay; the voice fades out on its own.
    Decay,
    /// Attack then hold until an explicit release.
    Sustain,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

#[derive(Debug, Clone)]
pub struct Envelope {
    mode: EnvelopeMode,
    peak: f64,
    stage: Stage,
    level: f64,
    sample_rate: f64,
    stage_samples: usize,
    stage_counter: usize,
    /// Level at the start of the current stage.
    start_level: f64,
    /// Per-sample multiplier for the decay stage.
    decay_coeff: f64,
}

impl Envelope {
    pub fn new(mode: EnvelopeMode, sample_rate: f64) -> Self {
        Envelope {
            mode,
            peak: 1.0,
            stage: Stage::Idle,
            level: 0.0,
            sample_rate,
            stage_samples: 0,
            stage_counter: 0,
            start_level: 0.0,
            decay_coeff: (-1.0 / (DECAY_TIME_CONSTANT * sample_rate)).exp(),
        }
    }

    pub fn mode(&self) -> EnvelopeMode {
        self.mode
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    /// Start the attack toward `peak`.
    pub fn gate_on(&mut self, peak: f64) {
        self.peak = peak.max(ENVELOPE_FLOOR);
        self.stage = Stage::Attack;
        self.stage_samples = (ATTACK_SECS * self.sample_rate) as usize;
        self.stage_counter = 0;
        self.start_level = ENVELOPE_FLOOR;
        self.level = ENVELOPE_FLOOR;
    }

    /// Fade linearly from the current level to silence over `fade_secs`.
    pub fn release(&mut self, fade_secs: f64) {
        if self.stage == Stage::Idle {
            return;
        }
        self.stage = Stage::Release;
        self.stage_samples = (fade_secs.max(0.0) * self.sample_rate) as usize;
        self.stage_counter = 0;
        self.start_level = self.level;
    }

    pub fn is_releasing(&self) -> bool {
        self.stage == Stage::Release
    }

    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Idle
    }

    pub fn next_sample(&mut self) -> f64 {
        match self.stage {
            Stage::Idle => {
                self.level = 0.0;
            }
            Stage::Attack => {
                if self.stage_counter >= self.stage_samples {
                    self.level = self.peak;
                    self.enter_hold();
                } else {
                    let t = self.stage_counter as f64 / self.stage_samples as f64;
                    self.level = self.start_level + (self.peak - self.start_level) * t;
                    self.stage_counter += 1;
                }
            }
            Stage::Decay => {
                self.level *= self.decay_coeff;
            }
            Stage::Sustain => {
                self.level = self.peak;
            }
            Stage::Release => {
                if self.stage_counter >= self.stage_samples {
                    self.level = 0.0;
                    self.stage = Stage::Idle;
                } else {
                    let t = self.stage_counter as f64 / self.stage_samples as f64;
                    self.level = self.start_level * (1.0 - t);
                    self.stage_counter += 1;
                }
            }
        }
        self.level
    }

    fn enter_hold(&mut self) {
        self.stage = match self.mode {
            EnvelopeMode::Decay => Stage::Decay,
            EnvelopeMode::Sustain => Stage::Sustain,
        };
        self.stage_counter = 0;
    }
}
