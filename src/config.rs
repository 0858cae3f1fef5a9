//! Engine configuration.
//!
//! Every timing constant the engine relies on lives here so hosts can tune
//! them from a JSON settings blob. Missing fields fall back to defaults and
//! out-of-range values are clamped by [`EngineConfig::sanitized`].

use serde::{Deserialize, Serialize};

use crate::dsp::envelope::EnvelopeMode;
use crate::dsp::oscillator::Waveform;
use crate::error::Result;

/// Tempo substituted for non-finite or non-positive BPM input.
pub const DEFAULT_BPM: f64 = 120.0;
pub const MIN_BPM: f64 = 20.0;
pub const MAX_BPM: f64 = 300.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output sample rate in Hz.
    pub sample_rate: f64,
    /// Scheduler re-poll period in milliseconds.
    pub lookahead_ms: f64,
    /// How far past the current clock time events get scheduled.
    pub schedule_ahead_ms: f64,
    /// Upper bound on steps scheduled in a single tick.
    pub max_events_per_tick: usize,
    pub default_bpm: f64,
    pub min_bpm: f64,
    pub max_bpm: f64,
    /// Master output gain [0, 1].
    pub master_volume: f64,
    /// Ramp applied when the master volume changes.
    pub volume_ramp_ms: f64,
    pub envelope_mode: EnvelopeMode,
    pub waveform: Waveform,
    /// Decay-mode voices are released after this long even without a note-off.
    pub voice_timeout_secs: f64,
    /// Samples per pitch analysis frame.
    pub analysis_frame_size: usize,
    /// Period of the pitch analysis callback in milliseconds.
    pub frame_interval_ms: f64,
    /// RMS below which a frame counts as silence.
    pub noise_floor: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sample_rate: 44100.0,
            lookahead_ms: 25.0,
            schedule_ahead_ms: 100.0,
            max_events_per_tick: 100,
            default_bpm: DEFAULT_BPM,
            min_bpm: MIN_BPM,
            max_bpm: MAX_BPM,
            master_volume: 0.8,
            volume_ramp_ms: 20.0,
            envelope_mode: EnvelopeMode::Decay,
            waveform: Waveform::Triangle,
            voice_timeout_secs: 5.0,
            analysis_frame_size: 2048,
            frame_interval_ms: 16.0,
            noise_floor: 0.01,
        }
    }
}

impl EngineConfig {
    /// Parse a config from JSON, then clamp it into a usable range.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        Ok(config.sanitized())
    }

    /// Clamp every field into a range the engine can run with.
    pub fn sanitized(mut self) -> Self {
        let defaults = EngineConfig::default();
        if !self.sample_rate.is_finite() || self.sample_rate < 8000.0 {
            self.sample_rate = defaults.sample_rate;
        }
        self.lookahead_ms = finite_or(self.lookahead_ms, defaults.lookahead_ms).clamp(1.0, 1000.0);
        self.schedule_ahead_ms =
            finite_or(self.schedule_ahead_ms, defaults.schedule_ahead_ms).max(self.lookahead_ms);
        self.max_events_per_tick = self.max_events_per_tick.max(1);
        self.min_bpm = finite_or(self.min_bpm, MIN_BPM).max(1.0);
        self.max_bpm = finite_or(self.max_bpm, MAX_BPM).max(self.min_bpm);
        if !self.default_bpm.is_finite() || self.default_bpm <= 0.0 {
            self.default_bpm = DEFAULT_BPM;
        }
        self.default_bpm = self.default_bpm.clamp(self.min_bpm, self.max_bpm);
        self.master_volume = finite_or(self.master_volume, defaults.master_volume).clamp(0.0, 1.0);
        self.volume_ramp_ms = finite_or(self.volume_ramp_ms, defaults.volume_ramp_ms).max(0.0);
        self.voice_timeout_secs =
            finite_or(self.voice_timeout_secs, defaults.voice_timeout_secs).max(0.1);
        self.analysis_frame_size = self.analysis_frame_size.clamp(64, 32768);
        self.frame_interval_ms = finite_or(self.frame_interval_ms, defaults.frame_interval_ms).max(1.0);
        self.noise_floor = finite_or(self.noise_floor, defaults.noise_floor).max(0.0);
        self
    }

    pub fn lookahead_secs(&self) -> f64 {
        self.lookahead_ms / 1000.0
    }

    pub fn schedule_ahead_secs(&self) -> f64 {
        self.schedule_ahead_ms / 1000.0
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_json_overrides_fields() {
        let config = EngineConfig::from_json(r#"{"lookahead_ms": 30, "envelope_mode": "Sustain"}"#)
            .unwrap();
        assert_eq!(config.lookahead_ms, 30.0);
        assert_eq!(config.envelope_mode, EnvelopeMode::Sustain);
        assert_eq!(config.max_events_per_tick, 100);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let config = EngineConfig::from_json(
            r#"{"default_bpm": -5, "master_volume": 3.0, "max_events_per_tick": 0, "sample_rate": 10}"#,
        )
        .unwrap();
        assert_eq!(config.default_bpm, DEFAULT_BPM);
        assert_eq!(config.master_volume, 1.0);
        assert_eq!(config.max_events_per_tick, 1);
        assert_eq!(config.sample_rate, 44100.0);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(EngineConfig::from_json("{not json").is_err());
    }
}
