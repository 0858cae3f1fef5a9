//! DSP: sample-level synthesis and analysis.
//!
//! Oscillators, envelopes and clicks run per sample on the audio thread;
//! [`tuner`] runs once per analysis frame.

pub mod click;
pub mod envelope;
pub mod mixer;
pub mod oscillator;
pub mod tuner;
pub mod voice;
pub mod voices;
