//! Polyphonic voice manager.
//!
//! Keeps at most one live voice per MIDI pitch. Stopping a voice moves it
//! out of the active map into a short release list; the voice is dropped once
//! its fade has finished plus a small grace period. `stop` is the only path
//! out of the active map, so a safety timeout and an explicit note-off can
//! never release the same voice twice.

use std::collections::{HashMap, HashSet};

use log::debug;
use serde::{Deserialize, Serialize};

use super::envelope::EnvelopeMode;
use super::oscillator::Waveform;
use super::voice::Voice;

/// Fade used when a voice is cut off (restart, stop-all, immediate stop).
pub const IMMEDIATE_FADE_SECS: f64 = 0.01;
/// Fade used for a normal note-off.
pub const RELEASE_FADE_SECS: f64 = 0.05;
/// Time a faded voice is kept before its oscillator is dropped.
pub const RELEASE_GRACE_SECS: f64 = 0.05;

/// Highest MIDI pitch; larger values are clamped to it.
pub const MAX_MIDI: u8 = 127;

/// Intervals stopped on a chord-assist release: covers major, minor and
/// diminished triads whichever one was sounded.
pub const CHORD_RELEASE_INTERVALS: [u8; 5] = [0, 3, 4, 6, 7];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChordQuality {
    Major,
    Minor,
    Diminished,
}

impl ChordQuality {
    pub fn intervals(self) -> [u8; 3] {
        match self {
            ChordQuality::Major => [0, 4, 7],
            ChordQuality::Minor => [0, 3, 7],
            ChordQuality::Diminished => [0, 3, 6],
        }
    }

    /// Triad quality of `root` as a degree of the major scale on `tonic`.
    ///
    /// Returns `None` for notes outside the scale.
    pub fn diatonic(root: u8, tonic: u8) -> Option<ChordQuality> {
        match (root as i32 - tonic as i32).rem_euclid(12) {
            0 | 5 | 7 => Some(ChordQuality::Major),
            2 | 4 | 9 => Some(ChordQuality::Minor),
            11 => Some(ChordQuality::Diminished),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Releasing {
    voice: Voice,
    /// Samples left before the voice is dropped.
    remaining: usize,
}

#[derive(Debug)]
pub struct VoiceManager {
    sample_rate: f64,
    waveform: Waveform,
    mode: EnvelopeMode,
    timeout_samples: usize,
    chord_assist: bool,
    /// Roots whose press sounded a triad, released as chords whatever the
    /// assist flag says by then.
    chord_roots: HashSet<u8>,
    active: HashMap<u8, Voice>,
    releasing: Vec<Releasing>,
}

impl VoiceManager {
    pub fn new(sample_rate: f64, waveform: Waveform, mode: EnvelopeMode, timeout_secs: f64) -> Self {
        VoiceManager {
            sample_rate,
            waveform,
            mode,
            timeout_samples: (timeout_secs * sample_rate) as usize,
            chord_assist: false,
            chord_roots: HashSet::new(),
            active: HashMap::new(),
            releasing: Vec::new(),
        }
    }

    /// Envelope mode used by voices started from now on.
    pub fn set_envelope_mode(&mut self, mode: EnvelopeMode) {
        self.mode = mode;
    }

    pub fn envelope_mode(&self) -> EnvelopeMode {
        self.mode
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    pub fn set_chord_assist(&mut self, enabled: bool) {
        self.chord_assist = enabled;
    }

    pub fn chord_assist(&self) -> bool {
        self.chord_assist
    }

    pub fn is_active(&self, midi: u8) -> bool {
        self.active.contains_key(&midi)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Voices fading out but not yet dropped.
    pub fn releasing_count(&self) -> usize {
        self.releasing.len()
    }

    /// Active pitches in ascending order.
    pub fn active_pitches(&self) -> Vec<u8> {
        let mut pitches: Vec<u8> = self.active.keys().copied().collect();
        pitches.sort_unstable();
        pitches
    }

    /// Start a voice for `midi`, cutting off any voice already on that pitch.
    pub fn play(&mut self, midi: u8) {
        let midi = midi.min(MAX_MIDI);
        self.stop(midi, true);
        let voice = Voice::start(midi, self.waveform, self.mode, self.sample_rate);
        self.active.insert(midi, voice);
    }

    /// Fade out and release the voice on `midi`. Returns false if none was active.
    pub fn stop(&mut self, midi: u8, immediate: bool) -> bool {
        let midi = midi.min(MAX_MIDI);
        let Some(mut voice) = self.active.remove(&midi) else {
            return false;
        };
        let fade = if immediate {
            IMMEDIATE_FADE_SECS
        } else {
            RELEASE_FADE_SECS
        };
        voice.stop(fade);
        let remaining = ((fade + RELEASE_GRACE_SECS) * self.sample_rate) as usize;
        self.releasing.push(Releasing { voice, remaining });
        true
    }

    pub fn stop_all(&mut self) {
        let pitches: Vec<u8> = self.active.keys().copied().collect();
        for midi in pitches {
            self.stop(midi, true);
        }
        self.chord_roots.clear();
    }

    /// Key press: the root alone, or its triad when chord assist is on.
    pub fn press(&mut self, root: u8, quality: Option<ChordQuality>) {
        let root = root.min(MAX_MIDI);
        match quality {
            Some(quality) if self.chord_assist => {
                self.chord_roots.insert(root);
                for interval in quality.intervals() {
                    if let Some(midi) = root.checked_add(interval).filter(|m| *m <= MAX_MIDI) {
                        self.play(midi);
                    }
                }
            }
            _ => {
                self.chord_roots.remove(&root);
                self.play(root);
            }
        }
    }

    /// Key release matching [`press`](Self::press). A root pressed as a chord
    /// releases the whole interval set even if assist was switched off since.
    pub fn release(&mut self, root: u8, immediate: bool) {
        let root = root.min(MAX_MIDI);
        let was_chord = self.chord_roots.remove(&root);
        if !was_chord && !self.chord_assist {
            self.stop(root, immediate);
            return;
        }
        for interval in CHORD_RELEASE_INTERVALS {
            if let Some(midi) = root.checked_add(interval).filter(|m| *m <= MAX_MIDI) {
                self.stop(midi, immediate);
            }
        }
    }

    /// Mix every voice into `out`, then retire timed-out and finished voices.
    pub fn render_add(&mut self, out: &mut [f64]) {
        for voice in self.active.values_mut() {
            for sample in out.iter_mut() {
                *sample += voice.next_sample();
            }
        }
        for releasing in self.releasing.iter_mut() {
            for sample in out.iter_mut() {
                *sample += releasing.voice.next_sample();
            }
        }

        let frames = out.len();
        self.releasing.retain_mut(|r| {
            r.remaining = r.remaining.saturating_sub(frames);
            r.remaining > 0
        });

        let timeout = self.timeout_samples;
        let expired: Vec<u8> = self
            .active
            .iter()
            .filter(|(_, v)| v.mode() == EnvelopeMode::Decay && v.age_samples() >= timeout)
            .map(|(midi, _)| *midi)
            .collect();
        for midi in expired {
            debug!(target: "engine::voices", "safety release for pitch {midi}");
            self.stop(midi, false);
        }
    }
}
