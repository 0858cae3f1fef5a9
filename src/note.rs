//! Frequency ↔ note conversion (equal temperament, A4 = 440 Hz).

use std::fmt;

use serde::{Deserialize, Serialize};

pub const A4_FREQUENCY: f64 = 440.0;
pub const A4_MIDI: i32 = 69;

/// The twelve pitch classes, sharps only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoteName {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl NoteName {
    pub const ALL: [NoteName; 12] = [
        NoteName::C,
        NoteName::CSharp,
        NoteName::D,
        NoteName::DSharp,
        NoteName::E,
        NoteName::F,
        NoteName::FSharp,
        NoteName::G,
        NoteName::GSharp,
        NoteName::A,
        NoteName::ASharp,
        NoteName::B,
    ];

    /// Pitch class of a MIDI note, normalized into [0, 12).
    pub fn from_midi(midi: i32) -> NoteName {
        Self::ALL[midi.rem_euclid(12) as usize]
    }

    /// Semitone index above C.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NoteName::C => "C",
            NoteName::CSharp => "C#",
            NoteName::D => "D",
            NoteName::DSharp => "D#",
            NoteName::E => "E",
            NoteName::F => "F",
            NoteName::FSharp => "F#",
            NoteName::G => "G",
            NoteName::GSharp => "G#",
            NoteName::A => "A",
            NoteName::ASharp => "A#",
            NoteName::B => "B",
        }
    }
}

impl fmt::Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A frequency resolved to the nearest equal-tempered note.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteReading {
    pub note: NoteName,
    pub octave: i32,
    /// Deviation from the nearest note, floored to whole cents.
    pub cents: i32,
    pub midi: i32,
    /// Set when the input frequency was unusable and the default was returned.
    pub silent: bool,
}

impl NoteReading {
    /// A4, 0 cents, flagged silent. Returned for non-finite or non-positive input.
    pub const SILENT: NoteReading = NoteReading {
        note: NoteName::A,
        octave: 4,
        cents: 0,
        midi: A4_MIDI,
        silent: true,
    };

    /// Scientific pitch label, e.g. "A4" or "C#3".
    pub fn label(&self) -> String {
        format!("{}{}", self.note, self.octave)
    }
}

/// Map a frequency in Hz to note, octave and cents offset.
pub fn frequency_to_note(frequency: f64) -> NoteReading {
    if !frequency.is_finite() || frequency <= 0.0 {
        return NoteReading::SILENT;
    }
    let n = 12.0 * (frequency / A4_FREQUENCY).log2() + A4_MIDI as f64;
    let midi = n.round() as i32;
    let cents = ((n - midi as f64) * 100.0).floor() as i32;
    NoteReading {
        note: NoteName::from_midi(midi),
        octave: midi.div_euclid(12) - 1,
        cents,
        midi,
        silent: false,
    }
}

/// Frequency of a MIDI note: `440 · 2^((midi − 69) / 12)`.
pub fn midi_to_frequency(midi: i32) -> f64 {
    A4_FREQUENCY * 2.0_f64.powf((midi - A4_MIDI) as f64 / 12.0)
}

/// Parse a note name such as "C4", "F#3" or "Bb5" into a MIDI note number.
pub fn note_to_midi(note: &str) -> Option<i32> {
    let mut chars = note.chars();
    let base = match chars.next()? {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    let rest = chars.as_str();
    let (semitone, octave_str) = if let Some(r) = rest.strip_prefix('#') {
        (base + 1, r)
    } else if let Some(r) = rest.strip_prefix('b') {
        (base - 1, r)
    } else {
        (base, rest)
    };
    let octave: i32 = octave_str.parse().ok()?;
    Some((octave + 1) * 12 + semitone)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_is_440() {
        let reading = frequency_to_note(440.0);
        assert_eq!(reading.note, NoteName::A);
        assert_eq!(reading.octave, 4);
        assert_eq!(reading.cents, 0);
        assert!(!reading.silent);
        assert_eq!(reading.label(), "A4");
    }

    #[test]
    fn midi_round_trip_recovers_note_and_octave() {
        for m in 0..=127 {
            let reading = frequency_to_note(midi_to_frequency(m));
            assert_eq!(reading.midi, m);
            assert_eq!(reading.note, NoteName::from_midi(m), "midi {m}");
            assert_eq!(reading.octave, m / 12 - 1, "midi {m}");
            assert!(reading.cents.abs() <= 1, "midi {m}: {} cents", reading.cents);
        }
    }

    #[test]
    fn flat_a_reads_negative_cents() {
        // 432 Hz is about 31.8 cents flat of A4.
        let reading = frequency_to_note(432.0);
        assert_eq!(reading.note, NoteName::A);
        assert_eq!(reading.cents, -32);
    }

    #[test]
    fn sharp_c_rounds_to_c() {
        let reading = frequency_to_note(midi_to_frequency(60) * 2.0_f64.powf(0.2 / 12.0));
        assert_eq!(reading.label(), "C4");
        assert!((19..=20).contains(&reading.cents), "cents {}", reading.cents);
    }

    #[test]
    fn invalid_frequencies_return_silent_default() {
        for f in [0.0, -10.0, f64::NAN, f64::INFINITY] {
            assert_eq!(frequency_to_note(f), NoteReading::SILENT, "input {f}");
        }
    }

    #[test]
    fn c4_frequency() {
        let f = midi_to_frequency(60);
        assert!((f - 261.63).abs() < 0.01, "C4 should be ~261.63Hz, got {f}");
    }

    #[test]
    fn parse_note_names() {
        assert_eq!(note_to_midi("A4"), Some(69));
        assert_eq!(note_to_midi("C4"), Some(60));
        assert_eq!(note_to_midi("F#4"), note_to_midi("Gb4"));
        assert_eq!(note_to_midi("C-1"), Some(0));
        assert_eq!(note_to_midi("H2"), None);
        assert_eq!(note_to_midi(""), None);
    }
}
