//! Beat grids: the step sequences the scheduler walks through.
//!
//! A standard grid is `beats × subdivision` steps with an accented downbeat.
//! A polyrhythm grid interleaves two step counts over `lcm(a, b)` steps so
//! every onset of either rhythm lands on a grid boundary.

use serde::{Deserialize, Serialize};

/// Largest step count accepted for either side of a polyrhythm.
pub const MAX_POLY_STEPS: u32 = 16;
pub const MAX_BEATS: u32 = 16;
pub const MAX_SUBDIVISION: u32 = 8;

/// How a single grid step sounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepIntensity {
    Mute,
    Weak,
    Strong,
    /// Onset of the first polyrhythm voice only.
    PolyA,
    /// Onset of the second polyrhythm voice only.
    PolyB,
    /// Both polyrhythm voices coincide.
    PolyBoth,
}

impl StepIntensity {
    pub fn is_audible(self) -> bool {
        self != StepIntensity::Mute
    }

    /// Next state when a user taps a standard-mode cell.
    pub fn cycled(self) -> StepIntensity {
        match self {
            StepIntensity::Mute => StepIntensity::Weak,
            StepIntensity::Weak => StepIntensity::Strong,
            StepIntensity::Strong => StepIntensity::Mute,
            poly => poly,
        }
    }

    /// Compact numeric code used by the WASM bindings.
    pub fn code(self) -> u8 {
        match self {
            StepIntensity::Mute => 0,
            StepIntensity::Weak => 1,
            StepIntensity::Strong => 2,
            StepIntensity::PolyA => 3,
            StepIntensity::PolyB => 4,
            StepIntensity::PolyBoth => 5,
        }
    }

    pub fn from_code(code: u8) -> StepIntensity {
        match code {
            1 => StepIntensity::Weak,
            2 => StepIntensity::Strong,
            3 => StepIntensity::PolyA,
            4 => StepIntensity::PolyB,
            5 => StepIntensity::PolyBoth,
            _ => StepIntensity::Mute,
        }
    }
}

/// How a grid was generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridMode {
    Standard { beats: u32, subdivision: u32 },
    Polyrhythm { steps_a: u32, steps_b: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatGrid {
    steps: Vec<StepIntensity>,
    mode: GridMode,
}

impl BeatGrid {
    /// Standard grid: downbeat STRONG, other beat starts WEAK, subdivisions MUTE.
    ///
    /// `beats` and `subdivision` are clamped to at least 1 so the grid is never empty.
    pub fn standard(beats: u32, subdivision: u32) -> Self {
        let beats = beats.clamp(1, MAX_BEATS);
        let subdivision = subdivision.clamp(1, MAX_SUBDIVISION);
        let len = (beats * subdivision) as usize;
        let steps = (0..len)
            .map(|i| {
                if i == 0 {
                    StepIntensity::Strong
                } else if i % subdivision as usize == 0 {
                    StepIntensity::Weak
                } else {
                    StepIntensity::Mute
                }
            })
            .collect();
        BeatGrid {
            steps,
            mode: GridMode::Standard { beats, subdivision },
        }
    }

    /// Interleaved grid for `steps_a` against `steps_b`.
    ///
    /// A zero on either side yields an empty grid, which the scheduler treats
    /// as nothing to play.
    pub fn polyrhythm(steps_a: u32, steps_b: u32) -> Self {
        let steps_a = steps_a.min(MAX_POLY_STEPS);
        let steps_b = steps_b.min(MAX_POLY_STEPS);
        let mode = GridMode::Polyrhythm { steps_a, steps_b };
        if steps_a == 0 || steps_b == 0 {
            return BeatGrid {
                steps: Vec::new(),
                mode,
            };
        }

        let len = lcm(steps_a, steps_b) as usize;
        let every_a = len / steps_a as usize;
        let every_b = len / steps_b as usize;
        let steps = (0..len)
            .map(|i| match (i % every_a == 0, i % every_b == 0) {
                (true, true) => StepIntensity::PolyBoth,
                (true, false) => StepIntensity::PolyA,
                (false, true) => StepIntensity::PolyB,
                (false, false) => StepIntensity::Mute,
            })
            .collect();
        BeatGrid { steps, mode }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<StepIntensity> {
        self.steps.get(index).copied()
    }

    pub fn steps(&self) -> &[StepIntensity] {
        &self.steps
    }

    pub fn mode(&self) -> GridMode {
        self.mode
    }

    /// Duration of one step, measured in beats.
    ///
    /// Standard mode: `1 / subdivision`. Polyrhythm mode: a bar of `steps_b`
    /// beats split into `lcm(a, b)` steps. Empty grids have no step length.
    pub fn step_beats(&self) -> Option<f64> {
        match self.mode {
            GridMode::Standard { subdivision, .. } => Some(1.0 / subdivision as f64),
            GridMode::Polyrhythm { steps_a, steps_b } => {
                if steps_a == 0 || steps_b == 0 {
                    None
                } else {
                    Some(steps_b as f64 / lcm(steps_a, steps_b) as f64)
                }
            }
        }
    }

    /// Step duration in seconds at the given tempo.
    pub fn step_interval(&self, bpm: f64) -> Option<f64> {
        self.step_beats().map(|beats| beats * 60.0 / bpm)
    }

    /// Length of one full pass through the grid, in seconds.
    pub fn bar_duration(&self, bpm: f64) -> Option<f64> {
        self.step_interval(bpm).map(|step| step * self.len() as f64)
    }

    /// Cycle a standard-mode cell MUTE → WEAK → STRONG → MUTE.
    ///
    /// Polyrhythm grids are derived, so edits are ignored. Returns the new
    /// intensity when the cell changed.
    pub fn cycle_cell(&mut self, index: usize) -> Option<StepIntensity> {
        if !matches!(self.mode, GridMode::Standard { .. }) {
            return None;
        }
        let cell = self.steps.get_mut(index)?;
        *cell = cell.cycled();
        Some(*cell)
    }

    /// Build a grid from raw step codes, e.g. a pattern restored by the UI.
    pub fn from_steps(steps: Vec<StepIntensity>, subdivision: u32) -> Self {
        let subdivision = subdivision.clamp(1, MAX_SUBDIVISION);
        let beats = (steps.len() as u32).div_ceil(subdivision).max(1);
        BeatGrid {
            steps,
            mode: GridMode::Standard { beats, subdivision },
        }
    }
}

/// Step interval in seconds for a standard grid.
pub fn standard_step_interval(bpm: f64, subdivision: u32) -> f64 {
    (60.0 / bpm) / subdivision.max(1) as f64
}

/// Step interval in seconds for an `a` against `b` polyrhythm.
pub fn polyrhythm_step_interval(bpm: f64, steps_a: u32, steps_b: u32) -> f64 {
    if steps_a == 0 || steps_b == 0 {
        return 0.0;
    }
    (60.0 / bpm * steps_b as f64) / lcm(steps_a, steps_b) as f64
}

pub fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

pub fn lcm(a: u32, b: u32) -> u32 {
    if a == 0 || b == 0 {
        return 0;
    }
    a / gcd(a, b) * b
}
