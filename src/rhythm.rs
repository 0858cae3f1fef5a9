//! Rhythm dictation patterns.
//!
//! A pattern is authored as a sequence of cells, each a fraction of one bar,
//! and stored as the sorted onset positions of its sounding cells in `[0, 1)`.

use serde::{Deserialize, Serialize};

use crate::error::RhythmError;

/// Slack allowed when checking that cells fit in one bar.
const BAR_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RhythmCell {
    /// Length as a fraction of one bar (a quarter note in 4/4 is 0.25).
    pub duration: f64,
    pub is_rest: bool,
}

impl RhythmCell {
    pub fn note(duration: f64) -> Self {
        RhythmCell {
            duration,
            is_rest: false,
        }
    }

    pub fn rest(duration: f64) -> Self {
        RhythmCell {
            duration,
            is_rest: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RhythmPattern {
    onsets: Vec<f64>,
}

impl RhythmPattern {
    /// Lay the cells end to end from the start of the bar.
    ///
    /// Fails if a duration is not positive or the cells add up to more than
    /// one bar.
    pub fn from_cells(cells: &[RhythmCell]) -> Result<Self, RhythmError> {
        let mut onsets = Vec::with_capacity(cells.len());
        let mut position = 0.0;
        for cell in cells {
            if !(cell.duration.is_finite() && cell.duration > 0.0) {
                return Err(RhythmError::InvalidDuration(cell.duration));
            }
            if !cell.is_rest {
                onsets.push(position);
            }
            position += cell.duration;
        }
        if position > 1.0 + BAR_EPSILON {
            return Err(RhythmError::BarOverflow { total: position });
        }
        Ok(RhythmPattern { onsets })
    }

    /// Build from raw onset positions. Positions are wrapped into `[0, 1)`,
    /// sorted, and non-finite values dropped.
    pub fn from_onsets(onsets: impl IntoIterator<Item = f64>) -> Self {
        let mut onsets: Vec<f64> = onsets
            .into_iter()
            .filter(|p| p.is_finite())
            .map(|p| {
                // rem_euclid rounds tiny negatives up to exactly 1.0.
                let p = p.rem_euclid(1.0);
                if p >= 1.0 { 0.0 } else { p }
            })
            .collect();
        onsets.sort_by(f64::total_cmp);
        onsets.dedup_by(|a, b| (*a - *b).abs() < BAR_EPSILON);
        RhythmPattern { onsets }
    }

    pub fn onsets(&self) -> &[f64] {
        &self.onsets
    }

    pub fn len(&self) -> usize {
        self.onsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.onsets.is_empty()
    }

    /// True when both patterns have the same number of onsets and each pair
    /// lies within `tolerance` bars of each other.
    pub fn matches(&self, other: &RhythmPattern, tolerance: f64) -> bool {
        self.onsets.len() == other.onsets.len()
            && self
                .onsets
                .iter()
                .zip(&other.onsets)
                .all(|(a, b)| (a - b).abs() <= tolerance)
    }

    /// Onset times in seconds for a bar lasting `bar_seconds`.
    pub fn onset_times(&self, bar_seconds: f64) -> Vec<f64> {
        self.onsets.iter().map(|p| p * bar_seconds).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn quarter_notes() {
        let cells = [RhythmCell::note(0.25); 4];
        let pattern = RhythmPattern::from_cells(&cells).unwrap();
        assert_eq!(pattern.onsets(), &[0.0, 0.25, 0.5, 0.75]);
    }

    #[test]
    fn rests_have_no_onset() {
        let cells = [
            RhythmCell::note(0.5),
            RhythmCell::rest(0.25),
            RhythmCell::note(0.125),
            RhythmCell::note(0.125),
        ];
        let pattern = RhythmPattern::from_cells(&cells).unwrap();
        assert_eq!(pattern.onsets(), &[0.0, 0.75, 0.875]);
    }

    #[test]
    fn short_patterns_are_allowed() {
        let pattern = RhythmPattern::from_cells(&[RhythmCell::note(0.25)]).unwrap();
        assert_eq!(pattern.len(), 1);
        assert!(RhythmPattern::from_cells(&[]).unwrap().is_empty());
    }

    #[test]
    fn overflowing_bar_is_rejected() {
        let cells = [RhythmCell::note(0.5), RhythmCell::note(0.5), RhythmCell::rest(0.25)];
        match RhythmPattern::from_cells(&cells) {
            Err(RhythmError::BarOverflow { total }) => assert_relative_eq!(total, 1.25),
            other => panic!("expected BarOverflow, got {other:?}"),
        }
    }

    #[test]
    fn triplets_fill_exactly_one_bar() {
        let cells = [RhythmCell::note(1.0 / 3.0); 3];
        assert!(RhythmPattern::from_cells(&cells).is_ok());
    }

    #[test]
    fn bad_durations_are_rejected() {
        assert_eq!(
            RhythmPattern::from_cells(&[RhythmCell::note(0.0)]),
            Err(RhythmError::InvalidDuration(0.0))
        );
        assert!(RhythmPattern::from_cells(&[RhythmCell::rest(f64::NAN)]).is_err());
    }

    #[test]
    fn matching_uses_tolerance() {
        let target = RhythmPattern::from_cells(&[RhythmCell::note(0.25); 4]).unwrap();
        let close = RhythmPattern::from_onsets([0.01, 0.26, 0.49, 0.74]);
        let off = RhythmPattern::from_onsets([0.0, 0.3, 0.5, 0.75]);
        let short = RhythmPattern::from_onsets([0.0, 0.25, 0.5]);
        assert!(target.matches(&close, 0.02));
        assert!(!target.matches(&off, 0.02));
        assert!(!target.matches(&short, 0.02));
    }

    #[test]
    fn onsets_are_normalized() {
        let pattern = RhythmPattern::from_onsets([0.5, 1.25, f64::INFINITY, 0.0, 0.5]);
        assert_eq!(pattern.onsets(), &[0.0, 0.25, 0.5]);
    }

    #[test]
    fn tiny_negative_onset_wraps_to_zero() {
        let pattern = RhythmPattern::from_onsets([-1e-20, 0.5]);
        assert_eq!(pattern.onsets(), &[0.0, 0.5]);
        assert!(pattern.onsets().iter().all(|p| (0.0..1.0).contains(p)));
    }

    #[test]
    fn onset_times_scale_with_bar_length() {
        let pattern = RhythmPattern::from_cells(&[RhythmCell::note(0.25); 4]).unwrap();
        assert_eq!(pattern.onset_times(2.0), vec![0.0, 0.5, 1.0, 1.5]);
    }
}
