//! Tuner: autocorrelation pitch detection on a single analysis frame.
//!
//! Each call is independent: a silence gate on RMS, a normalized
//! mean-absolute-difference correlation over lags `2..len/2`, hill-climbing
//! to the first strong peak, then parabolic refinement of that peak.

/// Frames with RMS below this are treated as silence.
pub const NOISE_FLOOR: f64 = 0.01;
/// Correlation a lag must exceed to count as a period candidate.
pub const CORRELATION_THRESHOLD: f64 = 0.9;
/// Minimum correlation accepted by the best-lag fallback.
pub const FALLBACK_FLOOR: f64 = 0.01;
const MIN_LAG: usize = 2;

/// Estimate the fundamental frequency of `samples` in Hz.
///
/// Returns `None` for silent or aperiodic frames. Never panics, whatever
/// the buffer length or sample rate.
pub fn detect_pitch(samples: &[f32], sample_rate: f64) -> Option<f64> {
    PitchDetector::new().detect(samples, sample_rate)
}

/// Detector settings plus a reusable correlation buffer.
#[derive(Debug, Clone)]
pub struct PitchDetector {
    pub noise_floor: f64,
    pub threshold: f64,
    correlations: Vec<f64>,
}

impl Default for PitchDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PitchDetector {
    pub fn new() -> Self {
        PitchDetector {
            noise_floor: NOISE_FLOOR,
            threshold: CORRELATION_THRESHOLD,
            correlations: Vec::new(),
        }
    }

    pub fn with_noise_floor(noise_floor: f64) -> Self {
        PitchDetector {
            noise_floor,
            ..Self::new()
        }
    }

    pub fn detect(&mut self, samples: &[f32], sample_rate: f64) -> Option<f64> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return None;
        }
        let half = samples.len() / 2;
        if half <= MIN_LAG + 1 {
            return None;
        }
        if rms(samples) < self.noise_floor {
            return None;
        }

        self.correlations.clear();
        self.correlations.resize(half + 1, 0.0);

        let mut best_lag = 0usize;
        let mut best_corr = 0.0f64;
        let mut last_corr = 1.0f64;
        let mut found_peak = false;
        // Highest correlation seen on a rising slope, for the fallback.
        let mut max_lag = 0usize;
        let mut max_corr = f64::MIN;

        for lag in MIN_LAG..=half {
            let mut diff = 0.0f64;
            for i in 0..half {
                diff += (samples[i] as f64 - samples[i + lag] as f64).abs();
            }
            let corr = 1.0 - diff / half as f64;
            self.correlations[lag] = corr;

            let rising = corr > last_corr;
            if rising && corr > max_corr {
                max_corr = corr;
                max_lag = lag;
            }

            if corr > self.threshold && rising {
                found_peak = true;
                if corr > best_corr {
                    best_corr = corr;
                    best_lag = lag;
                }
            } else if found_peak {
                // The climb ended: `best_lag` is the period, refine it.
                let refined = self.refine(best_lag);
                return Some(sample_rate / refined);
            }
            last_corr = corr;
        }

        if found_peak {
            return Some(sample_rate / self.refine(best_lag));
        }
        if max_corr > FALLBACK_FLOOR && max_lag >= MIN_LAG {
            return Some(sample_rate / max_lag as f64);
        }
        None
    }

    /// Parabolic interpolation around `lag`; falls back to `lag` itself when
    /// a neighbour is missing or the curvature is too flat.
    fn refine(&self, lag: usize) -> f64 {
        if lag <= MIN_LAG || lag + 1 >= self.correlations.len() {
            return lag as f64;
        }
        let a = self.correlations[lag - 1];
        let b = self.correlations[lag];
        let c = self.correlations[lag + 1];
        let denom = a - 2.0 * b + c;
        if denom.abs() < 1e-12 {
            return lag as f64;
        }
        let shift = 0.5 * (a - c) / denom;
        if shift.abs() > 1.0 {
            return lag as f64;
        }
        lag as f64 + shift
    }
}

/// Root-mean-square level of a frame.
pub fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt()
}
