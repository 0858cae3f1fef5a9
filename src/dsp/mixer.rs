//! Mixer: master gain with a short ramp on changes, then soft clipping.

/// Linearly ramped gain value for click-free volume changes.
#[derive(Debug, Clone)]
pub struct SmoothedGain {
    current: f64,
    target: f64,
    step: f64,
    remaining: usize,
    ramp_samples: usize,
}

impl SmoothedGain {
    pub fn new(initial: f64, ramp_secs: f64, sample_rate: f64) -> Self {
        SmoothedGain {
            current: initial,
            target: initial,
            step: 0.0,
            remaining: 0,
            ramp_samples: ((ramp_secs * sample_rate) as usize).max(1),
        }
    }

    pub fn set_target(&mut self, target: f64) {
        if (target - self.target).abs() < f64::EPSILON {
            return;
        }
        self.target = target;
        self.remaining = self.ramp_samples;
        self.step = (self.target - self.current) / self.remaining as f64;
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    #[inline]
    pub fn next_sample(&mut self) -> f64 {
        if self.remaining > 0 {
            self.remaining -= 1;
            self.current = if self.remaining == 0 {
                self.target
            } else {
                self.current + self.step
            };
        }
        self.current
    }
}

#[derive(Debug, Clone)]
pub struct Mixer {
    gain: SmoothedGain,
}

impl Mixer {
    pub fn new(master_volume: f64, ramp_secs: f64, sample_rate: f64) -> Self {
        Mixer {
            gain: SmoothedGain::new(master_volume.clamp(0.0, 1.0), ramp_secs, sample_rate),
        }
    }

    /// Ramp the master gain to `volume` over the configured ramp time.
    pub fn set_volume(&mut self, volume: f64) {
        self.gain.set_target(volume.clamp(0.0, 1.0));
    }

    pub fn volume(&self) -> f64 {
        self.gain.target()
    }

    /// Apply master gain and soft clipping, writing f32 output.
    pub fn process(&mut self, mix: &[f64], out: &mut [f32]) {
        for (o, &s) in out.iter_mut().zip(mix) {
            *o = soft_clip(s * self.gain.next_sample()) as f32;
        }
    }
}

/// Soft clipper using tanh to prevent harsh digital clipping.
fn soft_clip(x: f64) -> f64 {
    x.tanh()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_stays_silent() {
        let mut m = Mixer::new(0.8, 0.02, 44100.0);
        let mut out = [1.0f32; 64];
        m.process(&[0.0; 64], &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn soft_clip_prevents_overflow() {
        let mut m = Mixer::new(1.0, 0.02, 44100.0);
        let mut out = [0.0f32; 1];
        m.process(&[100.0], &mut out);
        assert!(out[0].abs() <= 1.0, "got {}", out[0]);
    }

    #[test]
    fn volume_change_ramps_over_20ms() {
        let mut gain = SmoothedGain::new(1.0, 0.02, 44100.0);
        gain.set_target(0.0);
        let first = gain.next_sample();
        assert!(first < 1.0 && first > 0.99, "no jump on first sample: {first}");
        for _ in 0..440 {
            gain.next_sample();
        }
        let mid = gain.next_sample();
        assert!((mid - 0.5).abs() < 0.01, "half-way at 10ms: {mid}");
        for _ in 0..500 {
            gain.next_sample();
        }
        assert_eq!(gain.next_sample(), 0.0);
    }

    #[test]
    fn volume_is_clamped() {
        let mut m = Mixer::new(2.0, 0.02, 44100.0);
        assert_eq!(m.volume(), 1.0);
        m.set_volume(-1.0);
        assert_eq!(m.volume(), 0.0);
    }
}
