//! Audio context: the sample-accurate clock every component schedules against.
//!
//! Created once per engine and passed by reference to the scheduler and the
//! voice layer. Time only moves when rendered frames are counted with
//! [`AudioContext::advance`].

/// Something that exposes a monotonically increasing audio time in seconds.
pub trait AudioClock {
    fn current_time(&self) -> f64;
}

/// Owned audio context: sample rate plus a running frame counter.
#[derive(Debug, Clone)]
pub struct AudioContext {
    sample_rate: f64,
    frames: u64,
}

impl AudioContext {
    pub fn new(sample_rate: f64) -> Self {
        AudioContext {
            sample_rate,
            frames: 0,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Total frames rendered so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Advance the clock by `frames` rendered samples.
    pub fn advance(&mut self, frames: u64) {
        self.frames += frames;
    }

    /// Frame index at which an event at `time` seconds should sound.
    pub fn frame_at(&self, time: f64) -> u64 {
        (time.max(0.0) * self.sample_rate).round() as u64
    }

    pub fn seconds_to_samples(&self, seconds: f64) -> usize {
        (seconds.max(0.0) * self.sample_rate) as usize
    }
}

impl AudioClock for AudioContext {
    fn current_time(&self) -> f64 {
        self.frames as f64 / self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_advances_with_frames() {
        let mut ctx = AudioContext::new(48000.0);
        assert_eq!(ctx.current_time(), 0.0);
        ctx.advance(24000);
        assert!((ctx.current_time() - 0.5).abs() < 1e-12);
        assert_eq!(ctx.frame_at(0.5), 24000);
    }

    #[test]
    fn negative_times_map_to_frame_zero() {
        let ctx = AudioContext::new(44100.0);
        assert_eq!(ctx.frame_at(-1.0), 0);
        assert_eq!(ctx.seconds_to_samples(-0.2), 0);
    }
}
