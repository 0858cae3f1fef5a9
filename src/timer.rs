//! Cancellable periodic task handle.
//!
//! Hosts that drive the engine from wall-clock timers (a UI event loop, a
//! display-frame callback) poll an [`Interval`] and run their work when it
//! reports due. Cancelling flips the active flag first so a poll racing the
//! cancel never fires.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Interval {
    period: Duration,
    next_due: Option<Instant>,
}

impl Interval {
    /// A stopped interval with the given period.
    pub fn new(period: Duration) -> Self {
        Interval {
            period,
            next_due: None,
        }
    }

    pub fn from_millis(ms: f64) -> Self {
        Self::new(Duration::from_secs_f64(ms.max(0.0) / 1000.0))
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_active(&self) -> bool {
        self.next_due.is_some()
    }

    /// Arm the interval so the first poll at or after `now` fires.
    pub fn start(&mut self, now: Instant) {
        self.next_due = Some(now);
    }

    pub fn cancel(&mut self) {
        self.next_due = None;
    }

    /// Returns true when the task should run, re-arming for the next period.
    ///
    /// A late poll fires once and re-arms relative to `now`; missed periods
    /// are not replayed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(due) if now >= due => {
                self.next_due = Some(now + self.period);
                true
            }
            _ => false,
        }
    }

    /// Time left until the next firing, if armed.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.next_due.map(|due| due.saturating_duration_since(now))
    }
}
