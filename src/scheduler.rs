//! Lookahead scheduler.
//!
//! Each tick schedules every grid step whose time falls inside
//! `[now, now + schedule_ahead)` on the audio clock, so the coarse tick timer
//! only has to run more often than the window is long. Times are kept in the
//! audio clock's domain; the scheduler never reads a wall clock.

use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::grid::{BeatGrid, StepIntensity};

/// Shortest step interval accepted by [`LookaheadScheduler::set_step_interval`].
pub const MIN_STEP_INTERVAL: f64 = 0.001;

/// Mutable scheduling state, owned by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleState {
    pub is_running: bool,
    pub current_step: usize,
    /// Audio-clock time of the next unfired step.
    pub next_event_time: f64,
    pub step_interval: f64,
}

/// One step handed to the audio layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduledStep {
    pub index: usize,
    pub intensity: StepIntensity,
    /// Audio-clock time at which the step sounds.
    pub time: f64,
    /// Wall-clock delay from the tick until the step sounds. Zero once the
    /// step is reported as sounding by the engine.
    pub ui_delay: Duration,
}

/// Speed trainer settings: every `bar_count` bars, raise the tempo by `increment`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedTrainerConfig {
    pub bar_count: u32,
    pub increment: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct SpeedTrainer {
    config: SpeedTrainerConfig,
    bars: u32,
}

impl SpeedTrainer {
    fn new(config: SpeedTrainerConfig) -> Self {
        SpeedTrainer {
            config: SpeedTrainerConfig {
                bar_count: config.bar_count.max(1),
                increment: if config.increment.is_finite() {
                    config.increment
                } else {
                    0.0
                },
            },
            bars: 1,
        }
    }

    /// Count a wrap back to step 0. Returns the new tempo when it is time to speed up.
    fn on_wrap(&mut self, bpm: f64, max_bpm: f64) -> Option<f64> {
        self.bars += 1;
        if self.bars > self.config.bar_count {
            self.bars = 1;
            Some((bpm + self.config.increment).min(max_bpm))
        } else {
            None
        }
    }
}

/// What one tick produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutput {
    pub steps: Vec<ScheduledStep>,
    /// New tempo if the speed trainer fired during this tick.
    pub tempo_change: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct LookaheadScheduler {
    state: ScheduleState,
    grid: BeatGrid,
    bpm: f64,
    /// Step length in beats, so the interval follows tempo changes.
    step_beats: f64,
    schedule_ahead: f64,
    lookahead: f64,
    max_events_per_tick: usize,
    default_bpm: f64,
    min_bpm: f64,
    max_bpm: f64,
    trainer: Option<SpeedTrainer>,
}

impl LookaheadScheduler {
    pub fn new(config: &EngineConfig) -> Self {
        let grid = BeatGrid::standard(4, 1);
        let step_beats = grid.step_beats().unwrap_or(1.0);
        let bpm = config.default_bpm;
        LookaheadScheduler {
            state: ScheduleState {
                is_running: false,
                current_step: 0,
                next_event_time: 0.0,
                step_interval: step_beats * 60.0 / bpm,
            },
            grid,
            bpm,
            step_beats,
            schedule_ahead: config.schedule_ahead_secs(),
            lookahead: config.lookahead_secs(),
            max_events_per_tick: config.max_events_per_tick,
            default_bpm: config.default_bpm,
            min_bpm: config.min_bpm,
            max_bpm: config.max_bpm,
            trainer: None,
        }
    }

    pub fn state(&self) -> &ScheduleState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn grid(&self) -> &BeatGrid {
        &self.grid
    }

    pub fn step_interval(&self) -> f64 {
        self.state.step_interval
    }

    /// Re-poll period for whatever timer drives [`tick`](Self::tick).
    pub fn lookahead(&self) -> Duration {
        Duration::from_secs_f64(self.lookahead)
    }

    /// Replace tempo and pattern. Takes effect on the next tick.
    ///
    /// Invalid tempos are replaced with the default; valid ones are clamped.
    pub fn set_params(&mut self, bpm: f64, grid: BeatGrid) {
        self.bpm = self.sanitize_bpm(bpm);
        if let Some(beats) = grid.step_beats() {
            self.step_beats = beats;
        }
        self.state.current_step = if grid.is_empty() {
            0
        } else {
            self.state.current_step % grid.len()
        };
        self.grid = grid;
        self.refresh_interval();
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = self.sanitize_bpm(bpm);
        self.refresh_interval();
    }

    /// Override the step duration in seconds (clamped to at least 1 ms).
    pub fn set_step_interval(&mut self, seconds: f64) {
        let seconds = if seconds.is_finite() {
            seconds.max(MIN_STEP_INTERVAL)
        } else {
            MIN_STEP_INTERVAL
        };
        self.step_beats = seconds * self.bpm / 60.0;
        self.refresh_interval();
    }

    pub fn set_speed_trainer(&mut self, config: Option<SpeedTrainerConfig>) {
        self.trainer = config.map(SpeedTrainer::new);
    }

    /// Begin scheduling from step 0 at `now`. No-op if already running.
    pub fn start(&mut self, now: f64) {
        if self.state.is_running {
            return;
        }
        self.state.is_running = true;
        self.state.current_step = 0;
        self.state.next_event_time = now;
        if let Some(trainer) = self.trainer.as_mut() {
            trainer.bars = 1;
        }
        debug!(target: "engine::scheduler", "start at {now:.3}s, {} BPM", self.bpm);
    }

    /// Stop scheduling and rewind to step 0. No-op if already stopped.
    pub fn stop(&mut self) {
        if !self.state.is_running {
            return;
        }
        self.state.is_running = false;
        self.state.current_step = 0;
        debug!(target: "engine::scheduler", "stop");
    }

    /// Schedule every step due before `now + schedule_ahead`.
    pub fn tick(&mut self, now: f64) -> TickOutput {
        let mut out = TickOutput::default();
        if !self.state.is_running || self.grid.is_empty() {
            return out;
        }

        // Fell behind (pause, stalled host): resume from the present.
        if self.state.next_event_time < now {
            self.state.next_event_time = now;
        }

        let horizon = now + self.schedule_ahead;
        while self.state.next_event_time < horizon {
            if out.steps.len() >= self.max_events_per_tick {
                warn!(
                    target: "engine::scheduler",
                    "tick scheduled {} steps, deferring the rest",
                    out.steps.len()
                );
                break;
            }

            let index = self.state.current_step;
            let time = self.state.next_event_time;
            out.steps.push(ScheduledStep {
                index,
                intensity: self.grid.get(index).unwrap_or(StepIntensity::Mute),
                time,
                ui_delay: Duration::from_secs_f64((time - now).max(0.0)),
            });

            self.state.current_step = (index + 1) % self.grid.len();
            if self.state.current_step == 0 {
                let max_bpm = self.max_bpm;
                let bpm = self.bpm;
                if let Some(new_bpm) = self.trainer.as_mut().and_then(|t| t.on_wrap(bpm, max_bpm)) {
                    debug!(target: "engine::scheduler", "speed trainer: {bpm} -> {new_bpm} BPM");
                    self.bpm = new_bpm;
                    self.refresh_interval();
                    out.tempo_change = Some(new_bpm);
                }
            }
            self.state.next_event_time += self.state.step_interval;
        }
        out
    }

    fn sanitize_bpm(&self, bpm: f64) -> f64 {
        if !bpm.is_finite() || bpm <= 0.0 {
            warn!(target: "engine::scheduler", "invalid tempo {bpm}, using {}", self.default_bpm);
            return self.default_bpm;
        }
        bpm.clamp(self.min_bpm, self.max_bpm)
    }

    fn refresh_interval(&mut self) {
        self.state.step_interval = (self.step_beats * 60.0 / self.bpm).max(MIN_STEP_INTERVAL);
    }
}
