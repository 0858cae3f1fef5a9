//! Engine: owns the audio clock and every sound source, and renders
//! them into the output buffer.
//!
//! The engine lives on the audio thread. Everything else talks to it through
//! an [`EngineHandle`], whose commands are applied at the start of the next
//! render block, and listens on the [`EngineEvent`] channel. Scheduled steps
//! wait in a queue and start their click on the exact frame they are due.

use std::collections::VecDeque;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::context::{AudioClock, AudioContext};
use crate::dsp::click::Click;
use crate::dsp::envelope::EnvelopeMode;
use crate::dsp::mixer::Mixer;
use crate::dsp::oscillator::Waveform;
use crate::dsp::voices::{ChordQuality, VoiceManager};
use crate::grid::BeatGrid;
use crate::scheduler::{LookaheadScheduler, ScheduledStep, SpeedTrainerConfig};

/// Frames rendered per inner block.
pub const BLOCK_SIZE: usize = 128;
/// Events buffered for a slow consumer before new ones are dropped.
const EVENT_CAPACITY: usize = 1024;

/// State changes queued by an [`EngineHandle`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetParams { bpm: f64, grid: BeatGrid },
    SetBpm(f64),
    SetStepInterval(f64),
    SetSpeedTrainer(Option<SpeedTrainerConfig>),
    Start,
    Stop,
    NoteOn(u8),
    NoteOff { midi: u8, immediate: bool },
    ChordOn { root: u8, quality: Option<ChordQuality> },
    ChordOff { root: u8, immediate: bool },
    StopAll,
    SetVolume(f64),
    SetEnvelopeMode(EnvelopeMode),
    SetWaveform(Waveform),
    SetChordAssist(bool),
}

/// Notifications for the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    /// A step started sounding on the audio clock.
    Step(ScheduledStep),
    /// The speed trainer raised the tempo.
    TempoChanged { bpm: f64 },
    Started,
    Stopped,
}

/// Cloneable, thread-safe entry point into a running [`Engine`].
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: Sender<Command>,
}

impl EngineHandle {
    pub fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            debug!(target: "engine", "engine dropped, command ignored");
        }
    }

    pub fn set_params(&self, bpm: f64, grid: BeatGrid) {
        self.send(Command::SetParams { bpm, grid });
    }

    pub fn set_bpm(&self, bpm: f64) {
        self.send(Command::SetBpm(bpm));
    }

    pub fn set_step_interval(&self, seconds: f64) {
        self.send(Command::SetStepInterval(seconds));
    }

    pub fn set_speed_trainer(&self, config: Option<SpeedTrainerConfig>) {
        self.send(Command::SetSpeedTrainer(config));
    }

    pub fn start(&self) {
        self.send(Command::Start);
    }

    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    pub fn note_on(&self, midi: u8) {
        self.send(Command::NoteOn(midi));
    }

    pub fn note_off(&self, midi: u8, immediate: bool) {
        self.send(Command::NoteOff { midi, immediate });
    }

    pub fn chord_on(&self, root: u8, quality: Option<ChordQuality>) {
        self.send(Command::ChordOn { root, quality });
    }

    pub fn chord_off(&self, root: u8, immediate: bool) {
        self.send(Command::ChordOff { root, immediate });
    }

    pub fn stop_all(&self) {
        self.send(Command::StopAll);
    }

    pub fn set_volume(&self, volume: f64) {
        self.send(Command::SetVolume(volume));
    }

    pub fn set_envelope_mode(&self, mode: EnvelopeMode) {
        self.send(Command::SetEnvelopeMode(mode));
    }

    pub fn set_waveform(&self, waveform: Waveform) {
        self.send(Command::SetWaveform(waveform));
    }

    pub fn set_chord_assist(&self, enabled: bool) {
        self.send(Command::SetChordAssist(enabled));
    }
}

pub struct Engine {
    context: AudioContext,
    scheduler: LookaheadScheduler,
    voices: VoiceManager,
    clicks: Vec<Click>,
    mixer: Mixer,
    /// Scheduled steps not yet sounding, in time order.
    pending: VecDeque<ScheduledStep>,
    /// Frame at which the scheduler is next re-polled.
    next_tick_frame: u64,
    tick_frames: u64,
    command_tx: Sender<Command>,
    commands: Receiver<Command>,
    event_tx: Sender<EngineEvent>,
    event_rx: Receiver<EngineEvent>,
    mix: Vec<f64>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let config = config.sanitized();
        let sample_rate = config.sample_rate;
        let (command_tx, commands) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::bounded(EVENT_CAPACITY);
        let context = AudioContext::new(sample_rate);
        let tick_frames = (context.seconds_to_samples(config.lookahead_secs()) as u64).max(1);
        Engine {
            scheduler: LookaheadScheduler::new(&config),
            voices: VoiceManager::new(
                sample_rate,
                config.waveform,
                config.envelope_mode,
                config.voice_timeout_secs,
            ),
            clicks: Vec::new(),
            mixer: Mixer::new(config.master_volume, config.volume_ramp_ms / 1000.0, sample_rate),
            pending: VecDeque::new(),
            next_tick_frame: 0,
            tick_frames,
            command_tx,
            commands,
            event_tx,
            event_rx,
            mix: vec![0.0; BLOCK_SIZE],
            context,
        }
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            tx: self.command_tx.clone(),
        }
    }

    pub fn events(&self) -> Receiver<EngineEvent> {
        self.event_rx.clone()
    }

    pub fn context(&self) -> &AudioContext {
        &self.context
    }

    pub fn scheduler(&self) -> &LookaheadScheduler {
        &self.scheduler
    }

    pub fn voices(&self) -> &VoiceManager {
        &self.voices
    }

    pub fn current_time(&self) -> f64 {
        self.context.current_time()
    }

    pub fn bpm(&self) -> f64 {
        self.scheduler.bpm()
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Steps scheduled but not yet sounding.
    pub fn pending_steps(&self) -> usize {
        self.pending.len()
    }

    pub fn set_params(&mut self, bpm: f64, grid: BeatGrid) {
        self.scheduler.set_params(bpm, grid);
    }

    pub fn set_step_interval(&mut self, seconds: f64) {
        self.scheduler.set_step_interval(seconds);
    }

    /// Start the metronome at the current audio time. The first step sounds
    /// at the start of the next rendered block.
    pub fn start(&mut self) {
        if self.scheduler.is_running() {
            return;
        }
        self.scheduler.start(self.context.current_time());
        debug!(target: "engine", "started at {:.3}s", self.context.current_time());
        self.emit(EngineEvent::Started);
        self.tick();
    }

    /// Stop the metronome. Steps already scheduled but not yet sounding are
    /// dropped; clicks already sounding ring out.
    pub fn stop(&mut self) {
        if !self.scheduler.is_running() {
            return;
        }
        self.scheduler.stop();
        self.pending.clear();
        debug!(target: "engine", "stopped");
        self.emit(EngineEvent::Stopped);
    }

    /// Re-poll the scheduler against the audio clock.
    pub fn tick(&mut self) {
        let output = self.scheduler.tick(self.context.current_time());
        self.pending.extend(output.steps);
        if let Some(bpm) = output.tempo_change {
            self.emit(EngineEvent::TempoChanged { bpm });
        }
        self.next_tick_frame = self.context.frames() + self.tick_frames;
    }

    pub fn note_on(&mut self, midi: u8) {
        self.voices.play(midi);
    }

    pub fn note_off(&mut self, midi: u8, immediate: bool) {
        self.voices.stop(midi, immediate);
    }

    pub fn stop_all(&mut self) {
        self.voices.stop_all();
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.mixer.set_volume(volume);
    }

    pub fn apply(&mut self, command: Command) {
        match command {
            Command::SetParams { bpm, grid } => self.set_params(bpm, grid),
            Command::SetBpm(bpm) => self.scheduler.set_bpm(bpm),
            Command::SetStepInterval(seconds) => self.set_step_interval(seconds),
            Command::SetSpeedTrainer(config) => self.scheduler.set_speed_trainer(config),
            Command::Start => self.start(),
            Command::Stop => self.stop(),
            Command::NoteOn(midi) => self.note_on(midi),
            Command::NoteOff { midi, immediate } => self.note_off(midi, immediate),
            Command::ChordOn { root, quality } => self.voices.press(root, quality),
            Command::ChordOff { root, immediate } => self.voices.release(root, immediate),
            Command::StopAll => self.stop_all(),
            Command::SetVolume(volume) => self.set_volume(volume),
            Command::SetEnvelopeMode(mode) => self.voices.set_envelope_mode(mode),
            Command::SetWaveform(waveform) => self.voices.set_waveform(waveform),
            Command::SetChordAssist(enabled) => self.voices.set_chord_assist(enabled),
        }
    }

    /// Render `out.len()` mono frames and advance the audio clock.
    pub fn process(&mut self, out: &mut [f32]) {
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
        }

        let mut offset = 0;
        while offset < out.len() {
            let frame = self.context.frames();
            if self.scheduler.is_running() && frame >= self.next_tick_frame {
                self.tick();
            }
            while let Some(step) = self.pending.front().copied() {
                if self.context.frame_at(step.time) > frame {
                    break;
                }
                self.pending.pop_front();
                self.fire(step);
            }

            // Render up to the next step onset or scheduler re-poll.
            let mut len = (out.len() - offset).min(BLOCK_SIZE);
            if let Some(step) = self.pending.front() {
                len = len.min((self.context.frame_at(step.time) - frame) as usize);
            }
            if self.scheduler.is_running() {
                len = len.min(self.next_tick_frame.saturating_sub(frame) as usize);
            }
            let len = len.max(1);

            let mix = &mut self.mix[..len];
            mix.fill(0.0);
            self.voices.render_add(mix);
            for click in self.clicks.iter_mut() {
                for sample in mix.iter_mut() {
                    *sample += click.next_sample();
                }
            }
            self.clicks.retain(|c| !c.is_finished());
            self.mixer.process(mix, &mut out[offset..offset + len]);

            self.context.advance(len as u64);
            offset += len;
        }
    }

    fn fire(&mut self, step: ScheduledStep) {
        if let Some(click) = Click::for_step(step.intensity, self.context.sample_rate()) {
            self.clicks.push(click);
        }
        self.emit(EngineEvent::Step(ScheduledStep {
            ui_delay: Duration::ZERO,
            ..step
        }));
    }

    fn emit(&self, event: EngineEvent) {
        if let Err(TrySendError::Full(_)) = self.event_tx.try_send(event) {
            debug!(target: "engine", "event queue full, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::StepIntensity;

    const SR: f64 = 44100.0;

    fn engine() -> Engine {
        Engine::new(EngineConfig::default())
    }

    fn render(engine: &mut Engine, seconds: f64) -> Vec<f32> {
        let mut out = vec![0.0f32; (seconds * SR) as usize];
        for chunk in out.chunks_mut(512) {
            engine.process(chunk);
        }
        out
    }

    fn steps(rx: &Receiver<EngineEvent>) -> Vec<ScheduledStep> {
        rx.try_iter()
            .filter_map(|e| match e {
                EngineEvent::Step(step) => Some(step),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn idle_engine_is_silent() {
        let mut e = engine();
        let out = render(&mut e, 0.5);
        assert!(out.iter().all(|&s| s == 0.0));
        assert!((e.current_time() - 0.5).abs() < 1e-3);
    }

    #[test]
    fn metronome_fires_on_the_beat() {
        let mut e = engine();
        let events = e.events();
        e.set_params(120.0, BeatGrid::standard(4, 1));
        e.start();
        render(&mut e, 2.05);

        let fired = steps(&events);
        let indices: Vec<usize> = fired.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 0]);
        assert_eq!(fired[0].intensity, StepIntensity::Strong);
        assert_eq!(fired[1].intensity, StepIntensity::Weak);
        for (i, step) in fired.iter().enumerate() {
            assert!((step.time - i as f64 * 0.5).abs() < 1e-9, "step {i} at {}", step.time);
        }
    }

    #[test]
    fn sounding_steps_carry_no_ui_delay() {
        let mut e = engine();
        let events = e.events();
        e.set_params(120.0, BeatGrid::standard(4, 4));
        e.start();
        render(&mut e, 0.5);
        let fired = steps(&events);
        assert!(fired.len() > 1);
        assert!(fired.iter().all(|s| s.ui_delay == Duration::ZERO));
    }

    #[test]
    fn click_starts_on_its_frame() {
        let mut e = engine();
        e.set_params(120.0, BeatGrid::standard(4, 1));
        e.start();
        let out = render(&mut e, 0.6);

        // First click at frame 0, second at 0.5s; silence in between.
        assert!(out[..200].iter().any(|s| s.abs() > 0.05));
        let gap_start = (0.1 * SR) as usize;
        let second = (0.5 * SR) as usize;
        assert!(out[gap_start..second].iter().all(|&s| s == 0.0));
        assert!(out[second..second + 200].iter().any(|s| s.abs() > 0.05));
    }

    #[test]
    fn stop_cancels_pending_steps() {
        let mut e = engine();
        let events = e.events();
        // 16th notes at 300 BPM: several steps are queued at any time.
        e.set_params(300.0, BeatGrid::standard(4, 4));
        e.start();
        render(&mut e, 0.01);
        assert!(e.pending_steps() > 0);

        e.stop();
        assert_eq!(e.pending_steps(), 0);
        events.try_iter().count();
        render(&mut e, 0.5);
        assert!(steps(&events).is_empty());
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let mut e = engine();
        let events = e.events();
        e.start();
        e.start();
        e.stop();
        e.stop();
        let lifecycle: Vec<EngineEvent> = events
            .try_iter()
            .filter(|e| !matches!(e, EngineEvent::Step(_)))
            .collect();
        assert_eq!(lifecycle, vec![EngineEvent::Started, EngineEvent::Stopped]);
    }

    #[test]
    fn handle_commands_apply_on_next_block() {
        let mut e = engine();
        let handle = e.handle();
        handle.set_params(90.0, BeatGrid::standard(3, 1));
        handle.start();
        assert!(!e.is_running());

        render(&mut e, 0.01);
        assert!(e.is_running());
        assert_eq!(e.bpm(), 90.0);
        assert_eq!(e.scheduler().grid().len(), 3);
    }

    #[test]
    fn handle_outlives_engine() {
        let handle = engine().handle();
        handle.note_on(60);
    }

    #[test]
    fn notes_sound_through_handle() {
        let mut e = engine();
        let handle = e.handle();
        handle.note_on(69);
        let out = render(&mut e, 0.1);
        assert!(e.voices().is_active(69));
        assert!(out.iter().any(|s| s.abs() > 0.05));

        handle.note_off(69, true);
        render(&mut e, 0.2);
        assert!(!e.voices().is_active(69));
        assert_eq!(e.voices().releasing_count(), 0);
    }

    #[test]
    fn chord_assist_through_handle() {
        let mut e = engine();
        let handle = e.handle();
        handle.set_chord_assist(true);
        handle.chord_on(60, Some(ChordQuality::Major));
        render(&mut e, 0.01);
        assert_eq!(e.voices().active_pitches(), vec![60, 64, 67]);

        handle.chord_off(60, false);
        render(&mut e, 0.01);
        assert_eq!(e.voices().active_count(), 0);
    }

    #[test]
    fn speed_trainer_reports_tempo_change() {
        let mut e = engine();
        let events = e.events();
        e.set_params(100.0, BeatGrid::standard(1, 1));
        e.handle().set_speed_trainer(Some(SpeedTrainerConfig {
            bar_count: 1,
            increment: 10.0,
        }));
        e.handle().start();
        render(&mut e, 1.0);
        let changes: Vec<f64> = events
            .try_iter()
            .filter_map(|e| match e {
                EngineEvent::TempoChanged { bpm } => Some(bpm),
                _ => None,
            })
            .collect();
        assert_eq!(changes.first(), Some(&110.0));
        assert!(e.bpm() > 100.0);
    }

    #[test]
    fn output_stays_in_range() {
        let mut e = engine();
        e.set_volume(1.0);
        for midi in 40..80 {
            e.note_on(midi);
        }
        let out = render(&mut e, 0.1);
        assert!(out.iter().all(|s| s.abs() <= 1.0));
    }
}
