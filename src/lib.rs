pub mod config;
pub mod context;
#[cfg(feature = "device")]
pub mod device;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod grid;
pub mod listener;
pub mod note;
pub mod rhythm;
pub mod scheduler;
pub mod timer;

pub use config::EngineConfig;
pub use dsp::tuner::detect_pitch;
pub use engine::{Command, Engine, EngineEvent, EngineHandle};
pub use error::{EngineError, RhythmError};
pub use grid::{BeatGrid, StepIntensity};
pub use listener::{PitchListener, PitchSample};
pub use note::{NoteName, NoteReading, frequency_to_note, midi_to_frequency};
pub use scheduler::{LookaheadScheduler, ScheduledStep, SpeedTrainerConfig};

use crossbeam_channel::Receiver;
use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the practice_engine version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: fundamental frequency of one analysis frame, or `undefined`.
#[wasm_bindgen]
pub fn detect_pitch_hz(samples: &[f32], sample_rate: f64) -> Option<f64> {
    detect_pitch(samples, sample_rate)
}

/// WASM-exposed: note, octave and cents for a frequency as a JS object.
#[wasm_bindgen]
pub fn frequency_to_note_js(hz: f64) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(&frequency_to_note(hz))
        .map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: standard grid as step codes (see [`StepIntensity::code`]).
#[wasm_bindgen]
pub fn standard_grid_js(beats: u32, subdivision: u32) -> Vec<u8> {
    grid_codes(&BeatGrid::standard(beats, subdivision))
}

/// WASM-exposed: polyrhythm grid as step codes.
#[wasm_bindgen]
pub fn polyrhythm_grid_js(steps_a: u32, steps_b: u32) -> Vec<u8> {
    grid_codes(&BeatGrid::polyrhythm(steps_a, steps_b))
}

fn grid_codes(grid: &BeatGrid) -> Vec<u8> {
    grid.steps().iter().map(|s| s.code()).collect()
}

/// Engine driven from an AudioWorklet: the worklet calls `process` once per
/// render quantum and polls `drain_events` from the main thread's messages.
#[wasm_bindgen]
pub struct WebEngine {
    engine: Engine,
    events: Receiver<EngineEvent>,
}

#[wasm_bindgen]
impl WebEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(sample_rate: f64) -> WebEngine {
        let engine = Engine::new(EngineConfig {
            sample_rate,
            ..EngineConfig::default()
        });
        let events = engine.events();
        WebEngine { engine, events }
    }

    pub fn process(&mut self, out: &mut [f32]) {
        self.engine.process(out);
    }

    pub fn start(&mut self) {
        self.engine.start();
    }

    pub fn stop(&mut self) {
        self.engine.stop();
    }

    pub fn is_running(&self) -> bool {
        self.engine.is_running()
    }

    pub fn current_time(&self) -> f64 {
        self.engine.current_time()
    }

    pub fn bpm(&self) -> f64 {
        self.engine.bpm()
    }

    /// Standard grid: `beats` per bar, `subdivision` steps per beat.
    pub fn set_params(&mut self, bpm: f64, beats: u32, subdivision: u32) {
        self.engine.set_params(bpm, BeatGrid::standard(beats, subdivision));
    }

    pub fn set_polyrhythm(&mut self, bpm: f64, steps_a: u32, steps_b: u32) {
        self.engine.set_params(bpm, BeatGrid::polyrhythm(steps_a, steps_b));
    }

    /// User-edited standard grid, one step code per cell.
    pub fn set_grid(&mut self, bpm: f64, codes: &[u8], subdivision: u32) {
        let steps = codes.iter().map(|&c| StepIntensity::from_code(c)).collect();
        self.engine.set_params(bpm, BeatGrid::from_steps(steps, subdivision));
    }

    pub fn set_speed_trainer(&mut self, bar_count: u32, increment: f64) {
        self.engine.apply(Command::SetSpeedTrainer(Some(SpeedTrainerConfig {
            bar_count,
            increment,
        })));
    }

    pub fn clear_speed_trainer(&mut self) {
        self.engine.apply(Command::SetSpeedTrainer(None));
    }

    pub fn note_on(&mut self, midi: u8) {
        self.engine.note_on(midi);
    }

    pub fn note_off(&mut self, midi: u8, immediate: bool) {
        self.engine.note_off(midi, immediate);
    }

    pub fn stop_all(&mut self) {
        self.engine.stop_all();
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.engine.set_volume(volume);
    }

    /// Events since the last call, as an array of tagged JS objects.
    pub fn drain_events(&self) -> Result<JsValue, JsValue> {
        let events: Vec<EngineEvent> = self.events.try_iter().collect();
        serde_wasm_bindgen::to_value(&events).map_err(|e| JsValue::from_str(&format!("{e}")))
    }
}
