use thiserror::Error;

/// Errors surfaced to the caller of the engine.
///
/// Range problems (tempo, grid sizes, frequencies) never show up here: they
/// are clamped or replaced with defaults where they occur. Only one-shot
/// setup failures are reported.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No audio device available: {0}")]
    DeviceUnavailable(String),

    #[error("Microphone permission denied")]
    PermissionDenied,

    #[error("Unsupported stream configuration: {0}")]
    StreamConfig(String),

    #[error("Audio stream error: {0}")]
    Stream(String),

    #[error("Pitch listener is already running")]
    AlreadyListening,

    #[error("Invalid engine config: {0}")]
    Config(#[from] serde_json::Error),
}

/// Errors from authoring a rhythm pattern.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RhythmError {
    #[error("Cells span {total:.3} bars; a pattern must fit in one bar")]
    BarOverflow { total: f64 },

    #[error("Cell duration must be positive, got {0}")]
    InvalidDuration(f64),
}

pub type Result<T> = std::result::Result<T, EngineError>;
