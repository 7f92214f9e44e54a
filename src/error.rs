//! Error types for metro

use thiserror::Error;

/// Result type alias for metro operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in metro
///
/// The validation variants are raised at the mutation boundary, before any
/// state is touched, so the sequencer keeps its last valid configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// Step index outside the grid
    #[error("step index {0} out of range (0..16)")]
    StepOutOfRange(usize),

    /// Repeat count / hold length of zero
    #[error("repeat count must be at least 1")]
    ZeroCount,

    /// Scale degree outside the current scale
    #[error("scale degree {degree} out of range (scale has {len} degrees)")]
    DegreeOutOfRange { degree: usize, len: usize },

    /// Tempo outside 1..=1000 BPM
    #[error("tempo must be within 1..=1000 BPM, got {0}")]
    InvalidTempo(f64),

    /// Scale with no degrees, or a degree that is not an audible pitch
    #[error("scale needs at least one positive frequency, got {0:?}")]
    InvalidScale(Vec<f32>),

    /// Gate length outside (0, 1]
    #[error("gate length must be within (0, 1], got {0}")]
    InvalidGateLength(f64),

    /// The scheduler thread could not be spawned
    #[error("failed to start scheduler timer: {0}")]
    Timer(std::io::Error),

    /// Audio device / stream error
    #[error("Audio error: {0}")]
    Audio(String),

    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}
