/// METRO - A lookahead step sequencer library
///
/// This library provides the core components of a 16-step tone sequencer:
/// - Step grid with per-step mode and repeat count
/// - Lookahead scheduling against an audio clock
/// - Transport control with a cancellable timer
/// - Audio output for playback

pub mod audio;
pub mod config;
pub mod error;
pub mod scale;
pub mod sequencer;

// Re-export commonly used types
pub use audio::{AudioEngine, EngineClock, ToneSender};
pub use config::Config;
pub use error::{Error, Result};
pub use scale::{midi_note_name, Scale, ScaleKind};
pub use sequencer::dispatch::{ScheduledEvent, ToneSink};
pub use sequencer::playback::{AudioClock, PlaybackEngine, Snapshot, Timing};
pub use sequencer::{Mode, Resolution, Sequencer, Step, StepGrid, StepMode, StepUpdate};
