//! Configuration file support for metro
//!
//! Every field is optional; anything missing falls back to its default.
//!
//! ```toml
//! [transport]
//! tempo = 120.0
//! gate_length = 0.3
//! resolution = "sixteenth"   # "sixteenth", "eighth" or "quarter"
//!
//! [scale]
//! root = 55                  # MIDI note, 55 = G3
//! kind = "natural_minor"
//!
//! [scheduler]
//! lookahead_ms = 25
//! schedule_ahead = 0.1
//!
//! [audio]
//! cutoff = 50.0
//! resonance = 10.0
//! delay_feedback = 0.0
//! delay_wet = 0.2
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::scale::{Scale, ScaleKind, DEFAULT_ROOT};
use crate::sequencer::dispatch::ToneSink;
use crate::sequencer::playback::Timing;
use crate::sequencer::{Resolution, Sequencer, DEFAULT_GATE_LENGTH, DEFAULT_TEMPO};

/// Longest scheduling window accepted, seconds
pub const MAX_SCHEDULE_AHEAD: f64 = 1.0;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub transport: TransportSettings,
    pub scale: ScaleSettings,
    pub scheduler: SchedulerSettings,
    pub audio: AudioSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Beats per minute
    pub tempo: f64,
    /// Fraction of a beat a note sounds for
    pub gate_length: f64,
    pub resolution: Resolution,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            tempo: DEFAULT_TEMPO,
            gate_length: DEFAULT_GATE_LENGTH,
            resolution: Resolution::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleSettings {
    /// MIDI note of the first degree
    pub root: u8,
    pub kind: ScaleKind,
}

impl Default for ScaleSettings {
    fn default() -> Self {
        Self {
            root: DEFAULT_ROOT,
            kind: ScaleKind::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Timer interval in milliseconds
    pub lookahead_ms: u64,
    /// Seconds scheduled ahead of the audio clock on each tick
    pub schedule_ahead: f64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        let timing = Timing::default();
        Self {
            lookahead_ms: timing.lookahead.as_millis() as u64,
            schedule_ahead: timing.schedule_ahead,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Filter cutoff control, 0..100
    pub cutoff: f32,
    /// Filter resonance control, 0..100
    pub resonance: f32,
    pub delay_feedback: f32,
    pub delay_wet: f32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            cutoff: 50.0,
            resonance: 10.0,
            delay_feedback: 0.0,
            delay_wet: 0.2,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.scheduler.lookahead_ms == 0 {
            return Err(Error::Config("lookahead_ms must be at least 1".to_string()));
        }
        let ahead = self.scheduler.schedule_ahead;
        if !(ahead > 0.0 && ahead <= MAX_SCHEDULE_AHEAD) {
            return Err(Error::Config(format!(
                "schedule_ahead must be within (0, {MAX_SCHEDULE_AHEAD}] seconds, got {ahead}"
            )));
        }
        if ahead * 1000.0 <= self.scheduler.lookahead_ms as f64 {
            log::warn!(
                "schedule_ahead ({ahead}s) does not cover the {}ms lookahead interval, expect gaps",
                self.scheduler.lookahead_ms
            );
        }
        Ok(())
    }

    pub fn timing(&self) -> Timing {
        Timing {
            lookahead: Duration::from_millis(self.scheduler.lookahead_ms),
            schedule_ahead: self.scheduler.schedule_ahead,
        }
    }

    pub fn build_scale(&self) -> Scale {
        Scale::new(self.scale.root, self.scale.kind)
    }

    /// A sequencer with the configured scale and transport settings
    pub fn sequencer<S: ToneSink>(&self, sink: S) -> Result<Sequencer<S>> {
        let mut sequencer = Sequencer::new(self.build_scale(), sink);
        sequencer.set_tempo(self.transport.tempo)?;
        sequencer.set_gate_length(self.transport.gate_length)?;
        sequencer.set_resolution(self.transport.resolution);
        Ok(sequencer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::testing::RecordingSink;

    #[test]
    fn test_empty_config_is_default() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.timing(), Timing::default());
    }

    #[test]
    fn test_parse_sections() {
        let config = Config::from_toml_str(
            r#"
            [transport]
            tempo = 90.0
            resolution = "quarter"

            [scale]
            root = 60
            kind = "major"

            [scheduler]
            lookahead_ms = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.transport.tempo, 90.0);
        assert_eq!(config.transport.gate_length, DEFAULT_GATE_LENGTH);
        assert_eq!(config.transport.resolution, Resolution::Quarter);
        assert_eq!(config.scale.kind, ScaleKind::Major);
        assert_eq!(config.timing().lookahead, Duration::from_millis(10));

        let sequencer = config.sequencer(RecordingSink::default()).unwrap();
        assert_eq!(sequencer.tempo(), 90.0);
        assert_eq!(sequencer.resolution(), Resolution::Quarter);
        assert_eq!(sequencer.scale().root(), 60);
    }

    #[test]
    fn test_invalid_tempo_fails_to_build() {
        let config = Config::from_toml_str("[transport]\ntempo = 0.0\n").unwrap();
        assert!(matches!(
            config.sequencer(RecordingSink::default()),
            Err(Error::InvalidTempo(_))
        ));
    }

    #[test]
    fn test_rejects_bad_scheduler_settings() {
        assert!(Config::from_toml_str("[scheduler]\nlookahead_ms = 0\n").is_err());
        assert!(Config::from_toml_str("[scheduler]\nschedule_ahead = -1.0\n").is_err());
        assert!(matches!(
            Config::from_toml_str("[scheduler]\nschedule_ahead = 1e6\n"),
            Err(Error::Config(_))
        ));
        assert!(Config::from_toml_str("[scheduler]\nschedule_ahead = 1.0\n").is_ok());
        assert!(matches!(
            Config::from_toml_str("[transport]\nresolution = \"triplet\"\n"),
            Err(Error::TomlParse(_))
        ));
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(Config::from_toml_str(&text).unwrap(), config);
    }
}
