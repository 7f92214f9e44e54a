//! Test doubles for the audio clock and tone sink

use std::sync::{Arc, Mutex};

use super::dispatch::ToneSink;
use super::playback::AudioClock;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub frequency: f32,
    pub start: f64,
    pub stop: f64,
}

/// Records every emitted tone; clones share the record
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    tones: Arc<Mutex<Vec<Tone>>>,
}

impl RecordingSink {
    pub fn tones(&self) -> Vec<Tone> {
        self.tones.lock().unwrap().clone()
    }
}

impl ToneSink for RecordingSink {
    type Handle = usize;

    fn emit_tone(&mut self, frequency: f32, start: f64, stop: f64) -> usize {
        let mut tones = self.tones.lock().unwrap();
        tones.push(Tone {
            frequency,
            start,
            stop,
        });
        tones.len() - 1
    }
}

/// Clock that only moves when told to
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<f64>>,
}

impl ManualClock {
    pub fn at(now: f64) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: f64) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, secs: f64) {
        *self.now.lock().unwrap() += secs;
    }
}

impl AudioClock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock().unwrap()
    }
}
