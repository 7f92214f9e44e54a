/// Pitch provider - maps scale degrees to frequencies
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// G3
pub const DEFAULT_ROOT: u8 = 55;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleKind {
    Major,
    #[default]
    NaturalMinor,
    HarmonicMinor,
    Dorian,
    Phrygian,
    Mixolydian,
    MajorPentatonic,
    MinorPentatonic,
    Chromatic,
}

impl ScaleKind {
    pub const ALL: [ScaleKind; 9] = [
        ScaleKind::Major,
        ScaleKind::NaturalMinor,
        ScaleKind::HarmonicMinor,
        ScaleKind::Dorian,
        ScaleKind::Phrygian,
        ScaleKind::Mixolydian,
        ScaleKind::MajorPentatonic,
        ScaleKind::MinorPentatonic,
        ScaleKind::Chromatic,
    ];

    pub fn intervals(&self) -> &'static [u8] {
        match self {
            ScaleKind::Major => &[0, 2, 4, 5, 7, 9, 11],
            ScaleKind::NaturalMinor => &[0, 2, 3, 5, 7, 8, 10],
            ScaleKind::HarmonicMinor => &[0, 2, 3, 5, 7, 8, 11],
            ScaleKind::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            ScaleKind::Phrygian => &[0, 1, 3, 5, 7, 8, 10],
            ScaleKind::Mixolydian => &[0, 2, 4, 5, 7, 9, 10],
            ScaleKind::MajorPentatonic => &[0, 2, 4, 7, 9],
            ScaleKind::MinorPentatonic => &[0, 3, 5, 7, 10],
            ScaleKind::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScaleKind::Major => "Major",
            ScaleKind::NaturalMinor => "Natural minor",
            ScaleKind::HarmonicMinor => "Harmonic minor",
            ScaleKind::Dorian => "Dorian",
            ScaleKind::Phrygian => "Phrygian",
            ScaleKind::Mixolydian => "Mixolydian",
            ScaleKind::MajorPentatonic => "Major pentatonic",
            ScaleKind::MinorPentatonic => "Minor pentatonic",
            ScaleKind::Chromatic => "Chromatic",
        }
    }
}

/// One octave of a scale, from the root up to and including the octave above
/// it. A seven-note scale therefore has eight degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct Scale {
    root: u8,
    kind: ScaleKind,
    notes: Vec<u8>,
    frequencies: Vec<f32>,
}

impl Scale {
    pub fn new(root: u8, kind: ScaleKind) -> Self {
        let root = root.min(127 - 12);
        let notes: Vec<u8> = kind
            .intervals()
            .iter()
            .map(|iv| root + iv)
            .chain(std::iter::once(root + 12))
            .collect();
        let frequencies = notes.iter().map(|&n| midi_note_to_frequency(n)).collect();

        Self {
            root,
            kind,
            notes,
            frequencies,
        }
    }

    /// Scale from an explicit, ordered list of frequencies. Empty lists and
    /// non-positive or non-finite pitches are rejected.
    pub fn from_frequencies(frequencies: Vec<f32>) -> Result<Self> {
        if frequencies.is_empty() || !frequencies.iter().all(|f| f.is_finite() && *f > 0.0) {
            return Err(Error::InvalidScale(frequencies));
        }
        Ok(Self {
            root: 0,
            kind: ScaleKind::Chromatic,
            notes: Vec::new(),
            frequencies,
        })
    }

    pub fn root(&self) -> u8 {
        self.root
    }

    pub fn kind(&self) -> ScaleKind {
        self.kind
    }

    /// Number of degrees
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    pub fn frequency(&self, degree: usize) -> Option<f32> {
        self.frequencies.get(degree).copied()
    }

    pub fn frequencies(&self) -> &[f32] {
        &self.frequencies
    }

    pub fn note_name(&self, degree: usize) -> Option<String> {
        self.notes.get(degree).map(|&n| midi_note_name(n))
    }
}

impl Default for Scale {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT, ScaleKind::default())
    }
}

pub fn midi_note_to_frequency(note: u8) -> f32 {
    440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0)
}

pub fn midi_note_name(note: u8) -> String {
    let note_names = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
    let octave = (note / 12) as i32 - 1;
    let note_index = (note % 12) as usize;
    format!("{}{}", note_names[note_index], octave)
}
