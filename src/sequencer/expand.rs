/// Mode expansion - one step becomes a run of sixteenth-note events
use super::grid::StepMode;

/// One sixteenth-note advance produced by a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteEvent {
    /// Whether this advance starts a new attack
    pub sounding: bool,
    /// Sounding length in sixteenths
    pub length: u8,
}

impl NoteEvent {
    const REST: NoteEvent = NoteEvent {
        sounding: false,
        length: 1,
    };

    fn attack(length: u8) -> Self {
        Self {
            sounding: true,
            length,
        }
    }
}

/// Expand a step mode into exactly `mode.count()` events, one per sixteenth.
pub fn expand(mode: StepMode) -> impl Iterator<Item = NoteEvent> {
    let count = mode.count().get();
    (0..count).map(move |i| match mode {
        StepMode::Rest { .. } => NoteEvent::REST,
        StepMode::Single { .. } if i == 0 => NoteEvent::attack(1),
        StepMode::Single { .. } => NoteEvent::REST,
        StepMode::Repeat { .. } => NoteEvent::attack(1),
        StepMode::Hold { length } if i == 0 => NoteEvent::attack(length.get()),
        StepMode::Hold { .. } => NoteEvent::REST,
    })
}
