/// Step data model - 16 steps of pitch, mode and repeat count
use std::num::NonZeroU8;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::scale::Scale;

pub const STEP_COUNT: usize = 16;

/// Upper bound for randomized repeat counts / hold lengths
pub const MAX_RANDOM_COUNT: u8 = 8;

const ONE: NonZeroU8 = NonZeroU8::MIN;

/// Playback mode of a step, without its count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Rest,
    Single,
    Repeat,
    Hold,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Rest, Mode::Single, Mode::Repeat, Mode::Hold];

    pub fn from_index(idx: usize) -> Option<Mode> {
        Self::ALL.get(idx).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mode::Rest => "Rest",
            Mode::Single => "Single",
            Mode::Repeat => "Repeat",
            Mode::Hold => "Hold",
        }
    }
}

/// Mode together with what its count means for that mode.
///
/// Every variant occupies `count()` sixteenth notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepMode {
    /// Silent for `slots` sixteenths
    Rest { slots: NonZeroU8 },
    /// One attack, then silent for the remaining `repeats - 1` sixteenths
    Single { repeats: NonZeroU8 },
    /// A fresh attack on each of `repeats` sixteenths
    Repeat { repeats: NonZeroU8 },
    /// One attack sustained for `length` sixteenths
    Hold { length: NonZeroU8 },
}

impl StepMode {
    pub fn new(mode: Mode, count: NonZeroU8) -> Self {
        match mode {
            Mode::Rest => StepMode::Rest { slots: count },
            Mode::Single => StepMode::Single { repeats: count },
            Mode::Repeat => StepMode::Repeat { repeats: count },
            Mode::Hold => StepMode::Hold { length: count },
        }
    }

    pub fn kind(&self) -> Mode {
        match self {
            StepMode::Rest { .. } => Mode::Rest,
            StepMode::Single { .. } => Mode::Single,
            StepMode::Repeat { .. } => Mode::Repeat,
            StepMode::Hold { .. } => Mode::Hold,
        }
    }

    pub fn count(&self) -> NonZeroU8 {
        match *self {
            StepMode::Rest { slots } => slots,
            StepMode::Single { repeats } | StepMode::Repeat { repeats } => repeats,
            StepMode::Hold { length } => length,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub mode: StepMode,
    /// Index into the scale
    pub degree: usize,
    /// Resolved pitch of `degree`
    pub frequency: f32,
}

impl Step {
    /// A single hit on `degree`, or a rest if the scale has no such degree
    fn single(degree: usize, scale: &Scale) -> Self {
        match scale.frequency(degree) {
            Some(frequency) => Self {
                mode: StepMode::Single { repeats: ONE },
                degree,
                frequency,
            },
            None => Self {
                mode: StepMode::Rest { slots: ONE },
                degree,
                frequency: 0.0,
            },
        }
    }
}

/// Partial edit of a step. Unset fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepUpdate {
    pub degree: Option<usize>,
    pub mode: Option<Mode>,
    pub count: Option<u8>,
}

impl StepUpdate {
    pub fn degree(mut self, degree: usize) -> Self {
        self.degree = Some(degree);
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn count(mut self, count: u8) -> Self {
        self.count = Some(count);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepGrid {
    steps: [Step; STEP_COUNT],
}

impl StepGrid {
    /// The default pattern: the first eight degrees ascending, twice.
    /// Scales with fewer degrees wrap around.
    pub fn new(scale: &Scale) -> Self {
        let degrees = scale.len().max(1);
        Self {
            steps: std::array::from_fn(|i| Step::single(i % 8 % degrees, scale)),
        }
    }

    pub fn len(&self) -> usize {
        STEP_COUNT
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Step at `slot`, wrapping past the end
    pub fn get(&self, slot: usize) -> &Step {
        &self.steps[slot % STEP_COUNT]
    }

    pub fn steps(&self) -> &[Step; STEP_COUNT] {
        &self.steps
    }

    pub fn reset(&mut self, scale: &Scale) {
        *self = Self::new(scale);
    }

    pub fn randomize<R: Rng>(&mut self, scale: &Scale, rng: &mut R) {
        if scale.is_empty() {
            return;
        }
        for step in &mut self.steps {
            let degree = rng.random_range(0..scale.len());
            let mode = Mode::ALL[rng.random_range(0..Mode::ALL.len())];
            let count = NonZeroU8::new(rng.random_range(1..=MAX_RANDOM_COUNT)).unwrap_or(ONE);

            *step = Step {
                mode: StepMode::new(mode, count),
                degree,
                frequency: scale.frequency(degree).unwrap_or_default(),
            };
        }
    }

    /// Validate `update` against the current step and replace it whole.
    /// On error the grid is left untouched.
    pub fn update(&mut self, index: usize, update: StepUpdate, scale: &Scale) -> Result<Step> {
        let current = self.steps.get(index).ok_or(Error::StepOutOfRange(index))?;

        let degree = update.degree.unwrap_or(current.degree);
        let frequency = scale.frequency(degree).ok_or(Error::DegreeOutOfRange {
            degree,
            len: scale.len(),
        })?;
        let count = match update.count {
            Some(count) => NonZeroU8::new(count).ok_or(Error::ZeroCount)?,
            None => current.mode.count(),
        };
        let mode = update.mode.unwrap_or(current.mode.kind());

        let step = Step {
            mode: StepMode::new(mode, count),
            degree,
            frequency,
        };
        self.steps[index] = step;
        Ok(step)
    }
}
