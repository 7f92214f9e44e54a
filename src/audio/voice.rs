/// A single scheduled square-wave tone
use crate::sequencer::dispatch::ATTACK;

/// Envelope peak
const PEAK: f32 = 0.8;

#[derive(Debug, Clone, PartialEq)]
pub struct Voice {
    pub id: u64,
    frequency: f32,
    start: f64,
    stop: f64,
    phase: f32,
}

impl Voice {
    pub fn new(id: u64, frequency: f32, start: f64, stop: f64) -> Self {
        Self {
            id,
            frequency,
            start,
            stop,
            phase: 0.0,
        }
    }

    /// Linear ramp up to the peak over the attack, then linear decay to
    /// silence at `stop`.
    pub fn envelope(&self, t: f64) -> f32 {
        if t < self.start || t >= self.stop {
            return 0.0;
        }
        let attack_end = (self.start + ATTACK).min(self.stop);
        if t < attack_end {
            PEAK * ((t - self.start) / ATTACK) as f32
        } else {
            PEAK * ((self.stop - t) / (self.stop - attack_end)) as f32
        }
    }

    pub fn next_sample(&mut self, t: f64, sample_rate: f32) -> f32 {
        if t < self.start {
            return 0.0;
        }
        let square = if self.phase < 0.5 { 1.0 } else { -1.0 };
        self.phase = (self.phase + self.frequency / sample_rate).fract();
        square * self.envelope(t)
    }

    pub fn finished(&self, t: f64) -> bool {
        t >= self.stop
    }
}
