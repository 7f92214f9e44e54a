/// Master effects - low-pass filter and echo
use std::f32::consts::PI;

/// Lowest cutoff the filter control reaches, Hz
const MIN_CUTOFF: f32 = 100.0;
/// Resonance control 100 maps to this Q
const MAX_Q: f32 = 30.0;
/// Longest supported echo, seconds
pub const MAX_DELAY: f32 = 2.0;

/// Map a 0..100 control value onto 100 Hz..Nyquist, exponentially so that
/// equal steps cover equal numbers of octaves.
pub fn cutoff_hz(value: f32, sample_rate: f32) -> f32 {
    let value = value.clamp(0.0, 100.0) * 0.01;
    let max = sample_rate / 2.0;
    let octaves = (max / MIN_CUTOFF).log2();
    max * 2.0_f32.powf(octaves * (value - 1.0))
}

/// Map a 0..100 control value onto a filter Q
pub fn resonance_q(value: f32) -> f32 {
    (value.clamp(0.0, 100.0) / 100.0 * MAX_Q).max(0.1)
}

/// Echo time that follows the tempo, seconds
pub fn delay_time_for_tempo(bpm: f64) -> f32 {
    ((bpm / 3.0 * 0.01) as f32).clamp(0.0, MAX_DELAY)
}

/// Biquad low-pass (RBJ cookbook)
#[derive(Debug, Clone)]
pub struct LowPass {
    sample_rate: f32,
    cutoff: f32,
    q: f32,
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl LowPass {
    pub fn new(sample_rate: f32, cutoff: f32, q: f32) -> Self {
        let mut filter = Self {
            sample_rate,
            cutoff,
            q,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        };
        filter.set(cutoff, q);
        filter
    }

    pub fn set_cutoff(&mut self, cutoff: f32) {
        self.set(cutoff, self.q);
    }

    pub fn set_q(&mut self, q: f32) {
        self.set(self.cutoff, q);
    }

    pub fn set(&mut self, cutoff: f32, q: f32) {
        self.cutoff = cutoff.clamp(10.0, self.sample_rate * 0.49);
        self.q = q.max(0.01);
        let w0 = 2.0 * PI * self.cutoff / self.sample_rate;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * self.q);
        let a0 = 1.0 + alpha;

        self.b0 = (1.0 - cos) / 2.0 / a0;
        self.b1 = (1.0 - cos) / a0;
        self.b2 = self.b0;
        self.a1 = -2.0 * cos / a0;
        self.a2 = (1.0 - alpha) / a0;
    }

    pub fn process(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

/// Single-tap delay line returning only the wet signal
#[derive(Debug, Clone)]
pub struct Echo {
    sample_rate: f32,
    buffer: Vec<f32>,
    write: usize,
    delay: usize,
    feedback: f32,
    wet: f32,
}

impl Echo {
    pub fn new(sample_rate: f32) -> Self {
        let len = (sample_rate * MAX_DELAY) as usize + 1;
        Self {
            sample_rate,
            buffer: vec![0.0; len],
            write: 0,
            delay: 1,
            feedback: 0.0,
            wet: 0.0,
        }
    }

    pub fn set(&mut self, time: f32, feedback: f32, wet: f32) {
        let max = self.buffer.len() - 1;
        self.delay = ((time.clamp(0.0, MAX_DELAY) * self.sample_rate).round() as usize).clamp(1, max);
        self.feedback = feedback.clamp(0.0, 0.95);
        self.wet = wet.clamp(0.0, 1.0);
    }

    pub fn process(&mut self, x: f32) -> f32 {
        let len = self.buffer.len();
        let read = (self.write + len - self.delay) % len;
        let delayed = self.buffer[read];
        self.buffer[self.write] = x + delayed * self.feedback;
        self.write = (self.write + 1) % len;
        delayed * self.wet
    }
}
