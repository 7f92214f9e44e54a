/// Core sequencer logic - step grid, transport parameters and the lookahead
/// scheduling loop
///
/// Nothing in here knows about threads or wall time. The scheduler is fed the
/// audio clock's current time by `playback::PlaybackEngine`, which owns the
/// timer.
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::scale::Scale;

pub mod dispatch;
pub mod expand;
pub mod grid;
pub mod playback;

#[cfg(test)]
pub(crate) mod testing;

use dispatch::{NoteDispatcher, ScheduledEvent, ToneSink};
pub use grid::{Mode, Step, StepGrid, StepMode, StepUpdate, STEP_COUNT};

pub const DEFAULT_TEMPO: f64 = 120.0;
pub const DEFAULT_GATE_LENGTH: f64 = 0.3;
pub const MIN_TEMPO: f64 = 1.0;
pub const MAX_TEMPO: f64 = 1000.0;

/// Which slots are allowed to sound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    #[default]
    Sixteenth,
    Eighth,
    Quarter,
}

impl Resolution {
    pub const ALL: [Resolution; 3] = [Resolution::Sixteenth, Resolution::Eighth, Resolution::Quarter];

    pub fn from_index(idx: usize) -> Option<Resolution> {
        Self::ALL.get(idx).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Resolution::Sixteenth => "1/16",
            Resolution::Eighth => "1/8",
            Resolution::Quarter => "1/4",
        }
    }

    fn stride(&self) -> usize {
        match self {
            Resolution::Sixteenth => 1,
            Resolution::Eighth => 2,
            Resolution::Quarter => 4,
        }
    }

    pub fn admits(&self, slot: usize) -> bool {
        slot % self.stride() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SchedulerState {
    pub playing: bool,
    /// Next slot to expand, 0..16
    pub current_slot: usize,
    /// Audio clock time of the next unscheduled sixteenth
    pub next_due: f64,
}

impl SchedulerState {
    fn start(&mut self, now: f64) {
        *self = SchedulerState {
            playing: true,
            current_slot: 0,
            next_due: now,
        };
    }
}

pub struct Sequencer<S: ToneSink> {
    grid: StepGrid,
    scale: Scale,
    tempo: f64,
    resolution: Resolution,
    gate_length: f64,
    state: SchedulerState,
    dispatcher: NoteDispatcher<S>,
}

impl<S: ToneSink> Sequencer<S> {
    pub fn new(scale: Scale, sink: S) -> Self {
        Self {
            grid: StepGrid::new(&scale),
            scale,
            tempo: DEFAULT_TEMPO,
            resolution: Resolution::default(),
            gate_length: DEFAULT_GATE_LENGTH,
            state: SchedulerState::default(),
            dispatcher: NoteDispatcher::new(sink),
        }
    }

    pub fn grid(&self) -> &StepGrid {
        &self.grid
    }

    pub fn scale(&self) -> &Scale {
        &self.scale
    }

    pub fn update_step(&mut self, index: usize, update: StepUpdate) -> Result<Step> {
        self.grid.update(index, update, &self.scale)
    }

    pub fn reset(&mut self) {
        self.grid.reset(&self.scale);
        log::info!("step grid reset to default pattern");
    }

    pub fn randomize(&mut self) {
        self.randomize_with(&mut rand::rng());
    }

    pub fn randomize_with<R: Rng>(&mut self, rng: &mut R) {
        self.grid.randomize(&self.scale, rng);
        log::info!("step grid randomized");
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    /// Takes effect from the next sixteenth; already dispatched notes keep
    /// their timing.
    pub fn set_tempo(&mut self, bpm: f64) -> Result<()> {
        if !(MIN_TEMPO..=MAX_TEMPO).contains(&bpm) {
            return Err(Error::InvalidTempo(bpm));
        }
        self.tempo = bpm;
        log::debug!("tempo set to {bpm} BPM");
        Ok(())
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn set_resolution(&mut self, resolution: Resolution) {
        self.resolution = resolution;
        log::debug!("resolution set to {}", resolution.name());
    }

    pub fn gate_length(&self) -> f64 {
        self.gate_length
    }

    pub fn set_gate_length(&mut self, gate_length: f64) -> Result<()> {
        if !(gate_length > 0.0 && gate_length <= 1.0) {
            return Err(Error::InvalidGateLength(gate_length));
        }
        self.gate_length = gate_length;
        Ok(())
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state.playing
    }

    /// Anchor playback at `now`, starting from slot 0
    pub fn start(&mut self, now: f64) {
        self.state.start(now);
        self.dispatcher.clear_queue();
    }

    /// Slot pointer and due time are left as they are
    pub fn stop(&mut self) {
        self.state.playing = false;
    }

    /// Duration of one sixteenth at the current tempo, seconds
    pub fn sixteenth(&self) -> f64 {
        60.0 / self.tempo * 0.25
    }

    /// Sounding length of a one-sixteenth note, seconds
    pub fn note_length(&self) -> f64 {
        60.0 / self.tempo * self.gate_length
    }

    /// One timer tick: schedule everything due before `now + ahead`.
    /// Does nothing while stopped.
    pub fn tick(&mut self, now: f64, ahead: f64) -> usize {
        if !self.state.playing {
            return 0;
        }
        if self.state.next_due < now {
            log::warn!(
                "scheduler tick {:.1}ms late, notes may drop out",
                (now - self.state.next_due) * 1000.0
            );
        }
        self.schedule(now + ahead)
    }

    /// Expand and dispatch every step whose start is before `horizon`.
    ///
    /// A step is always dispatched whole, so the last step may run past the
    /// horizon. Returns the number of sixteenths dispatched.
    pub fn schedule(&mut self, horizon: f64) -> usize {
        let mut dispatched = 0;

        while self.state.next_due < horizon {
            let slot = self.state.current_slot;
            let step = *self.grid.get(slot);
            let audible = self.resolution.admits(slot);
            let due_before = self.state.next_due;

            for event in expand::expand(step.mode) {
                let pitch = (event.sounding && audible).then_some(step.frequency);
                let length = self.note_length() * f64::from(event.length);
                let due = self.state.next_due;

                self.dispatcher
                    .dispatch(ScheduledEvent { slot, due, pitch }, length);
                self.state.next_due += self.sixteenth();
                dispatched += 1;
            }

            if self.state.next_due <= due_before {
                log::error!("scheduler stalled at {:.3}s, giving up this pass", due_before);
                break;
            }

            self.state.current_slot = (slot + 1) % STEP_COUNT;
            self.dispatcher.reclaim();
        }

        dispatched
    }

    /// Playhead entries whose time has come, in order
    pub fn drain_playhead(&mut self, now: f64) -> Vec<ScheduledEvent> {
        self.dispatcher.drain_due(now)
    }

    pub fn dispatcher(&self) -> &NoteDispatcher<S> {
        &self.dispatcher
    }

    pub fn sink_mut(&mut self) -> &mut S {
        self.dispatcher.sink_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testing::RecordingSink;

    const EPS: f64 = 1e-9;

    fn sequencer() -> (Sequencer<RecordingSink>, RecordingSink) {
        let sink = RecordingSink::default();
        let scale = Scale::from_frequencies(vec![
            100.0, 200.0, 300.0, 400.0, 500.0, 600.0, 700.0, 800.0,
        ])
        .unwrap();
        (Sequencer::new(scale, sink.clone()), sink)
    }

    fn queued(seq: &Sequencer<RecordingSink>) -> Vec<ScheduledEvent> {
        seq.dispatcher().queued().copied().collect()
    }

    #[test]
    fn test_first_four_sixteenths_at_120() {
        let (mut seq, sink) = sequencer();
        let t0 = 3.5;
        seq.start(t0);
        seq.schedule(t0 + 0.4);

        let tones = sink.tones();
        assert_eq!(tones.len(), 4);
        for (i, tone) in tones.iter().enumerate() {
            assert!((tone.start - (t0 + 0.125 * i as f64)).abs() < EPS);
            assert_eq!(tone.frequency, 100.0 * (i + 1) as f32);
        }
        assert!(queued(&seq).iter().all(|e| !e.is_rest()));
    }

    #[test]
    fn test_due_time_advances_by_one_sixteenth() {
        for tempo in [40.0, 97.5, 120.0, 240.0] {
            let (mut seq, _) = sequencer();
            seq.set_tempo(tempo).unwrap();
            seq.start(0.0);
            for i in 1..=40 {
                seq.schedule(seq.state().next_due + EPS);
                let expected = i as f64 * 60.0 / tempo * 0.25;
                assert!((seq.state().next_due - expected).abs() < 1e-6);
            }

            let dues: Vec<f64> = queued(&seq).iter().map(|e| e.due).collect();
            for pair in dues.windows(2) {
                assert!((pair[1] - pair[0] - 60.0 / tempo * 0.25).abs() < EPS);
            }
        }
    }

    #[test]
    fn test_slots_wrap_in_order() {
        let (mut seq, _) = sequencer();
        seq.start(0.0);
        seq.schedule(0.125 * 40.0);

        let slots: Vec<usize> = queued(&seq).iter().map(|e| e.slot).collect();
        assert_eq!(slots.len(), 40);
        for (i, slot) in slots.iter().enumerate() {
            assert_eq!(*slot, i % STEP_COUNT);
        }
        assert_eq!(seq.state().current_slot, 40 % STEP_COUNT);
    }

    #[test]
    fn test_slot_after_fifteen_is_zero() {
        for start in 0..STEP_COUNT {
            let (mut seq, _) = sequencer();
            seq.start(0.0);
            seq.state.current_slot = start;
            seq.schedule(EPS);
            assert_eq!(seq.state().current_slot, (start + 1) % STEP_COUNT);
        }
    }

    #[test]
    fn test_quarter_resolution_mutes_offbeats() {
        let (mut seq, sink) = sequencer();
        seq.set_resolution(Resolution::Quarter);
        seq.start(0.0);
        seq.schedule(0.125 * 16.0);

        let starts: Vec<f64> = sink.tones().iter().map(|t| t.start).collect();
        assert_eq!(starts, [0.0, 0.5, 1.0, 1.5]);

        let events = queued(&seq);
        assert_eq!(events.len(), 16);
        for event in events {
            assert_eq!(event.is_rest(), event.slot % 4 != 0);
        }
    }

    #[test]
    fn test_eighth_resolution() {
        let (mut seq, sink) = sequencer();
        seq.set_resolution(Resolution::Eighth);
        seq.start(0.0);
        seq.schedule(0.125 * 16.0);
        assert_eq!(sink.tones().len(), 8);
    }

    #[test]
    fn test_repeat_step_holds_its_slot() {
        let (mut seq, sink) = sequencer();
        seq.update_step(0, StepUpdate::default().mode(Mode::Repeat).count(3))
            .unwrap();
        seq.start(0.0);
        seq.schedule(0.4);

        let slots: Vec<usize> = queued(&seq).iter().map(|e| e.slot).collect();
        assert_eq!(slots, [0, 0, 0, 1]);
        assert_eq!(sink.tones().len(), 4);
        assert!((sink.tones()[3].start - 0.375).abs() < EPS);
    }

    #[test]
    fn test_single_step_advances_silently() {
        let (mut seq, sink) = sequencer();
        seq.update_step(0, StepUpdate::default().count(3)).unwrap();
        seq.start(0.0);
        seq.schedule(0.4);

        let rests: Vec<bool> = queued(&seq).iter().map(|e| e.is_rest()).collect();
        assert_eq!(rests, [false, true, true, false]);
        assert_eq!(sink.tones().len(), 2);
    }

    #[test]
    fn test_hold_sustains_across_slots() {
        let (mut seq, sink) = sequencer();
        seq.update_step(0, StepUpdate::default().mode(Mode::Hold).count(4))
            .unwrap();
        seq.start(0.0);
        seq.schedule(0.6);

        let tones = sink.tones();
        assert_eq!(tones.len(), 2);
        let held = dispatch::ATTACK + 4.0 * seq.note_length() + dispatch::RELEASE;
        assert!((tones[0].stop - held).abs() < EPS);
        assert!((tones[1].start - 0.5).abs() < EPS);
        assert_eq!(tones[1].frequency, 200.0);
    }

    #[test]
    fn test_tempo_change_applies_to_following_sixteenths() {
        let (mut seq, _) = sequencer();
        seq.start(0.0);
        seq.schedule(0.2);
        seq.set_tempo(60.0).unwrap();
        seq.schedule(1.0);

        let dues: Vec<f64> = queued(&seq).iter().map(|e| e.due).collect();
        assert_eq!(dues.len(), 5);
        assert!((dues[1] - 0.125).abs() < EPS);
        assert!((dues[2] - 0.25).abs() < EPS);
        assert!((dues[3] - 0.5).abs() < EPS);
        assert!((dues[4] - 0.75).abs() < EPS);
    }

    #[test]
    fn test_late_tick_keeps_scheduled_times() {
        let (mut seq, sink) = sequencer();
        seq.start(0.0);
        assert_eq!(seq.tick(0.0, 0.1), 1);
        assert_eq!(seq.tick(1.0, 0.1), 8);

        let starts: Vec<f64> = sink.tones().iter().map(|t| t.start).collect();
        for (i, start) in starts.iter().enumerate() {
            assert!((start - 0.125 * i as f64).abs() < EPS);
        }
    }

    #[test]
    fn test_tick_while_stopped_does_nothing() {
        let (mut seq, sink) = sequencer();
        assert_eq!(seq.tick(0.0, 0.1), 0);
        seq.start(0.0);
        seq.tick(0.0, 0.1);
        seq.stop();
        assert_eq!(seq.tick(5.0, 0.1), 0);
        assert_eq!(sink.tones().len(), 1);
    }

    #[test]
    fn test_start_reanchors() {
        let (mut seq, _) = sequencer();
        seq.start(1.0);
        seq.schedule(2.0);
        seq.stop();
        seq.start(10.0);
        assert_eq!(seq.state().current_slot, 0);
        assert_eq!(seq.state().next_due, 10.0);
        assert!(seq.is_playing());
        assert_eq!(queued(&seq).len(), 0);
    }

    #[test]
    fn test_invalid_tempo_is_rejected() {
        let (mut seq, _) = sequencer();
        for bpm in [0.0, -10.0, 0.5, 1000.5, 1e20, f64::NAN, f64::INFINITY] {
            assert!(matches!(seq.set_tempo(bpm), Err(Error::InvalidTempo(_))));
        }
        assert_eq!(seq.tempo(), DEFAULT_TEMPO);
        seq.set_tempo(MIN_TEMPO).unwrap();
        seq.set_tempo(MAX_TEMPO).unwrap();
    }

    #[test]
    fn test_schedule_stops_when_due_time_cannot_advance() {
        let (mut seq, _) = sequencer();
        seq.tempo = 1e20;
        seq.start(100.0);
        assert_eq!(seq.schedule(100.1), 1);
        assert_eq!(seq.state().next_due, 100.0);
    }

    #[test]
    fn test_invalid_gate_length_is_rejected() {
        let (mut seq, _) = sequencer();
        for gate in [0.0, 1.5, -0.2, f64::NAN] {
            assert!(seq.set_gate_length(gate).is_err());
        }
        seq.set_gate_length(1.0).unwrap();
        assert_eq!(seq.gate_length(), 1.0);
    }

    #[test]
    fn test_note_length_follows_gate() {
        let (mut seq, _) = sequencer();
        assert!((seq.note_length() - 0.15).abs() < EPS);
        seq.set_gate_length(0.5).unwrap();
        assert!((seq.note_length() - 0.25).abs() < EPS);
    }
}
