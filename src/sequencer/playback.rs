/// Playback engine - transport control and the lookahead timer
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};

use super::dispatch::{ScheduledEvent, ToneSink};
use super::{Resolution, Sequencer, Step, StepUpdate, STEP_COUNT};
use crate::error::{Error, Result};

/// Monotonic time source in seconds, owned by the audio host
pub trait AudioClock: Send + Sync {
    fn now(&self) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    /// How often the scheduler wakes up
    pub lookahead: Duration,
    /// How far past `now` each wake-up schedules, seconds
    pub schedule_ahead: f64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            lookahead: Duration::from_millis(25),
            schedule_ahead: 0.1,
        }
    }
}

/// A repeating tick on its own thread. Cancelling (or dropping) it wakes the
/// thread and waits for it to exit, so no tick runs once `cancel` returns.
pub struct TickTimer {
    cancel: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TickTimer {
    pub fn spawn<F>(interval: Duration, mut tick: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (cancel, cancelled) = bounded::<()>(1);
        let thread = thread::Builder::new()
            .name("metro-lookahead".into())
            .spawn(move || loop {
                match cancelled.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => tick(),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(Error::Timer)?;

        Ok(Self {
            cancel: Some(cancel),
            thread: Some(thread),
        })
    }

    pub fn cancel(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.try_send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("scheduler thread panicked");
            }
        }
    }
}

impl Drop for TickTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Copy of the sequencer's user-facing state, for mirroring in a UI
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub steps: [Step; STEP_COUNT],
    pub tempo: f64,
    pub resolution: Resolution,
    pub gate_length: f64,
    pub playing: bool,
}

pub struct PlaybackEngine<S: ToneSink + 'static> {
    sequencer: Arc<Mutex<Sequencer<S>>>,
    clock: Arc<dyn AudioClock>,
    timing: Timing,
    timer: Option<TickTimer>,
}

impl<S: ToneSink + 'static> PlaybackEngine<S> {
    pub fn new(sequencer: Sequencer<S>, clock: Arc<dyn AudioClock>, timing: Timing) -> Self {
        Self {
            sequencer: Arc::new(Mutex::new(sequencer)),
            clock,
            timing,
            timer: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Sequencer<S>> {
        lock(&self.sequencer)
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Start if stopped, stop if playing. Returns whether it is now playing.
    pub fn toggle_play(&mut self) -> Result<bool> {
        if self.is_running() {
            self.stop();
        } else {
            self.play()?;
        }
        Ok(self.is_running())
    }

    /// Anchor at the current audio time from slot 0 and start ticking.
    /// Already playing is a no-op; playback is not restarted.
    pub fn play(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let now = self.clock.now();
        {
            let mut sequencer = self.lock();
            sequencer.start(now);
            sequencer.tick(now, self.timing.schedule_ahead);
        }

        let sequencer = Arc::clone(&self.sequencer);
        let clock = Arc::clone(&self.clock);
        let ahead = self.timing.schedule_ahead;
        let timer = TickTimer::spawn(self.timing.lookahead, move || {
            let now = clock.now();
            lock(&sequencer).tick(now, ahead);
        });

        match timer {
            Ok(timer) => {
                self.timer = Some(timer);
                log::info!("playback started at {now:.3}s");
                Ok(())
            }
            Err(e) => {
                self.lock().stop();
                Err(e)
            }
        }
    }

    /// Stop ticking. The grid is untouched; stopping twice is a no-op.
    pub fn stop(&mut self) {
        let Some(timer) = self.timer.take() else {
            return;
        };
        self.lock().stop();
        timer.cancel();
        log::info!("playback stopped");
    }

    /// Run one scheduling pass against the current audio time
    pub fn poll(&self) -> usize {
        let now = self.clock.now();
        self.lock().tick(now, self.timing.schedule_ahead)
    }

    pub fn update_step(&self, index: usize, update: StepUpdate) -> Result<Step> {
        self.lock().update_step(index, update)
    }

    pub fn set_tempo(&self, bpm: f64) -> Result<()> {
        self.lock().set_tempo(bpm)
    }

    pub fn set_resolution(&self, resolution: Resolution) {
        self.lock().set_resolution(resolution)
    }

    pub fn set_gate_length(&self, gate_length: f64) -> Result<()> {
        self.lock().set_gate_length(gate_length)
    }

    pub fn reset(&self) {
        self.lock().reset()
    }

    pub fn randomize(&self) {
        self.lock().randomize()
    }

    /// Playhead entries that have become due, in order
    pub fn drain_playhead(&self) -> Vec<ScheduledEvent> {
        let now = self.clock.now();
        self.lock().drain_playhead(now)
    }

    pub fn snapshot(&self) -> Snapshot {
        let sequencer = self.lock();
        Snapshot {
            steps: *sequencer.grid().steps(),
            tempo: sequencer.tempo(),
            resolution: sequencer.resolution(),
            gate_length: sequencer.gate_length(),
            playing: sequencer.is_playing(),
        }
    }

    /// Run `f` with the sequencer locked
    pub fn with_sequencer<R>(&self, f: impl FnOnce(&mut Sequencer<S>) -> R) -> R {
        f(&mut self.lock())
    }
}

impl<S: ToneSink + 'static> Drop for PlaybackEngine<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
