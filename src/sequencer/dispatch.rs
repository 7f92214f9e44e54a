/// Note dispatch - hands sounding events to the audio sink and records every
/// event for the playhead
use std::collections::VecDeque;

/// Envelope attack, seconds
pub const ATTACK: f64 = 0.02;
/// Envelope release, seconds
pub const RELEASE: f64 = 0.01;

/// Once this many tone handles are outstanding, older ones are released
pub const HANDLE_HIGH_WATER: usize = 100;
/// How many of the newest handles survive a reclaim
pub const HANDLE_RETAIN: usize = 20;

/// Undrained playhead entries beyond this are dropped, oldest first
pub const REPLAY_CAPACITY: usize = 1024;

/// Anything that can turn a scheduled tone into sound.
///
/// `start` and `stop` are in the audio clock's time base. The returned handle
/// is held until the dispatcher reclaims it.
pub trait ToneSink: Send {
    type Handle: Send;

    fn emit_tone(&mut self, frequency: f32, start: f64, stop: f64) -> Self::Handle;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledEvent {
    pub slot: usize,
    /// Audio clock time the event starts at
    pub due: f64,
    /// `None` for rests, including slots muted by the resolution
    pub pitch: Option<f32>,
}

impl ScheduledEvent {
    pub fn is_rest(&self) -> bool {
        self.pitch.is_none()
    }
}

pub struct NoteDispatcher<S: ToneSink> {
    sink: S,
    handles: VecDeque<S::Handle>,
    queue: VecDeque<ScheduledEvent>,
}

impl<S: ToneSink> NoteDispatcher<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            handles: VecDeque::with_capacity(HANDLE_HIGH_WATER),
            queue: VecDeque::new(),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Emit `event` if it sounds and queue it for the playhead either way.
    /// `length` is the sounding length in seconds, envelope excluded.
    pub fn dispatch(&mut self, event: ScheduledEvent, length: f64) {
        if let Some(frequency) = event.pitch {
            let stop = event.due + ATTACK + length + RELEASE;
            log::trace!(
                "slot {} tone {:.2}Hz {:.4}..{:.4}",
                event.slot,
                frequency,
                event.due,
                stop
            );
            let handle = self.sink.emit_tone(frequency, event.due, stop);
            self.handles.push_back(handle);
        }

        if self.queue.len() >= REPLAY_CAPACITY {
            self.queue.pop_front();
        }
        self.queue.push_back(event);
    }

    /// Release all but the newest handles once too many are outstanding.
    pub fn reclaim(&mut self) {
        let outstanding = self.handles.len();
        if outstanding >= HANDLE_HIGH_WATER {
            self.handles.drain(..outstanding - HANDLE_RETAIN);
            log::debug!("released {} tone handles", outstanding - HANDLE_RETAIN);
        }
    }

    pub fn outstanding(&self) -> usize {
        self.handles.len()
    }

    /// Pop every queued event that is due by `now`, in dispatch order.
    pub fn drain_due(&mut self, now: f64) -> Vec<ScheduledEvent> {
        let mut due = Vec::new();
        while let Some(event) = self.queue.front() {
            if event.due > now {
                break;
            }
            due.extend(self.queue.pop_front());
        }
        due
    }

    pub fn queued(&self) -> impl Iterator<Item = &ScheduledEvent> {
        self.queue.iter()
    }

    pub fn clear_queue(&mut self) {
        self.queue.clear();
    }
}
