/// Audio output using cpal
///
/// Tones arrive from the scheduler as voices over a channel and are rendered
/// against the stream's own frame counter, which is also the audio clock the
/// scheduler reads.
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub mod effects;
pub mod voice;

use crate::config::AudioSettings;
use crate::error::{Error, Result};
use crate::sequencer::dispatch::ToneSink;
use crate::sequencer::playback::AudioClock;
use effects::{cutoff_hz, resonance_q, Echo, LowPass};
use voice::Voice;

const MASTER_GAIN: f32 = 0.2;
const COMMAND_CAPACITY: usize = 1024;
const VOICE_CAPACITY: usize = 256;

pub enum Command {
    Voice(Voice),
    Cutoff(f32),
    Resonance(f32),
    Delay { time: f32, feedback: f32, wet: f32 },
}

/// Audio time in seconds: frames rendered by the stream, or wall time when
/// there is no stream
#[derive(Debug, Clone)]
pub enum EngineClock {
    Frames {
        frames: Arc<AtomicU64>,
        sample_rate: u32,
    },
    Wall(Instant),
}

impl AudioClock for EngineClock {
    fn now(&self) -> f64 {
        match self {
            EngineClock::Frames {
                frames,
                sample_rate,
            } => frames.load(Ordering::Acquire) as f64 / f64::from(*sample_rate),
            EngineClock::Wall(origin) => origin.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceId(pub u64);

/// The scheduler's handle on the engine. Never blocks: if the audio thread
/// falls behind, tones are dropped.
#[derive(Debug, Clone)]
pub struct ToneSender {
    commands: Sender<Command>,
    next_id: u64,
}

impl ToneSink for ToneSender {
    type Handle = VoiceId;

    fn emit_tone(&mut self, frequency: f32, start: f64, stop: f64) -> VoiceId {
        let id = self.next_id;
        self.next_id += 1;

        match self
            .commands
            .try_send(Command::Voice(Voice::new(id, frequency, start, stop)))
        {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => log::warn!("voice queue full, dropping tone {id}"),
            Err(TrySendError::Disconnected(_)) => log::trace!("no audio output, tone {id} dropped"),
        }
        VoiceId(id)
    }
}

struct Renderer {
    commands: Receiver<Command>,
    voices: Vec<Voice>,
    filter: LowPass,
    echo: Echo,
    frames: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    sample_rate: f32,
    channels: usize,
}

impl Renderer {
    fn apply(&mut self, command: Command) {
        match command {
            Command::Voice(voice) => {
                if self.voices.len() < VOICE_CAPACITY {
                    self.voices.push(voice);
                } else {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
            Command::Cutoff(value) => self.filter.set_cutoff(cutoff_hz(value, self.sample_rate)),
            Command::Resonance(value) => self.filter.set_q(resonance_q(value)),
            Command::Delay {
                time,
                feedback,
                wet,
            } => self.echo.set(time, feedback, wet),
        }
    }

    fn render(&mut self, data: &mut [f32]) {
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
        }

        let start = self.frames.load(Ordering::Acquire);
        let rate = f64::from(self.sample_rate);
        let mut frame_count = 0u64;

        for frame in data.chunks_mut(self.channels) {
            let t = (start + frame_count) as f64 / rate;
            let mix: f32 = self
                .voices
                .iter_mut()
                .map(|v| v.next_sample(t, self.sample_rate))
                .sum();
            let dry = self.filter.process(mix * MASTER_GAIN);
            let out = dry + self.echo.process(dry);
            frame.fill(out);
            frame_count += 1;
        }

        let end = (start + frame_count) as f64 / rate;
        self.voices.retain(|v| !v.finished(end));
        self.frames.fetch_add(frame_count, Ordering::Release);
    }
}

pub struct AudioEngine {
    stream: Option<cpal::Stream>,
    commands: Sender<Command>,
    clock: EngineClock,
    dropped: Arc<AtomicU64>,
    sample_rate: u32,
}

impl AudioEngine {
    /// Open the default output device
    pub fn new(settings: &AudioSettings, tempo: f64) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device".to_string()))?;
        let config = device
            .default_output_config()
            .map_err(|e| Error::Audio(format!("Failed to get output config: {}", e)))?;

        if config.sample_format() != cpal::SampleFormat::F32 {
            return Err(Error::Audio(format!(
                "unsupported sample format {:?}",
                config.sample_format()
            )));
        }

        let sample_rate = config.sample_rate().0;
        let channels = usize::from(config.channels()).max(1);
        let frames = Arc::new(AtomicU64::new(0));
        let dropped = Arc::new(AtomicU64::new(0));
        let (commands, receiver) = bounded(COMMAND_CAPACITY);

        let mut renderer = Renderer {
            commands: receiver,
            voices: Vec::with_capacity(VOICE_CAPACITY),
            filter: LowPass::new(
                sample_rate as f32,
                cutoff_hz(settings.cutoff, sample_rate as f32),
                resonance_q(settings.resonance),
            ),
            echo: Echo::new(sample_rate as f32),
            frames: Arc::clone(&frames),
            dropped: Arc::clone(&dropped),
            sample_rate: sample_rate as f32,
            channels,
        };
        renderer.echo.set(
            effects::delay_time_for_tempo(tempo),
            settings.delay_feedback,
            settings.delay_wet,
        );

        let stream = device
            .build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| renderer.render(data),
                |err| log::error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| Error::Audio(format!("Failed to build stream: {}", e)))?;
        stream
            .play()
            .map_err(|e| Error::Audio(format!("Failed to start stream: {}", e)))?;

        log::info!(
            "audio output on {} at {} Hz, {} channel(s)",
            device.name().unwrap_or_else(|_| "unknown device".to_string()),
            sample_rate,
            channels
        );

        Ok(Self {
            stream: Some(stream),
            commands,
            clock: EngineClock::Frames {
                frames,
                sample_rate,
            },
            dropped,
            sample_rate,
        })
    }

    /// Engine without a device: the clock runs on wall time and tones go
    /// nowhere
    pub fn silent() -> Self {
        let (commands, _) = bounded(1);
        Self {
            stream: None,
            commands,
            clock: EngineClock::Wall(Instant::now()),
            dropped: Arc::new(AtomicU64::new(0)),
            sample_rate: 0,
        }
    }

    pub fn is_silent(&self) -> bool {
        self.stream.is_none()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Voices the audio thread discarded because all voice slots were busy
    pub fn dropped_voices(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn clock(&self) -> EngineClock {
        self.clock.clone()
    }

    pub fn tone_sender(&self) -> ToneSender {
        ToneSender {
            commands: self.commands.clone(),
            next_id: 0,
        }
    }

    /// 0..100
    pub fn set_cutoff(&self, value: f32) {
        self.send(Command::Cutoff(value));
    }

    /// 0..100
    pub fn set_resonance(&self, value: f32) {
        self.send(Command::Resonance(value));
    }

    pub fn set_delay(&self, time: f32, feedback: f32, wet: f32) {
        self.send(Command::Delay {
            time,
            feedback,
            wet,
        });
    }

    fn send(&self, command: Command) {
        if let Err(TrySendError::Full(_)) = self.commands.try_send(command) {
            log::warn!("audio command queue full");
        }
    }
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::new(&AudioSettings::default(), crate::sequencer::DEFAULT_TEMPO).unwrap_or_else(|e| {
            log::warn!("{e}, falling back to silent output");
            Self::silent()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer(channels: usize) -> (Renderer, Sender<Command>) {
        let (commands, receiver) = bounded(16);
        let renderer = Renderer {
            commands: receiver,
            voices: Vec::new(),
            filter: LowPass::new(1_000.0, 400.0, 0.707),
            echo: Echo::new(1_000.0),
            frames: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
            sample_rate: 1_000.0,
            channels,
        };
        (renderer, commands)
    }

    #[test]
    fn test_render_advances_clock() {
        let (mut renderer, _) = renderer(2);
        let clock = EngineClock::Frames {
            frames: Arc::clone(&renderer.frames),
            sample_rate: 1_000,
        };
        let mut buffer = vec![0.0; 200];
        renderer.render(&mut buffer);
        assert!((clock.now() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_voices_play_then_expire() {
        let (mut renderer, commands) = renderer(1);
        let mut sender = ToneSender {
            commands,
            next_id: 0,
        };
        assert_eq!(sender.emit_tone(100.0, 0.01, 0.05), VoiceId(0));
        assert_eq!(sender.emit_tone(100.0, 0.5, 0.6), VoiceId(1));

        let mut buffer = vec![0.0; 100];
        renderer.render(&mut buffer);
        assert!(buffer.iter().any(|s| *s != 0.0));
        assert_eq!(renderer.voices.len(), 1);
        assert_eq!(renderer.voices[0].id, 1);
    }

    #[test]
    fn test_voices_over_capacity_are_counted() {
        let (mut renderer, _) = renderer(1);
        for id in 0..VOICE_CAPACITY as u64 + 3 {
            renderer.apply(Command::Voice(Voice::new(id, 100.0, 1.0, 2.0)));
        }
        assert_eq!(renderer.voices.len(), VOICE_CAPACITY);
        assert_eq!(renderer.dropped.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_silent_engine_drops_tones() {
        let engine = AudioEngine::silent();
        let mut sender = engine.tone_sender();
        assert_eq!(sender.emit_tone(440.0, 0.0, 1.0), VoiceId(0));
        assert!(engine.is_silent());
        assert_eq!(engine.dropped_voices(), 0);
        assert!(engine.clock().now() >= 0.0);
    }
}
