#[cfg(feature = "gui")]
use eframe::egui;

#[cfg(feature = "gui")]
use metro::{
    audio::effects::delay_time_for_tempo, AudioEngine, Config, Mode, PlaybackEngine, Resolution,
    StepUpdate, ToneSender,
};

#[cfg(feature = "gui")]
use clap::Parser;

#[cfg(feature = "gui")]
#[derive(Parser)]
#[command(name = "metro")]
#[command(author, version, about = "16-step lookahead tone sequencer", long_about = None)]
struct Cli {
    /// Config file path (TOML)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Initial tempo in BPM
    #[arg(short, long)]
    tempo: Option<f64>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[cfg(feature = "gui")]
fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = match cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(tempo) = cli.tempo {
        config.transport.tempo = tempo;
    }

    let app = SequencerApp::new(config)?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 520.0])
            .with_title("METRO - Step Sequencer"),
        ..Default::default()
    };

    eframe::run_native(
        "METRO",
        options,
        Box::new(|_cc| Ok(Box::new(app))),
    )
    .map_err(|e| anyhow::anyhow!("{e}"))
}

#[cfg(not(feature = "gui"))]
fn main() {
    eprintln!("This binary requires the 'gui' feature to be enabled");
    std::process::exit(1);
}

#[cfg(feature = "gui")]
struct SequencerApp {
    playback: PlaybackEngine<ToneSender>,
    audio: AudioEngine,
    config: Config,

    // UI state
    note_names: Vec<String>,
    current_visual_step: Option<usize>,
    dropped_voices: u64,
    error: Option<String>,
}

#[cfg(feature = "gui")]
impl SequencerApp {
    fn new(config: Config) -> metro::Result<Self> {
        let audio = AudioEngine::new(&config.audio, config.transport.tempo).unwrap_or_else(|e| {
            log::warn!("{e}, falling back to silent output");
            AudioEngine::silent()
        });

        let sequencer = config.sequencer(audio.tone_sender())?;
        let scale = sequencer.scale().clone();
        let note_names = (0..scale.len())
            .map(|d| scale.note_name(d).unwrap_or_else(|| d.to_string()))
            .collect();
        let playback =
            PlaybackEngine::new(sequencer, std::sync::Arc::new(audio.clock()), config.timing());

        Ok(Self {
            playback,
            audio,
            config,
            note_names,
            current_visual_step: None,
            dropped_voices: 0,
            error: None,
        })
    }

    fn handle_playback_events(&mut self) {
        for event in self.playback.drain_playhead() {
            self.current_visual_step = Some(event.slot);
        }

        let dropped = self.audio.dropped_voices();
        if dropped > self.dropped_voices {
            log::warn!(
                "audio thread dropped {} voice(s), {dropped} in total",
                dropped - self.dropped_voices
            );
            self.dropped_voices = dropped;
        }
    }

    fn report(&mut self, result: metro::Result<()>) {
        match result {
            Ok(()) => self.error = None,
            Err(e) => {
                log::warn!("{e}");
                self.error = Some(e.to_string());
            }
        }
    }

    fn edit_step(&mut self, index: usize, update: StepUpdate) {
        let result = self.playback.update_step(index, update).map(|_| ());
        self.report(result);
    }

    fn transport_controls(&mut self, ui: &mut egui::Ui, tempo: f64, resolution: Resolution) {
        ui.horizontal(|ui| {
            if self.playback.is_running() {
                if ui.button("⏸ Stop").clicked() {
                    self.playback.stop();
                    self.current_visual_step = None;
                }
            } else if ui.button("▶ Play").clicked() {
                let result = self.playback.play();
                self.report(result);
            }

            ui.add_space(20.0);

            ui.label("BPM:");
            let mut bpm = tempo;
            if ui
                .add(egui::Slider::new(&mut bpm, 40.0..=240.0).step_by(1.0))
                .changed()
            {
                let result = self.playback.set_tempo(bpm);
                if result.is_ok() {
                    let audio = &self.config.audio;
                    self.audio
                        .set_delay(delay_time_for_tempo(bpm), audio.delay_feedback, audio.delay_wet);
                }
                self.report(result);
            }

            ui.add_space(20.0);

            ui.label("Resolution:");
            let mut selected = resolution;
            egui::ComboBox::from_id_source("resolution")
                .selected_text(selected.name())
                .show_ui(ui, |ui| {
                    for r in Resolution::ALL {
                        ui.selectable_value(&mut selected, r, r.name());
                    }
                });
            if selected != resolution {
                self.playback.set_resolution(selected);
            }

            ui.add_space(20.0);

            if ui.button("Reset").clicked() {
                self.playback.reset();
            }
            if ui.button("Randomize").clicked() {
                self.playback.randomize();
            }
        });
    }

    fn tone_controls(&mut self, ui: &mut egui::Ui, gate_length: f64) {
        ui.horizontal(|ui| {
            ui.label("Gate:");
            let mut gate = gate_length;
            if ui.add(egui::Slider::new(&mut gate, 0.05..=1.0)).changed() {
                let result = self.playback.set_gate_length(gate);
                self.report(result);
            }

            ui.add_space(20.0);

            ui.label("Cutoff:");
            if ui
                .add(egui::Slider::new(&mut self.config.audio.cutoff, 0.0..=100.0))
                .changed()
            {
                self.audio.set_cutoff(self.config.audio.cutoff);
            }

            ui.label("Resonance:");
            if ui
                .add(egui::Slider::new(&mut self.config.audio.resonance, 0.0..=100.0))
                .changed()
            {
                self.audio.set_resonance(self.config.audio.resonance);
            }
        });
    }
}

#[cfg(feature = "gui")]
impl eframe::App for SequencerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint();

        self.handle_playback_events();
        let snapshot = self.playback.snapshot();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("METRO - Step Sequencer");
            ui.add_space(10.0);

            self.transport_controls(ui, snapshot.tempo, snapshot.resolution);
            ui.add_space(5.0);
            self.tone_controls(ui, snapshot.gate_length);

            ui.add_space(20.0);

            let max_degree = self.note_names.len().saturating_sub(1);
            let mut edits = Vec::new();

            ui.horizontal(|ui| {
                for (i, step) in snapshot.steps.iter().enumerate() {
                    ui.vertical(|ui| {
                        let is_current = snapshot.playing && self.current_visual_step == Some(i);
                        let is_rest = step.mode.kind() == Mode::Rest;

                        let button = egui::Button::new(format!("{}", i + 1))
                            .min_size(egui::vec2(56.0, 32.0))
                            .fill(if is_current {
                                egui::Color32::from_rgb(100, 200, 100)
                            } else if !is_rest {
                                egui::Color32::from_rgb(60, 60, 200)
                            } else {
                                egui::Color32::from_rgb(40, 40, 40)
                            });
                        if ui.add(button).clicked() {
                            let mode = if is_rest { Mode::Single } else { Mode::Rest };
                            edits.push((i, StepUpdate::default().mode(mode)));
                        }

                        let mut degree = step.degree;
                        if ui
                            .add(egui::Slider::new(&mut degree, 0..=max_degree).vertical())
                            .changed()
                        {
                            edits.push((i, StepUpdate::default().degree(degree)));
                        }
                        if let Some(name) = self.note_names.get(step.degree) {
                            ui.label(name.as_str());
                        }

                        let mut mode = step.mode.kind();
                        egui::ComboBox::from_id_source(("mode", i))
                            .width(56.0)
                            .selected_text(mode.name())
                            .show_ui(ui, |ui| {
                                for m in Mode::ALL {
                                    ui.selectable_value(&mut mode, m, m.name());
                                }
                            });
                        if mode != step.mode.kind() {
                            edits.push((i, StepUpdate::default().mode(mode)));
                        }

                        let mut count = step.mode.count().get();
                        if ui
                            .add(egui::Slider::new(&mut count, 1..=8).vertical())
                            .changed()
                        {
                            edits.push((i, StepUpdate::default().count(count)));
                        }
                    });
                }
            });

            for (index, update) in edits {
                self.edit_step(index, update);
            }

            // Info
            ui.separator();
            ui.label("Click a step number to mute or unmute it");
            if self.audio.is_silent() {
                ui.colored_label(
                    egui::Color32::YELLOW,
                    "⚠ No audio output available - running silent",
                );
            }
            if self.dropped_voices > 0 {
                ui.label(format!("Dropped voices: {}", self.dropped_voices));
            }
            if let Some(error) = &self.error {
                ui.colored_label(egui::Color32::LIGHT_RED, error.as_str());
            }
        });
    }
}
