#[cfg(feature = "gui")]
use eframe::egui;

#[cfg(feature = "gui")]
use polyseq::sequencer::{RATE_LABELS, STEPS};
#[cfg(feature = "gui")]
use polyseq::{
    midi_note_name, AudioOutput, ClockSource, Edit, Editor, PlaybackEvent, Scale, SequencerBank,
    TrackRole, TraversalMode,
};
use polyseq::{Config, MidiClockInput, MidiOutputDevice, PlaybackEngine, SharedBank};
#[cfg(feature = "gui")]
use std::sync::PoisonError;
use std::sync::{Arc, Mutex};

#[cfg(feature = "gui")]
fn main() -> Result<(), eframe::Error> {
    env_logger::init();
    let config = Config::load();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 640.0])
            .with_title("polyseq"),
        ..Default::default()
    };

    eframe::run_native(
        "polyseq",
        options,
        Box::new(move |_cc| Ok(Box::new(SequencerApp::new(&config)))),
    )
}

/// Play the configured pattern on the configured port until Enter is pressed.
/// An optional argument names a config file to use instead of the user's.
#[cfg(not(feature = "gui"))]
fn main() {
    env_logger::init();
    if let Err(e) = run_headless() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "gui"))]
fn run_headless() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_path(std::path::Path::new(&path))?,
        None => Config::load(),
    };
    let mut bank = polyseq::SequencerBank::new();
    config.apply(&mut bank);

    let mut output = MidiOutputDevice::new();
    match config.output_port() {
        Some(port) => output.connect_by_name(port)?,
        None => output.connect(0)?,
    }

    // nobody polls playback events here
    let mut engine = PlaybackEngine::without_events();
    let _clock_input = match config.clock_input_port() {
        Some(port) => Some(MidiClockInput::connect(port, engine.clock_sender())?),
        None => None,
    };

    engine.start(SharedBank::new(bank), Arc::new(Mutex::new(output)));
    println!("playing, press Enter to stop");
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    engine.stop();
    Ok(())
}

#[cfg(feature = "gui")]
struct SequencerApp {
    bank: SharedBank,
    editor: Editor<SharedBank>,
    audio_output: AudioOutput,
    midi_output: Arc<Mutex<MidiOutputDevice>>,
    clock_input: Option<MidiClockInput>,
    playback_engine: PlaybackEngine,

    // UI state
    available_midi_ports: Vec<String>,
    selected_port: Option<usize>,
    available_clock_ports: Vec<String>,
    selected_voice: usize,
    selected_role: TrackRole,
    status: Option<String>,
}

#[cfg(feature = "gui")]
impl SequencerApp {
    fn new(config: &Config) -> Self {
        let mut bank = SequencerBank::new();
        config.apply(&mut bank);
        let bank = SharedBank::new(bank);

        let available_midi_ports = MidiOutputDevice::available_ports();
        let mut midi_output = MidiOutputDevice::new();
        let mut selected_port = None;
        if let Some(port) = config.output_port() {
            match midi_output.connect_by_name(port) {
                Ok(()) => {
                    selected_port = available_midi_ports
                        .iter()
                        .position(|name| Some(name.as_str()) == midi_output.port_name())
                }
                Err(e) => log::warn!("{}", e),
            }
        }

        let playback_engine = PlaybackEngine::new();
        let clock_input = config.clock_input_port().and_then(|port| {
            MidiClockInput::connect(port, playback_engine.clock_sender())
                .map_err(|e| log::warn!("{}", e))
                .ok()
        });

        Self {
            editor: Editor::new(bank.clone()),
            bank,
            audio_output: AudioOutput::default(),
            midi_output: Arc::new(Mutex::new(midi_output)),
            clock_input,
            playback_engine,
            available_midi_ports,
            selected_port,
            available_clock_ports: MidiClockInput::available_ports(),
            selected_voice: 0,
            selected_role: TrackRole::Pitch,
            status: None,
        }
    }

    fn handle_playback_events(&mut self) {
        for event in self.playback_engine.poll_events() {
            match event {
                PlaybackEvent::Midi(message) => message.send_to(&mut self.audio_output),
                PlaybackEvent::Stopped => self.audio_output.stop(),
            }
        }
    }

    fn apply_edits(&mut self, edits: Vec<Edit>) {
        for edit in edits {
            match self.editor.apply(self.selected_voice, edit) {
                Ok(()) => self.status = None,
                Err(e) => {
                    log::warn!("edit rejected: {}", e);
                    self.status = Some(e.to_string());
                }
            }
        }
    }

    fn connect_output(&mut self, port_index: usize) {
        let mut output = self.midi_output.lock().unwrap_or_else(PoisonError::into_inner);
        if self.selected_port == Some(port_index) && output.is_connected() {
            return;
        }
        match output.connect(port_index) {
            Ok(()) => self.selected_port = Some(port_index),
            Err(e) => self.status = Some(e.to_string()),
        }
    }

    fn connect_clock_input(&mut self, name: &str) {
        self.clock_input = None;
        match MidiClockInput::connect(name, self.playback_engine.clock_sender()) {
            Ok(input) => self.clock_input = Some(input),
            Err(e) => self.status = Some(e.to_string()),
        }
    }

    fn start_playback(&mut self) {
        self.playback_engine
            .start(self.bank.clone(), self.midi_output.clone());
    }

    fn stop_playback(&mut self) {
        self.playback_engine.stop();
        self.audio_output.stop();
    }

    fn output_connected(&self) -> bool {
        self.midi_output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_connected()
    }

    fn ports_ui(&mut self, ui: &mut egui::Ui) {
        let mut port_changed = None;
        let mut clock_port_changed = None;

        ui.horizontal(|ui| {
            ui.label("MIDI Output:");
            if self.available_midi_ports.is_empty() {
                ui.label("No MIDI ports available");
            } else {
                egui::ComboBox::from_id_source("midi_output")
                    .selected_text(
                        self.selected_port
                            .and_then(|i| self.available_midi_ports.get(i))
                            .map(String::as_str)
                            .unwrap_or("Select port..."),
                    )
                    .show_ui(ui, |ui| {
                        for (i, port_name) in self.available_midi_ports.iter().enumerate() {
                            if ui
                                .selectable_label(self.selected_port == Some(i), port_name)
                                .clicked()
                            {
                                port_changed = Some(i);
                            }
                        }
                    });
            }

            ui.add_space(20.0);
            ui.label("Clock Input:");
            egui::ComboBox::from_id_source("clock_input")
                .selected_text(
                    self.clock_input
                        .as_ref()
                        .map(|input| input.port_name())
                        .unwrap_or("None"),
                )
                .show_ui(ui, |ui| {
                    for port_name in &self.available_clock_ports {
                        if ui.selectable_label(false, port_name).clicked() {
                            clock_port_changed = Some(port_name.clone());
                        }
                    }
                });
        });

        if let Some(index) = port_changed {
            self.connect_output(index);
        }
        if let Some(name) = clock_port_changed {
            self.connect_clock_input(&name);
        }
    }

    fn transport_ui(&mut self, ui: &mut egui::Ui, bank: &SequencerBank, edits: &mut Vec<Edit>) {
        ui.horizontal(|ui| {
            if self.playback_engine.is_running() {
                if ui.button("⏸ Stop").clicked() {
                    self.stop_playback();
                }
            } else if ui.button("▶ Play").clicked() {
                self.start_playback();
            }

            if ui.button("⟲ Sync").clicked() {
                self.editor.resync();
            }

            ui.add_space(20.0);

            ui.label("BPM:");
            let mut bpm = bank.bpm;
            if ui.add(egui::Slider::new(&mut bpm, 20..=240)).changed() {
                edits.push(Edit::Bpm(bpm));
            }

            ui.add_space(20.0);

            let mut source = bank.clock_source;
            ui.radio_value(&mut source, ClockSource::Internal, "Internal");
            ui.radio_value(&mut source, ClockSource::MidiClock, "MIDI Clock");
            if source != bank.clock_source {
                edits.push(Edit::ClockSource(source));
            }
        });
    }

    fn voice_ui(&mut self, ui: &mut egui::Ui, bank: &SequencerBank, edits: &mut Vec<Edit>) {
        ui.horizontal(|ui| {
            for index in 0..bank.voices().len() {
                ui.selectable_value(&mut self.selected_voice, index, format!("Voice {}", index + 1));
            }
        });

        let Some(voice) = bank.voice(self.selected_voice) else {
            return;
        };
        let settings = &voice.settings;

        ui.horizontal(|ui| {
            let mut enabled = settings.enabled;
            if ui.checkbox(&mut enabled, "Enabled").changed() {
                edits.push(Edit::Enabled(enabled));
            }

            ui.label("Channel:");
            let mut channel = settings.channel + 1;
            if ui.add(egui::DragValue::new(&mut channel).clamp_range(1..=16)).changed() {
                edits.push(Edit::Channel(channel - 1));
            }

            ui.label("Scale:");
            egui::ComboBox::from_id_source("scale")
                .selected_text(settings.scale.name())
                .show_ui(ui, |ui| {
                    for scale in Scale::ALL {
                        if ui.selectable_label(settings.scale == scale, scale.name()).clicked() {
                            edits.push(Edit::Scale(scale));
                        }
                    }
                });

            ui.label("Root:");
            let mut root = voice.track(TrackRole::Pitch).root_note();
            if ui.add(egui::Slider::new(&mut root, 1..=115)).changed() {
                edits.push(Edit::Root(root));
            }
            ui.label(format!("({})", midi_note_name(root.clamp(0, 127) as u8)));
        });

        ui.horizontal(|ui| {
            let mut mod_enabled = settings.mod_enabled;
            if ui.checkbox(&mut mod_enabled, "Mod CC").changed() {
                edits.push(Edit::ModEnabled(mod_enabled));
            }
            ui.label("Channel:");
            let mut mod_channel = settings.mod_channel + 1;
            if ui.add(egui::DragValue::new(&mut mod_channel).clamp_range(1..=16)).changed() {
                edits.push(Edit::ModChannel(mod_channel - 1));
            }
            ui.label("CC#:");
            let mut controller = voice.track(TrackRole::Modulation).controller();
            if ui.add(egui::DragValue::new(&mut controller).clamp_range(0..=127)).changed() {
                edits.push(Edit::ModController(controller));
            }
        });
    }

    fn track_ui(&mut self, ui: &mut egui::Ui, bank: &SequencerBank, edits: &mut Vec<Edit>) {
        ui.horizontal(|ui| {
            for role in TrackRole::ALL {
                ui.selectable_value(&mut self.selected_role, role, role.name());
            }
        });

        let Some(voice) = bank.voice(self.selected_voice) else {
            return;
        };
        let role = self.selected_role;
        let track = voice.track(role);

        ui.horizontal(|ui| {
            ui.label("Rate:");
            egui::ComboBox::from_id_source("divider")
                .selected_text(RATE_LABELS.get(track.divider).copied().unwrap_or("?"))
                .show_ui(ui, |ui| {
                    for (index, label) in RATE_LABELS.iter().enumerate() {
                        if ui.selectable_label(track.divider == index, *label).clicked() {
                            edits.push(Edit::Divider { role, index });
                        }
                    }
                });

            ui.label("Direction:");
            egui::ComboBox::from_id_source("traversal")
                .selected_text(track.mode.name())
                .show_ui(ui, |ui| {
                    for mode in TraversalMode::ALL {
                        if ui.selectable_label(track.mode == mode, mode.name()).clicked() {
                            edits.push(Edit::Traversal { role, mode });
                        }
                    }
                });

            ui.label("Steps:");
            let mut first = track.first_step + 1;
            let mut last = track.last_step + 1;
            let first_changed = ui.add(egui::DragValue::new(&mut first).clamp_range(1..=STEPS)).changed();
            ui.label("to");
            let last_changed = ui.add(egui::DragValue::new(&mut last).clamp_range(1..=STEPS)).changed();
            if first_changed || last_changed {
                edits.push(Edit::Window { role, first: first - 1, last: last - 1 });
            }
        });

        if role == TrackRole::Probability {
            ui.horizontal(|ui| {
                ui.label("Euclid length:");
                let mut length = track.euclid_length;
                if ui.add(egui::DragValue::new(&mut length).clamp_range(1..=16)).changed() {
                    edits.push(Edit::EuclidLength(length));
                }
                ui.label("Beats:");
                let mut beats = track.euclid_beats;
                if ui.add(egui::DragValue::new(&mut beats).clamp_range(0..=16)).changed() {
                    edits.push(Edit::EuclidBeats(beats));
                }
                ui.label("Offset:");
                let mut offset = track.euclid_offset();
                if ui.add(egui::DragValue::new(&mut offset).clamp_range(0..=15)).changed() {
                    edits.push(Edit::EuclidOffset(offset));
                }
            });
        }

        ui.add_space(10.0);

        let is_playing = self.playback_engine.is_running();
        let (min, max) = role.range();
        ui.horizontal(|ui| {
            for step in 0..STEPS {
                ui.vertical(|ui| {
                    let mut value = track.values[step];
                    let slider = egui::Slider::new(&mut value, min..=max)
                        .vertical()
                        .show_value(false);
                    let in_window = (track.first_step..=track.last_step).contains(&step);
                    if ui.add_enabled(in_window, slider).changed() {
                        edits.push(Edit::StepValue { role, step, value });
                    }

                    let is_current = is_playing && track.step_index == step;
                    let label = egui::RichText::new(format!("{}\n{}", step + 1, track.values[step]));
                    ui.label(if is_current {
                        label.color(egui::Color32::from_rgb(100, 200, 100)).strong()
                    } else {
                        label
                    });
                });
            }
        });
    }
}

#[cfg(feature = "gui")]
impl eframe::App for SequencerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint();

        self.handle_playback_events();

        let snapshot = self.bank.snapshot();
        if let Some(voice) = snapshot.voice(self.selected_voice) {
            self.audio_output.channel = Some(voice.settings.channel);
        }
        let mut edits = Vec::new();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("polyseq");
            ui.add_space(10.0);

            self.ports_ui(ui);
            ui.add_space(10.0);
            self.transport_ui(ui, &snapshot, &mut edits);
            ui.separator();
            self.voice_ui(ui, &snapshot, &mut edits);
            ui.separator();
            self.track_ui(ui, &snapshot, &mut edits);

            ui.separator();
            if let Some(status) = &self.status {
                ui.colored_label(egui::Color32::LIGHT_RED, status);
            }
            if !self.output_connected() {
                ui.colored_label(
                    egui::Color32::YELLOW,
                    "⚠ No MIDI output connected - audio preview only",
                );
            }
        });

        self.apply_edits(edits);
    }
}

#[cfg(feature = "gui")]
impl Drop for SequencerApp {
    fn drop(&mut self) {
        self.stop_playback();
    }
}
