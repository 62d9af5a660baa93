//! frameloop - Loop Player
//!
//! Decodes an audio file into fixed-size frames and plays a chosen region of
//! it over and over. Playback can be slowed down by repeating every frame,
//! and the loop points can be moved from the keyboard, the mouse or a MIDI
//! controller while the audio keeps running.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex, PoisonError};

use eframe::egui;
use thiserror::Error;

mod audio;
mod looper;
mod midi;
mod render;
mod settings;

use audio::{
    AudioDecoder, DecodeError, OpenError, OutputDevice, SinkError, BYTES_PER_FRAME,
    SAMPLES_PER_FRAME,
};
use looper::{help_text, FrameStore, LoopSession, PlaybackThread, Scheduler, StatusReport, TrackInfo};
use midi::MidiController;
use render::{BarClick, LoopBar};
use settings::AppSettings;

const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "ogg", "m4a", "aac", "aiff"];

/// Anything that ends the program early
#[derive(Error, Debug)]
enum AppError {
    #[error("No audio file selected")]
    NoFile,

    #[error(transparent)]
    Open(#[from] OpenError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Audio output: {0}")]
    Sink(#[from] SinkError),

    #[error("Failed to start playback thread: {0}")]
    Thread(#[source] std::io::Error),

    #[error("UI error: {0}")]
    Ui(#[from] eframe::Error),

    #[error("Playback failed: {0}")]
    Playback(String),
}

fn main() -> ExitCode {
    env_logger::init();
    log::info!("Starting frameloop");

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("frameloop: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// File named on the command line, or one picked from a dialog
fn choose_file() -> Option<PathBuf> {
    if let Some(arg) = std::env::args_os().nth(1) {
        return Some(PathBuf::from(arg));
    }
    rfd::FileDialog::new()
        .add_filter("Audio", AUDIO_EXTENSIONS)
        .pick_file()
}

/// Decode a whole file into a frame store
fn load_track(path: &Path) -> Result<(FrameStore, TrackInfo), AppError> {
    let mut decoder = AudioDecoder::open(path)?;
    let raw = decoder.read_all()?;
    let store = FrameStore::build(raw, BYTES_PER_FRAME)?;

    log::info!(
        "Loaded {:?}: {} frames of {} bytes from {} source channel(s)",
        decoder.path(),
        store.frame_count(),
        store.frame_size(),
        decoder.source_channels()
    );

    let track = TrackInfo::new(
        decoder.path(),
        decoder.sample_rate(),
        store.frame_count(),
        SAMPLES_PER_FRAME,
    );
    Ok((store, track))
}

/// Playback thread and the device it feeds.
///
/// Fields drop in order, so the thread is joined before the stream closes.
struct Engine {
    player: PlaybackThread,
    output: OutputDevice,
}

fn run() -> Result<(), AppError> {
    let settings = AppSettings::load();

    let path = choose_file().ok_or(AppError::NoFile)?;
    let (store, track) = load_track(&path)?;
    let store = Arc::new(store);

    let session = Arc::new(LoopSession::new(store.frame_count()));
    session.set_speed(settings.speed);

    let (output, writer) = OutputDevice::open(settings.sink_config(track.sample_rate))?;
    let scheduler = Scheduler::new(Arc::clone(&store), Arc::clone(&session));
    let player = PlaybackThread::spawn(scheduler, writer).map_err(AppError::Thread)?;
    let engine = Engine { player, output };

    let loop_bar = LoopBar::new(&store);
    let exit_error = Arc::new(Mutex::new(None));
    let app_exit_error = Arc::clone(&exit_error);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([820.0, 420.0])
            .with_title(format!("frameloop - {}", track.filename)),
        ..Default::default()
    };

    eframe::run_native(
        "frameloop",
        options,
        Box::new(move |cc| {
            Ok(Box::new(LoopApp::new(
                cc,
                engine,
                session,
                track,
                loop_bar,
                settings,
                app_exit_error,
            )))
        }),
    )?;

    let exit_message = exit_error
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    match exit_message {
        Some(message) => Err(AppError::Playback(message)),
        None => Ok(()),
    }
}

/// Keyboard commands seen this frame
#[derive(Debug, Default)]
struct KeyInput {
    /// Steps to move the start point (negative is earlier)
    start: isize,
    /// Steps to move the end point
    end: isize,
    toggle_speed: bool,
    toggle_midi: bool,
    quit: bool,
}

impl KeyInput {
    fn read(input: &egui::InputState) -> Self {
        use egui::Key;

        let pressed = |key| input.key_pressed(key);
        let step = |down: Key, up: Key| pressed(up) as isize - pressed(down) as isize;

        // Ctrl+C arrives as a copy event on most platforms
        let ctrl_c = (input.modifiers.ctrl && pressed(Key::C))
            || input.events.iter().any(|e| matches!(e, egui::Event::Copy));

        Self {
            start: step(Key::ArrowLeft, Key::ArrowRight),
            end: step(Key::ArrowDown, Key::ArrowUp),
            toggle_speed: pressed(Key::Space),
            toggle_midi: pressed(Key::M),
            quit: ctrl_c || pressed(Key::Escape) || pressed(Key::Q),
        }
    }
}

pub struct LoopApp {
    engine: Engine,
    session: Arc<LoopSession>,
    track: TrackInfo,
    loop_bar: LoopBar,
    midi: MidiController,
    shift_step: usize,
    sink_buffer_size: usize,
    show_help: bool,
    /// Latest start-up, MIDI or operator notice, shown under the status
    message: String,
    exit_error: Arc<Mutex<Option<String>>>,
}

impl LoopApp {
    fn new(
        cc: &eframe::CreationContext<'_>,
        engine: Engine,
        session: Arc<LoopSession>,
        track: TrackInfo,
        loop_bar: LoopBar,
        settings: AppSettings,
        exit_error: Arc<Mutex<Option<String>>>,
    ) -> Self {
        // Every position change wakes the UI
        let ctx = cc.egui_ctx.clone();
        session.set_refresh_hook(move || ctx.request_repaint());

        let mut message = track.loaded_message();
        log::info!("{}", message);

        let mut midi = MidiController::new(settings.midi_mappings.clone());
        if let Some(port) = &settings.midi_port {
            if midi.select_port(port) {
                midi.connect();
                message = format!("{} | MIDI {}", message, midi.status);
            } else {
                log::warn!("MIDI port {:?} not found", port);
                message = format!("{} | MIDI port {} not found", message, port);
            }
        }

        Self {
            engine,
            session,
            track,
            loop_bar,
            midi,
            shift_step: settings.shift_step,
            sink_buffer_size: settings.sink_buffer_size,
            show_help: settings.show_help,
            message,
            exit_error,
        }
    }

    fn apply_keys(&mut self, keys: &KeyInput) {
        let step = isize::try_from(self.shift_step).unwrap_or(isize::MAX);
        if keys.start != 0 {
            let start = self.session.nudge_start(keys.start.saturating_mul(step));
            self.message = format!("Loop start: {}", start);
        }
        if keys.end != 0 {
            let end = self.session.nudge_end(keys.end.saturating_mul(step));
            self.message = format!("Loop end: {}", end);
        }
        if keys.toggle_speed {
            let speed = self.session.toggle_speed();
            log::info!("Speed {}x", speed);
            self.message = format!("Speed: {}x", speed);
        }
        if keys.toggle_midi {
            self.midi.toggle();
            self.message = self.midi.status.clone();
        }
    }

    fn apply_click(&mut self, click: BarClick) {
        let (accepted, label, frame) = match click {
            BarClick::SetStart(frame) => (self.session.set_start(frame), "start", frame),
            BarClick::SetEnd(frame) => (self.session.set_end(frame), "end", frame),
        };
        if accepted {
            self.message = format!("Loop {}: {}", label, frame);
        }
    }

    /// Record a playback failure and close the window
    fn check_playback(&self, ctx: &egui::Context) {
        if let Some(message) = self.engine.player.failure() {
            let mut exit_error = self
                .exit_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if exit_error.is_none() {
                *exit_error = Some(message);
                ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            }
        }
    }
}

impl eframe::App for LoopApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let keys = ctx.input(KeyInput::read);
        self.apply_keys(&keys);

        let updates = self.midi.poll();
        if !updates.is_empty() {
            midi::apply_updates(&updates, &self.session);
        }

        self.check_playback(ctx);

        if keys.quit || ctx.input(|i| i.viewport().close_requested()) {
            AppSettings::from_app(self).save();
        }
        if keys.quit {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }

        // Top panel
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("frameloop");
                ui.separator();

                let midi_text = if self.midi.is_connected {
                    "MIDI on"
                } else {
                    "MIDI off"
                };
                if ui.button(midi_text).clicked() {
                    self.midi.toggle();
                }
                ui.label(&self.midi.status);

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.toggle_value(&mut self.show_help, "Help");
                    ui.separator();
                    ui.small(format!(
                        "{} ({} ch)",
                        self.engine.output.device_name(),
                        self.engine.output.channels()
                    ));
                });
            });
        });

        if self.show_help {
            egui::SidePanel::right("help_panel")
                .min_width(280.0)
                .show(ctx, |ui| {
                    ui.heading("Help");
                    ui.separator();
                    ui.monospace(help_text(self.shift_step));
                });
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Playing File");
            ui.label(self.track.describe())
                .on_hover_text(self.track.path.display().to_string());

            ui.separator();

            ui.heading("Status");
            let state = self.session.snapshot();
            let frame_count = self.session.frame_count();
            ui.monospace(StatusReport::new(&state, frame_count).to_string());

            ui.add_space(8.0);
            if let Some(click) = self.loop_bar.show(ui, &state, frame_count) {
                self.apply_click(click);
            }

            ui.add_space(4.0);
            if self.engine.player.is_running() {
                ui.label(&self.message);
            } else {
                ui.colored_label(egui::Color32::LIGHT_RED, "Playback stopped");
            }
        });
    }
}
