use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audio::SinkConfig;
use crate::looper::DEFAULT_SHIFT_STEP;
use crate::midi::{default_mappings, MidiMapping};
use crate::LoopApp;

/// Sink buffer size in bytes
pub const DEFAULT_SINK_BUFFER_SIZE: usize = 8192;

/// Largest loop point step that still fits a signed frame offset
const MAX_SHIFT_STEP: usize = isize::MAX as usize;

/// Returns the path to the settings file: `~/.config/frameloop/settings.json`
fn settings_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("frameloop");
    path.push("settings.json");
    path
}

/// Persisted application settings.
///
/// Serialized as JSON to the platform config directory.
/// Fields use `#[serde(default)]` so that adding new settings
/// won't break existing config files. Loop points are never stored;
/// every run starts on the whole file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    // Loop controls
    pub shift_step: usize,
    pub speed: u32,

    // Output
    pub sink_buffer_size: usize,

    // MIDI
    pub midi_port: Option<String>,
    pub midi_mappings: Vec<MidiMapping>,

    // Window
    pub show_help: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            shift_step: DEFAULT_SHIFT_STEP,
            speed: 1,

            sink_buffer_size: DEFAULT_SINK_BUFFER_SIZE,

            midi_port: None,
            midi_mappings: default_mappings(),

            show_help: true,
        }
    }
}

impl AppSettings {
    /// Load settings from disk, falling back to defaults on any error.
    pub fn load() -> Self {
        Self::load_from(&settings_path())
    }

    fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    settings.sanitized()
                }
                Err(e) => {
                    log::warn!("Failed to parse settings ({}), using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                log::info!("No settings file found ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// Save settings to disk as pretty JSON.
    pub fn save(&self) {
        self.save_to(&settings_path());
    }

    fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("Failed to create config directory: {}", e);
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    log::warn!("Failed to write settings: {}", e);
                }
            }
            Err(e) => {
                log::warn!("Failed to serialize settings: {}", e);
            }
        }
    }

    /// Replace values the player cannot run with by their defaults
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.shift_step == 0 {
            log::warn!("shift_step 0 in settings, using {}", defaults.shift_step);
            self.shift_step = defaults.shift_step;
        }
        if self.shift_step > MAX_SHIFT_STEP {
            log::warn!("shift_step {} in settings, using {}", self.shift_step, MAX_SHIFT_STEP);
            self.shift_step = MAX_SHIFT_STEP;
        }
        if self.speed == 0 {
            log::warn!("speed 0 in settings, using {}", defaults.speed);
            self.speed = defaults.speed;
        }
        // Whole stereo sample pairs only
        let pair = crate::audio::CHANNELS as usize * crate::audio::BYTES_PER_SAMPLE;
        let rounded = self.sink_buffer_size - self.sink_buffer_size % pair;
        if rounded == 0 {
            log::warn!(
                "sink_buffer_size {} in settings, using {}",
                self.sink_buffer_size,
                defaults.sink_buffer_size
            );
            self.sink_buffer_size = defaults.sink_buffer_size;
        } else if rounded != self.sink_buffer_size {
            log::warn!("sink_buffer_size {} rounded down to {}", self.sink_buffer_size, rounded);
            self.sink_buffer_size = rounded;
        }
        self
    }

    /// Sink parameters for a stream at `sample_rate`
    pub fn sink_config(&self, sample_rate: u32) -> SinkConfig {
        SinkConfig {
            sample_rate,
            channels: crate::audio::CHANNELS,
            bytes_per_sample: crate::audio::BYTES_PER_SAMPLE,
            buffer_size: self.sink_buffer_size,
        }
    }

    /// Extract current settings from the running application.
    pub fn from_app(app: &LoopApp) -> Self {
        Self {
            shift_step: app.shift_step,
            speed: app.session.speed(),

            sink_buffer_size: app.sink_buffer_size,

            midi_port: app
                .midi
                .is_connected
                .then(|| app.midi.selected_port_name().map(str::to_string))
                .flatten(),
            midi_mappings: app.midi.mappings.clone(),

            show_help: app.show_help,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = AppSettings::load_from(&dir.path().join("settings.json"));
        assert_eq!(settings, AppSettings::default());
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "shift_step": 10, "speed": 0 }"#).unwrap();

        let settings = AppSettings::load_from(&path);
        assert_eq!(settings.shift_step, 10);
        assert_eq!(settings.speed, 1);
        assert_eq!(settings.sink_buffer_size, DEFAULT_SINK_BUFFER_SIZE);
        assert_eq!(settings.midi_mappings, default_mappings());
    }

    #[test]
    fn test_corrupt_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();

        assert_eq!(AppSettings::load_from(&path), AppSettings::default());
    }

    #[test]
    fn test_sink_buffer_rounds_to_whole_sample_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        std::fs::write(&path, r#"{ "sink_buffer_size": 8190 }"#).unwrap();
        assert_eq!(AppSettings::load_from(&path).sink_buffer_size, 8188);

        std::fs::write(&path, r#"{ "sink_buffer_size": 3 }"#).unwrap();
        assert_eq!(
            AppSettings::load_from(&path).sink_buffer_size,
            DEFAULT_SINK_BUFFER_SIZE
        );
    }

    #[test]
    fn test_huge_shift_step_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, format!(r#"{{ "shift_step": {} }}"#, usize::MAX)).unwrap();

        let settings = AppSettings::load_from(&path);
        assert_eq!(settings.shift_step, isize::MAX as usize);
        assert!(isize::try_from(settings.shift_step).is_ok());
    }

    #[test]
    fn test_save_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = AppSettings {
            shift_step: 25,
            midi_port: Some("Launch Control".to_string()),
            ..AppSettings::default()
        };

        settings.save_to(&path);
        assert_eq!(AppSettings::load_from(&path), settings);
    }
}
