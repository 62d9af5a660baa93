//! MIDI input handling
//!
//! Receives MIDI CC messages and maps them onto loop controls.
//! Uses a lock-free approach: the MIDI callback writes to shared atomics
//! that the UI thread reads each frame.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use midir::{MidiInput, MidiInputConnection};
use serde::{Deserialize, Serialize};

use crate::looper::LoopSession;

/// Highest speed multiplier reachable from a controller
const MAX_MIDI_SPEED: u32 = 4;

/// A loop control that can be driven via MIDI CC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MidiParam {
    LoopStart,
    LoopEnd,
    Speed,
}

impl MidiParam {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoopStart => "Loop Start",
            Self::LoopEnd => "Loop End",
            Self::Speed => "Speed",
        }
    }

    /// Map a CC value (0-127) onto this control for a store of `frame_count` frames.
    ///
    /// Loop points spread linearly over the whole store; speed steps through
    /// multipliers 1 to `MAX_MIDI_SPEED`.
    pub fn map_value(&self, cc_value: u8, frame_count: usize) -> usize {
        let cc = cc_value.min(127) as usize;
        match self {
            Self::LoopStart | Self::LoopEnd => cc * frame_count.saturating_sub(1) / 127,
            Self::Speed => 1 + cc * (MAX_MIDI_SPEED as usize - 1) / 127,
        }
    }
}

/// A single CC-to-parameter mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiMapping {
    pub cc: u8,
    pub param: MidiParam,
}

/// Mappings used when the settings file has none
pub fn default_mappings() -> Vec<MidiMapping> {
    vec![
        MidiMapping {
            cc: 20,
            param: MidiParam::LoopStart,
        },
        MidiMapping {
            cc: 21,
            param: MidiParam::LoopEnd,
        },
        MidiMapping {
            cc: 22,
            param: MidiParam::Speed,
        },
    ]
}

/// Shared CC values written by the MIDI callback, read by the UI thread.
/// Index = CC number (0-127), value = last received CC value.
#[derive(Clone)]
struct SharedCcValues {
    values: Arc<[AtomicU8; 128]>,
    /// One flag per CC (0 = not changed, 1 = changed since last poll)
    changed: Arc<[AtomicU8; 128]>,
}

impl SharedCcValues {
    fn new() -> Self {
        Self {
            values: Arc::new(std::array::from_fn(|_| AtomicU8::new(0))),
            changed: Arc::new(std::array::from_fn(|_| AtomicU8::new(0))),
        }
    }

    /// Called from MIDI callback thread
    fn set(&self, cc: u8, value: u8) {
        self.values[cc as usize].store(value, Ordering::Relaxed);
        self.changed[cc as usize].store(1, Ordering::Relaxed);
    }

    /// Read a CC value and clear its changed flag. Returns Some if changed since last poll.
    fn poll(&self, cc: u8) -> Option<u8> {
        if self.changed[cc as usize].swap(0, Ordering::Relaxed) != 0 {
            Some(self.values[cc as usize].load(Ordering::Relaxed))
        } else {
            None
        }
    }
}

/// Parse a raw MIDI message, returning (cc, value) for control changes
fn parse_cc(message: &[u8]) -> Option<(u8, u8)> {
    // [0xB0 | channel, cc_number, value]
    if message.len() == 3 && (message[0] & 0xF0) == 0xB0 {
        Some((message[1] & 0x7F, message[2] & 0x7F))
    } else {
        None
    }
}

/// MIDI input controller
pub struct MidiController {
    /// Available MIDI port names (refreshed on scan)
    pub ports: Vec<String>,

    /// Currently selected port index
    pub selected_port: usize,

    /// Active connection (None if disconnected)
    connection: Option<MidiInputConnection<()>>,

    cc_values: SharedCcValues,

    pub mappings: Vec<MidiMapping>,

    pub status: String,

    pub is_connected: bool,
}

impl MidiController {
    /// Create a controller and scan for ports
    pub fn new(mappings: Vec<MidiMapping>) -> Self {
        let mut controller = Self::with_mappings(mappings);
        controller.scan_ports();
        controller
    }

    fn with_mappings(mappings: Vec<MidiMapping>) -> Self {
        Self {
            ports: Vec::new(),
            selected_port: 0,
            connection: None,
            cc_values: SharedCcValues::new(),
            mappings,
            status: "Disconnected".to_string(),
            is_connected: false,
        }
    }

    /// Scan for available MIDI input ports
    pub fn scan_ports(&mut self) {
        self.ports.clear();
        match MidiInput::new("frameloop-scan") {
            Ok(midi_in) => {
                for port in midi_in.ports().iter() {
                    let name = midi_in
                        .port_name(port)
                        .unwrap_or_else(|_| "Unknown".to_string());
                    self.ports.push(name);
                }
                if self.ports.is_empty() {
                    self.status = "No MIDI devices found".to_string();
                }
            }
            Err(e) => {
                self.status = format!("MIDI init error: {}", e);
            }
        }
    }

    /// Select a port by name, returning whether it was found
    pub fn select_port(&mut self, name: &str) -> bool {
        match self.ports.iter().position(|p| p == name) {
            Some(index) => {
                self.selected_port = index;
                true
            }
            None => false,
        }
    }

    /// Name of the selected port, if it exists
    pub fn selected_port_name(&self) -> Option<&str> {
        self.ports.get(self.selected_port).map(String::as_str)
    }

    /// Connect to the currently selected MIDI port
    pub fn connect(&mut self) {
        if self.is_connected {
            return;
        }

        let midi_in = match MidiInput::new("frameloop") {
            Ok(m) => m,
            Err(e) => {
                self.status = format!("MIDI init error: {}", e);
                return;
            }
        };

        let ports = midi_in.ports();
        let port = match ports.get(self.selected_port) {
            Some(p) => p,
            None => {
                self.status = "Port not found".to_string();
                return;
            }
        };

        let port_name = midi_in
            .port_name(port)
            .unwrap_or_else(|_| "Unknown".to_string());

        let cc_values = self.cc_values.clone();

        match midi_in.connect(
            port,
            "frameloop-input",
            move |_timestamp, message, _| {
                if let Some((cc, value)) = parse_cc(message) {
                    cc_values.set(cc, value);
                }
            },
            (),
        ) {
            Ok(conn) => {
                self.connection = Some(conn);
                self.is_connected = true;
                self.status = format!("Connected: {}", port_name);
                log::info!("MIDI connected: {}", port_name);
            }
            Err(e) => {
                self.status = format!("Connect error: {}", e);
                log::error!("MIDI connect error: {}", e);
            }
        }
    }

    /// Disconnect from the current MIDI port
    pub fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close();
        }
        self.is_connected = false;
        self.status = "Disconnected".to_string();
        log::info!("MIDI disconnected");
    }

    /// Toggle connection state
    pub fn toggle(&mut self) {
        if self.is_connected {
            self.disconnect();
        } else {
            self.connect();
        }
    }

    /// Changed CC values for mapped controls since the last poll.
    /// Call this once per frame from the UI thread.
    pub fn poll(&mut self) -> Vec<(MidiParam, u8)> {
        self.mappings
            .iter()
            .filter_map(|mapping| {
                self.cc_values
                    .poll(mapping.cc)
                    .map(|value| (mapping.param, value))
            })
            .collect()
    }
}

/// Apply polled CC values to the loop session.
/// Returns how many updates the session accepted.
pub fn apply_updates(updates: &[(MidiParam, u8)], session: &LoopSession) -> usize {
    let frame_count = session.frame_count();
    let mut applied = 0;

    for &(param, cc_value) in updates {
        let value = param.map_value(cc_value, frame_count);
        log::debug!("MIDI {} -> {}", param.name(), value);
        let accepted = match param {
            MidiParam::LoopStart => session.set_start(value),
            MidiParam::LoopEnd => session.set_end(value),
            MidiParam::Speed => session.set_speed(value as u32),
        };
        if accepted {
            applied += 1;
        }
    }

    applied
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cc() {
        assert_eq!(parse_cc(&[0xB3, 21, 64]), Some((21, 64)));
        assert_eq!(parse_cc(&[0x90, 60, 100]), None);
        assert_eq!(parse_cc(&[0xB0, 1]), None);
    }

    #[test]
    fn test_map_value_ranges() {
        assert_eq!(MidiParam::LoopStart.map_value(0, 1000), 0);
        assert_eq!(MidiParam::LoopStart.map_value(127, 1000), 999);
        assert_eq!(MidiParam::LoopEnd.map_value(64, 128), 64);

        assert_eq!(MidiParam::Speed.map_value(0, 1000), 1);
        assert_eq!(MidiParam::Speed.map_value(127, 1000), MAX_MIDI_SPEED as usize);
    }

    #[test]
    fn test_poll_returns_only_changed_mapped_ccs() {
        let mut controller = MidiController::with_mappings(default_mappings());

        controller.cc_values.set(20, 10);
        controller.cc_values.set(99, 5);
        assert_eq!(controller.poll(), vec![(MidiParam::LoopStart, 10)]);
        assert!(controller.poll().is_empty());
    }

    #[test]
    fn test_apply_updates_moves_loop_points() {
        let session = LoopSession::new(128);
        let updates = [
            (MidiParam::LoopStart, 32),
            (MidiParam::LoopEnd, 96),
            (MidiParam::Speed, 127),
        ];

        assert_eq!(apply_updates(&updates, &session), 3);

        let state = session.snapshot();
        assert_eq!(state.start_frame, 32);
        assert_eq!(state.end_frame, 96);
        assert_eq!(state.speed, MAX_MIDI_SPEED);
    }
}
