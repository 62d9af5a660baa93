//! Status text
//!
//! Everything here is a pure function of the values passed in. Nothing is
//! cached; the UI asks again whenever it repaints.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::session::LoopState;

/// Width of the textual progress bar
pub const BAR_WIDTH: usize = 100;

const FILL: &str = "-";

/// Position of `frame` as an integer percentage of the store
pub fn percent_of(frame: usize, frame_count: usize) -> usize {
    frame * 100 / frame_count.max(1)
}

/// Fill-glyph bar with the percentage written in at its own position
pub fn progress_bar(percent: usize) -> String {
    match percent {
        0 => FILL.repeat(BAR_WIDTH),
        p if p >= 100 => format!("{}100", FILL.repeat(BAR_WIDTH - 1)),
        p => format!("{}{}{}", FILL.repeat(p - 1), p, FILL.repeat(BAR_WIDTH - p)),
    }
}

/// A loop boundary and where it sits in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub frame: usize,
    pub percent: usize,
}

impl Marker {
    fn new(frame: usize, frame_count: usize) -> Self {
        Self {
            frame,
            percent: percent_of(frame, frame_count),
        }
    }
}

/// Display-ready view of the playback position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub current_frame: usize,
    pub frame_count: usize,
    pub percent: usize,
    pub start: Marker,
    pub end: Marker,
    pub speed: u32,
    pub bar: String,
}

impl StatusReport {
    pub fn new(state: &LoopState, frame_count: usize) -> Self {
        let percent = percent_of(state.current_frame, frame_count);
        Self {
            current_frame: state.current_frame,
            frame_count,
            percent,
            start: Marker::new(state.start_frame, frame_count),
            end: Marker::new(state.end_frame, frame_count),
            speed: state.speed,
            bar: progress_bar(percent),
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<10}: {} ({}) ->  {} ({})",
            "Repeat", self.start.frame, self.start.percent, self.end.frame, self.end.percent
        )?;
        writeln!(
            f,
            "{:<10}: {}/{} ",
            "Frames", self.current_frame, self.frame_count
        )?;
        writeln!(f, "{:<10}: {}x", "Speed", self.speed)?;
        write!(f, "{}", self.bar)
    }
}

/// Metadata about the loaded file
#[derive(Debug, Clone)]
pub struct TrackInfo {
    pub path: PathBuf,
    pub filename: String,
    pub sample_rate: u32,
    pub frame_count: usize,
    pub duration: Duration,
}

impl TrackInfo {
    /// Describe a store of `frame_count` frames of `samples_per_frame` each
    pub fn new(
        path: impl AsRef<Path>,
        sample_rate: u32,
        frame_count: usize,
        samples_per_frame: usize,
    ) -> Self {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("Unknown")
            .to_string();

        let samples = (frame_count * samples_per_frame) as f64;
        let duration = Duration::from_secs_f64(samples / sample_rate.max(1) as f64);

        Self {
            path: path.to_path_buf(),
            filename,
            sample_rate,
            frame_count,
            duration,
        }
    }

    /// One-line notice shown once the file is playing
    pub fn loaded_message(&self) -> String {
        format!(
            "Playing {} ({} frames, {} Hz)",
            self.filename, self.frame_count, self.sample_rate
        )
    }

    /// Three-line summary for the file info view
    pub fn describe(&self) -> String {
        format!(
            "File: {}\nTime: {}\nFrames: {}",
            self.filename,
            format_duration(self.duration),
            self.frame_count
        )
    }
}

/// Format a duration as MM:SS.mmm
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{:02}:{:02}.{:03}", secs / 60, secs % 60, d.subsec_millis())
}

/// Key binding summary for the help view
pub fn help_text(step: usize) -> String {
    [
        format!("Loop start point:            <- and ->  ({} frames)", step),
        format!("Loop end point:              up and down  ({} frames)", step),
        "Speed-Up and Speed-Down      space".to_string(),
        "MIDI connect / disconnect    m".to_string(),
        "Quit                         ctrl+c, esc, q".to_string(),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(start: usize, end: usize, current: usize) -> LoopState {
        LoopState {
            start_frame: start,
            end_frame: end,
            speed: 1,
            current_frame: current,
        }
    }

    #[test]
    fn test_report_marks_position_in_bar() {
        let report = StatusReport::new(&state(20, 40, 40), 100);

        assert_eq!(report.percent, 40);
        assert_eq!(report.start, Marker { frame: 20, percent: 20 });
        assert_eq!(report.end, Marker { frame: 40, percent: 40 });

        let bar = &report.bar;
        assert!(bar[..39].chars().all(|c| c == '-'));
        assert_eq!(&bar[39..41], "40");
        assert_eq!(bar[41..].len(), 60);
        assert!(bar[41..].chars().all(|c| c == '-'));
    }

    #[test]
    fn test_bar_edges() {
        assert_eq!(progress_bar(0), "-".repeat(100));
        assert_eq!(progress_bar(100), format!("{}100", "-".repeat(99)));
        assert_eq!(progress_bar(1), format!("1{}", "-".repeat(99)));
        assert!(progress_bar(99).ends_with("99-"));
    }

    #[test]
    fn test_zero_frame_count_reports_zero() {
        assert_eq!(percent_of(0, 0), 0);
        let report = StatusReport::new(&state(0, 0, 0), 0);
        assert_eq!(report.bar, "-".repeat(100));
    }

    #[test]
    fn test_report_is_idempotent() {
        let s = state(3, 70, 55);
        let first = StatusReport::new(&s, 120).to_string();
        let second = StatusReport::new(&s, 120).to_string();
        assert_eq!(first, second);
    }

    #[test]
    fn test_report_text_layout() {
        let text = StatusReport::new(&state(20, 40, 30), 100).to_string();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "Repeat    : 20 (20) ->  40 (40)");
        assert_eq!(lines[1], "Frames    : 30/100 ");
        assert_eq!(lines[2], "Speed     : 1x");
        assert_eq!(lines[3], progress_bar(30));
    }

    #[test]
    fn test_track_info_duration() {
        // 100 frames of 1152 samples at 44.1 kHz is a little over 2.6 s
        let info = TrackInfo::new("/music/take.mp3", 44100, 100, 1152);

        assert_eq!(info.filename, "take.mp3");
        assert_eq!(info.duration.as_millis(), 2612);
        assert_eq!(info.describe(), "File: take.mp3\nTime: 00:02.612\nFrames: 100");
    }

    #[test]
    fn test_track_info_loaded_message() {
        let info = TrackInfo::new("/music/take.mp3", 48000, 250, 1152);
        assert_eq!(info.loaded_message(), "Playing take.mp3 (250 frames, 48000 Hz)");
    }
}
