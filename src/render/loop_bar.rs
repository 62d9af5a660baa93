//! Loop overview widget
//!
//! Draws the whole file as a peak waveform with the loop region, its
//! boundaries and the playhead on top. Clicking sets a loop boundary.

use eframe::egui::{self, Color32, Pos2, Rect, Stroke, Vec2};

use crate::looper::{FrameStore, LoopState};

/// Number of peak buckets kept for the overview
const OVERVIEW_POINTS: usize = 1024;

/// Display settings for the loop bar
#[derive(Clone)]
pub struct LoopBarSettings {
    pub waveform: Color32,
    pub background: Color32,
    pub region: Color32,
    pub boundary: Color32,
    pub playhead: Color32,
    pub height: f32,
}

impl Default for LoopBarSettings {
    fn default() -> Self {
        Self {
            waveform: Color32::from_rgb(80, 120, 80),
            background: Color32::from_gray(30),
            region: Color32::from_rgba_unmultiplied(100, 255, 100, 40),
            boundary: Color32::from_rgb(100, 255, 100),
            playhead: Color32::WHITE,
            height: 60.0,
        }
    }
}

/// Loop boundary picked by clicking the bar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarClick {
    SetStart(usize),
    SetEnd(usize),
}

/// Peak amplitude (0.0-1.0) of `points` equal slices of the store.
///
/// Reads the interleaved s16le samples directly; both channels count.
pub fn overview(store: &FrameStore, points: usize) -> Vec<f32> {
    let frame_count = store.frame_count();
    if frame_count == 0 || points == 0 {
        return Vec::new();
    }

    let points = points.min(frame_count);
    let mut peaks = vec![0.0f32; points];

    for (i, frame) in store.iter().enumerate() {
        let bucket = i * points / frame_count;
        let peak = frame
            .chunks_exact(2)
            .map(|b| (i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0).abs())
            .fold(0.0f32, f32::max);
        peaks[bucket] = peaks[bucket].max(peak);
    }

    peaks
}

/// Loop overview widget
pub struct LoopBar {
    pub settings: LoopBarSettings,
    peaks: Vec<f32>,
}

impl LoopBar {
    pub fn new(store: &FrameStore) -> Self {
        Self {
            settings: LoopBarSettings::default(),
            peaks: overview(store, OVERVIEW_POINTS),
        }
    }

    fn frame_to_x(frame: usize, frame_count: usize, rect: Rect) -> f32 {
        let t = frame as f32 / frame_count.max(1) as f32;
        rect.left() + t.clamp(0.0, 1.0) * rect.width()
    }

    fn x_to_frame(x: f32, frame_count: usize, rect: Rect) -> usize {
        let t = ((x - rect.left()) / rect.width()).clamp(0.0, 1.0);
        let frame = (t * frame_count as f32) as usize;
        frame.min(frame_count.saturating_sub(1))
    }

    /// Draw the bar; returns the boundary the user clicked, if any
    pub fn show(
        &self,
        ui: &mut egui::Ui,
        state: &LoopState,
        frame_count: usize,
    ) -> Option<BarClick> {
        let size = Vec2::new(ui.available_width(), self.settings.height);
        let (response, painter) = ui.allocate_painter(size, egui::Sense::click());
        let rect = response.rect;

        painter.rect_filled(rect, 4.0, self.settings.background);

        self.draw_ticks(&painter, rect);
        self.draw_waveform(&painter, rect);
        self.draw_region(&painter, rect, state, frame_count);

        let playhead_x = Self::frame_to_x(state.current_frame, frame_count, rect);
        painter.line_segment(
            [
                Pos2::new(playhead_x, rect.top()),
                Pos2::new(playhead_x, rect.bottom()),
            ],
            Stroke::new(2.0, self.settings.playhead),
        );

        let pos = response.interact_pointer_pos()?;
        let frame = Self::x_to_frame(pos.x, frame_count, rect);
        if response.clicked() {
            Some(BarClick::SetStart(frame))
        } else if response.secondary_clicked() {
            Some(BarClick::SetEnd(frame))
        } else {
            None
        }
    }

    fn draw_ticks(&self, painter: &egui::Painter, rect: Rect) {
        let stroke = Stroke::new(0.5, Color32::from_rgba_unmultiplied(80, 100, 80, 100));

        for i in 1..10 {
            let x = rect.left() + i as f32 / 10.0 * rect.width();
            painter.line_segment([Pos2::new(x, rect.top()), Pos2::new(x, rect.bottom())], stroke);
        }
    }

    fn draw_waveform(&self, painter: &egui::Painter, rect: Rect) {
        if self.peaks.is_empty() {
            return;
        }

        let center_y = rect.center().y;
        let height = rect.height() * 0.45;
        let stroke = Stroke::new(1.0, self.settings.waveform);

        for (i, peak) in self.peaks.iter().enumerate() {
            let t = i as f32 / self.peaks.len() as f32;
            let x = rect.left() + t * rect.width();
            let amp = peak.min(1.0) * height;
            painter.line_segment(
                [Pos2::new(x, center_y - amp), Pos2::new(x, center_y + amp)],
                stroke,
            );
        }
    }

    fn draw_region(&self, painter: &egui::Painter, rect: Rect, state: &LoopState, frame_count: usize) {
        // A stored end at or past the last frame means "to the end"
        let end = state.end_frame.min(frame_count.saturating_sub(1));
        let start_x = Self::frame_to_x(state.start_frame, frame_count, rect);
        let end_x = Self::frame_to_x(end, frame_count, rect);

        if end_x > start_x {
            let region = Rect::from_x_y_ranges(start_x..=end_x, rect.y_range());
            painter.rect_filled(region, 0.0, self.settings.region);
        }

        let stroke = Stroke::new(1.5, self.settings.boundary);
        for x in [start_x, end_x] {
            painter.line_segment([Pos2::new(x, rect.top()), Pos2::new(x, rect.bottom())], stroke);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::BYTES_PER_FRAME;

    /// One frame per entry, every sample set to the given value
    fn store_of(levels: &[i16]) -> FrameStore {
        let mut raw = Vec::with_capacity(levels.len() * BYTES_PER_FRAME);
        for level in levels {
            for _ in 0..BYTES_PER_FRAME / 2 {
                raw.extend_from_slice(&level.to_le_bytes());
            }
        }
        FrameStore::build(raw, BYTES_PER_FRAME).unwrap()
    }

    #[test]
    fn test_overview_takes_peak_per_bucket() {
        let store = store_of(&[0, 16384, -32768, 8192]);
        let peaks = overview(&store, 2);

        assert_eq!(peaks.len(), 2);
        assert!((peaks[0] - 0.5).abs() < 1e-6);
        assert!((peaks[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_overview_never_exceeds_frame_count() {
        let store = store_of(&[100, 200, 300]);
        assert_eq!(overview(&store, OVERVIEW_POINTS).len(), 3);
        assert!(overview(&store, 0).is_empty());
    }

    #[test]
    fn test_position_mapping_stays_in_store() {
        let rect = Rect::from_min_size(Pos2::new(10.0, 0.0), Vec2::new(100.0, 20.0));

        assert_eq!(LoopBar::x_to_frame(10.0, 200, rect), 0);
        assert_eq!(LoopBar::x_to_frame(60.0, 200, rect), 100);
        assert_eq!(LoopBar::x_to_frame(500.0, 200, rect), 199);
        assert_eq!(LoopBar::frame_to_x(100, 200, rect), 60.0);
    }
}
