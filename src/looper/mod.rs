//! Looper module - frame-based loop playback engine
//!
//! - `FrameStore`: decoded audio cut into fixed-size frames, built once
//! - `LoopSession`: loop bounds, speed and position shared across threads
//! - `Scheduler`: walks the loop region and feeds the sink
//! - `StatusReport`: position text for the UI

mod scheduler;
mod session;
mod status;
mod store;

pub use scheduler::{PlaybackThread, Scheduler};
pub use session::{LoopSession, LoopState, DEFAULT_SHIFT_STEP};
pub use status::{help_text, StatusReport, TrackInfo};
pub use store::FrameStore;
