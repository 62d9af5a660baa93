//! Loop range controller
//!
//! `LoopSession` owns the loop bounds, the speed multiplier and the current
//! playback position. The UI thread mutates the bounds, the playback thread
//! advances the position. A single mutex guards all four fields so neither
//! side can observe a new end paired with a stale start.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Default step for boundary nudges, in frames
pub const DEFAULT_SHIFT_STEP: usize = 50;

/// Callback fired whenever position or bounds change
pub type RefreshHook = Arc<dyn Fn() + Send + Sync>;

/// Snapshot of the loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopState {
    pub start_frame: usize,
    /// May equal the frame count until playback first normalizes it
    pub end_frame: usize,
    pub speed: u32,
    pub current_frame: usize,
}

/// Shared loop session between the control and playback threads
pub struct LoopSession {
    frame_count: usize,
    state: Mutex<LoopState>,
    refresh: Mutex<Option<RefreshHook>>,
}

impl LoopSession {
    /// Create a session spanning the whole store at normal speed
    pub fn new(frame_count: usize) -> Self {
        Self {
            frame_count,
            state: Mutex::new(LoopState {
                start_frame: 0,
                end_frame: frame_count,
                speed: 1,
                current_frame: 0,
            }),
            refresh: Mutex::new(None),
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Install the callback used to ask the status display to refresh
    pub fn set_refresh_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.refresh.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
    }

    /// Consistent copy of all loop fields
    pub fn snapshot(&self) -> LoopState {
        *self.lock()
    }

    pub fn speed(&self) -> u32 {
        self.lock().speed
    }

    /// Move the loop start. Out-of-range values are ignored.
    pub fn set_start(&self, frame: usize) -> bool {
        if frame >= self.frame_count {
            log::debug!("Ignoring loop start {} (frame count {})", frame, self.frame_count);
            return false;
        }
        self.lock().start_frame = frame;
        self.notify();
        true
    }

    /// Move the loop end. Out-of-range values are ignored.
    pub fn set_end(&self, frame: usize) -> bool {
        if frame >= self.frame_count {
            log::debug!("Ignoring loop end {} (frame count {})", frame, self.frame_count);
            return false;
        }
        self.lock().end_frame = frame;
        self.notify();
        true
    }

    /// Shift the loop start by `delta` frames, saturating at the store edges
    pub fn nudge_start(&self, delta: isize) -> usize {
        self.nudge(delta, |state| &mut state.start_frame)
    }

    /// Shift the loop end by `delta` frames, saturating at the store edges
    pub fn nudge_end(&self, delta: isize) -> usize {
        self.nudge(delta, |state| &mut state.end_frame)
    }

    /// Set the speed multiplier. Zero is ignored.
    pub fn set_speed(&self, multiplier: u32) -> bool {
        if multiplier == 0 {
            log::debug!("Ignoring speed multiplier 0");
            return false;
        }
        self.lock().speed = multiplier;
        self.notify();
        true
    }

    /// Flip between normal speed and half rate, returning the new multiplier
    pub fn toggle_speed(&self) -> u32 {
        let speed = {
            let mut state = self.lock();
            state.speed = if state.speed == 1 { 2 } else { 1 };
            state.speed
        };
        self.notify();
        speed
    }

    /// Run `f` with exclusive access to the state
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut LoopState) -> R) -> R {
        f(&mut self.lock())
    }

    /// Fire the refresh hook, if any
    pub(crate) fn notify(&self) {
        let hook = self
            .refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    fn nudge(&self, delta: isize, field: impl FnOnce(&mut LoopState) -> &mut usize) -> usize {
        if self.frame_count == 0 {
            return 0;
        }
        let last = self.frame_count - 1;
        let target = {
            let mut state = self.lock();
            let bound = field(&mut *state);
            let target = bound.saturating_add_signed(delta).min(last);
            if bound.checked_add_signed(delta) != Some(target) {
                log::debug!("Boundary clamped to frame {}", target);
            }
            *bound = target;
            target
        };
        self.notify();
        target
    }

    fn lock(&self) -> MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
