//! Playback scheduler
//!
//! Walks the frame store between the session's loop bounds and pushes frames
//! into an audio sink, forever. Slow playback is done by repetition: with a
//! speed multiplier of `n`, every fetched frame is written `n` times before
//! the next one is fetched. There is no resampling and no crossfade at the
//! loop point.
//!
//! The loop only ends when its stop flag is raised or the sink fails. A sink
//! failure is not retried.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use crate::audio::{AudioSink, SinkError};

use super::session::{LoopSession, LoopState};
use super::store::FrameStore;

/// What the last tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickState {
    /// Re-emitted the held frame
    #[default]
    ThrottleWait,
    /// Fetched the next frame
    Advancing,
}

/// Tick-driven frame scheduler
pub struct Scheduler {
    store: Arc<FrameStore>,
    session: Arc<LoopSession>,
    /// Ticks since the last fetch
    index: u32,
    /// Frame fetched on the last advancing tick
    held: Option<usize>,
    state: TickState,
}

impl Scheduler {
    pub fn new(store: Arc<FrameStore>, session: Arc<LoopSession>) -> Self {
        Self {
            store,
            session,
            index: 0,
            held: None,
            state: TickState::default(),
        }
    }

    /// Run one scheduler step
    pub fn tick<S: AudioSink + ?Sized>(&mut self, sink: &mut S) -> Result<TickState, SinkError> {
        self.index = self.index.saturating_add(1);

        if self.index <= self.session.speed() {
            if let Some(frame) = self.held.and_then(|i| self.store.frame(i)) {
                sink.write(frame)?;
            }
            self.state = TickState::ThrottleWait;
        } else {
            self.index = 0;
            self.held = Some(self.fetch_next());
            self.state = TickState::Advancing;
        }

        Ok(self.state)
    }

    /// Advance the session position and return the new frame index
    pub fn fetch_next(&mut self) -> usize {
        let frame_count = self.store.frame_count();
        let index = self
            .session
            .with_state(|state| advance(state, frame_count));
        self.session.notify();
        index
    }

    /// Tick until `stop` is raised or the sink fails
    pub fn run<S: AudioSink + ?Sized>(
        &mut self,
        sink: &mut S,
        stop: &AtomicBool,
    ) -> Result<(), SinkError> {
        log::info!("Playing ...");
        while !stop.load(Ordering::Relaxed) {
            self.tick(sink)?;
        }
        log::info!("Playback stopped");
        Ok(())
    }
}

/// Move `current_frame` one step through the loop region.
///
/// An end at or before the start means "play to the end of the store" for
/// this step only; the stored end is left alone.
fn advance(state: &mut LoopState, frame_count: usize) -> usize {
    let last = frame_count.saturating_sub(1);
    if state.end_frame > last {
        state.end_frame = last;
    }

    let end = if state.end_frame <= state.start_frame {
        last
    } else {
        state.end_frame
    };

    state.current_frame += 1;
    if state.current_frame + 1 > end || state.current_frame < state.start_frame {
        state.current_frame = state.start_frame;
    }
    state.current_frame
}

/// Scheduler running on its own thread
pub struct PlaybackThread {
    stop: Arc<AtomicBool>,
    failure: Arc<Mutex<Option<String>>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl PlaybackThread {
    /// Start playing `scheduler` into `sink`
    pub fn spawn<S>(mut scheduler: Scheduler, mut sink: S) -> std::io::Result<Self>
    where
        S: AudioSink + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let failure = Arc::new(Mutex::new(None));

        let thread_stop = Arc::clone(&stop);
        let thread_failure = Arc::clone(&failure);

        sink.watch_stop(Arc::clone(&stop));

        let handle = thread::Builder::new()
            .name("playback".to_string())
            .spawn(move || {
                if let Err(e) = scheduler.run(&mut sink, &thread_stop) {
                    log::error!("Playback error: {}", e);
                    *thread_failure
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Some(e.to_string());
                    scheduler.session.notify();
                }
            })?;

        Ok(Self {
            stop,
            failure,
            thread_handle: Some(handle),
        })
    }

    /// Ask the loop to stop and wait for it
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Sink error that ended playback, if any
    pub fn failure(&self) -> Option<String> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for PlaybackThread {
    fn drop(&mut self) {
        self.stop();
    }
}
