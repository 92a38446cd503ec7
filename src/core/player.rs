//! Frame playback engine for decoded animations
//!
//! Two layers:
//! - `Playback`: pure state machine over `Paused(idx)` / `Playing(idx)`,
//!   driven by explicit `tick(now)` calls. No clock, no threads.
//! - `FramePlayer`: owns a `Playback`, a `RenderSink`, and a ticker thread
//!   that exists only while playing.
//!
//! # Timing Model
//!
//! Per-frame delays, not a fixed frame rate. A tick advances one frame
//! once `now - last_frame_start >= frames[idx].delay`, then restarts the
//! frame clock at `now`. The last frame wraps to the first; playback
//! never ends on its own.
//!
//! # Rendering
//!
//! Exactly one draw per index change, plus one at construction, on rewind,
//! and on bounds change. Never autoplays.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender};
use log::{debug, error, trace};

use crate::entities::frame::{Frame, FrameSequence};
use crate::entities::traits::{Bounds, RenderSink};
use crate::error::PreconditionError;

/// Observable player state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Paused(usize),
    Playing(usize),
}

impl PlayState {
    pub fn index(self) -> usize {
        match self {
            PlayState::Paused(i) | PlayState::Playing(i) => i,
        }
    }

    pub fn is_playing(self) -> bool {
        matches!(self, PlayState::Playing(_))
    }
}

/// Playback state machine (no clock of its own)
#[derive(Debug, Clone)]
pub struct Playback {
    frames: FrameSequence,
    index: usize,
    playing: bool,
    last_frame_start: Instant,
}

impl Playback {
    /// Start at `Paused(0)`.
    ///
    /// # Errors
    /// `PreconditionError::EmptyFrames` if `frames` is empty.
    pub fn new(frames: FrameSequence, now: Instant) -> Result<Self, PreconditionError> {
        if frames.is_empty() {
            return Err(PreconditionError::EmptyFrames);
        }
        Ok(Self {
            frames,
            index: 0,
            playing: false,
            last_frame_start: now,
        })
    }

    pub fn state(&self) -> PlayState {
        if self.playing {
            PlayState::Playing(self.index)
        } else {
            PlayState::Paused(self.index)
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Never true; construction rejects empty sequences
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &FrameSequence {
        &self.frames
    }

    pub fn current(&self) -> &Frame {
        &self.frames[self.index]
    }

    /// Paused -> Playing (frame clock restarts at `now`), Playing -> Paused
    /// (index kept).
    pub fn toggle(&mut self, now: Instant) -> PlayState {
        self.playing = !self.playing;
        if self.playing {
            self.last_frame_start = now;
        }
        trace!("Playback toggled: {:?}", self.state());
        self.state()
    }

    /// Any state -> `Paused(0)`
    pub fn rewind(&mut self, now: Instant) -> PlayState {
        self.playing = false;
        self.index = 0;
        self.last_frame_start = now;
        self.state()
    }

    /// Advance if the current frame's delay has elapsed.
    /// Returns the new index when it changed.
    pub fn tick(&mut self, now: Instant) -> Option<usize> {
        if !self.playing {
            return None;
        }
        let elapsed = now.saturating_duration_since(self.last_frame_start);
        if elapsed < self.current().delay() {
            return None;
        }
        self.index = (self.index + 1) % self.frames.len();
        self.last_frame_start = now;
        Some(self.index)
    }

    /// When the current frame is due to be replaced (None while paused)
    pub fn next_deadline(&self) -> Option<Instant> {
        self.playing.then(|| self.last_frame_start + self.current().delay())
    }
}

/// Playback + the surface it draws on, shared with the ticker thread
struct Core {
    playback: Playback,
    sink: Box<dyn RenderSink>,
    bounds: Bounds,
}

impl Core {
    fn render(&mut self) {
        let index = self.playback.index();
        self.sink.draw(self.playback.current(), index, self.bounds);
    }

    fn tick(&mut self, now: Instant) -> Option<usize> {
        let advanced = self.playback.tick(now);
        if advanced.is_some() {
            self.render();
        }
        advanced
    }
}

type SharedCore = Arc<Mutex<Core>>;

/// Shortest gap between ticker wakeups, about one display frame. Frames
/// with shorter (or zero) delays advance at most once per interval.
pub const MIN_FRAME_INTERVAL: Duration = Duration::from_millis(16);

fn lock(core: &SharedCore) -> MutexGuard<'_, Core> {
    core.lock().unwrap_or_else(|e| e.into_inner())
}

/// Background clock for one player. Sleeps until the next frame deadline,
/// ticks, repeats. Stopped and joined on drop.
struct Ticker {
    stop: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Ticker {
    fn start(core: SharedCore) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("picker-playback".into())
            .spawn(move || {
                trace!("Ticker started");
                let mut last_wake = Instant::now();
                loop {
                    let Some(deadline) = lock(&core).playback.next_deadline() else {
                        break;
                    };
                    let due = deadline.max(last_wake + MIN_FRAME_INTERVAL);
                    let wait = due.saturating_duration_since(Instant::now());
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {
                            last_wake = Instant::now();
                            lock(&core).tick(last_wake);
                        }
                        // stop signal or sender dropped
                        _ => break,
                    }
                }
                trace!("Ticker stopped");
            })?;

        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        // Disconnect wakes the thread immediately
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            let _ = handle.join();
        }
    }
}

/// Timed player for one frame sequence.
///
/// # Example
/// ```ignore
/// let mut player = FramePlayer::new(frames, Box::new(sink))?; // draws frame 0
/// player.toggle(); // Playing: ticker thread starts
/// player.toggle(); // Paused: ticker stopped, index kept
/// player.rewind(); // Paused(0), frame 0 redrawn
/// ```
pub struct FramePlayer {
    core: SharedCore,
    ticker: Option<Ticker>,
}

impl FramePlayer {
    /// Create paused at frame 0 and draw it at the frame's native size.
    ///
    /// # Errors
    /// `PreconditionError::EmptyFrames` for an empty sequence; nothing is
    /// drawn in that case.
    pub fn new(frames: FrameSequence, sink: Box<dyn RenderSink>) -> Result<Self, PreconditionError> {
        let playback = Playback::new(frames, Instant::now())?;
        let bounds = Bounds::of_frame(playback.current());
        let mut core = Core {
            playback,
            sink,
            bounds,
        };
        core.render();
        debug!("FramePlayer created: {} frames", core.playback.len());

        Ok(Self {
            core: Arc::new(Mutex::new(core)),
            ticker: None,
        })
    }

    pub fn state(&self) -> PlayState {
        lock(&self.core).playback.state()
    }

    pub fn index(&self) -> usize {
        lock(&self.core).playback.index()
    }

    pub fn len(&self) -> usize {
        lock(&self.core).playback.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn is_paused(&self) -> bool {
        !self.state().is_playing()
    }

    /// "current/total", 1-based
    pub fn counter(&self) -> String {
        let core = lock(&self.core);
        format!("{}/{}", core.playback.index() + 1, core.playback.len())
    }

    /// Ticker thread alive
    pub fn is_ticking(&self) -> bool {
        self.ticker.is_some()
    }

    /// Play from the current index, or pause keeping it.
    pub fn toggle(&mut self) -> PlayState {
        let state = lock(&self.core).playback.toggle(Instant::now());
        if state.is_playing() {
            self.start_ticker();
        } else {
            self.stop_ticker();
        }
        state
    }

    /// Stop and show frame 0.
    pub fn rewind(&mut self) -> PlayState {
        self.stop_ticker();
        let mut core = lock(&self.core);
        let state = core.playback.rewind(Instant::now());
        core.render();
        state
    }

    /// Manual clock for hosts that drive playback from their own loop.
    /// Returns the new index if the frame changed.
    pub fn tick(&self, now: Instant) -> Option<usize> {
        lock(&self.core).tick(now)
    }

    /// Change draw bounds and redraw the current frame.
    pub fn set_bounds(&self, bounds: Bounds) {
        let mut core = lock(&self.core);
        if core.bounds != bounds {
            core.bounds = bounds;
            core.render();
        }
    }

    fn start_ticker(&mut self) {
        if self.ticker.is_some() {
            return;
        }
        match Ticker::start(Arc::clone(&self.core)) {
            Ok(ticker) => self.ticker = Some(ticker),
            // Playback still advances through tick() from the host loop
            Err(e) => error!("Failed to start playback ticker: {}", e),
        }
    }

    fn stop_ticker(&mut self) {
        // Must not hold the core lock here: the ticker may be waiting on it
        self.ticker.take();
    }
}

impl Drop for FramePlayer {
    fn drop(&mut self) {
        self.stop_ticker();
        trace!("FramePlayer dropped");
    }
}

impl std::fmt::Debug for FramePlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePlayer")
            .field("state", &self.state())
            .field("ticking", &self.is_ticking())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(delays: &[u32]) -> FrameSequence {
        delays
            .iter()
            .enumerate()
            .map(|(i, d)| Frame::solid(2, 2, [i as u8, 0, 0, 255], *d, format!("{:06}.png", i)))
            .collect::<Vec<_>>()
            .into()
    }

    /// Records drawn indices
    #[derive(Clone, Default)]
    struct Recording(Arc<Mutex<Vec<(usize, Bounds)>>>);

    impl Recording {
        fn indices(&self) -> Vec<usize> {
            self.0.lock().unwrap().iter().map(|(i, _)| *i).collect()
        }

        fn count(&self) -> usize {
            self.0.lock().unwrap().len()
        }
    }

    impl RenderSink for Recording {
        fn draw(&mut self, _frame: &Frame, index: usize, bounds: Bounds) {
            self.0.lock().unwrap().push((index, bounds));
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_per_frame_delays_and_wrap() {
        let t0 = Instant::now();
        let mut pb = Playback::new(frames(&[100, 200, 150]), t0).unwrap();
        assert_eq!(pb.toggle(t0), PlayState::Playing(0));

        for t in 0..=460u64 {
            pb.tick(t0 + ms(t));
            let expected = match t {
                0..=99 => 0,
                100..=299 => 1,
                300..=449 => 2,
                _ => 0,
            };
            assert_eq!(pb.index(), expected, "t={}", t);
        }
        assert_eq!(pb.state(), PlayState::Playing(0));
    }

    #[test]
    fn test_late_tick_advances_one_frame() {
        let t0 = Instant::now();
        let mut pb = Playback::new(frames(&[10, 10, 10]), t0).unwrap();
        pb.toggle(t0);
        // Way past several deadlines: still only one step, clock restarts
        assert_eq!(pb.tick(t0 + ms(100)), Some(1));
        assert_eq!(pb.tick(t0 + ms(105)), None);
        assert_eq!(pb.tick(t0 + ms(110)), Some(2));
    }

    #[test]
    fn test_paused_tick_is_noop() {
        let t0 = Instant::now();
        let mut pb = Playback::new(frames(&[10, 10]), t0).unwrap();
        assert_eq!(pb.tick(t0 + ms(1000)), None);
        assert_eq!(pb.state(), PlayState::Paused(0));
        assert_eq!(pb.next_deadline(), None);
    }

    #[test]
    fn test_toggle_keeps_index() {
        let t0 = Instant::now();
        let mut pb = Playback::new(frames(&[10, 10, 10]), t0).unwrap();
        pb.toggle(t0);
        pb.tick(t0 + ms(10));
        assert_eq!(pb.toggle(t0 + ms(12)), PlayState::Paused(1));
        // Resume restarts the frame clock at the toggle time
        assert_eq!(pb.toggle(t0 + ms(50)), PlayState::Playing(1));
        assert_eq!(pb.tick(t0 + ms(55)), None);
        assert_eq!(pb.tick(t0 + ms(60)), Some(2));
    }

    #[test]
    fn test_rewind_from_any_state() {
        let t0 = Instant::now();
        for steps in 0..4u64 {
            for keep_playing in [true, false] {
                let mut pb = Playback::new(frames(&[10, 10, 10]), t0).unwrap();
                pb.toggle(t0);
                for s in 1..=steps {
                    pb.tick(t0 + ms(10 * s));
                }
                if !keep_playing {
                    pb.toggle(t0 + ms(100));
                }
                assert_eq!(pb.rewind(t0 + ms(200)), PlayState::Paused(0));
            }
        }
    }

    #[test]
    fn test_index_stays_in_range() {
        let t0 = Instant::now();
        let mut pb = Playback::new(frames(&[1]), t0).unwrap();
        pb.toggle(t0);
        for t in 1..50 {
            pb.tick(t0 + ms(t));
            assert_eq!(pb.index(), 0);
        }
    }

    #[test]
    fn test_empty_frames_rejected() {
        let sink = Recording::default();
        let err = FramePlayer::new(FrameSequence::from(Vec::new()), Box::new(sink.clone())).unwrap_err();
        assert_eq!(err, PreconditionError::EmptyFrames);
        assert_eq!(sink.count(), 0);
        assert!(Playback::new(FrameSequence::from(Vec::new()), Instant::now()).is_err());
    }

    #[test]
    fn test_new_player_draws_first_frame_paused() {
        let sink = Recording::default();
        let player = FramePlayer::new(frames(&[10, 10]), Box::new(sink.clone())).unwrap();
        assert_eq!(player.state(), PlayState::Paused(0));
        assert!(!player.is_ticking());
        assert_eq!(sink.indices(), vec![0]);
        assert_eq!(sink.0.lock().unwrap()[0].1, Bounds::new(0.0, 0.0, 2.0, 2.0));
        assert_eq!(player.counter(), "1/2");
    }

    #[test]
    fn test_manual_tick_renders_each_change() {
        let sink = Recording::default();
        let mut player = FramePlayer::new(frames(&[1000, 1000, 1000]), Box::new(sink.clone())).unwrap();
        player.toggle();
        player.toggle();
        // Paused: manual ticks draw nothing
        assert_eq!(player.tick(Instant::now() + ms(1000)), None);
        assert_eq!(sink.indices(), vec![0]);

        player.rewind();
        assert_eq!(sink.indices(), vec![0, 0]);

        player.set_bounds(Bounds::new(0.0, 0.0, 100.0, 50.0));
        player.set_bounds(Bounds::new(0.0, 0.0, 100.0, 50.0));
        assert_eq!(sink.count(), 3);
    }

    #[test]
    fn test_ticker_lifecycle() {
        let sink = Recording::default();
        let mut player = FramePlayer::new(frames(&[5, 5, 5]), Box::new(sink.clone())).unwrap();

        assert!(player.toggle().is_playing());
        assert!(player.is_ticking());
        thread::sleep(ms(150));
        assert!(sink.count() > 3, "ticker should have advanced frames");
        let drawn = sink.indices();
        assert!(drawn.windows(2).all(|w| w[1] == (w[0] + 1) % 3));

        // Pause releases the ticker
        let paused = player.toggle();
        assert!(!paused.is_playing());
        assert!(!player.is_ticking());
        let after_pause = sink.count();
        thread::sleep(ms(40));
        assert_eq!(sink.count(), after_pause);
        assert_eq!(player.index(), paused.index());

        // Drop while playing stops the thread too
        player.toggle();
        drop(player);
        let after_drop = sink.count();
        thread::sleep(ms(40));
        assert_eq!(sink.count(), after_drop);
    }

    #[test]
    fn test_zero_delay_frames_are_rate_limited() {
        let sink = Recording::default();
        let mut player = FramePlayer::new(frames(&[0, 0]), Box::new(sink.clone())).unwrap();

        player.toggle();
        thread::sleep(ms(100));
        player.toggle();
        let draws = sink.count();

        // 1 initial draw plus at most one per interval (~6 in 100 ms)
        assert!(draws > 1, "ticker should still advance zero-delay frames");
        assert!(draws <= 12, "ticker spun: {} draws in 100 ms", draws);
        let drawn = sink.indices();
        assert!(drawn.windows(2).all(|w| w[1] == (w[0] + 1) % 2));
    }

    #[test]
    fn test_rewind_while_playing_stops_ticker() {
        let sink = Recording::default();
        let mut player = FramePlayer::new(frames(&[5, 5, 5]), Box::new(sink.clone())).unwrap();
        player.toggle();
        thread::sleep(ms(20));
        assert_eq!(player.rewind(), PlayState::Paused(0));
        assert!(!player.is_ticking());
        assert_eq!(sink.indices().last(), Some(&0));
    }
}
