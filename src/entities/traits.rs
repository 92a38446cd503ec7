//! Collaborator interfaces.
//!
//! The cache and player only talk to the outside world through these
//! traits. Implementations live in `core/`, `source`, the binary, or tests.

use std::sync::Arc;

use log::warn;

use super::frame::Frame;
use crate::error::FetchError;

/// Background executor for fetch jobs.
pub trait WorkerPool: Send + Sync {
    /// Run `job` on some other thread. Must not run it inline.
    fn execute(&self, job: Box<dyn FnOnce() + Send + 'static>);
}

/// Destination rectangle in surface pixels
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Bounds covering a frame at its native size
    pub fn of_frame(frame: &Frame) -> Self {
        Self::new(0.0, 0.0, frame.width() as f32, frame.height() as f32)
    }
}

/// Drawing surface for the frame player.
pub trait RenderSink: Send {
    /// Draw one frame image at the given bounds. `index` is the frame's
    /// position in its sequence.
    fn draw(&mut self, frame: &Frame, index: usize, bounds: Bounds);
}

/// Tells whether a consumer currently sits inside the viewing region.
pub trait Visibility {
    fn in_view(&self) -> bool;
}

impl<F: Fn() -> bool> Visibility for F {
    fn in_view(&self) -> bool {
        self()
    }
}

/// Receives every failed fetch. Never raises.
pub trait FailureReporter: Send + Sync {
    fn report(&self, operation: &str, error: &FetchError);
}

/// Default reporter: a warning in the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl FailureReporter for LogReporter {
    fn report(&self, operation: &str, error: &FetchError) {
        warn!("{} failed: {}", operation, error);
    }
}

impl<T: WorkerPool + ?Sized> WorkerPool for Arc<T> {
    fn execute(&self, job: Box<dyn FnOnce() + Send + 'static>) {
        (**self).execute(job)
    }
}

impl<T: FailureReporter + ?Sized> FailureReporter for Arc<T> {
    fn report(&self, operation: &str, error: &FetchError) {
        (**self).report(operation, error)
    }
}
