//! Decoded animation frames
//!
//! A `Frame` is one RGBA image plus how long it stays on screen. Frames are
//! immutable; the pixel buffer is shared (`Arc`) so sequences clone cheaply
//! out of the cache.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;

#[derive(Clone)]
pub struct Frame {
    image: Arc<RgbaImage>,
    delay_ms: u32,
    source: String,
}

impl Frame {
    pub fn new(image: RgbaImage, delay_ms: u32, source: impl Into<String>) -> Self {
        Self {
            image: Arc::new(image),
            delay_ms,
            source: source.into(),
        }
    }

    /// Solid-color frame, handy for tests and placeholders
    pub fn solid(width: u32, height: u32, rgba: [u8; 4], delay_ms: u32, source: impl Into<String>) -> Self {
        Self::new(RgbaImage::from_pixel(width, height, image::Rgba(rgba)), delay_ms, source)
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn delay_ms(&self) -> u32 {
        self.delay_ms
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms as u64)
    }

    /// File name inside the source archive
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Approximate memory footprint in bytes
    pub fn mem(&self) -> usize {
        self.image.as_raw().len()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("source", &self.source)
            .field("size", &(self.width(), self.height()))
            .field("delay_ms", &self.delay_ms)
            .finish()
    }
}

/// Ordered frames of one animation, fixed once produced.
#[derive(Clone, Debug)]
pub struct FrameSequence(Arc<[Frame]>);

impl FrameSequence {
    pub fn frames(&self) -> &[Frame] {
        &self.0
    }

    /// Sum of all frame delays (one loop)
    pub fn duration(&self) -> Duration {
        self.0.iter().map(Frame::delay).sum()
    }

    pub fn mem(&self) -> usize {
        self.0.iter().map(Frame::mem).sum()
    }
}

impl From<Vec<Frame>> for FrameSequence {
    fn from(frames: Vec<Frame>) -> Self {
        Self(frames.into())
    }
}

impl Deref for FrameSequence {
    type Target = [Frame];

    fn deref(&self) -> &[Frame] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_duration_and_mem() {
        let seq = FrameSequence::from(vec![
            Frame::solid(2, 2, [255, 0, 0, 255], 100, "000000.png"),
            Frame::solid(2, 2, [0, 255, 0, 255], 200, "000001.png"),
        ]);
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.duration(), Duration::from_millis(300));
        assert_eq!(seq.mem(), 2 * 2 * 2 * 4);
        assert_eq!(seq[1].source(), "000001.png");
        assert_eq!(seq[1].image().get_pixel(0, 0).0, [0, 255, 0, 255]);
    }
}
