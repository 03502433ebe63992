//! Off-screen capture surface.
//!
//! Holds the still image that gets classified. Every draw first matches the
//! surface to the incoming frame's native size, then copies the frame in at
//! the origin.

use image::{imageops, RgbImage};

pub struct CaptureSurface {
    buffer: RgbImage,
}

impl CaptureSurface {
    /// An empty, zero-sized surface.
    pub fn new() -> Self {
        Self {
            buffer: RgbImage::new(0, 0),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    /// Resize to `frame`'s dimensions and draw it at (0, 0).
    pub fn draw(&mut self, frame: &RgbImage) -> &RgbImage {
        if self.buffer.dimensions() != frame.dimensions() {
            tracing::debug!(
                from = ?self.buffer.dimensions(),
                to = ?frame.dimensions(),
                "resizing capture surface"
            );
            self.buffer = RgbImage::new(frame.width(), frame.height());
        }
        imageops::replace(&mut self.buffer, frame, 0, 0);
        &self.buffer
    }

    pub fn snapshot(&self) -> &RgbImage {
        &self.buffer
    }
}

impl Default for CaptureSurface {
    fn default() -> Self {
        Self::new()
    }
}
