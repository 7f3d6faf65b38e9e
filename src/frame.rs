//! Sensor captures.
//!
//! A `Frame` is an opaque capture handed from the source to the acquisition stage and
//! then moved, never copied, through the pipeline. It deliberately does not implement
//! `Clone`, so a frame can only ever sit in one queue slot:
//!
//! ```compile_fail
//! use onroad_pipeline::Frame;
//!
//! let frame = Frame::new(vec![0u8; 12], 2, 2, 1);
//! let copy = frame.clone();
//! ```

use std::time::{Duration, Instant};

pub struct Frame {
    /// Pixel bytes as produced by the source. Never logged.
    data: Vec<u8>,

    pub width: u32,
    pub height: u32,

    /// Per-source capture counter, starting at 1.
    sequence: u64,

    /// Monotonic capture instant.
    captured_at: Instant,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            data,
            width,
            height,
            sequence,
            captured_at: Instant::now(),
        }
    }

    /// Read-only pixel access for detectors.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Time since capture.
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

// Pixel content stays out of logs.
impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}
