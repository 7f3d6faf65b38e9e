//! Frame sources.
//!
//! This module provides the sources the acquisition stage pulls from:
//! - Synthetic source (`stub://<name>`), paced to a target frame rate
//! - Still-file source: a capture file rewritten by an external camera tool
//!   (e.g. `libcamera-still -o /tmp/latest_frame.jpg`), re-read whenever it changes
//!
//! Sources are responsible for:
//! - Pacing: `acquire_frame` may block until the next capture is due
//! - Numbering frames with a per-source sequence starting at 1
//!
//! Sources MUST NOT retain a frame after returning it.

pub mod still;
pub mod synthetic;

pub use still::StillFileSource;
pub use synthetic::SyntheticSource;

use std::time::Duration;

use anyhow::{bail, Result};

use crate::frame::Frame;

const DEFAULT_SOURCE_URL: &str = "stub://front_camera";
const DEFAULT_TARGET_FPS: u32 = 30;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_SOURCE_POLL_MS: u64 = 50;
/// Largest accepted frame width or height.
pub const MAX_FRAME_DIMENSION: u32 = 8192;

/// Configuration for a frame source.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceConfig {
    /// `stub://<name>` for synthetic frames, otherwise a local file path.
    pub url: String,
    /// Target frame rate (frames per second).
    pub target_fps: u32,
    /// Synthetic frame size. Still captures report their decoded size instead.
    pub width: u32,
    pub height: u32,
    /// How long a still-file read waits for the file to change before giving up.
    pub poll_interval: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SOURCE_URL.to_string(),
            target_fps: DEFAULT_TARGET_FPS,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            poll_interval: Duration::from_millis(DEFAULT_SOURCE_POLL_MS),
        }
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub url: String,
}

/// Sensor collaborator.
pub trait FrameSource: Send {
    fn name(&self) -> &str;

    /// Open the device. Called once, synchronously, before the pipeline starts;
    /// an error here is a startup failure.
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Capture the next frame.
    ///
    /// May block (this is the acquisition stage's only sanctioned blocking point).
    /// `Ok(None)` means no new frame became available within the source's own poll
    /// window; the stage simply asks again. `Err` is a transient fault.
    fn acquire_frame(&mut self) -> Result<Option<Frame>>;

    fn stats(&self) -> SourceStats;
}

/// Open the source named by `config.url`.
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    if config.url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(config.clone())));
    }
    if config.url.contains("://") {
        bail!(
            "unsupported source url '{}': expected stub://<name> or a local file path",
            config.url
        );
    }
    if config.url.trim().is_empty() {
        bail!("source url must not be empty");
    }
    Ok(Box::new(StillFileSource::new(config.clone())))
}
