//! Synthetic frame source (`stub://` URLs).
//!
//! Produces patterned RGB frames at the configured rate. Frames are generated, not
//! captured, so the source never faults; it exists for demos, soak runs and tests.

use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use super::{FrameSource, SourceConfig, SourceStats};
use crate::frame::Frame;

pub struct SyntheticSource {
    config: SourceConfig,
    frame_count: u64,
    /// Simulated scene, changes every 50 frames.
    scene_state: u8,
    next_due: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            scene_state: 0,
            next_due: None,
        }
    }

    fn frame_interval(&self) -> Duration {
        if self.config.target_fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(1.0 / self.config.target_fps as f64)
        }
    }

    /// Sleep until the next frame is due, keeping a fixed cadence.
    fn pace(&mut self) {
        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);
        if due > now {
            std::thread::sleep(due - now);
        }
        // Do not try to catch up after a long stall.
        let base = due.max(now);
        self.next_due = Some(base + self.frame_interval());
    }

    fn generate_pixels(&mut self) -> Result<Vec<u8>> {
        let pixel_count = (self.config.width as usize)
            .checked_mul(self.config.height as usize)
            .and_then(|area| area.checked_mul(3))
            .ok_or_else(|| {
                anyhow!(
                    "frame size {}x{} overflows",
                    self.config.width,
                    self.config.height
                )
            })?;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let offset = self.frame_count + self.scene_state as u64;
        Ok((0..pixel_count)
            .map(|i| ((i as u64 + offset) % 256) as u8)
            .collect())
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn connect(&mut self) -> Result<()> {
        log::info!(
            "frame source: connected to {} (synthetic, {}x{} @ {} fps)",
            self.config.url,
            self.config.width,
            self.config.height,
            self.config.target_fps
        );
        Ok(())
    }

    fn acquire_frame(&mut self) -> Result<Option<Frame>> {
        self.pace();
        let pixels = self.generate_pixels()?;
        self.frame_count += 1;
        Ok(Some(Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            self.frame_count,
        )))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}
