//! Still-file frame source.
//!
//! Some camera stacks are easiest to drive as an external process that keeps
//! overwriting one capture file. `StillFileSource` watches that file and turns each
//! new version into a `Frame`. A version is "new" when its content digest differs
//! from the last one seen; timestamps are not trusted. Each new version is decoded
//! to RGB8, so frames carry the capture's real dimensions. A version that does not
//! decode (a writer caught mid-write) is reported as a fault and not retried.
//!
//! The still source MUST NOT:
//! - Fetch remote URLs
//! - Modify or delete the capture file

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use image::GenericImageView;
use sha2::{Digest, Sha256};

use super::{FrameSource, SourceConfig, SourceStats};
use crate::frame::Frame;

pub struct StillFileSource {
    config: SourceConfig,
    path: PathBuf,
    last_digest: Option<[u8; 32]>,
    frame_count: u64,
}

impl StillFileSource {
    pub fn new(config: SourceConfig) -> Self {
        let path = PathBuf::from(&config.url);
        Self {
            config,
            path,
            last_digest: None,
            frame_count: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the capture file once. `None` when it is missing or unchanged.
    fn read_if_changed(&mut self) -> Result<Option<Vec<u8>>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", self.path.display()))
            }
        };
        // A writer that truncates before writing can briefly leave an empty file.
        if bytes.is_empty() {
            return Ok(None);
        }
        let digest: [u8; 32] = Sha256::digest(&bytes).into();
        if self.last_digest == Some(digest) {
            return Ok(None);
        }
        self.last_digest = Some(digest);
        Ok(Some(bytes))
    }
}

impl FrameSource for StillFileSource {
    fn name(&self) -> &str {
        "still"
    }

    fn connect(&mut self) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        if !dir.is_dir() {
            return Err(anyhow!(
                "capture directory {} does not exist",
                dir.display()
            ));
        }
        log::info!("frame source: watching {}", self.path.display());
        Ok(())
    }

    fn acquire_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(bytes) = self.read_if_changed()? {
            let (pixels, width, height) = decode_capture(&bytes)
                .with_context(|| format!("failed to decode {}", self.path.display()))?;
            self.frame_count += 1;
            return Ok(Some(Frame::new(pixels, width, height, self.frame_count)));
        }
        // Nothing new: wait one poll window, then report "no frame yet".
        std::thread::sleep(self.config.poll_interval.max(Duration::from_millis(1)));
        Ok(None)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}

fn decode_capture(bytes: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let image = image::load_from_memory(bytes)?;
    let (width, height) = image.dimensions();
    Ok((image.into_rgb8().into_raw(), width, height))
}
