use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// `infer` may be slow and its latency is unbounded; the detection stage is the only
/// caller. Implementations return every raw detection they find; category and
/// confidence filtering happens in the stage, not here.
///
/// Errors are treated as transient: the stage logs them, drops the frame and moves on.
pub trait Detector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// The frame is borrowed for the duration of the call only.
    fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook, run once before the pipeline starts.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
