use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{bail, Result};

use crate::detect::backend::Detector;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Backend that replays fixed outputs. Used for tests, demos and the `fixed` backend.
///
/// Outputs are cycled per call; calls listed in `fail_on` (1-based) return an error
/// instead.
pub struct ScriptedBackend {
    outputs: Vec<Vec<Detection>>,
    fail_on: BTreeSet<u64>,
    latency: Duration,
    calls: u64,
}

impl ScriptedBackend {
    /// Same detections on every call.
    pub fn constant(detections: Vec<Detection>) -> Self {
        Self::sequence(vec![detections])
    }

    /// One entry per call, repeating from the start when exhausted.
    pub fn sequence(outputs: Vec<Vec<Detection>>) -> Self {
        Self {
            outputs,
            fail_on: BTreeSet::new(),
            latency: Duration::ZERO,
            calls: 0,
        }
    }

    pub fn failing_on(mut self, calls: impl IntoIterator<Item = u64>) -> Self {
        self.fail_on.extend(calls);
        self
    }

    /// Simulated inference time per call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Detector for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn infer(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        self.calls += 1;
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        if self.fail_on.contains(&self.calls) {
            bail!("scripted failure on call {}", self.calls);
        }
        if self.outputs.is_empty() {
            return Ok(Vec::new());
        }
        let index = ((self.calls - 1) % self.outputs.len() as u64) as usize;
        Ok(self.outputs[index].clone())
    }
}
