//! Output collaborators.
//!
//! - `Renderer`: primary view, fed every consumed result
//! - `StatusSink`: slow, low-bandwidth display, refreshed every M results
//! - `RecordLog`: append-only structured log, one record per result
//!
//! All three are best-effort: the output stage treats every error as a sink fault,
//! logs it and keeps consuming.

pub mod overlay;
pub mod record;
pub mod status;

pub use overlay::OverlayRenderer;
pub use record::{read_records, JsonlRecordLog};
pub use status::{StatusPanel, StatusTarget};

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::detect::DetectionResult;

const DEFAULT_LOG_DIR: &str = "data_logs";

/// What the renderer wants the pipeline to do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderFlow {
    Continue,
    /// User asked to quit; the output stage requests pipeline shutdown.
    Quit,
}

pub trait Renderer: Send {
    fn show(&mut self, result: &DetectionResult) -> Result<RenderFlow>;
}

/// Summary pushed to the status display.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatusUpdate {
    pub total: u32,
    pub counts: BTreeMap<String, u32>,
    pub rate: f64,
}

impl StatusUpdate {
    pub fn from_result(result: &DetectionResult) -> Self {
        Self {
            total: result.total(),
            counts: result.counts().clone(),
            rate: result.rate,
        }
    }
}

pub trait StatusSink: Send {
    fn update(&mut self, update: &StatusUpdate) -> Result<()>;
}

/// One line of the session log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Wall-clock time, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    pub sequence: u64,
    pub total: u32,
    pub counts: BTreeMap<String, u32>,
    /// Detection rate (results/s) when the result was produced.
    pub rate: f64,
}

impl LogRecord {
    pub fn from_result(result: &DetectionResult) -> Self {
        Self {
            timestamp_ms: unix_millis(),
            sequence: result.sequence(),
            total: result.total(),
            counts: result.counts().clone(),
            rate: result.rate,
        }
    }
}

pub trait RecordLog: Send {
    fn append(&mut self, record: &LogRecord) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Which outputs are enabled and where they write.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputSettings {
    pub enable_log: bool,
    pub log_dir: PathBuf,
    pub enable_status: bool,
    /// Status panel file; `None` writes the panel to the process log.
    pub status_path: Option<PathBuf>,
    /// Log every overlay line at info level instead of debug.
    pub preview: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            enable_log: true,
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            enable_status: true,
            status_path: None,
            preview: false,
        }
    }
}

pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
