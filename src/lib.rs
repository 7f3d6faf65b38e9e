//! On-road detection pipeline
//!
//! This crate runs a three-stage, real-time pipeline on an edge device:
//! a sensor produces frames, a detector annotates every N-th frame with vehicle
//! detections, and an output stage renders each result, refreshes a small status
//! display every M results and appends every result to a session log.
//!
//! # Architecture
//!
//! The pipeline keeps these properties by construction:
//!
//! 1. **Latest data over complete data**: channels are bounded and drop new items
//!    when full; a producer never waits on a slow consumer.
//! 2. **Single ownership of frames**: a `Frame` is moved through the pipeline and
//!    cannot be cloned.
//! 3. **Isolated faults**: a failed sensor read, inference or sink call is logged and
//!    counted; the stage keeps running.
//! 4. **Cooperative shutdown**: one write-once cancellation token, checked by every
//!    stage after each step; stages that miss the grace period are abandoned.
//!
//! # Module Structure
//!
//! - `rate`: per-stage throughput over one-second windows
//! - `channel`: bounded drop-on-full channel
//! - `frame`: sensor captures
//! - `ingest`: frame sources (synthetic, still file)
//! - `detect`: detector backends, category filter, detection results
//! - `sink`: renderer, status display, session log
//! - `stage`: stage loops and lifecycle
//! - `pipeline`: orchestrator
//! - `config`: daemon configuration
//! - `summary`: session log analysis

pub mod channel;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod rate;
pub mod sink;
pub mod stage;
pub mod summary;

pub use channel::{BoundedChannel, DEFAULT_QUEUE_CAPACITY};
pub use config::PipelineConfig;
pub use detect::{
    BoundingBox, CategoryFilter, Detection, DetectionResult, Detector, DetectorRegistry,
    DetectorSettings, ScriptedBackend, SyntheticBackend,
};
pub use error::{PipelineError, SinkKind};
pub use frame::Frame;
pub use ingest::{open_source, FrameSource, SourceConfig, SourceStats};
pub use pipeline::{
    OutputPlacement, Pipeline, PipelineParts, PipelineSettings, PipelineStats, ShutdownReport,
};
pub use rate::{RateHandle, RateTracker, RATE_WINDOW};
pub use sink::{
    LogRecord, OutputSettings, RecordLog, RenderFlow, Renderer, StatusSink, StatusUpdate,
};
pub use stage::{CancelToken, OutputSinks, StageKind, StageState};
pub use summary::LogSummary;
