//! Pipeline stages and the machinery they share.
//!
//! A stage is a value implementing [`Stage`]: one call to `step` does one unit of work
//! (acquire a frame, detect one frame, consume one result) and reports whether the
//! caller should continue, wait, or stop. The same step functions drive both the
//! threaded pipeline (`run_loop` on a dedicated thread per stage) and the sequential
//! single-thread mode.
//!
//! Stages never share a lock. The only shared state is the two channels, the
//! [`CancelToken`], per-stage rate handles and the atomic [`StageCounters`], where
//! each counter has exactly one writing stage.

mod acquisition;
mod detection;
mod output;

pub use acquisition::AcquisitionStage;
pub use detection::DetectionStage;
pub use output::{OutputSinks, OutputStage};

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::PipelineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageKind {
    Acquisition,
    Detection,
    Output,
}

impl StageKind {
    pub fn name(self) -> &'static str {
        match self {
            StageKind::Acquisition => "acquisition",
            StageKind::Detection => "detection",
            StageKind::Output => "output",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ----------------------------------------------------------------------------
// Lifecycle
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum StageState {
    Idle = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl StageState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => StageState::Idle,
            1 => StageState::Running,
            2 => StageState::Stopping,
            _ => StageState::Stopped,
        }
    }
}

/// Shared lifecycle cell of one stage. Written by the stage, read by the orchestrator.
#[derive(Clone, Debug)]
pub struct StageStatus {
    state: Arc<AtomicU8>,
}

impl StageStatus {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(StageState::Idle as u8)),
        }
    }

    pub fn get(&self) -> StageState {
        StageState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move `from -> to`; false if the stage was not in `from`.
    pub fn transition(&self, from: StageState, to: StageState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn set(&self, state: StageState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl Default for StageStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Pipeline-wide shutdown signal. Flips from unset to set exactly once.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Returns true only for the call that set the flag.
    pub fn cancel(&self) -> bool {
        self.flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

// ----------------------------------------------------------------------------
// Counters
// ----------------------------------------------------------------------------

/// Traffic and fault counters. Every field has a single writing stage.
#[derive(Debug, Default)]
pub struct StageCounters {
    // acquisition
    pub frames_acquired: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub acquisition_faults: AtomicU64,
    // detection
    pub frames_taken: AtomicU64,
    pub frames_skipped: AtomicU64,
    pub frames_detected: AtomicU64,
    pub results_dropped: AtomicU64,
    pub detection_faults: AtomicU64,
    // output
    pub results_consumed: AtomicU64,
    pub status_updates: AtomicU64,
    pub log_records: AtomicU64,
    pub sink_faults: AtomicU64,
}

pub(crate) fn bump(counter: &AtomicU64) -> u64 {
    counter.fetch_add(1, Ordering::Relaxed) + 1
}

pub(crate) fn read(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

// ----------------------------------------------------------------------------
// Stepping
// ----------------------------------------------------------------------------

/// Outcome of one stage step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Work was done (or the stage's own blocking call returned); step again.
    Busy,
    /// Nothing to do right now; sleep this long before stepping again.
    Wait(Duration),
    /// The stage asks for the whole pipeline to shut down.
    Stop,
}

pub trait Stage: Send {
    fn kind(&self) -> StageKind;

    fn step(&mut self) -> Step;

    /// Called once after the loop exits.
    fn finish(&mut self) {}
}

/// Drive a stage until cancellation (or until it asks to stop).
///
/// Cancellation is checked before every step, and so after every sleep.
pub fn run_loop<S: Stage + ?Sized>(stage: &mut S, cancel: &CancelToken, status: &StageStatus) {
    let kind = stage.kind();
    if !status.transition(StageState::Idle, StageState::Running) {
        log::error!("{} stage already started; refusing to run twice", kind);
        return;
    }
    log::info!("{} stage running", kind);

    while !cancel.is_cancelled() {
        match stage.step() {
            Step::Busy => {}
            Step::Wait(delay) => std::thread::sleep(delay),
            Step::Stop => {
                if cancel.cancel() {
                    log::info!("{} stage requested pipeline shutdown", kind);
                }
                break;
            }
        }
    }

    status.set(StageState::Stopping);
    stage.finish();
    status.set(StageState::Stopped);
    log::info!("{} stage stopped", kind);
}

/// Orchestrator-side record of a stage running on its own thread.
#[derive(Debug)]
pub struct StageHandle {
    kind: StageKind,
    status: StageStatus,
    join: Option<JoinHandle<()>>,
}

impl StageHandle {
    /// Spawn `stage` on a named thread.
    pub fn spawn<S: Stage + 'static>(
        mut stage: S,
        cancel: CancelToken,
    ) -> Result<Self, PipelineError> {
        let kind = stage.kind();
        let status = StageStatus::new();
        let thread_status = status.clone();
        let join = std::thread::Builder::new()
            .name(format!("onroad-{}", kind))
            .spawn(move || run_loop(&mut stage, &cancel, &thread_status))
            .map_err(|e| PipelineError::startup("stage thread", e))?;
        Ok(Self {
            kind,
            status,
            join: Some(join),
        })
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn state(&self) -> StageState {
        self.status.get()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |join| join.is_finished())
    }

    /// Join the stage thread if it exits before `deadline`; otherwise abandon it.
    pub fn join_until(&mut self, deadline: Instant, grace: Duration) -> Result<(), PipelineError> {
        while !self.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        if !self.is_finished() {
            // Dropping the JoinHandle detaches the thread.
            self.join = None;
            return Err(PipelineError::ShutdownTimeout {
                stage: self.kind,
                grace,
            });
        }
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::error!("{} stage thread panicked", self.kind);
            }
        }
        Ok(())
    }
}
