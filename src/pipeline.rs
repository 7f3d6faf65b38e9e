//! Pipeline orchestrator.
//!
//! Owns both channels, the cancellation token and the stage threads. Acquisition
//! and detection always run in the background; output runs either on a third thread
//! or inline on the caller's thread. `run_sequential` drives the same three stages
//! round-robin on the calling thread instead.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::anyhow;

use crate::channel::{BoundedChannel, DEFAULT_QUEUE_CAPACITY};
use crate::detect::{CategoryFilter, DetectionResult, Detector};
use crate::error::PipelineError;
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::rate::RateHandle;
use crate::stage::{
    read, run_loop, AcquisitionStage, CancelToken, DetectionStage, OutputSinks, OutputStage,
    Stage, StageCounters, StageHandle, StageKind, StageStatus, Step,
};

pub const DEFAULT_SAMPLING_INTERVAL: u64 = 1;
pub const DEFAULT_STATUS_INTERVAL: u64 = 5;
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);
const DEFAULT_ACQUIRE_YIELD: Duration = Duration::from_millis(1);
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(100);
const DEFAULT_HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(10);
const HEALTH_TICK: Duration = Duration::from_millis(50);

/// Tuning knobs of a pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineSettings {
    /// Capacity of each of the two channels.
    pub queue_capacity: usize,
    /// Run inference on every N-th frame taken.
    pub sampling_interval: u64,
    /// Refresh the status sink every M-th consumed result.
    pub status_interval: u64,
    pub filter: CategoryFilter,
    /// How long shutdown waits for background stages.
    pub shutdown_grace: Duration,
    /// Sleep between polls of an empty channel.
    pub poll_interval: Duration,
    /// Sleep after each acquired frame.
    pub acquire_yield: Duration,
    /// Sleep after a sensor fault.
    pub retry_backoff: Duration,
    /// Period of the health log line; `None` disables it.
    pub health_log_interval: Option<Duration>,
    /// Stop after this many consumed results.
    pub max_results: Option<u64>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            sampling_interval: DEFAULT_SAMPLING_INTERVAL,
            status_interval: DEFAULT_STATUS_INTERVAL,
            filter: CategoryFilter::default(),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            acquire_yield: DEFAULT_ACQUIRE_YIELD,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            health_log_interval: Some(DEFAULT_HEALTH_LOG_INTERVAL),
            max_results: None,
        }
    }
}

/// The external collaborators a pipeline is built from.
pub struct PipelineParts {
    pub source: Box<dyn FrameSource>,
    pub detector: Box<dyn Detector>,
    pub sinks: OutputSinks,
}

/// Where the output stage runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputPlacement {
    /// On its own thread, like the other two stages.
    Background,
    /// On the caller's thread, via [`Pipeline::run_output`].
    Inline,
}

/// Point-in-time copy of every counter, rate and queue depth.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PipelineStats {
    pub frames_acquired: u64,
    pub frames_dropped: u64,
    pub acquisition_faults: u64,
    pub frames_taken: u64,
    pub frames_skipped: u64,
    pub frames_detected: u64,
    pub results_dropped: u64,
    pub detection_faults: u64,
    pub results_consumed: u64,
    pub status_updates: u64,
    pub log_records: u64,
    pub sink_faults: u64,
    pub acquisition_rate: f64,
    pub detection_rate: f64,
    pub output_rate: f64,
    pub frames_queued: usize,
    pub results_queued: usize,
    /// Time since start; zero if never started.
    pub elapsed: Duration,
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "acq {:.1}/s det {:.1}/s out {:.1}/s | acquired={} dropped={} skipped={} detected={} \
             results_dropped={} consumed={} | faults acq={} det={} sink={} | queued {}/{}",
            self.acquisition_rate,
            self.detection_rate,
            self.output_rate,
            self.frames_acquired,
            self.frames_dropped,
            self.frames_skipped,
            self.frames_detected,
            self.results_dropped,
            self.results_consumed,
            self.acquisition_faults,
            self.detection_faults,
            self.sink_faults,
            self.frames_queued,
            self.results_queued,
        )
    }
}

/// Outcome of [`Pipeline::shutdown`].
#[derive(Clone, Debug, PartialEq)]
pub struct ShutdownReport {
    pub stats: PipelineStats,
    /// Stages that missed the grace period and were left running.
    pub abandoned: Vec<StageKind>,
}

/// Everything needed to snapshot stats from any thread.
#[derive(Clone)]
struct StatsProbe {
    counters: Arc<StageCounters>,
    frames: Arc<BoundedChannel<Frame>>,
    results: Arc<BoundedChannel<DetectionResult>>,
    acquisition_rate: RateHandle,
    detection_rate: RateHandle,
    output_rate: RateHandle,
}

impl StatsProbe {
    fn snapshot(&self, started_at: Option<Instant>) -> PipelineStats {
        let c = &self.counters;
        PipelineStats {
            frames_acquired: read(&c.frames_acquired),
            frames_dropped: read(&c.frames_dropped),
            acquisition_faults: read(&c.acquisition_faults),
            frames_taken: read(&c.frames_taken),
            frames_skipped: read(&c.frames_skipped),
            frames_detected: read(&c.frames_detected),
            results_dropped: read(&c.results_dropped),
            detection_faults: read(&c.detection_faults),
            results_consumed: read(&c.results_consumed),
            status_updates: read(&c.status_updates),
            log_records: read(&c.log_records),
            sink_faults: read(&c.sink_faults),
            acquisition_rate: self.acquisition_rate.current_rate(),
            detection_rate: self.detection_rate.current_rate(),
            output_rate: self.output_rate.current_rate(),
            frames_queued: self.frames.len(),
            results_queued: self.results.len(),
            elapsed: started_at.map(|t| t.elapsed()).unwrap_or_default(),
        }
    }
}

struct Stages {
    acquisition: AcquisitionStage,
    detection: DetectionStage,
    output: OutputStage,
}

pub struct Pipeline {
    settings: PipelineSettings,
    cancel: CancelToken,
    probe: StatsProbe,
    /// Present until the pipeline starts.
    stages: Option<Stages>,
    /// Output stage waiting for `run_output` (inline placement).
    inline_output: Option<OutputStage>,
    handles: Vec<StageHandle>,
    health: Option<JoinHandle<()>>,
    started_at: Option<Instant>,
    report: Option<ShutdownReport>,
}

impl Pipeline {
    /// Wire stages and channels. Nothing runs until `start` or `run_sequential`.
    pub fn new(settings: PipelineSettings, parts: PipelineParts) -> Result<Self, PipelineError> {
        if settings.sampling_interval == 0 {
            return Err(PipelineError::startup(
                "detection stage",
                anyhow!("sampling interval must be at least 1"),
            ));
        }
        if settings.status_interval == 0 {
            return Err(PipelineError::startup(
                "output stage",
                anyhow!("status interval must be at least 1"),
            ));
        }
        let frames = Arc::new(
            BoundedChannel::new(settings.queue_capacity)
                .map_err(|e| PipelineError::startup("frame channel", e))?,
        );
        let results = Arc::new(
            BoundedChannel::new(settings.queue_capacity)
                .map_err(|e| PipelineError::startup("result channel", e))?,
        );
        let counters = Arc::new(StageCounters::default());

        let acquisition = AcquisitionStage::new(
            parts.source,
            frames.clone(),
            counters.clone(),
            settings.acquire_yield,
            settings.retry_backoff,
        );
        let detection = DetectionStage::new(
            parts.detector,
            frames.clone(),
            results.clone(),
            settings.filter.clone(),
            settings.sampling_interval,
            counters.clone(),
            settings.poll_interval,
        );
        let output = OutputStage::new(
            results.clone(),
            parts.sinks,
            settings.status_interval,
            settings.max_results,
            counters.clone(),
            settings.poll_interval,
        );

        let probe = StatsProbe {
            counters,
            frames,
            results,
            acquisition_rate: acquisition.rate(),
            detection_rate: detection.rate(),
            output_rate: output.rate(),
        };

        Ok(Self {
            settings,
            cancel: CancelToken::new(),
            probe,
            stages: Some(Stages {
                acquisition,
                detection,
                output,
            }),
            inline_output: None,
            handles: Vec::new(),
            health: None,
            started_at: None,
            report: None,
        })
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Token shared by every stage; cancelling it stops the pipeline.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn stats(&self) -> PipelineStats {
        self.probe.snapshot(self.started_at)
    }

    /// Connect the sensor and warm up the detector. Failures leave the stages in place.
    fn prepare(&mut self) -> Result<Stages, PipelineError> {
        let stages = self.stages.as_mut().ok_or(PipelineError::AlreadyStarted)?;
        stages
            .acquisition
            .connect()
            .map_err(|e| PipelineError::startup("frame source", e))?;
        stages
            .detection
            .warm_up()
            .map_err(|e| PipelineError::startup("detector", e))?;
        self.stages.take().ok_or(PipelineError::AlreadyStarted)
    }

    /// Start the background stages.
    ///
    /// With [`OutputPlacement::Inline`] the caller must then drive the output stage
    /// with [`Pipeline::run_output`].
    pub fn start(&mut self, placement: OutputPlacement) -> Result<(), PipelineError> {
        let stages = self.prepare()?;
        self.started_at = Some(Instant::now());

        let spawned = self.spawn_stages(stages, placement);
        if let Err(e) = spawned {
            self.cancel.cancel();
            return Err(e);
        }
        self.spawn_health_monitor();
        log::info!(
            "pipeline started (capacity {}, N={}, M={}, output {:?})",
            self.settings.queue_capacity,
            self.settings.sampling_interval,
            self.settings.status_interval,
            placement
        );
        Ok(())
    }

    fn spawn_stages(
        &mut self,
        stages: Stages,
        placement: OutputPlacement,
    ) -> Result<(), PipelineError> {
        let Stages {
            acquisition,
            detection,
            output,
        } = stages;
        self.handles
            .push(StageHandle::spawn(acquisition, self.cancel.clone())?);
        self.handles
            .push(StageHandle::spawn(detection, self.cancel.clone())?);
        match placement {
            OutputPlacement::Background => {
                self.handles
                    .push(StageHandle::spawn(output, self.cancel.clone())?);
            }
            OutputPlacement::Inline => self.inline_output = Some(output),
        }
        Ok(())
    }

    fn spawn_health_monitor(&mut self) {
        let Some(interval) = self.settings.health_log_interval else {
            return;
        };
        let probe = self.probe.clone();
        let cancel = self.cancel.clone();
        let started_at = self.started_at;
        let spawned = std::thread::Builder::new()
            .name("onroad-health".into())
            .spawn(move || {
                let mut next = Instant::now() + interval;
                while !cancel.is_cancelled() {
                    std::thread::sleep(HEALTH_TICK.min(interval));
                    if Instant::now() >= next {
                        log::info!("health: {}", probe.snapshot(started_at));
                        next += interval;
                    }
                }
            });
        match spawned {
            Ok(join) => self.health = Some(join),
            Err(e) => log::warn!("health monitor not started: {}", e),
        }
    }

    /// Drive the output stage on the calling thread until cancellation.
    ///
    /// Only valid after `start(OutputPlacement::Inline)`, and only once.
    pub fn run_output(&mut self) -> Result<(), PipelineError> {
        let mut output = self
            .inline_output
            .take()
            .ok_or(PipelineError::AlreadyStarted)?;
        run_loop(&mut output, &self.cancel, &StageStatus::new());
        Ok(())
    }

    /// Single-thread mode: step acquisition, detection and output in turn until
    /// cancellation or until a stage asks to stop, then shut down.
    pub fn run_sequential(&mut self) -> Result<ShutdownReport, PipelineError> {
        let mut stages = self.prepare()?;
        self.started_at = Some(Instant::now());
        log::info!(
            "pipeline running sequentially (capacity {}, N={}, M={})",
            self.settings.queue_capacity,
            self.settings.sampling_interval,
            self.settings.status_interval
        );

        let mut next_health = self
            .settings
            .health_log_interval
            .map(|interval| (Instant::now() + interval, interval));
        while !self.cancel.is_cancelled() {
            let steps = [
                stages.acquisition.step(),
                stages.detection.step(),
                stages.output.step(),
            ];
            if steps.contains(&Step::Stop) {
                self.cancel.cancel();
                break;
            }
            let idle = steps
                .iter()
                .map(|step| match step {
                    Step::Wait(delay) => Some(*delay),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
                .and_then(|delays| delays.into_iter().min());
            if let Some(delay) = idle {
                std::thread::sleep(delay);
            }
            if let Some((due, interval)) = next_health.as_mut() {
                if Instant::now() >= *due {
                    log::info!("health: {}", self.stats());
                    *due += *interval;
                }
            }
        }

        stages.acquisition.finish();
        stages.detection.finish();
        stages.output.finish();
        Ok(self.shutdown())
    }

    /// Stop everything. Idempotent: later calls return the first report.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if let Some(report) = &self.report {
            return report.clone();
        }
        if self.cancel.cancel() {
            log::info!("pipeline shutdown requested");
        }

        let grace = self.settings.shutdown_grace;
        let deadline = Instant::now() + grace;
        let mut abandoned = Vec::new();
        for handle in &mut self.handles {
            if let Err(e) = handle.join_until(deadline, grace) {
                log::warn!("{}", e);
                abandoned.push(handle.kind());
            }
        }
        self.handles.clear();
        if let Some(mut output) = self.inline_output.take() {
            output.finish();
        }
        if let Some(health) = self.health.take() {
            if health.join().is_err() {
                log::error!("health monitor thread panicked");
            }
        }
        self.probe.frames.close();
        self.probe.results.close();

        let stats = self.stats();
        if self.started_at.is_some() {
            log::info!(
                "processed {} frames in {:.1} s ({} results consumed, {} dropped at acquisition, \
                 {} dropped at detection)",
                stats.frames_detected,
                stats.elapsed.as_secs_f64(),
                stats.results_consumed,
                stats.frames_dropped,
                stats.results_dropped
            );
        }
        let report = ShutdownReport { stats, abandoned };
        self.report = Some(report.clone());
        report
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.is_started() && self.report.is_none() {
            self.shutdown();
        } else {
            self.cancel.cancel();
        }
    }
}
