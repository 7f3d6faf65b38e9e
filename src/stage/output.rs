use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use super::{bump, Stage, StageCounters, StageKind, Step};
use crate::channel::BoundedChannel;
use crate::detect::DetectionResult;
use crate::error::{PipelineError, SinkKind};
use crate::rate::{RateHandle, RateTracker};
use crate::sink::{
    JsonlRecordLog, LogRecord, OutputSettings, OverlayRenderer, RecordLog, RenderFlow, Renderer,
    StatusPanel, StatusSink, StatusTarget, StatusUpdate,
};

/// The output collaborators. Status and log are optional.
pub struct OutputSinks {
    pub renderer: Box<dyn Renderer>,
    pub status: Option<Box<dyn StatusSink>>,
    pub log: Option<Box<dyn RecordLog>>,
}

impl OutputSinks {
    /// Renderer only.
    pub fn renderer(renderer: Box<dyn Renderer>) -> Self {
        Self {
            renderer,
            status: None,
            log: None,
        }
    }

    /// Build the standard sinks. Opening the session log is the only step that can fail.
    pub fn from_settings(settings: &OutputSettings) -> Result<Self> {
        let status: Option<Box<dyn StatusSink>> = if settings.enable_status {
            let target = match &settings.status_path {
                Some(path) => StatusTarget::File(path.clone()),
                None => StatusTarget::Log,
            };
            Some(Box::new(StatusPanel::new(target)))
        } else {
            None
        };
        let log: Option<Box<dyn RecordLog>> = if settings.enable_log {
            Some(Box::new(JsonlRecordLog::create_session(&settings.log_dir)?))
        } else {
            None
        };
        Ok(Self {
            renderer: Box::new(OverlayRenderer::new(settings.preview)),
            status,
            log,
        })
    }
}

/// Consumes results: render every one, refresh status every M-th, log every one.
pub struct OutputStage {
    results: Arc<BoundedChannel<DetectionResult>>,
    sinks: OutputSinks,
    status_interval: u64,
    consumed: u64,
    max_results: Option<u64>,
    rate: RateTracker,
    counters: Arc<StageCounters>,
    poll_interval: Duration,
}

impl OutputStage {
    pub fn new(
        results: Arc<BoundedChannel<DetectionResult>>,
        sinks: OutputSinks,
        status_interval: u64,
        max_results: Option<u64>,
        counters: Arc<StageCounters>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            results,
            sinks,
            status_interval: status_interval.max(1),
            consumed: 0,
            max_results,
            rate: RateTracker::new(),
            counters,
            poll_interval,
        }
    }

    pub fn rate(&self) -> RateHandle {
        self.rate.handle()
    }

    fn sink_fault(&self, sink: SinkKind, source: anyhow::Error) {
        bump(&self.counters.sink_faults);
        log::warn!("{}", PipelineError::SinkFault { sink, source });
    }

    fn consume(&mut self, result: DetectionResult) -> Step {
        self.consumed += 1;
        bump(&self.counters.results_consumed);
        self.rate.record_event();

        let mut quit = false;
        match self.sinks.renderer.show(&result) {
            Ok(RenderFlow::Continue) => {}
            Ok(RenderFlow::Quit) => quit = true,
            Err(e) => self.sink_fault(SinkKind::Renderer, e),
        }

        if self.consumed % self.status_interval == 0 {
            if let Some(status) = self.sinks.status.as_mut() {
                let outcome = status.update(&StatusUpdate::from_result(&result));
                match outcome {
                    Ok(()) => {
                        bump(&self.counters.status_updates);
                    }
                    Err(e) => self.sink_fault(SinkKind::Status, e),
                }
            }
        }

        if let Some(records) = self.sinks.log.as_mut() {
            let outcome = records.append(&LogRecord::from_result(&result));
            match outcome {
                Ok(()) => {
                    bump(&self.counters.log_records);
                }
                Err(e) => self.sink_fault(SinkKind::Log, e),
            }
        }

        if quit {
            log::info!("renderer requested quit after {} results", self.consumed);
            return Step::Stop;
        }
        if self.max_results.is_some_and(|max| self.consumed >= max) {
            log::info!("result limit reached ({} results)", self.consumed);
            return Step::Stop;
        }
        Step::Busy
    }
}

impl Stage for OutputStage {
    fn kind(&self) -> StageKind {
        StageKind::Output
    }

    fn step(&mut self) -> Step {
        match self.results.try_take() {
            Some(result) => self.consume(result),
            None => Step::Wait(self.poll_interval),
        }
    }

    fn finish(&mut self) {
        if let Some(records) = self.sinks.log.as_mut() {
            if let Err(e) = records.flush() {
                self.sink_fault(SinkKind::Log, e);
            }
        }
    }
}
