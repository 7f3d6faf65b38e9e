use std::sync::Arc;
use std::time::Duration;

use super::{bump, Stage, StageCounters, StageKind, Step};
use crate::channel::BoundedChannel;
use crate::error::PipelineError;
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::rate::{RateHandle, RateTracker};

/// Pulls frames from the sensor and offers them to the frame channel.
pub struct AcquisitionStage {
    source: Box<dyn FrameSource>,
    frames: Arc<BoundedChannel<Frame>>,
    rate: RateTracker,
    counters: Arc<StageCounters>,
    /// Pause after each delivered frame.
    yield_interval: Duration,
    /// Pause after a source fault before retrying.
    retry_backoff: Duration,
}

impl AcquisitionStage {
    pub fn new(
        source: Box<dyn FrameSource>,
        frames: Arc<BoundedChannel<Frame>>,
        counters: Arc<StageCounters>,
        yield_interval: Duration,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            source,
            frames,
            rate: RateTracker::new(),
            counters,
            yield_interval,
            retry_backoff,
        }
    }

    pub fn rate(&self) -> RateHandle {
        self.rate.handle()
    }

    pub(crate) fn connect(&mut self) -> anyhow::Result<()> {
        log::info!("connecting {} source", self.source.name());
        self.source.connect()
    }
}

impl Stage for AcquisitionStage {
    fn kind(&self) -> StageKind {
        StageKind::Acquisition
    }

    fn step(&mut self) -> Step {
        match self.source.acquire_frame() {
            Ok(Some(frame)) => {
                self.rate.record_event();
                bump(&self.counters.frames_acquired);
                let sequence = frame.sequence();
                if !self.frames.try_put(frame) {
                    bump(&self.counters.frames_dropped);
                    log::debug!("frame #{} dropped: frame queue full", sequence);
                }
                Step::Wait(self.yield_interval)
            }
            Ok(None) => Step::Busy,
            Err(source) => {
                let fault = PipelineError::TransientFault {
                    stage: StageKind::Acquisition,
                    source,
                };
                bump(&self.counters.acquisition_faults);
                log::warn!("{}; retrying in {:?}", fault, self.retry_backoff);
                Step::Wait(self.retry_backoff)
            }
        }
    }

    fn finish(&mut self) {
        let stats = self.source.stats();
        log::info!(
            "acquisition: {} frames captured from {}",
            stats.frames_captured,
            stats.url
        );
    }
}
