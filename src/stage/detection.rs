use std::sync::Arc;
use std::time::Duration;

use super::{bump, Stage, StageCounters, StageKind, Step};
use crate::channel::BoundedChannel;
use crate::detect::{CategoryFilter, DetectionResult, Detector};
use crate::error::PipelineError;
use crate::frame::Frame;
use crate::rate::{RateHandle, RateTracker};

/// Takes frames, runs inference on every N-th one and publishes results.
///
/// Skipped frames are released right away. A failed inference drops that frame
/// and the stage moves on to the next one.
pub struct DetectionStage {
    detector: Box<dyn Detector>,
    frames: Arc<BoundedChannel<Frame>>,
    results: Arc<BoundedChannel<DetectionResult>>,
    filter: CategoryFilter,
    sampling_interval: u64,
    intake: u64,
    rate: RateTracker,
    counters: Arc<StageCounters>,
    poll_interval: Duration,
}

impl DetectionStage {
    pub fn new(
        detector: Box<dyn Detector>,
        frames: Arc<BoundedChannel<Frame>>,
        results: Arc<BoundedChannel<DetectionResult>>,
        filter: CategoryFilter,
        sampling_interval: u64,
        counters: Arc<StageCounters>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            detector,
            frames,
            results,
            filter,
            sampling_interval: sampling_interval.max(1),
            intake: 0,
            rate: RateTracker::new(),
            counters,
            poll_interval,
        }
    }

    pub fn rate(&self) -> RateHandle {
        self.rate.handle()
    }

    pub(crate) fn warm_up(&mut self) -> anyhow::Result<()> {
        log::info!(
            "warming up {} detector (every {} frame(s))",
            self.detector.name(),
            self.sampling_interval
        );
        self.detector.warm_up()
    }
}

impl Stage for DetectionStage {
    fn kind(&self) -> StageKind {
        StageKind::Detection
    }

    fn step(&mut self) -> Step {
        let Some(frame) = self.frames.try_take() else {
            return Step::Wait(self.poll_interval);
        };
        self.intake += 1;
        bump(&self.counters.frames_taken);
        if self.intake % self.sampling_interval != 0 {
            bump(&self.counters.frames_skipped);
            return Step::Busy;
        }

        let detections = match self.detector.infer(&frame) {
            Ok(detections) => detections,
            Err(source) => {
                let fault = PipelineError::TransientFault {
                    stage: StageKind::Detection,
                    source,
                };
                bump(&self.counters.detection_faults);
                log::warn!("{}; frame #{} discarded", fault, frame.sequence());
                return Step::Busy;
            }
        };

        let kept = self.filter.apply(detections);
        self.rate.record_event();
        let result = DetectionResult::new(frame, kept, self.rate.current_rate());
        bump(&self.counters.frames_detected);
        let sequence = result.sequence();
        if !self.results.try_put(result) {
            bump(&self.counters.results_dropped);
            log::debug!("result #{} dropped: result queue full", sequence);
        }
        Step::Busy
    }
}
