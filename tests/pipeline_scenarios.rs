//! End-to-end pipeline scenarios.
//!
//! These tests verify that:
//! 1. Every result is rendered and logged; status refreshes after every M-th result
//! 2. A failed inference loses only its own frame
//! 3. Sampling processes exactly every N-th frame
//! 4. Full channels drop frames without stalling the producer
//! 5. Start/shutdown follow the lifecycle rules (no double start, idempotent shutdown)
//! 6. A stuck stage is abandoned after the grace period

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};

use onroad_pipeline::{
    BoundingBox, Detection, DetectionResult, DetectorRegistry, Frame, FrameSource, LogRecord,
    OutputPlacement, OutputSinks, Pipeline, PipelineConfig, PipelineError, PipelineParts,
    PipelineSettings, RecordLog, RenderFlow, Renderer, ScriptedBackend, SourceStats, StageKind,
    StatusSink, StatusUpdate,
};

const WAIT: Duration = Duration::from_secs(5);

// ----------------------------------------------------------------------------
// Collaborators
// ----------------------------------------------------------------------------

/// Emits one frame per token received; reports "no frame" when the gate is idle.
struct GatedSource {
    gate: Receiver<u64>,
    captured: u64,
    fail_connect: bool,
}

impl FrameSource for GatedSource {
    fn name(&self) -> &str {
        "gated"
    }

    fn connect(&mut self) -> Result<()> {
        if self.fail_connect {
            bail!("camera not found");
        }
        Ok(())
    }

    fn acquire_frame(&mut self) -> Result<Option<Frame>> {
        match self.gate.recv_timeout(Duration::from_millis(20)) {
            Ok(sequence) => {
                self.captured += 1;
                Ok(Some(Frame::new(vec![0; 12], 2, 2, sequence)))
            }
            Err(_) => Ok(None),
        }
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.captured,
            url: "gated://test".into(),
        }
    }
}

fn gated_source() -> (Sender<u64>, Box<dyn FrameSource>) {
    let (tx, rx) = unbounded();
    let source = GatedSource {
        gate: rx,
        captured: 0,
        fail_connect: false,
    };
    (tx, Box::new(source))
}

/// Produces frames as fast as it is asked.
struct CountingSource {
    next: u64,
}

impl FrameSource for CountingSource {
    fn name(&self) -> &str {
        "counting"
    }

    fn acquire_frame(&mut self) -> Result<Option<Frame>> {
        self.next += 1;
        Ok(Some(Frame::new(vec![0; 12], 2, 2, self.next)))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.next,
            url: "counting://test".into(),
        }
    }
}

/// Blocks far longer than any grace period.
struct StuckSource;

impl FrameSource for StuckSource {
    fn name(&self) -> &str {
        "stuck"
    }

    fn acquire_frame(&mut self) -> Result<Option<Frame>> {
        std::thread::sleep(Duration::from_secs(3));
        Ok(None)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: 0,
            url: "stuck://test".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Entry {
    Render(u64),
    Status(StatusUpdate),
    Log(u64),
}

type Timeline = Arc<Mutex<Vec<Entry>>>;

struct TimelineRenderer {
    timeline: Timeline,
    quit_on: Option<u64>,
    fail: bool,
}

impl Renderer for TimelineRenderer {
    fn show(&mut self, result: &DetectionResult) -> Result<RenderFlow> {
        self.timeline
            .lock()
            .unwrap()
            .push(Entry::Render(result.sequence()));
        if self.fail {
            bail!("display disconnected");
        }
        if self.quit_on == Some(result.sequence()) {
            return Ok(RenderFlow::Quit);
        }
        Ok(RenderFlow::Continue)
    }
}

struct TimelineStatus(Timeline);

impl StatusSink for TimelineStatus {
    fn update(&mut self, update: &StatusUpdate) -> Result<()> {
        self.0.lock().unwrap().push(Entry::Status(update.clone()));
        Ok(())
    }
}

struct TimelineLog(Timeline);

impl RecordLog for TimelineLog {
    fn append(&mut self, record: &LogRecord) -> Result<()> {
        self.0.lock().unwrap().push(Entry::Log(record.sequence));
        Ok(())
    }
}

fn timeline_sinks(timeline: &Timeline) -> OutputSinks {
    OutputSinks {
        renderer: Box::new(TimelineRenderer {
            timeline: timeline.clone(),
            quit_on: None,
            fail: false,
        }),
        status: Some(Box::new(TimelineStatus(timeline.clone()))),
        log: Some(Box::new(TimelineLog(timeline.clone()))),
    }
}

fn logged(timeline: &Timeline) -> Vec<u64> {
    timeline
        .lock()
        .unwrap()
        .iter()
        .filter_map(|entry| match entry {
            Entry::Log(sequence) => Some(*sequence),
            _ => None,
        })
        .collect()
}

fn car() -> Detection {
    Detection::new("car", 0.9, BoundingBox::default())
}

fn settings(capacity: usize, sampling: u64, status: u64) -> PipelineSettings {
    PipelineSettings {
        queue_capacity: capacity,
        sampling_interval: sampling,
        status_interval: status,
        poll_interval: Duration::from_millis(2),
        health_log_interval: None,
        ..PipelineSettings::default()
    }
}

fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(2));
    }
}

// ----------------------------------------------------------------------------
// Scenarios
// ----------------------------------------------------------------------------

#[test]
fn twelve_frames_give_twelve_logs_and_two_status_updates() {
    let timeline = Timeline::default();
    let (gate, source) = gated_source();
    let parts = PipelineParts {
        source,
        detector: Box::new(ScriptedBackend::constant(vec![car()])),
        sinks: timeline_sinks(&timeline),
    };
    let mut pipeline = Pipeline::new(settings(5, 1, 5), parts).unwrap();
    pipeline.start(OutputPlacement::Background).unwrap();

    for sequence in 1..=12 {
        gate.send(sequence).unwrap();
        wait_until("result to be consumed", || {
            pipeline.stats().results_consumed == sequence
        });
    }
    let report = pipeline.shutdown();

    assert_eq!(report.stats.results_consumed, 12);
    assert_eq!(report.stats.log_records, 12);
    assert_eq!(report.stats.status_updates, 2);
    assert_eq!(report.stats.frames_dropped, 0);
    assert!(report.abandoned.is_empty());
    assert_eq!(logged(&timeline), (1..=12).collect::<Vec<_>>());

    let entries = timeline.lock().unwrap().clone();
    let status_positions: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| matches!(entry, Entry::Status(_)))
        .map(|(index, _)| index)
        .collect();
    assert_eq!(status_positions.len(), 2);
    assert_eq!(entries[status_positions[0] - 1], Entry::Render(5));
    assert_eq!(entries[status_positions[1] - 1], Entry::Render(10));

    let Entry::Status(last) = &entries[status_positions[1]] else {
        unreachable!()
    };
    assert_eq!(last.total, 1);
    assert_eq!(last.counts.get("car"), Some(&1));
    assert_eq!(last.counts.len(), 1);
}

#[test]
fn detector_failure_skips_only_the_failing_frame() {
    let timeline = Timeline::default();
    let (gate, source) = gated_source();
    let parts = PipelineParts {
        source,
        detector: Box::new(ScriptedBackend::constant(vec![car()]).failing_on([3])),
        sinks: timeline_sinks(&timeline),
    };
    let mut pipeline = Pipeline::new(settings(5, 1, 5), parts).unwrap();
    pipeline.start(OutputPlacement::Background).unwrap();

    for sequence in 1..=5 {
        gate.send(sequence).unwrap();
        wait_until("frame to be taken", || pipeline.stats().frames_taken == sequence);
    }
    wait_until("four results", || pipeline.stats().results_consumed == 4);
    assert_eq!(logged(&timeline), vec![1, 2, 4, 5]);
    assert_eq!(pipeline.stats().detection_faults, 1);

    // Still running after the fault.
    gate.send(6).unwrap();
    wait_until("result after the fault", || {
        pipeline.stats().results_consumed == 5
    });
    let report = pipeline.shutdown();
    assert_eq!(report.stats.detection_faults, 1);
    assert_eq!(logged(&timeline), vec![1, 2, 4, 5, 6]);
}

#[test]
fn sequential_mode_processes_every_nth_frame() {
    let timeline = Timeline::default();
    let parts = PipelineParts {
        source: Box::new(CountingSource { next: 0 }),
        detector: Box::new(ScriptedBackend::constant(vec![car()])),
        sinks: timeline_sinks(&timeline),
    };
    let mut settings = settings(1, 3, 2);
    settings.max_results = Some(4);
    let mut pipeline = Pipeline::new(settings, parts).unwrap();

    let report = pipeline.run_sequential().unwrap();

    assert_eq!(logged(&timeline), vec![3, 6, 9, 12]);
    assert_eq!(report.stats.frames_taken, 12);
    assert_eq!(report.stats.frames_skipped, 8);
    assert_eq!(report.stats.frames_detected, 4);
    assert_eq!(report.stats.frames_dropped, 0);
    assert_eq!(report.stats.status_updates, 2);
    assert!(pipeline.cancel_token().is_cancelled());
}

#[test]
fn slow_detector_causes_drops_not_stalls() {
    let parts = PipelineParts {
        source: Box::new(CountingSource { next: 0 }),
        detector: Box::new(
            ScriptedBackend::constant(vec![car()]).with_latency(Duration::from_millis(20)),
        ),
        sinks: OutputSinks::renderer(Box::new(TimelineRenderer {
            timeline: Timeline::default(),
            quit_on: None,
            fail: false,
        })),
    };
    let mut pipeline = Pipeline::new(settings(2, 1, 5), parts).unwrap();
    pipeline.start(OutputPlacement::Background).unwrap();
    wait_until("frames to be dropped", || pipeline.stats().frames_dropped > 0);
    wait_until("a result", || pipeline.stats().results_consumed > 0);
    let stats = pipeline.shutdown().stats;

    assert!(stats.frames_acquired > stats.frames_detected);
    assert_eq!(
        stats.frames_acquired,
        stats.frames_taken + stats.frames_dropped + stats.frames_queued as u64
    );
}

#[test]
fn second_start_is_rejected_and_shutdown_is_idempotent() {
    let (_gate, source) = gated_source();
    let parts = PipelineParts {
        source,
        detector: Box::new(ScriptedBackend::constant(vec![])),
        sinks: timeline_sinks(&Timeline::default()),
    };
    let mut pipeline = Pipeline::new(settings(5, 1, 5), parts).unwrap();
    pipeline.start(OutputPlacement::Background).unwrap();

    assert!(matches!(
        pipeline.start(OutputPlacement::Background),
        Err(PipelineError::AlreadyStarted)
    ));
    assert!(matches!(
        pipeline.run_sequential(),
        Err(PipelineError::AlreadyStarted)
    ));

    let first = pipeline.shutdown();
    let second = pipeline.shutdown();
    assert_eq!(first, second);
    assert!(first.abandoned.is_empty());
    assert!(!pipeline.cancel_token().cancel());
}

#[test]
fn stuck_stage_is_abandoned_after_grace_period() {
    let parts = PipelineParts {
        source: Box::new(StuckSource),
        detector: Box::new(ScriptedBackend::constant(vec![])),
        sinks: timeline_sinks(&Timeline::default()),
    };
    let mut settings = settings(5, 1, 5);
    settings.shutdown_grace = Duration::from_millis(100);
    let mut pipeline = Pipeline::new(settings, parts).unwrap();
    pipeline.start(OutputPlacement::Background).unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    let report = pipeline.shutdown();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(report.abandoned, vec![StageKind::Acquisition]);
}

#[test]
fn renderer_quit_stops_the_pipeline() {
    let timeline = Timeline::default();
    let (gate, source) = gated_source();
    let parts = PipelineParts {
        source,
        detector: Box::new(ScriptedBackend::constant(vec![car()])),
        sinks: OutputSinks {
            renderer: Box::new(TimelineRenderer {
                timeline: timeline.clone(),
                quit_on: Some(2),
                fail: false,
            }),
            status: None,
            log: Some(Box::new(TimelineLog(timeline.clone()))),
        },
    };
    let mut pipeline = Pipeline::new(settings(5, 1, 5), parts).unwrap();
    let cancel = pipeline.cancel_token();
    pipeline.start(OutputPlacement::Background).unwrap();

    for sequence in 1..=2 {
        gate.send(sequence).unwrap();
        wait_until("result", || pipeline.stats().results_consumed == sequence);
    }
    wait_until("cancellation", || cancel.is_cancelled());
    let report = pipeline.shutdown();
    assert_eq!(report.stats.results_consumed, 2);
    assert_eq!(logged(&timeline), vec![1, 2]);
}

#[test]
fn sink_faults_do_not_stop_consumption() {
    let timeline = Timeline::default();
    let (gate, source) = gated_source();
    let parts = PipelineParts {
        source,
        detector: Box::new(ScriptedBackend::constant(vec![car()])),
        sinks: OutputSinks {
            renderer: Box::new(TimelineRenderer {
                timeline: timeline.clone(),
                quit_on: None,
                fail: true,
            }),
            status: None,
            log: Some(Box::new(TimelineLog(timeline.clone()))),
        },
    };
    let mut pipeline = Pipeline::new(settings(5, 1, 5), parts).unwrap();
    pipeline.start(OutputPlacement::Background).unwrap();
    for sequence in 1..=3 {
        gate.send(sequence).unwrap();
        wait_until("result", || pipeline.stats().results_consumed == sequence);
    }
    let report = pipeline.shutdown();
    assert_eq!(report.stats.sink_faults, 3);
    assert_eq!(logged(&timeline), vec![1, 2, 3]);
}

#[test]
fn inline_output_runs_on_the_calling_thread() {
    let timeline = Timeline::default();
    let (gate, source) = gated_source();
    for sequence in 1..=3 {
        gate.send(sequence).unwrap();
    }
    let parts = PipelineParts {
        source,
        detector: Box::new(ScriptedBackend::constant(vec![car(), car()])),
        sinks: timeline_sinks(&timeline),
    };
    let mut settings = settings(5, 1, 5);
    settings.max_results = Some(3);
    let mut pipeline = Pipeline::new(settings, parts).unwrap();
    pipeline.start(OutputPlacement::Inline).unwrap();

    pipeline.run_output().unwrap();
    assert!(matches!(
        pipeline.run_output(),
        Err(PipelineError::AlreadyStarted)
    ));
    let report = pipeline.shutdown();
    assert_eq!(report.stats.results_consumed, 3);
    assert_eq!(logged(&timeline), vec![1, 2, 3]);
}

#[test]
fn failed_connect_is_a_startup_fault() {
    let (_gate, rx) = unbounded();
    let parts = PipelineParts {
        source: Box::new(GatedSource {
            gate: rx,
            captured: 0,
            fail_connect: true,
        }),
        detector: Box::new(ScriptedBackend::constant(vec![])),
        sinks: timeline_sinks(&Timeline::default()),
    };
    let mut pipeline = Pipeline::new(settings(5, 1, 5), parts).unwrap();
    let err = pipeline.start(OutputPlacement::Background).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::StartupFault {
            component: "frame source",
            ..
        }
    ));
    assert!(!pipeline.is_started());
}

#[test]
fn unknown_detector_backend_is_a_startup_fault() {
    let mut config = PipelineConfig::default();
    config.detector.backend = "yolo-on-the-moon".into();
    config.output.enable_log = false;
    let err = config
        .build_parts(&DetectorRegistry::default())
        .err()
        .unwrap();
    assert!(matches!(
        err,
        PipelineError::StartupFault {
            component: "detector",
            ..
        }
    ));
}
