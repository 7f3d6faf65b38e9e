use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::channel::DEFAULT_QUEUE_CAPACITY;
use crate::detect::{DetectorRegistry, DetectorSettings};
use crate::error::PipelineError;
use crate::ingest::{open_source, SourceConfig, MAX_FRAME_DIMENSION};
use crate::pipeline::{
    PipelineParts, PipelineSettings, DEFAULT_POLL_INTERVAL, DEFAULT_SAMPLING_INTERVAL,
    DEFAULT_SHUTDOWN_GRACE, DEFAULT_STATUS_INTERVAL,
};
use crate::sink::OutputSettings;
use crate::stage::OutputSinks;

pub const CONFIG_ENV: &str = "ONROAD_CONFIG";
const DEFAULT_HEALTH_LOG_SECS: u64 = 10;

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    pipeline: Option<PipelineSectionFile>,
    source: Option<SourceSectionFile>,
    detector: Option<DetectorSectionFile>,
    output: Option<OutputSectionFile>,
}

#[derive(Debug, Deserialize, Default)]
struct PipelineSectionFile {
    queue_capacity: Option<usize>,
    sampling_interval: Option<u64>,
    status_interval: Option<u64>,
    shutdown_grace_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
    health_log_secs: Option<u64>,
    max_results: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceSectionFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorSectionFile {
    backend: Option<String>,
    confidence: Option<f32>,
    categories: Option<Vec<String>>,
    seed: Option<u64>,
    latency_ms: Option<u64>,
    fixed: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputSectionFile {
    enable_log: Option<bool>,
    log_dir: Option<PathBuf>,
    enable_status: Option<bool>,
    status_path: Option<PathBuf>,
    preview: Option<bool>,
}

/// Daemon configuration: config file, then `ONROAD_*` environment overrides, then
/// validation.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub queue_capacity: usize,
    pub sampling_interval: u64,
    pub status_interval: u64,
    pub shutdown_grace: Duration,
    pub poll_interval: Duration,
    /// `None` when health logging is disabled (`health_log_secs = 0`).
    pub health_log_interval: Option<Duration>,
    pub max_results: Option<u64>,
    pub source: SourceConfig,
    pub detector: DetectorSettings,
    pub output: OutputSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            sampling_interval: DEFAULT_SAMPLING_INTERVAL,
            status_interval: DEFAULT_STATUS_INTERVAL,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            health_log_interval: Some(Duration::from_secs(DEFAULT_HEALTH_LOG_SECS)),
            max_results: None,
            source: SourceConfig::default(),
            detector: DetectorSettings::default(),
            output: OutputSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Load using the file named by `ONROAD_CONFIG`, if set.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Load from an explicit file (or defaults when `None`), then apply the environment.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => PipelineConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> Self {
        let defaults = Self::default();
        let pipeline = file.pipeline.unwrap_or_default();
        let source = file.source.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let output = file.output.unwrap_or_default();

        let health_log_interval = match pipeline.health_log_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.health_log_interval,
        };
        Self {
            queue_capacity: pipeline.queue_capacity.unwrap_or(defaults.queue_capacity),
            sampling_interval: pipeline
                .sampling_interval
                .unwrap_or(defaults.sampling_interval),
            status_interval: pipeline.status_interval.unwrap_or(defaults.status_interval),
            shutdown_grace: pipeline
                .shutdown_grace_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.shutdown_grace),
            poll_interval: pipeline
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            health_log_interval,
            max_results: pipeline.max_results,
            source: SourceConfig {
                url: source.url.unwrap_or(defaults.source.url),
                target_fps: source.target_fps.unwrap_or(defaults.source.target_fps),
                width: source.width.unwrap_or(defaults.source.width),
                height: source.height.unwrap_or(defaults.source.height),
                poll_interval: source
                    .poll_interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.source.poll_interval),
            },
            detector: DetectorSettings {
                backend: detector.backend.unwrap_or(defaults.detector.backend),
                confidence: detector.confidence.unwrap_or(defaults.detector.confidence),
                categories: detector
                    .categories
                    .unwrap_or(defaults.detector.categories),
                seed: detector.seed,
                latency: detector
                    .latency_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.detector.latency),
                fixed: detector.fixed.unwrap_or_default(),
            },
            output: OutputSettings {
                enable_log: output.enable_log.unwrap_or(defaults.output.enable_log),
                log_dir: output.log_dir.unwrap_or(defaults.output.log_dir),
                enable_status: output.enable_status.unwrap_or(defaults.output.enable_status),
                status_path: output.status_path,
                preview: output.preview.unwrap_or(defaults.output.preview),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("ONROAD_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(backend) = std::env::var("ONROAD_DETECTOR") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_string();
            }
        }
        if let Ok(categories) = std::env::var("ONROAD_CATEGORIES") {
            let parsed = split_csv(&categories);
            if !parsed.is_empty() {
                self.detector.categories = parsed;
            }
        }
        if let Ok(confidence) = std::env::var("ONROAD_CONFIDENCE") {
            self.detector.confidence = confidence
                .trim()
                .parse()
                .map_err(|_| anyhow!("ONROAD_CONFIDENCE must be a number between 0 and 1"))?;
        }
        if let Some(capacity) = env_integer("ONROAD_QUEUE_CAPACITY")? {
            self.queue_capacity = capacity as usize;
        }
        if let Some(n) = env_integer("ONROAD_SAMPLING_INTERVAL")? {
            self.sampling_interval = n;
        }
        if let Some(m) = env_integer("ONROAD_STATUS_INTERVAL")? {
            self.status_interval = m;
        }
        if let Ok(dir) = std::env::var("ONROAD_LOG_DIR") {
            if !dir.trim().is_empty() {
                self.output.log_dir = PathBuf::from(dir);
            }
        }
        if let Some(enabled) = env_flag("ONROAD_ENABLE_LOG")? {
            self.output.enable_log = enabled;
        }
        if let Some(enabled) = env_flag("ONROAD_ENABLE_STATUS")? {
            self.output.enable_status = enabled;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(anyhow!("queue_capacity must be at least 1"));
        }
        if self.sampling_interval == 0 {
            return Err(anyhow!("sampling_interval must be at least 1"));
        }
        if self.status_interval == 0 {
            return Err(anyhow!("status_interval must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.detector.confidence) {
            return Err(anyhow!(
                "detector confidence must be within [0, 1], got {}",
                self.detector.confidence
            ));
        }
        let mut seen = BTreeSet::new();
        self.detector.categories = self
            .detector
            .categories
            .iter()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty() && seen.insert(c.clone()))
            .collect();
        if self.detector.categories.is_empty() {
            return Err(anyhow!("detector category allow-list must not be empty"));
        }
        if self.source.target_fps == 0 {
            return Err(anyhow!("source target_fps must be at least 1"));
        }
        for (name, value) in [("width", self.source.width), ("height", self.source.height)] {
            if !(1..=MAX_FRAME_DIMENSION).contains(&value) {
                return Err(anyhow!(
                    "source {} must be within 1..={}, got {}",
                    name,
                    MAX_FRAME_DIMENSION,
                    value
                ));
            }
        }
        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            queue_capacity: self.queue_capacity,
            sampling_interval: self.sampling_interval,
            status_interval: self.status_interval,
            filter: self.detector.category_filter(),
            shutdown_grace: self.shutdown_grace,
            poll_interval: self.poll_interval,
            health_log_interval: self.health_log_interval,
            max_results: self.max_results,
            ..PipelineSettings::default()
        }
    }

    /// Construct the source, detector and sinks. Any failure is a startup fault.
    pub fn build_parts(&self, registry: &DetectorRegistry) -> Result<PipelineParts, PipelineError> {
        let source =
            open_source(&self.source).map_err(|e| PipelineError::startup("frame source", e))?;
        let detector = registry
            .create(&self.detector)
            .map_err(|e| PipelineError::startup("detector", e))?;
        let sinks = OutputSinks::from_settings(&self.output)
            .map_err(|e| PipelineError::startup("output sinks", e))?;
        Ok(PipelineParts {
            source,
            detector,
            sinks,
        })
    }
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let cfg = if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_integer(key: &str) -> Result<Option<u64>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a non-negative integer", key)),
        _ => Ok(None),
    }
}

fn env_flag(key: &str) -> Result<Option<bool>> {
    let Ok(value) = std::env::var(key) else {
        return Ok(None);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "" => Ok(None),
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        other => Err(anyhow!("{} must be a boolean, got '{}'", key, other)),
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
