use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{anyhow, Result};

use super::backend::Detector;
use super::backends::{ScriptedBackend, SyntheticBackend};
use super::filter::{CategoryFilter, DEFAULT_CATEGORIES, DEFAULT_MIN_CONFIDENCE};
use super::result::{BoundingBox, Detection};

pub const DEFAULT_BACKEND: &str = "synthetic";
const DEFAULT_SYNTHETIC_LATENCY_MS: u64 = 120;

/// Detector configuration: which backend to build, and how results are filtered.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectorSettings {
    pub backend: String,
    /// Minimum confidence for a detection to be counted.
    pub confidence: f32,
    /// Category allow-list.
    pub categories: Vec<String>,
    /// Seed for backends with randomness.
    pub seed: Option<u64>,
    /// Simulated per-call latency for synthetic backends.
    pub latency: Duration,
    /// Categories reported on every call by the `fixed` backend.
    pub fixed: Vec<String>,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            confidence: DEFAULT_MIN_CONFIDENCE,
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            seed: None,
            latency: Duration::from_millis(DEFAULT_SYNTHETIC_LATENCY_MS),
            fixed: Vec::new(),
        }
    }
}

impl DetectorSettings {
    pub fn category_filter(&self) -> CategoryFilter {
        CategoryFilter::new(self.categories.iter().cloned(), self.confidence)
    }
}

type DetectorFactory = Box<dyn Fn(&DetectorSettings) -> Result<Box<dyn Detector>> + Send + Sync>;

/// Named detector constructors.
///
/// The daemon resolves `detector.backend` here; an unknown name is a startup error.
pub struct DetectorRegistry {
    factories: BTreeMap<String, DetectorFactory>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with the backends shipped in this crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("synthetic", |settings| {
            Ok(Box::new(SyntheticBackend::new(settings.seed, settings.latency)))
        });
        registry.register("fixed", |settings| {
            let detections = settings
                .fixed
                .iter()
                .map(|category| Detection::new(category.clone(), 1.0, BoundingBox::default()))
                .collect();
            Ok(Box::new(
                ScriptedBackend::constant(detections).with_latency(settings.latency),
            ))
        });
        registry
    }

    /// Register a constructor. A later registration replaces an earlier one.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&DetectorSettings) -> Result<Box<dyn Detector>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Build the backend named in `settings`.
    pub fn create(&self, settings: &DetectorSettings) -> Result<Box<dyn Detector>> {
        let factory = self.factories.get(&settings.backend).ok_or_else(|| {
            anyhow!(
                "detector backend '{}' not registered (available: {})",
                settings.backend,
                self.list().join(", ")
            )
        })?;
        factory(settings)
    }

    /// List registered backends.
    pub fn list(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}
