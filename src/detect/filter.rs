use std::collections::BTreeSet;

use crate::detect::result::Detection;

/// Categories counted by default (COCO vehicle classes).
pub const DEFAULT_CATEGORIES: &[&str] = &["bicycle", "car", "motorbike", "bus", "truck"];

pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;

/// Category allow-list plus confidence threshold.
///
/// Detections outside the allow-list are ignored entirely: they are neither
/// counted nor forwarded.
#[derive(Clone, Debug, PartialEq)]
pub struct CategoryFilter {
    allowed: BTreeSet<String>,
    min_confidence: f32,
}

impl CategoryFilter {
    pub fn new<I, S>(categories: I, min_confidence: f32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: categories.into_iter().map(Into::into).collect(),
            min_confidence,
        }
    }

    pub fn allows(&self, detection: &Detection) -> bool {
        detection.confidence >= self.min_confidence && self.allowed.contains(&detection.category)
    }

    pub fn apply(&self, detections: Vec<Detection>) -> Vec<Detection> {
        detections.into_iter().filter(|d| self.allows(d)).collect()
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }

    pub fn min_confidence(&self) -> f32 {
        self.min_confidence
    }
}

impl Default for CategoryFilter {
    fn default() -> Self {
        Self::new(DEFAULT_CATEGORIES.iter().copied(), DEFAULT_MIN_CONFIDENCE)
    }
}
