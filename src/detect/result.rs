use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::frame::Frame;

/// Axis-aligned box in normalized (0..1) image coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// One raw detector output: category, confidence and region.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub category: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(category: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            category: category.into(),
            confidence,
            bbox,
        }
    }
}

/// Annotated frame produced by the detection stage.
///
/// Owns the frame it was derived from; like `Frame` it is moved, not cloned.
#[derive(Debug)]
pub struct DetectionResult {
    frame: Frame,
    detections: Vec<Detection>,
    counts: BTreeMap<String, u32>,
    /// Detection stage rate (results/s) when this result was produced.
    pub rate: f64,
    pub produced_at: Instant,
}

impl DetectionResult {
    /// Build a result from already-filtered detections.
    pub fn new(frame: Frame, detections: Vec<Detection>, rate: f64) -> Self {
        let mut counts = BTreeMap::new();
        for detection in &detections {
            *counts.entry(detection.category.clone()).or_insert(0) += 1;
        }
        Self {
            frame,
            detections,
            counts,
            rate,
            produced_at: Instant::now(),
        }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn into_frame(self) -> Frame {
        self.frame
    }

    pub fn sequence(&self) -> u64 {
        self.frame.sequence()
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    /// Number of kept detections.
    pub fn total(&self) -> u32 {
        self.detections.len() as u32
    }

    /// Kept detections per category.
    pub fn counts(&self) -> &BTreeMap<String, u32> {
        &self.counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_group_by_category() {
        let frame = Frame::new(vec![0; 3], 1, 1, 4);
        let detections = vec![
            Detection::new("car", 0.9, BoundingBox::default()),
            Detection::new("truck", 0.8, BoundingBox::default()),
            Detection::new("car", 0.7, BoundingBox::default()),
        ];
        let result = DetectionResult::new(frame, detections, 2.5);

        assert_eq!(result.total(), 3);
        assert_eq!(result.counts().get("car"), Some(&2));
        assert_eq!(result.counts().get("truck"), Some(&1));
        assert_eq!(result.counts().len(), 2);
        assert_eq!(result.sequence(), 4);
    }

    #[test]
    fn empty_detections_give_empty_counts() {
        let result = DetectionResult::new(Frame::new(vec![], 0, 0, 1), vec![], 0.0);
        assert_eq!(result.total(), 0);
        assert!(result.counts().is_empty());
    }
}
