use std::time::Duration;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::detect::backend::Detector;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

/// Categories the synthetic backend emits. Includes non-vehicle classes so the
/// allow-list has something to reject.
const SYNTHETIC_CATEGORIES: &[&str] = &[
    "car",
    "car",
    "truck",
    "bus",
    "motorbike",
    "bicycle",
    "person",
    "traffic light",
];

const MAX_DETECTIONS_PER_FRAME: usize = 4;

/// Pseudo-random detector with a simulated, jittered inference latency.
///
/// Stands in for a real model when no hardware accelerator or weights are present.
pub struct SyntheticBackend {
    rng: StdRng,
    latency: Duration,
}

impl SyntheticBackend {
    pub fn new(seed: Option<u64>, latency: Duration) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng, latency }
    }

    fn simulated_latency(&mut self) -> Duration {
        if self.latency.is_zero() {
            return Duration::ZERO;
        }
        // +/- 50% jitter around the configured latency.
        let factor: f64 = self.rng.gen_range(0.5..1.5);
        self.latency.mul_f64(factor)
    }

    fn random_detection(&mut self) -> Detection {
        let category = SYNTHETIC_CATEGORIES
            .choose(&mut self.rng)
            .copied()
            .unwrap_or("car");
        let w: f32 = self.rng.gen_range(0.05..0.4);
        let h: f32 = self.rng.gen_range(0.05..0.4);
        Detection {
            category: category.to_string(),
            confidence: self.rng.gen_range(0.3..1.0),
            bbox: BoundingBox {
                x: self.rng.gen_range(0.0..1.0 - w),
                y: self.rng.gen_range(0.0..1.0 - h),
                w,
                h,
            },
        }
    }
}

impl Detector for SyntheticBackend {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn infer(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        let latency = self.simulated_latency();
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        let count = self.rng.gen_range(0..=MAX_DETECTIONS_PER_FRAME);
        Ok((0..count).map(|_| self.random_detection()).collect())
    }
}
