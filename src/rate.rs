//! Per-stage throughput measurement.
//!
//! Each stage owns one `RateTracker`. The tracker counts events inside a one-second
//! window and publishes the closed window's rate to a `RateHandle`, which any thread
//! may read without touching the in-progress counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Length of a measurement window.
pub const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Read-only view of the last published rate (events per second).
#[derive(Clone, Debug, Default)]
pub struct RateHandle {
    bits: Arc<AtomicU64>,
}

impl RateHandle {
    pub fn current_rate(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    fn publish(&self, rate: f64) {
        self.bits.store(rate.to_bits(), Ordering::Release);
    }
}

/// Events observed in the current window.
#[derive(Clone, Copy, Debug)]
pub struct RateSample {
    pub count: u64,
    pub window_start: Instant,
}

#[derive(Debug)]
pub struct RateTracker {
    sample: RateSample,
    published: RateHandle,
}

impl RateTracker {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Tracker whose first window opens at `start`.
    pub fn starting_at(start: Instant) -> Self {
        Self {
            sample: RateSample {
                count: 0,
                window_start: start,
            },
            published: RateHandle::default(),
        }
    }

    pub fn record_event(&mut self) {
        self.record_event_at(Instant::now());
    }

    /// Count one event observed at `now`.
    ///
    /// The event that closes a window belongs to that window, so a source producing
    /// `R` uniformly spaced events per second reports exactly `R`.
    pub fn record_event_at(&mut self, now: Instant) {
        self.sample.count += 1;
        let elapsed = now.saturating_duration_since(self.sample.window_start);
        if elapsed >= RATE_WINDOW {
            let rate = self.sample.count as f64 / elapsed.as_secs_f64();
            self.published.publish(rate);
            self.sample = RateSample {
                count: 0,
                window_start: now,
            };
        }
    }

    /// Rate of the last closed window; 0 until the first window closes.
    pub fn current_rate(&self) -> f64 {
        self.published.current_rate()
    }

    pub fn handle(&self) -> RateHandle {
        self.published.clone()
    }

    pub fn sample(&self) -> RateSample {
        self.sample
    }
}

impl Default for RateTracker {
    fn default() -> Self {
        Self::new()
    }
}
