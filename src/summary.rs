//! Session log analysis.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::sink::LogRecord;

/// Aggregates over one session log.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LogSummary {
    pub records: usize,
    /// Time between the first and the last record.
    pub duration: Duration,
    pub average_rate: f64,
    /// Most vehicles seen in a single frame.
    pub max_per_frame: u32,
    pub total_detections: u64,
    pub per_category: BTreeMap<String, u64>,
}

impl LogSummary {
    pub fn from_records(records: &[LogRecord]) -> Self {
        let (Some(first), Some(last)) = (records.first(), records.last()) else {
            return Self::default();
        };
        let mut per_category = BTreeMap::new();
        for record in records {
            for (category, count) in &record.counts {
                *per_category.entry(category.clone()).or_insert(0) += u64::from(*count);
            }
        }
        Self {
            records: records.len(),
            duration: Duration::from_millis(last.timestamp_ms.saturating_sub(first.timestamp_ms)),
            average_rate: records.iter().map(|r| r.rate).sum::<f64>() / records.len() as f64,
            max_per_frame: records.iter().map(|r| r.total).max().unwrap_or(0),
            total_detections: records.iter().map(|r| u64::from(r.total)).sum(),
            per_category,
        }
    }
}

impl fmt::Display for LogSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "records:             {}", self.records)?;
        writeln!(f, "duration:            {:.1} s", self.duration.as_secs_f64())?;
        writeln!(f, "average rate:        {:.2} results/s", self.average_rate)?;
        writeln!(f, "max vehicles/frame:  {}", self.max_per_frame)?;
        writeln!(f, "total detections:    {}", self.total_detections)?;
        if self.per_category.is_empty() {
            return Ok(());
        }
        writeln!(f, "by category:")?;
        for (category, count) in &self.per_category {
            writeln!(f, "  {category:<12} {count}")?;
        }
        Ok(())
    }
}
