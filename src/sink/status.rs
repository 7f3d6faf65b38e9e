//! Small status display.
//!
//! Lays out the same screen a 128x64 panel shows: vehicle total, rate, and at most
//! three per-category lines. The panel is written to a text file (replaced
//! atomically, so a reader never sees half a screen) or to the process log.

use std::path::PathBuf;

use anyhow::{Context, Result};

use super::{StatusSink, StatusUpdate};

/// Category lines that fit on the panel.
pub const MAX_CATEGORY_LINES: usize = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusTarget {
    File(PathBuf),
    Log,
}

#[derive(Debug)]
pub struct StatusPanel {
    target: StatusTarget,
    updates: u64,
}

impl StatusPanel {
    pub fn new(target: StatusTarget) -> Self {
        Self { target, updates: 0 }
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }
}

/// Panel lines for an update.
pub fn render_lines(update: &StatusUpdate) -> Vec<String> {
    let mut lines = vec![
        format!("Vehicles: {}", update.total),
        format!("FPS: {:.1}", update.rate),
    ];
    if !update.counts.is_empty() {
        lines.push("Detected:".to_string());
        lines.extend(
            update
                .counts
                .iter()
                .take(MAX_CATEGORY_LINES)
                .map(|(category, count)| format!("- {category}: {count}")),
        );
    }
    lines
}

impl StatusSink for StatusPanel {
    fn update(&mut self, update: &StatusUpdate) -> Result<()> {
        let lines = render_lines(update);
        match &self.target {
            StatusTarget::File(path) => {
                let mut tmp = path.clone().into_os_string();
                tmp.push(".tmp");
                let tmp = PathBuf::from(tmp);
                let mut body = lines.join("\n");
                body.push('\n');
                std::fs::write(&tmp, body)
                    .with_context(|| format!("failed to write {}", tmp.display()))?;
                std::fs::rename(&tmp, path)
                    .with_context(|| format!("failed to replace {}", path.display()))?;
            }
            StatusTarget::Log => log::info!("status: {}", lines.join(" | ")),
        }
        self.updates += 1;
        Ok(())
    }
}
