use anyhow::Result;

use super::{RenderFlow, Renderer};
use crate::detect::DetectionResult;

/// Primary view for headless deployments: one overlay line per result, written to
/// the process log.
#[derive(Debug, Default)]
pub struct OverlayRenderer {
    preview: bool,
    shown: u64,
}

impl OverlayRenderer {
    pub fn new(preview: bool) -> Self {
        Self { preview, shown: 0 }
    }

    pub fn shown(&self) -> u64 {
        self.shown
    }
}

/// Text drawn over a frame: vehicle total, detection rate and per-category counts.
pub fn overlay_text(result: &DetectionResult) -> String {
    let mut text = format!("Vehicles: {} | FPS: {:.1}", result.total(), result.rate);
    if !result.counts().is_empty() {
        let parts: Vec<String> = result
            .counts()
            .iter()
            .map(|(category, count)| format!("{category}={count}"))
            .collect();
        text.push_str(" | ");
        text.push_str(&parts.join(" "));
    }
    text
}

impl Renderer for OverlayRenderer {
    fn show(&mut self, result: &DetectionResult) -> Result<RenderFlow> {
        self.shown += 1;
        let text = overlay_text(result);
        if self.preview {
            log::info!("frame #{}: {}", result.sequence(), text);
        } else {
            log::debug!("frame #{}: {}", result.sequence(), text);
        }
        Ok(RenderFlow::Continue)
    }
}
