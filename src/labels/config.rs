use std::error::Error;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// When "open now" venues jump ahead of nearer ones in label ranking.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusPriority {
    #[default]
    WhenFilterActive,
    Always,
    Never,
}

impl StatusPriority {
    pub fn applies(self, status_filter_active: bool) -> bool {
        match self {
            StatusPriority::WhenFilterActive => status_filter_active,
            StatusPriority::Always => true,
            StatusPriority::Never => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlannerOptions {
    /// Above this many visible features no labels are drawn at all.
    pub label_max_visible: usize,
    /// Up to this many visible features every one of them is a candidate.
    pub label_all_threshold: usize,
    /// Candidate count once the visible set exceeds `label_all_threshold`.
    pub label_subset_count: usize,
    pub spread_all_px: f32,
    pub spread_subset_px: f32,
    pub status_priority: StatusPriority,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            label_max_visible: 32,
            label_all_threshold: 16,
            label_subset_count: 12,
            spread_all_px: 34.0,
            spread_subset_px: 56.0,
            status_priority: StatusPriority::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MobileLabelOptions {
    pub min_zoom: f32,
    pub max_visible: usize,
}

impl Default for MobileLabelOptions {
    fn default() -> Self {
        Self {
            min_zoom: 11.2,
            max_visible: 46,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct IdlePreviewOptions {
    /// Picks come from the first `max_pool` unique visible features.
    pub max_pool: usize,
    pub pick_delay_ms: u64,
    pub pick_jitter_ms: u64,
    pub dwell_ms: u64,
    pub dwell_jitter_ms: u64,
}

impl Default for IdlePreviewOptions {
    fn default() -> Self {
        Self {
            max_pool: 28,
            pick_delay_ms: 1200,
            pick_jitter_ms: 1200,
            dwell_ms: 1150,
            dwell_jitter_ms: 450,
        }
    }
}

impl IdlePreviewOptions {
    /// `base + unit * jitter`, with `unit` in `[0, 1)`.
    pub fn pick_delay(&self, unit: f64) -> Duration {
        jittered(self.pick_delay_ms, self.pick_jitter_ms, unit)
    }

    pub fn dwell(&self, unit: f64) -> Duration {
        jittered(self.dwell_ms, self.dwell_jitter_ms, unit)
    }
}

fn jittered(base_ms: u64, jitter_ms: u64, unit: f64) -> Duration {
    let unit = if unit.is_finite() { unit.clamp(0.0, 1.0) } else { 0.0 };
    Duration::from_millis(base_ms + (jitter_ms as f64 * unit) as u64)
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RecenterOptions {
    pub label_min_zoom: f32,
    pub label_duration_ms: u64,
    pub marker_min_zoom: f32,
    pub marker_duration_ms: u64,
}

impl Default for RecenterOptions {
    fn default() -> Self {
        Self {
            label_min_zoom: 14.0,
            label_duration_ms: 550,
            marker_min_zoom: 14.5,
            marker_duration_ms: 900,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LabelConfig {
    /// Master switch for the declutter overlay.
    pub smart_labels_enabled: bool,
    /// Touch-first device: enables the always-on mobile label layer.
    pub coarse_pointer: bool,
    pub planner: PlannerOptions,
    pub mobile: MobileLabelOptions,
    pub idle_preview: IdlePreviewOptions,
    pub recenter: RecenterOptions,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            smart_labels_enabled: true,
            coarse_pointer: false,
            planner: PlannerOptions::default(),
            mobile: MobileLabelOptions::default(),
            idle_preview: IdlePreviewOptions::default(),
            recenter: RecenterOptions::default(),
        }
    }
}

impl LabelConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&text)?)
    }
}
