//! Engine tuning knobs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for an [`EngineState`](crate::engine::EngineState) and
/// the session driving it.
///
/// Every field has a default, so a partial JSON document is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Host container width in screen px
    pub container_width: f64,

    /// Host container height in screen px
    pub container_height: f64,

    /// Max pointer travel (px, per axis) for a press/release to count as a click
    pub click_threshold: f64,

    /// Markers closer than this (grid cells, per axis) are duplicates
    pub marker_threshold: i32,

    /// Scale change per wheel tick
    pub zoom_step: f64,

    pub min_scale: f64,
    pub max_scale: f64,

    /// Fraction of the container the map occupies after a fit
    pub fit_margin: f64,

    /// Robot pose poll interval in milliseconds
    pub pose_interval_ms: u64,

    /// Speed sent with goto commands
    pub goto_speed: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            container_width: 800.0,
            container_height: 600.0,
            click_threshold: 5.0,
            marker_threshold: 5,
            zoom_step: 0.1,
            min_scale: 0.1,
            max_scale: 5.0,
            fit_margin: 0.9,
            pose_interval_ms: 1_000,
            goto_speed: 0.5,
        }
    }
}

impl EngineConfig {
    pub fn pose_interval(&self) -> Duration {
        Duration::from_millis(self.pose_interval_ms)
    }

    /// Clamps a scale into the configured bounds.
    pub fn clamp_scale(&self, scale: f64) -> f64 {
        scale.clamp(self.min_scale, self.max_scale)
    }
}
