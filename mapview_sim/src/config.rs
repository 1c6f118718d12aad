//! Simulator configuration, loadable from JSON.

use crate::error::SimError;
use mapview_core::map_format::{MAX_ORIGIN_METERS, MAX_RESOLUTION};
use mapview_core::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Knobs for the generated floor plan and scenario lengths.
///
/// Missing fields take their defaults, so a config file only needs the
/// values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Floor plan size in cells
    pub map_width: i32,
    pub map_height: i32,

    /// Meters per cell
    pub resolution: f32,

    /// World position of cell (0, 0)
    pub origin_x: f32,
    pub origin_y: f32,

    /// Virtual seconds the pose-tracking scenario runs
    pub duration_secs: f64,

    /// Random clicks per inspection scenario
    pub clicks: usize,

    pub engine: EngineConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            map_width: 160,
            map_height: 120,
            resolution: 0.05,
            origin_x: -4.0,
            origin_y: -3.0,
            duration_secs: 10.0,
            clicks: 25,
            engine: EngineConfig::default(),
        }
    }
}

impl SimConfig {
    pub fn from_json(text: &str) -> Result<Self, SimError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), SimError> {
        // Room for border, interior walls and four rooms.
        if self.map_width < 16 || self.map_height < 16 {
            return Err(SimError::Config(format!(
                "floor plan {}x{} is smaller than 16x16",
                self.map_width, self.map_height
            )));
        }
        if !(self.resolution.is_finite()
            && self.resolution > 0.0
            && self.resolution <= MAX_RESOLUTION)
        {
            return Err(SimError::Config(format!(
                "resolution {} must be in (0, {}]",
                self.resolution, MAX_RESOLUTION
            )));
        }
        let in_range = |v: f32| v.is_finite() && v.abs() <= MAX_ORIGIN_METERS;
        if !in_range(self.origin_x) || !in_range(self.origin_y) {
            return Err(SimError::Config(format!(
                "origin ({}, {}) is out of range",
                self.origin_x, self.origin_y
            )));
        }
        if !(self.duration_secs.is_finite() && self.duration_secs > 0.0) {
            return Err(SimError::Config(format!(
                "duration {}s must be positive",
                self.duration_secs
            )));
        }
        Ok(())
    }

    pub fn origin(&self) -> (f32, f32) {
        (self.origin_x, self.origin_y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SimConfig::from_json(r#"{"map_width": 40, "engine": {"zoom_step": 0.2}}"#)
            .unwrap();
        assert_eq!(config.map_width, 40);
        assert_eq!(config.map_height, 120);
        assert_eq!(config.engine.zoom_step, 0.2);
        assert_eq!(config.engine.max_scale, 5.0);
    }

    #[test]
    fn test_rejects_tiny_plan() {
        let err = SimConfig::from_json(r#"{"map_width": 8}"#).unwrap_err();
        assert!(matches!(err, SimError::Config(_)));
    }

    #[test]
    fn test_rejects_bad_resolution() {
        assert!(SimConfig::from_json(r#"{"resolution": 0.0}"#).is_err());
        assert!(SimConfig::from_json(r#"{"resolution": 50.0}"#).is_err());
        assert!(SimConfig::from_json(r#"{"origin_x": 1e9}"#).is_err());
        assert!(SimConfig::from_json("not json").is_err());
    }
}
