//! Run export: PNG snapshots of the final view and a JSON report.

use crate::error::SimError;
use crate::runner::{ScenarioMetrics, ScenarioResult};
use image::RgbaImage;
use mapview_core::Raster;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Writes a raster as an RGBA PNG.
pub fn write_png(raster: &Raster, path: impl AsRef<Path>) -> Result<(), SimError> {
    let (width, height) = (raster.width(), raster.height());
    let image = RgbaImage::from_raw(width as u32, height as u32, raster.as_rgba().to_vec())
        .ok_or(SimError::InvalidRaster { width, height })?;
    image.save(path)?;
    Ok(())
}

/// One scenario run in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub seed: u64,
    pub passed: bool,
    pub time_secs: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    pub metrics: serde_json::Value,

    /// PNG written for this run, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<PathBuf>,
}

impl ScenarioReport {
    pub fn from_result(result: &ScenarioResult, snapshot: Option<PathBuf>) -> Self {
        Self {
            scenario: result.scenario.name().to_string(),
            seed: result.seed,
            passed: result.passed,
            time_secs: result.final_time_secs,
            failure_reason: result.failure_reason.clone(),
            metrics: metrics_json(&result.metrics),
            snapshot,
        }
    }
}

fn metrics_json(metrics: &ScenarioMetrics) -> serde_json::Value {
    serde_json::to_value(metrics).unwrap_or(serde_json::Value::Null)
}

/// Summary of a simulator invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<ScenarioReport>,
}

impl SimReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, report: ScenarioReport) {
        self.total += 1;
        if report.passed {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(report);
    }

    pub fn to_json(&self) -> Result<String, SimError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let json = self.to_json()?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapview_core::map_palette::{Rgb, WHITE};

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("mapview_sim_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_png_roundtrip_pixels() {
        let mut raster = Raster::new(3, 2, WHITE);
        raster.set_pixel(1, 0, Rgb::new(10, 20, 30));
        let path = scratch("snapshot.png");
        write_png(&raster, &path).unwrap();

        let image = image::open(&path).unwrap().to_rgba8();
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.get_pixel(1, 0).0, [10, 20, 30, 255]);
        assert_eq!(image.get_pixel(0, 1).0, [255, 255, 255, 255]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_report_counts() {
        let mut report = SimReport::new();
        for passed in [true, false, true] {
            report.add(ScenarioReport {
                scenario: "pan_drag".into(),
                seed: 1,
                passed,
                time_secs: 0.0,
                failure_reason: (!passed).then(|| "drift".to_string()),
                metrics: serde_json::Value::Null,
                snapshot: None,
            });
        }
        assert_eq!((report.total, report.passed, report.failed), (3, 2, 1));

        let path = scratch("report.json");
        report.write_to_file(&path).unwrap();
        let back: SimReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.failed, 1);
        assert_eq!(back.results[1].failure_reason.as_deref(), Some("drift"));
        std::fs::remove_file(&path).ok();
    }
}
