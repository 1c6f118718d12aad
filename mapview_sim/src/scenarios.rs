//! Interaction scenarios run against the simulated robot.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// MV-001: random clicks inspect the cell under the pointer
    ClickInspect,

    /// MV-002: drags pan the canvas, short presses stay clicks
    PanDrag,

    /// MV-003: wheel zoom keeps the point under the cursor fixed
    ZoomAnchor,

    /// MV-004: four quarter turns return to the start
    RotateSweep,

    /// MV-005: marking mode with near-duplicate clicks
    MarkerDedup,

    /// MV-006: markers survive a save and reload
    MarkerPersistence,

    /// MV-007: pose poller drives the robot overlay
    PoseTracking,

    /// MV-008: truncated and corrupted payloads decode fail-soft
    CorruptStream,

    /// MV-009: map replaced while a drag is in progress
    ReloadMidDrag,

    /// MV-010: robot goes offline and comes back
    OfflineBackend,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::ClickInspect,
            ScenarioId::PanDrag,
            ScenarioId::ZoomAnchor,
            ScenarioId::RotateSweep,
            ScenarioId::MarkerDedup,
            ScenarioId::MarkerPersistence,
            ScenarioId::PoseTracking,
            ScenarioId::CorruptStream,
            ScenarioId::ReloadMidDrag,
            ScenarioId::OfflineBackend,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::ClickInspect => "click_inspect",
            ScenarioId::PanDrag => "pan_drag",
            ScenarioId::ZoomAnchor => "zoom_anchor",
            ScenarioId::RotateSweep => "rotate_sweep",
            ScenarioId::MarkerDedup => "marker_dedup",
            ScenarioId::MarkerPersistence => "marker_persistence",
            ScenarioId::PoseTracking => "pose_tracking",
            ScenarioId::CorruptStream => "corrupt_stream",
            ScenarioId::ReloadMidDrag => "reload_mid_drag",
            ScenarioId::OfflineBackend => "offline_backend",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::ClickInspect => "Random clicks; readout matches the fixture grid",
            ScenarioId::PanDrag => "Jittered drags move the canvas by the pointer delta",
            ScenarioId::ZoomAnchor => "Wheel ticks at random points; anchor drift under 1e-6 px",
            ScenarioId::RotateSweep => "Rotate x4 on a square map; clicks land on the same cell",
            ScenarioId::MarkerDedup => "Marking mode; clicks within the threshold add nothing",
            ScenarioId::MarkerPersistence => "Save, drop and reload markers for the map",
            ScenarioId::PoseTracking => "1 Hz poller with malformed replies in between",
            ScenarioId::CorruptStream => "Truncated and corrupted payloads still render",
            ScenarioId::ReloadMidDrag => "Map swap during a drag keeps the transform",
            ScenarioId::OfflineBackend => "Fetches fail while offline; previous map stays",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "click_inspect" | "clickinspect" | "mv-001" => Ok(ScenarioId::ClickInspect),
            "pan_drag" | "pandrag" | "mv-002" => Ok(ScenarioId::PanDrag),
            "zoom_anchor" | "zoomanchor" | "mv-003" => Ok(ScenarioId::ZoomAnchor),
            "rotate_sweep" | "rotatesweep" | "mv-004" => Ok(ScenarioId::RotateSweep),
            "marker_dedup" | "markerdedup" | "mv-005" => Ok(ScenarioId::MarkerDedup),
            "marker_persistence" | "markerpersistence" | "mv-006" => {
                Ok(ScenarioId::MarkerPersistence)
            }
            "pose_tracking" | "posetracking" | "mv-007" => Ok(ScenarioId::PoseTracking),
            "corrupt_stream" | "corruptstream" | "mv-008" => Ok(ScenarioId::CorruptStream),
            "reload_mid_drag" | "reloadmiddrag" | "mv-009" => Ok(ScenarioId::ReloadMidDrag),
            "offline_backend" | "offlinebackend" | "mv-010" => Ok(ScenarioId::OfflineBackend),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
            assert!(!scenario.description().is_empty());
        }
    }

    #[test]
    fn test_aliases() {
        assert_eq!("MV-007".parse::<ScenarioId>(), Ok(ScenarioId::PoseTracking));
        assert_eq!("PanDrag".parse::<ScenarioId>(), Ok(ScenarioId::PanDrag));
        assert!("time_warp".parse::<ScenarioId>().is_err());
    }
}
