//! Wire types exchanged with the robot backend.

use crate::error::EnvError;
use serde::{Deserialize, Serialize};

/// Identifier of a stored map on the robot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct MapId(pub String);

impl MapId {
    /// Creates a MapId from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A map id is usable only if it is non-blank.
    pub fn is_valid(&self) -> bool {
        !self.0.trim().is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MapId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MapId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Robot pose in world coordinates (meters, heading in degrees).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RobotPose {
    pub x: f64,
    pub y: f64,
    pub angle: f64,
}

/// Body of `GET /maps/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapPayload {
    /// Hex encoding of header + compressed grid
    pub map_data: String,
}

/// Body of `GET /maps/position`.
///
/// The inner `response` is kept loose so that a malformed pose can be
/// reported without failing the whole request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoseEnvelope {
    #[serde(default)]
    pub response: Option<serde_json::Value>,
}

impl PoseEnvelope {
    /// Wraps a well-formed pose.
    pub fn from_pose(pose: RobotPose) -> Self {
        Self {
            response: serde_json::to_value(pose).ok(),
        }
    }

    /// Extracts the pose, failing if `response` is missing or malformed.
    pub fn pose(&self) -> Result<RobotPose, EnvError> {
        let value = self
            .response
            .as_ref()
            .ok_or_else(|| EnvError::serialization("pose envelope has no `response` field"))?;
        let pose: RobotPose = serde_json::from_value(value.clone())?;
        if !(pose.x.is_finite() && pose.y.is_finite() && pose.angle.is_finite()) {
            return Err(EnvError::serialization("pose contains non-finite values"));
        }
        Ok(pose)
    }
}

/// A marker as persisted by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerRecord {
    pub id: u64,
    pub x: i32,
    pub y: i32,
    #[serde(rename = "worldX")]
    pub world_x: String,
    #[serde(rename = "worldY")]
    pub world_y: String,
    pub label: String,
    #[serde(default)]
    pub selected: bool,
    pub map_id: MapId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub angle: Option<f64>,
}

/// Body of `GET /load-markers/{id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkerSet {
    #[serde(default)]
    pub markers: Vec<MarkerRecord>,
}

/// Body of `POST /save-markers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveMarkersRequest {
    pub map_id: MapId,
    pub markers: Vec<MarkerRecord>,
}

/// Body of `POST /base/maps` for a navigation goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GotoCommand {
    pub method: String,
    pub x: f64,
    pub y: f64,
    pub angle: f64,
    pub speed: f64,
}

impl GotoCommand {
    pub fn new(x: f64, y: f64, angle: f64, speed: f64) -> Self {
        Self {
            method: "goto".to_string(),
            x,
            y,
            angle,
            speed,
        }
    }
}

/// Body of `POST /base` asking the robot to dock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockCommand {
    pub method: String,
}

impl Default for DockCommand {
    fn default() -> Self {
        Self {
            method: "dock".to_string(),
        }
    }
}

/// Reply to a motion command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandReply {
    #[serde(default)]
    pub response: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_id_validity() {
        assert!(MapId::new("7").is_valid());
        assert!(!MapId::new("").is_valid());
        assert!(!MapId::new("   ").is_valid());
    }

    #[test]
    fn test_pose_envelope_parses_response() {
        let envelope: PoseEnvelope =
            serde_json::from_str(r#"{"response": {"x": 1.5, "y": -2.0, "angle": 90.0}}"#).unwrap();
        let pose = envelope.pose().unwrap();
        assert_eq!(pose, RobotPose { x: 1.5, y: -2.0, angle: 90.0 });
    }

    #[test]
    fn test_pose_envelope_rejects_malformed() {
        let missing: PoseEnvelope = serde_json::from_str(r#"{"status": "ok"}"#).unwrap();
        assert!(missing.pose().is_err());

        let partial: PoseEnvelope =
            serde_json::from_str(r#"{"response": {"x": 1.0}}"#).unwrap();
        assert!(matches!(partial.pose(), Err(EnvError::Serialization(_))));
    }

    #[test]
    fn test_marker_record_field_names() {
        let record = MarkerRecord {
            id: 1,
            x: 3,
            y: 4,
            world_x: "0.30".into(),
            world_y: "0.40".into(),
            label: "1".into(),
            selected: false,
            map_id: MapId::new("2"),
            angle: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["worldX"], "0.30");
        assert_eq!(json["map_id"], "2");
        assert!(json.get("angle").is_none());
    }

    #[test]
    fn test_goto_command_body() {
        let cmd = GotoCommand::new(1.0, 2.0, 0.0, 0.5);
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["method"], "goto");
        assert_eq!(json["speed"], 0.5);
        assert_eq!(DockCommand::default().method, "dock");
    }
}
