//! In-memory robot implementing RobotBackend with fault injection.

use crate::context::SimContext;
use async_trait::async_trait;
use mapview_env::{
    CommandReply, EnvError, GotoCommand, MapId, MapPayload, MarkerRecord, PoseEnvelope,
    RobotBackend, RobotPose, SaveMarkersRequest, ViewContext,
};
use serde::Serialize;
use std::collections::HashMap;
use std::f64::consts::TAU;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Circular trajectory the simulated robot drives, as a function of
/// virtual time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PosePath {
    pub center: (f64, f64),
    pub radius: f64,
    pub period_secs: f64,
}

impl Default for PosePath {
    fn default() -> Self {
        Self {
            center: (0.0, 0.0),
            radius: 1.0,
            period_secs: 60.0,
        }
    }
}

impl PosePath {
    /// Pose at `t`; heading is tangent to the circle, in degrees.
    pub fn pose_at(&self, t: Duration) -> RobotPose {
        let theta = TAU * t.as_secs_f64() / self.period_secs;
        RobotPose {
            x: self.center.0 + self.radius * theta.cos(),
            y: self.center.1 + self.radius * theta.sin(),
            angle: (theta.to_degrees() + 90.0).rem_euclid(360.0),
        }
    }
}

/// Request counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackendStats {
    pub map_fetches: u64,
    pub pose_fetches: u64,
    pub marker_loads: u64,
    pub marker_saves: u64,
    pub gotos: u64,
    pub docks: u64,
    pub rejected: u64,
}

#[derive(Default)]
struct RobotState {
    maps: HashMap<MapId, String>,
    markers: HashMap<MapId, Vec<MarkerRecord>>,
    path: PosePath,
    offline: bool,
    malformed_pose: bool,
    reject_motion: Option<String>,
    last_goto: Option<GotoCommand>,
    stats: BackendStats,
}

/// The simulated robot.
///
/// Poses follow [`PosePath`] on the shared virtual clock, so a session and
/// its backend always agree on "now".
pub struct SimBackend {
    context: Arc<SimContext>,
    state: Mutex<RobotState>,
}

impl SimBackend {
    pub fn new(context: Arc<SimContext>) -> Self {
        Self {
            context,
            state: Mutex::new(RobotState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, RobotState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stores a hex payload under `id`, replacing any previous one.
    pub fn insert_map(&self, id: MapId, map_data: String) {
        self.state().maps.insert(id, map_data);
    }

    pub fn stored_markers(&self, id: &MapId) -> Vec<MarkerRecord> {
        self.state().markers.get(id).cloned().unwrap_or_default()
    }

    pub fn set_pose_path(&self, path: PosePath) {
        self.state().path = path;
    }

    /// Pose the robot reports right now.
    pub fn current_pose(&self) -> RobotPose {
        self.state().path.pose_at(self.context.now())
    }

    // ---- fault injection ----

    /// Every request fails as unreachable while offline.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Pose replies lose their `response` payload.
    pub fn set_malformed_pose(&self, malformed: bool) {
        self.state().malformed_pose = malformed;
    }

    /// Motion commands are answered with this error.
    pub fn set_reject_motion(&self, reason: Option<String>) {
        self.state().reject_motion = reason;
    }

    pub fn stats(&self) -> BackendStats {
        self.state().stats.clone()
    }

    pub fn last_goto(&self) -> Option<GotoCommand> {
        self.state().last_goto.clone()
    }

    fn online(&self) -> Result<MutexGuard<'_, RobotState>, EnvError> {
        let state = self.state();
        if state.offline {
            return Err(EnvError::unreachable("sim-robot"));
        }
        Ok(state)
    }

    fn motion_reply(state: &mut RobotState) -> CommandReply {
        match &state.reject_motion {
            Some(reason) => {
                state.stats.rejected += 1;
                CommandReply {
                    response: None,
                    error: Some(reason.clone()),
                }
            }
            None => CommandReply {
                response: Some(serde_json::json!("accepted")),
                error: None,
            },
        }
    }
}

#[async_trait]
impl RobotBackend for SimBackend {
    async fn fetch_map(&self, map_id: &MapId) -> Result<MapPayload, EnvError> {
        let mut state = self.online()?;
        state.stats.map_fetches += 1;
        let map_data = state
            .maps
            .get(map_id)
            .cloned()
            .ok_or_else(|| EnvError::NotFound(format!("/maps/{}", map_id)))?;
        Ok(MapPayload { map_data })
    }

    async fn fetch_pose(&self) -> Result<PoseEnvelope, EnvError> {
        let mut state = self.online()?;
        state.stats.pose_fetches += 1;
        if state.malformed_pose {
            return Ok(PoseEnvelope {
                response: Some(serde_json::json!({ "status": "localizing" })),
            });
        }
        Ok(PoseEnvelope::from_pose(state.path.pose_at(self.context.now())))
    }

    async fn load_markers(&self, map_id: &MapId) -> Result<Vec<MarkerRecord>, EnvError> {
        let mut state = self.online()?;
        state.stats.marker_loads += 1;
        Ok(state.markers.get(map_id).cloned().unwrap_or_default())
    }

    async fn save_markers(&self, request: SaveMarkersRequest) -> Result<(), EnvError> {
        let mut state = self.online()?;
        state.stats.marker_saves += 1;
        state.markers.insert(request.map_id, request.markers);
        Ok(())
    }

    async fn goto(&self, command: GotoCommand) -> Result<CommandReply, EnvError> {
        let mut state = self.online()?;
        state.stats.gotos += 1;
        state.last_goto = Some(command);
        Ok(Self::motion_reply(&mut state))
    }

    async fn dock(&self) -> Result<CommandReply, EnvError> {
        let mut state = self.online()?;
        state.stats.docks += 1;
        Ok(Self::motion_reply(&mut state))
    }
}
