//! Robot backend abstraction for MapView sessions.

use crate::error::EnvError;
use crate::types::{
    CommandReply, GotoCommand, MapId, MapPayload, MarkerRecord, PoseEnvelope, SaveMarkersRequest,
};
use async_trait::async_trait;

/// Abstraction over the robot's REST API.
///
/// # Implementations
///
/// - **Production**: `HttpBackend` - reqwest against the robot's web API
/// - **Simulation**: `SimBackend` - in-memory robot with fault injection
///
/// # Request Flow
///
/// ```text
/// MapSession                   Backend                      Robot
///   |                            |                            |
///   |-- fetch_map(id) ---------->|-- GET /maps/{id} --------->|
///   |<-------- MapPayload -------|<------- {map_data} --------|
///   |                            |                            |
///   |-- fetch_pose() (1 Hz) ---->|-- GET /maps/position ----->|
///   |<------- PoseEnvelope ------|<------ {response} ---------|
/// ```
#[async_trait]
pub trait RobotBackend: Send + Sync + 'static {
    /// Downloads a map's hex-encoded payload.
    ///
    /// # Returns
    /// * `Ok(MapPayload)` - The raw map string, not yet decoded
    /// * `Err(EnvError::NotFound)` - Unknown map id
    async fn fetch_map(&self, map_id: &MapId) -> Result<MapPayload, EnvError>;

    /// Fetches the robot's current pose envelope.
    ///
    /// The envelope is returned even if its content is malformed; callers
    /// decide whether to use it via [`PoseEnvelope::pose`].
    async fn fetch_pose(&self) -> Result<PoseEnvelope, EnvError>;

    /// Loads the saved markers for a map.
    async fn load_markers(&self, map_id: &MapId) -> Result<Vec<MarkerRecord>, EnvError>;

    /// Persists the markers of one map, replacing what was stored.
    async fn save_markers(&self, request: SaveMarkersRequest) -> Result<(), EnvError>;

    /// Sends a navigation goal.
    async fn goto(&self, command: GotoCommand) -> Result<CommandReply, EnvError>;

    /// Asks the robot to return to its dock.
    async fn dock(&self) -> Result<CommandReply, EnvError>;
}
