//! Map session: wires an [`EngineState`] to a context and a robot backend.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       MapSession                           │
//! │  ┌──────────────────────────────────────────────────────┐  │
//! │  │ Context: ViewContext       Backend: RobotBackend      │  │
//! │  │  • now() → load timing      • fetch_map / fetch_pose  │  │
//! │  │  • sleep() → poll cadence   • load/save markers       │  │
//! │  │  • spawn() → pose poller    • goto / dock             │  │
//! │  └──────────────────────────────────────────────────────┘  │
//! │                            │                               │
//! │  ┌──────────────────────────────────────────────────────┐  │
//! │  │ EngineState: map · view · gestures · markers · robot │  │
//! │  └──────────────────────────────────────────────────────┘  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use mapview_core::session::MapSession;
//! use mapview_env::{HttpBackend, HttpConfig, MapId, TokioContext};
//!
//! let backend = Arc::new(HttpBackend::new(HttpConfig::default())?);
//! let mut session = MapSession::new(TokioContext::shared(), backend, EngineConfig::default());
//!
//! session.select_map(MapId::new("1")).await?;
//! session.start_pose_polling();
//! // host loop: forward events to session.engine_mut(), call session.on_tick()
//! ```

use crate::config::EngineConfig;
use crate::engine::EngineState;
use crate::error::SessionError;
use crate::map_markers::{Marker, MarkerId};
use mapview_env::{
    CommandReply, GotoCommand, MapId, RobotBackend, RobotPose, SaveMarkersRequest, ViewContext,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Background task fetching the robot pose at a fixed interval.
///
/// Stops when [`PosePoller::stop`] is called or the poller is dropped.
/// A fetch already in flight when stopping finishes, but its result is
/// discarded.
pub struct PosePoller {
    stop: Arc<AtomicBool>,
    latest: watch::Receiver<Option<RobotPose>>,
}

impl PosePoller {
    pub fn spawn<Ctx, B>(context: Arc<Ctx>, backend: Arc<B>, interval: Duration) -> Self
    where
        Ctx: ViewContext,
        B: RobotBackend,
    {
        let (tx, latest) = watch::channel(None);
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let clock = context.clone();

        context.spawn("pose-poller", async move {
            loop {
                clock.sleep(interval).await;
                if flag.load(Ordering::Acquire) {
                    break;
                }
                let pose = match backend.fetch_pose().await {
                    Ok(envelope) => match envelope.pose() {
                        Ok(pose) => pose,
                        Err(e) => {
                            warn!("Ignoring malformed pose: {}", e);
                            continue;
                        }
                    },
                    Err(e) => {
                        error!("Pose fetch failed: {}", e);
                        continue;
                    }
                };
                if flag.load(Ordering::Acquire) || tx.send(Some(pose)).is_err() {
                    break;
                }
            }
            debug!("Pose poller stopped");
        });

        Self { stop, latest }
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// The newest pose not yet taken, if any.
    pub fn take_latest(&mut self) -> Option<RobotPose> {
        if self.is_stopped() || !self.latest.has_changed().unwrap_or(false) {
            return None;
        }
        *self.latest.borrow_and_update()
    }
}

impl Drop for PosePoller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One operator view bound to a robot.
///
/// Generic over the context and backend so the same session code runs
/// against a live robot (tokio + HTTP) or inside the simulator.
pub struct MapSession<Ctx, B>
where
    Ctx: ViewContext,
    B: RobotBackend,
{
    context: Arc<Ctx>,
    backend: Arc<B>,
    engine: EngineState,
    poller: Option<PosePoller>,
}

impl<Ctx, B> MapSession<Ctx, B>
where
    Ctx: ViewContext,
    B: RobotBackend,
{
    pub fn new(context: Arc<Ctx>, backend: Arc<B>, config: EngineConfig) -> Self {
        Self {
            context,
            backend,
            engine: EngineState::new(config),
            poller: None,
        }
    }

    pub fn engine(&self) -> &EngineState {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut EngineState {
        &mut self.engine
    }

    pub fn context(&self) -> &Arc<Ctx> {
        &self.context
    }

    fn current_map_id(&self) -> Result<MapId, SessionError> {
        self.engine
            .map_id()
            .cloned()
            .ok_or(SessionError::NoMapSelected)
    }

    /// Downloads, decodes and displays a map, then loads its markers.
    ///
    /// A blank id performs no fetch. A failed fetch or decode leaves the
    /// previous map on display. Marker loading failures are logged only.
    pub async fn select_map(&mut self, map_id: MapId) -> Result<(), SessionError> {
        if !map_id.is_valid() {
            debug!("No map id selected, skipping fetch");
            return Err(SessionError::InvalidMapId(map_id));
        }

        let started = self.context.now();
        let payload = self.backend.fetch_map(&map_id).await.map_err(|e| {
            error!("Failed to fetch map {}: {}", map_id, e);
            e
        })?;
        self.engine.load_map_hex(map_id.clone(), &payload.map_data)?;
        info!(
            "Map {} ready in {:?}",
            map_id,
            self.context.now().saturating_sub(started)
        );

        if let Err(e) = self.load_markers().await {
            warn!("Markers for map {} not loaded: {}", map_id, e);
        }
        Ok(())
    }

    /// Replaces the current map's markers with the stored set.
    pub async fn load_markers(&mut self) -> Result<usize, SessionError> {
        let map_id = self.current_map_id()?;
        let records = self.backend.load_markers(&map_id).await?;
        let count = records.len();
        let markers = records.into_iter().map(Marker::from).collect();
        self.engine.markers_mut().replace_for_map(&map_id, markers);
        debug!("Loaded {} markers for map {}", count, map_id);
        Ok(count)
    }

    /// Persists the current map's markers.
    pub async fn save_markers(&mut self) -> Result<usize, SessionError> {
        let map_id = self.current_map_id()?;
        let markers = self.engine.markers().records(&map_id);
        let count = markers.len();
        self.backend
            .save_markers(SaveMarkersRequest {
                map_id: map_id.clone(),
                markers,
            })
            .await?;
        self.engine.markers_mut().mark_saved(&map_id);
        info!("Saved {} markers for map {}", count, map_id);
        Ok(count)
    }

    pub fn has_unsaved_markers(&self) -> bool {
        self.engine
            .map_id()
            .map(|id| self.engine.markers().is_dirty(id))
            .unwrap_or(false)
    }

    /// Sends the robot to a marker's world position.
    pub async fn goto_marker(&mut self, id: MarkerId) -> Result<CommandReply, SessionError> {
        let marker = self
            .engine
            .markers()
            .get(id)
            .ok_or(SessionError::UnknownMarker(id))?;
        let world = marker.world().ok_or(SessionError::InvalidCoordinate(id))?;
        let command = GotoCommand::new(
            world.x,
            world.y,
            marker.angle.unwrap_or(0.0),
            self.engine.config().goto_speed,
        );
        info!("Goto marker {} at ({:.2}, {:.2})", marker.label, world.x, world.y);

        let reply = self.backend.goto(command).await?;
        match reply.error {
            Some(err) => Err(SessionError::Rejected(err)),
            None => Ok(reply),
        }
    }

    /// Sends the robot to the first selected marker of the current map.
    pub async fn goto_selected(&mut self) -> Result<CommandReply, SessionError> {
        let map_id = self.current_map_id()?;
        let id = self
            .engine
            .markers()
            .for_map(&map_id)
            .find(|m| m.selected)
            .map(|m| m.id)
            .ok_or(SessionError::NoMarkerSelected)?;
        self.goto_marker(id).await
    }

    pub async fn dock(&mut self) -> Result<CommandReply, SessionError> {
        info!("Docking");
        let reply = self.backend.dock().await?;
        match reply.error {
            Some(err) => Err(SessionError::Rejected(err)),
            None => Ok(reply),
        }
    }

    /// Fetches the pose once and applies it. Failures are logged and
    /// leave the last pose in place.
    pub async fn poll_pose_once(&mut self) -> Option<RobotPose> {
        let envelope = match self.backend.fetch_pose().await {
            Ok(envelope) => envelope,
            Err(e) => {
                error!("Pose fetch failed: {}", e);
                return None;
            }
        };
        match envelope.pose() {
            Ok(pose) => {
                self.engine.on_tick(Some(pose));
                Some(pose)
            }
            Err(e) => {
                warn!("Ignoring malformed pose: {}", e);
                None
            }
        }
    }

    /// Starts the background pose poller if it is not running.
    pub fn start_pose_polling(&mut self) {
        if self.poller.is_some() {
            return;
        }
        let interval = self.engine.config().pose_interval();
        debug!("Starting pose poller every {:?}", interval);
        self.poller = Some(PosePoller::spawn(
            self.context.clone(),
            self.backend.clone(),
            interval,
        ));
    }

    /// Tears the poller down (view no longer active).
    pub fn stop_pose_polling(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.stop();
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_some()
    }

    /// Host tick: hands the newest polled pose to the engine.
    pub fn on_tick(&mut self) {
        let latest = self.poller.as_mut().and_then(PosePoller::take_latest);
        self.engine.on_tick(latest);
    }
}

impl<Ctx, B> Drop for MapSession<Ctx, B>
where
    Ctx: ViewContext,
    B: RobotBackend,
{
    fn drop(&mut self) {
        self.stop_pose_polling();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map_format::{encode_hex, MapHeader};
    use crate::map_interaction::PointerEvent;
    use crate::map_view::GridCell;
    use async_trait::async_trait;
    use mapview_env::{
        EnvError, MapPayload, MarkerRecord, PoseEnvelope, TokioContext,
    };
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockState {
        maps: HashMap<MapId, String>,
        markers: HashMap<MapId, Vec<MarkerRecord>>,
        pose: Option<serde_json::Value>,
        map_fetches: usize,
        gotos: Vec<GotoCommand>,
        docks: usize,
        reject: Option<String>,
    }

    #[derive(Default)]
    struct MockBackend {
        state: Mutex<MockState>,
    }

    impl MockBackend {
        fn with_map(id: &str, width: i32, height: i32) -> Self {
            let backend = Self::default();
            let header = MapHeader::for_grid(width, height, 0.05, (-1.0, -1.0));
            let grid = vec![0x05u8; (width * height) as usize];
            backend
                .state
                .lock()
                .unwrap()
                .maps
                .insert(MapId::new(id), encode_hex(&header, &grid));
            backend
        }

        fn set_pose(&self, pose: serde_json::Value) {
            self.state.lock().unwrap().pose = Some(pose);
        }
    }

    #[async_trait]
    impl RobotBackend for MockBackend {
        async fn fetch_map(&self, map_id: &MapId) -> Result<MapPayload, EnvError> {
            let mut state = self.state.lock().unwrap();
            state.map_fetches += 1;
            state
                .maps
                .get(map_id)
                .map(|hex| MapPayload {
                    map_data: hex.clone(),
                })
                .ok_or_else(|| EnvError::NotFound(map_id.to_string()))
        }

        async fn fetch_pose(&self) -> Result<PoseEnvelope, EnvError> {
            let state = self.state.lock().unwrap();
            Ok(PoseEnvelope {
                response: state.pose.clone(),
            })
        }

        async fn load_markers(&self, map_id: &MapId) -> Result<Vec<MarkerRecord>, EnvError> {
            let state = self.state.lock().unwrap();
            Ok(state.markers.get(map_id).cloned().unwrap_or_default())
        }

        async fn save_markers(&self, request: SaveMarkersRequest) -> Result<(), EnvError> {
            let mut state = self.state.lock().unwrap();
            state.markers.insert(request.map_id, request.markers);
            Ok(())
        }

        async fn goto(&self, command: GotoCommand) -> Result<CommandReply, EnvError> {
            let mut state = self.state.lock().unwrap();
            state.gotos.push(command);
            Ok(CommandReply {
                response: Some(serde_json::json!("ok")),
                error: state.reject.clone(),
            })
        }

        async fn dock(&self) -> Result<CommandReply, EnvError> {
            let mut state = self.state.lock().unwrap();
            state.docks += 1;
            Ok(CommandReply::default())
        }
    }

    fn session(backend: Arc<MockBackend>) -> MapSession<TokioContext, MockBackend> {
        let config = EngineConfig {
            pose_interval_ms: 10,
            ..Default::default()
        };
        MapSession::new(TokioContext::shared(), backend, config)
    }

    fn mark_cell(session: &mut MapSession<TokioContext, MockBackend>, x: i32, y: i32) -> MarkerId {
        let engine = session.engine_mut();
        engine.set_marking(true);
        let content = engine.current().unwrap().geometry.content_size();
        let p = engine.view().grid_to_screen(GridCell::new(x, y), content);
        engine.on_pointer_down(PointerEvent { position: p, timestamp_ms: 1 });
        engine
            .on_pointer_up(PointerEvent { position: p, timestamp_ms: 1 })
            .and_then(|c| c.marker)
            .unwrap()
    }

    #[tokio::test]
    async fn test_blank_map_id_skips_fetch() {
        let backend = Arc::new(MockBackend::with_map("1", 4, 4));
        let mut session = session(backend.clone());

        let result = session.select_map(MapId::new("  ")).await;
        assert!(matches!(result, Err(SessionError::InvalidMapId(_))));
        assert_eq!(backend.state.lock().unwrap().map_fetches, 0);
    }

    #[tokio::test]
    async fn test_select_map_and_failed_reload() {
        let backend = Arc::new(MockBackend::with_map("1", 20, 10));
        let mut session = session(backend.clone());

        session.select_map(MapId::new("1")).await.unwrap();
        assert_eq!(session.engine().map_id(), Some(&MapId::new("1")));

        let result = session.select_map(MapId::new("missing")).await;
        assert!(matches!(result, Err(SessionError::Env(EnvError::NotFound(_)))));
        assert_eq!(session.engine().map_id(), Some(&MapId::new("1")));
    }

    #[tokio::test]
    async fn test_save_then_reload_markers() {
        let backend = Arc::new(MockBackend::with_map("1", 40, 40));
        let mut session = session(backend.clone());
        session.select_map(MapId::new("1")).await.unwrap();

        mark_cell(&mut session, 10, 10);
        mark_cell(&mut session, 30, 30);
        assert!(session.has_unsaved_markers());

        assert_eq!(session.save_markers().await.unwrap(), 2);
        assert!(!session.has_unsaved_markers());
        assert_eq!(backend.state.lock().unwrap().markers[&MapId::new("1")].len(), 2);

        session.engine_mut().clear_markers();
        assert_eq!(session.load_markers().await.unwrap(), 2);
        assert_eq!(session.engine().current_markers().len(), 2);
    }

    #[tokio::test]
    async fn test_goto_marker_uses_world_coordinates() {
        let backend = Arc::new(MockBackend::with_map("1", 40, 40));
        let mut session = session(backend.clone());
        session.select_map(MapId::new("1")).await.unwrap();

        let id = mark_cell(&mut session, 20, 39);
        session.goto_marker(id).await.unwrap();
        {
            let state = backend.state.lock().unwrap();
            let cmd = &state.gotos[0];
            assert_eq!(cmd.method, "goto");
            // origin -1 + 20 * 0.05 = 0.00; row 39 is the bottom row
            assert_eq!((cmd.x, cmd.y), (0.0, -1.0));
            assert_eq!(cmd.speed, 0.5);
        }

        assert!(matches!(
            session.goto_marker(42).await,
            Err(SessionError::UnknownMarker(42))
        ));
        assert!(matches!(
            session.goto_selected().await,
            Err(SessionError::NoMarkerSelected)
        ));

        session.engine_mut().markers_mut().toggle_selected(id);
        backend.state.lock().unwrap().reject = Some("busy".into());
        assert!(matches!(
            session.goto_selected().await,
            Err(SessionError::Rejected(_))
        ));

        session.dock().await.unwrap();
        assert_eq!(backend.state.lock().unwrap().docks, 1);
    }

    #[tokio::test]
    async fn test_poll_pose_once_ignores_malformed() {
        let backend = Arc::new(MockBackend::with_map("1", 8, 8));
        let mut session = session(backend.clone());

        backend.set_pose(serde_json::json!({"x": 1.0, "y": 2.0, "angle": 30.0}));
        assert!(session.poll_pose_once().await.is_some());

        backend.set_pose(serde_json::json!({"x": "nope"}));
        assert!(session.poll_pose_once().await.is_none());
        assert_eq!(
            session.engine().robot_pose(),
            Some(RobotPose { x: 1.0, y: 2.0, angle: 30.0 })
        );
    }

    #[tokio::test]
    async fn test_background_polling_and_teardown() {
        let backend = Arc::new(MockBackend::with_map("1", 8, 8));
        backend.set_pose(serde_json::json!({"x": 0.5, "y": 0.5, "angle": 0.0}));
        let mut session = session(backend.clone());

        session.start_pose_polling();
        assert!(session.is_polling());
        tokio::time::sleep(Duration::from_millis(60)).await;
        session.on_tick();
        assert_eq!(session.engine().robot_pose().map(|p| p.x), Some(0.5));

        session.stop_pose_polling();
        assert!(!session.is_polling());
        backend.set_pose(serde_json::json!({"x": 9.0, "y": 9.0, "angle": 0.0}));
        tokio::time::sleep(Duration::from_millis(40)).await;
        session.on_tick();
        assert_eq!(session.engine().robot_pose().map(|p| p.x), Some(0.5));
    }
}
