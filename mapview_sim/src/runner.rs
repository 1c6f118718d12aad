//! Scenario runner - drives a MapSession against the simulated robot.

use crate::backend::{PosePath, SimBackend};
use crate::config::SimConfig;
use crate::context::SimContext;
use crate::fixtures::MapFixture;
use crate::scenarios::ScenarioId;

use mapview_core::map_markers::format_meters;
use mapview_core::map_raster::MARKER;
use mapview_core::map_view::{Size, ZoomDirection};
use mapview_core::{
    Click, CursorHint, DecodeStatus, GridCell, MapError, MapSession, Point, Raster, RoomLabel,
    Rotation, SessionError, WheelEvent,
};
use mapview_core::{PointerEvent, ViewTransform};
use mapview_env::{EnvError, MapId, ViewContext};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Fails the scenario with a formatted reason unless `cond` holds.
macro_rules! ensure {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err(format!($($arg)+));
        }
    };
}

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Virtual time consumed, in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,

    /// Final rendered view (map, markers, robot), if a map was loaded
    pub snapshot: Option<Raster>,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScenarioMetrics {
    /// Press/release pairs that ended as clicks on the map
    pub clicks: u64,

    /// Press/move/release gestures that panned
    pub drags: u64,

    pub wheel_ticks: u64,

    /// Markers created (not rejected as duplicates)
    pub markers: u64,

    /// Distinct robot poses applied to the overlay
    pub pose_updates: u64,

    /// Maps installed on the engine
    pub map_loads: u64,

    /// Map selections that failed (fetch or decode)
    pub failed_loads: u64,

    /// Decode status of the last installed map
    pub decode_status: Option<String>,
}

/// Runs interaction scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    config: SimConfig,
}

impl ScenarioRunner {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            config: SimConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SimConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets how long the pose-tracking scenario runs, in virtual seconds.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.config.duration_secs = secs;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Runs one scenario on a fresh session and robot.
    ///
    /// Expects a current-thread runtime: the pose poller and the scenario
    /// take turns at every yield.
    pub async fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Running {} (seed={}): {}", scenario, self.seed, scenario.description());
        let mut harness = Harness::new(self.seed, &self.config);

        let outcome = match scenario {
            ScenarioId::ClickInspect => harness.click_inspect().await,
            ScenarioId::PanDrag => harness.pan_drag().await,
            ScenarioId::ZoomAnchor => harness.zoom_anchor().await,
            ScenarioId::RotateSweep => harness.rotate_sweep().await,
            ScenarioId::MarkerDedup => harness.marker_dedup().await,
            ScenarioId::MarkerPersistence => harness.marker_persistence().await,
            ScenarioId::PoseTracking => harness.pose_tracking().await,
            ScenarioId::CorruptStream => harness.corrupt_stream().await,
            ScenarioId::ReloadMidDrag => harness.reload_mid_drag().await,
            ScenarioId::OfflineBackend => harness.offline_backend().await,
        };
        harness.session.stop_pose_polling();

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: outcome.is_ok(),
            final_time_secs: harness.ctx.now().as_secs_f64(),
            failure_reason: outcome.err(),
            snapshot: harness.session.engine().render_overlay(),
            metrics: harness.metrics,
        }
    }
}

/// One simulated operator session with its robot.
struct Harness {
    ctx: Arc<SimContext>,
    backend: Arc<SimBackend>,
    session: MapSession<SimContext, SimBackend>,
    config: SimConfig,
    fixture: MapFixture,
    map_id: MapId,
    rng: ChaCha8Rng,
    metrics: ScenarioMetrics,
}

impl Harness {
    fn new(seed: u64, config: &SimConfig) -> Self {
        let ctx = SimContext::shared(seed);
        let fixture = MapFixture::floor_plan(
            config.map_width,
            config.map_height,
            config.resolution,
            config.origin(),
            &mut ctx.rng(0),
        );
        let backend = Arc::new(SimBackend::new(ctx.clone()));
        let map_id = MapId::new("1");
        backend.insert_map(map_id.clone(), fixture.hex());

        let session = MapSession::new(ctx.clone(), backend.clone(), config.engine.clone());
        Self {
            rng: ctx.rng(1),
            ctx,
            backend,
            session,
            config: config.clone(),
            fixture,
            map_id,
            metrics: ScenarioMetrics::default(),
        }
    }

    fn container(&self) -> Size {
        Size::new(
            self.config.engine.container_width,
            self.config.engine.container_height,
        )
    }

    fn content(&self) -> Size {
        Size::new(self.fixture.width() as f64, self.fixture.height() as f64)
    }

    fn view(&self) -> ViewTransform {
        *self.session.engine().view()
    }

    fn event(&self, at: Point) -> PointerEvent {
        PointerEvent {
            position: at,
            timestamp_ms: self.ctx.unix_millis(),
        }
    }

    async fn select(&mut self, id: MapId) -> Result<(), SessionError> {
        match self.session.select_map(id).await {
            Ok(()) => {
                self.metrics.map_loads += 1;
                self.metrics.decode_status = self
                    .session
                    .engine()
                    .current()
                    .map(|c| format!("{:?}", c.map.status));
                Ok(())
            }
            Err(e) => {
                self.metrics.failed_loads += 1;
                Err(e)
            }
        }
    }

    async fn load_default(&mut self) -> Result<(), String> {
        let id = self.map_id.clone();
        self.select(id)
            .await
            .map_err(|e| format!("loading map failed: {}", e))
    }

    fn random_cell(&mut self) -> GridCell {
        GridCell::new(
            self.rng.gen_range(0..self.fixture.width()),
            self.rng.gen_range(0..self.fixture.height()),
        )
    }

    fn random_point(&mut self) -> Point {
        let c = self.container();
        Point::new(self.rng.gen_range(0.0..c.x), self.rng.gen_range(0.0..c.y))
    }

    /// Press and release at `press` and `release`, with one move between.
    fn gesture(&mut self, press: Point, release: Point) -> Option<Click> {
        let press_event = self.event(press);
        let release_event = self.event(release);
        let engine = self.session.engine_mut();
        engine.on_pointer_down(press_event);
        engine.on_pointer_move(release_event);
        let click = engine.on_pointer_up(release_event);
        if click.is_some() {
            self.metrics.clicks += 1;
        }
        click
    }

    fn click(&mut self, at: Point) -> Option<Click> {
        self.gesture(at, at)
    }

    fn click_cell(&mut self, cell: GridCell) -> Option<Click> {
        let at = self.view().grid_to_screen(cell, self.content());
        self.click(at)
    }

    // ---- scenarios ----

    async fn click_inspect(&mut self) -> Result<(), String> {
        self.load_default().await?;
        let geometry = self
            .session
            .engine()
            .current()
            .map(|c| c.geometry)
            .ok_or("no map installed")?;

        for _ in 0..self.config.clicks {
            let cell = self.random_cell();
            let click = self
                .click_cell(cell)
                .ok_or_else(|| format!("click on ({}, {}) missed the map", cell.x, cell.y))?;
            let selected = click.selected;
            let expected = self.fixture.value_at(cell.x, cell.y);

            ensure!(
                selected.cell == cell,
                "clicked ({}, {}) but inspected ({}, {})",
                cell.x,
                cell.y,
                selected.cell.x,
                selected.cell.y
            );
            ensure!(
                Some(selected.value) == expected,
                "value {} at ({}, {}), fixture has {:?}",
                selected.value,
                cell.x,
                cell.y,
                expected
            );
            ensure!(
                selected.label == RoomLabel::of(selected.value),
                "label {} for value {}",
                selected.label,
                selected.value
            );
            let world = geometry.grid_to_world(cell);
            ensure!(
                selected.world_x == format_meters(world.x)
                    && selected.world_y == format_meters(world.y),
                "world ({}, {}) for ({}, {})",
                selected.world_x,
                selected.world_y,
                cell.x,
                cell.y
            );
            ensure!(
                self.session.engine().selected_point() == Some(&selected),
                "selection not recorded"
            );
            debug!("{} | {}", selected.readout()[0], selected.readout()[1]);
        }

        // Just outside the top-left corner of the canvas.
        let outside = self.view().pan - Point::new(3.0, 3.0);
        ensure!(self.click(outside).is_none(), "click outside the map was inspected");
        Ok(())
    }

    async fn pan_drag(&mut self) -> Result<(), String> {
        self.load_default().await?;
        let threshold = self.config.engine.click_threshold;

        for _ in 0..self.config.clicks {
            let start = self.random_point();
            let magnitude = self.rng.gen_range(threshold + 1.0..threshold + 150.0);
            let sign = if self.rng.gen_bool(0.5) { 1.0 } else { -1.0 };
            let delta = Point::new(sign * magnitude, self.rng.gen_range(-40.0..40.0));

            let before = self.view().pan;
            let press = self.event(start);
            self.session.engine_mut().on_pointer_down(press);
            ensure!(
                self.session.engine().cursor_hint() == CursorHint::Grabbing,
                "cursor not grabbing during drag"
            );
            let middle = self.event(start + delta / 2.0);
            self.session.engine_mut().on_pointer_move(middle);
            let end = self.event(start + delta);
            self.session.engine_mut().on_pointer_move(end);
            ensure!(
                self.session.engine_mut().on_pointer_up(end).is_none(),
                "drag of {:.1} px released as a click",
                delta.norm()
            );
            self.metrics.drags += 1;

            let moved = self.view().pan - before;
            ensure!(
                (moved - delta).norm() < 1e-9,
                "pan moved ({:.3}, {:.3}), pointer moved ({:.3}, {:.3})",
                moved.x,
                moved.y,
                delta.x,
                delta.y
            );
        }

        // Jitter below the threshold is still a click on the cell under the press.
        self.session.engine_mut().reset_view();
        let jitter = Point::new(threshold * 0.5, -threshold * 0.4);
        for _ in 0..self.config.clicks {
            let cell = self.random_cell();
            let press = self.view().grid_to_screen(cell, self.content());
            let click = self
                .gesture(press, press + jitter)
                .ok_or("jittered press was not a click")?;
            ensure!(
                click.selected.cell == cell,
                "jittered click landed on ({}, {}), expected ({}, {})",
                click.selected.cell.x,
                click.selected.cell.y,
                cell.x,
                cell.y
            );
        }
        ensure!(
            self.session.engine().cursor_hint() == CursorHint::Grab,
            "cursor not back to grab"
        );
        Ok(())
    }

    async fn zoom_anchor(&mut self) -> Result<(), String> {
        self.load_default().await?;
        let limits = self.config.engine.clone();

        for _ in 0..self.config.clicks {
            let cursor = self.random_point();
            let delta_y = if self.rng.gen_bool(0.5) { -100.0 } else { 100.0 };
            let before = self.view().screen_to_content(cursor);
            self.wheel(cursor, delta_y);
            let after = self.view().screen_to_content(cursor);
            ensure!(
                (before - after).norm() < 1e-6,
                "anchor drifted by {:e} at zoom {}%",
                (before - after).norm(),
                self.session.engine().zoom_percent()
            );
        }

        let cursor = self.random_point();
        let ticks = ((limits.max_scale - limits.min_scale) / limits.zoom_step).ceil() as usize + 2;
        for _ in 0..ticks {
            self.wheel(cursor, -1.0);
        }
        ensure!(
            self.view().scale == limits.max_scale,
            "zoom in stopped at {}",
            self.view().scale
        );
        ensure!(
            !self.wheel(cursor, -1.0),
            "zoom past the upper bound reported a change"
        );
        for _ in 0..ticks {
            self.wheel(cursor, 1.0);
        }
        ensure!(
            self.view().scale == limits.min_scale,
            "zoom out stopped at {}",
            self.view().scale
        );
        ensure!(
            ZoomDirection::from_wheel_delta(1.0) == ZoomDirection::Out,
            "positive wheel delta must zoom out"
        );
        Ok(())
    }

    fn wheel(&mut self, position: Point, delta_y: f64) -> bool {
        self.metrics.wheel_ticks += 1;
        self.session
            .engine_mut()
            .on_wheel(WheelEvent { position, delta_y })
    }

    async fn rotate_sweep(&mut self) -> Result<(), String> {
        // Rectangular map: the rotated canvas swaps its axes.
        self.load_default().await?;
        let content = self.content();
        self.session.engine_mut().rotate();
        let rect = self.session.engine().canvas_rect().ok_or("no canvas")?;
        let scale = self.view().scale;
        ensure!(
            (rect.size - Size::new(content.y, content.x) * scale).norm() < 1e-9,
            "rotated canvas is {:?}",
            rect.size
        );

        // Square map: every quarter turn maps clicks back to the same cell.
        let side = self.config.map_height.min(self.config.map_width);
        let square = MapFixture::floor_plan(
            side,
            side,
            self.config.resolution,
            self.config.origin(),
            &mut self.ctx.rng(2),
        );
        let square_id = MapId::new("square");
        self.backend.insert_map(square_id.clone(), square.hex());
        self.fixture = square;
        self.select(square_id)
            .await
            .map_err(|e| format!("loading square map failed: {}", e))?;
        self.session.engine_mut().reset_view();

        let initial = self.view();
        let cells: Vec<GridCell> = (0..self.config.clicks).map(|_| self.random_cell()).collect();
        let center = self.container() / 2.0;

        for turn in 1..=4 {
            self.session.engine_mut().rotate();
            let rect = self.session.engine().canvas_rect().ok_or("no canvas")?;
            ensure!(
                (rect.center() - center).norm() < 1e-9,
                "canvas off-centre after turn {}",
                turn
            );
            for &cell in &cells {
                let click = self
                    .click_cell(cell)
                    .ok_or_else(|| format!("turn {}: click on ({}, {}) missed", turn, cell.x, cell.y))?;
                ensure!(
                    click.selected.cell == cell,
                    "turn {}: ({}, {}) inspected as ({}, {})",
                    turn,
                    cell.x,
                    cell.y,
                    click.selected.cell.x,
                    click.selected.cell.y
                );
            }
        }

        let view = self.view();
        ensure!(view.rotation == Rotation::Deg0, "rotation is {:?}", view.rotation);
        ensure!(
            (view.pan - initial.pan).norm() < 1e-9 && view.scale == initial.scale,
            "four turns did not restore the view"
        );
        Ok(())
    }

    async fn marker_dedup(&mut self) -> Result<(), String> {
        self.load_default().await?;
        let threshold = self.config.engine.marker_threshold;
        self.session.engine_mut().set_marking(true);
        ensure!(
            self.session.engine().cursor_hint() == CursorHint::Crosshair,
            "marking mode cursor"
        );

        let mut last_id = 0;
        for _ in 0..self.config.clicks {
            let cell = self.random_cell();
            let too_close = self
                .session
                .engine()
                .markers()
                .is_too_close(&self.map_id, cell, threshold);
            let click = self.click_cell(cell).ok_or("marking click missed the map")?;

            match click.marker {
                Some(id) => {
                    ensure!(!too_close, "duplicate marker at ({}, {})", cell.x, cell.y);
                    ensure!(id > last_id, "marker id {} not above {}", id, last_id);
                    last_id = id;
                    self.metrics.markers += 1;
                }
                None => ensure!(too_close, "marker at ({}, {}) rejected", cell.x, cell.y),
            }

            // A neighbouring cell is always inside the threshold of the marker above.
            if threshold > 1 && !too_close {
                let dx = if cell.x + 1 < self.fixture.width() { 1 } else { -1 };
                let neighbour = GridCell::new(cell.x + dx, cell.y);
                let again = self.click_cell(neighbour).ok_or("repeat click missed")?;
                ensure!(again.marker.is_none(), "repeat click added a marker");
            }
        }

        let markers = self.session.engine().current_markers();
        ensure!(
            markers.len() as u64 == self.metrics.markers,
            "{} markers stored, {} created",
            markers.len(),
            self.metrics.markers
        );
        for (i, marker) in markers.iter().enumerate() {
            ensure!(
                marker.label == (i + 1).to_string(),
                "marker {} labelled {}",
                i,
                marker.label
            );
        }

        if let Some(marker) = markers.last() {
            let (x, y) = (marker.cell.x as i64, marker.cell.y as i64);
            let overlay = self
                .session
                .engine()
                .render_overlay()
                .ok_or("no overlay")?;
            ensure!(
                overlay.pixel(x, y) == Some(MARKER),
                "marker not drawn at ({}, {})",
                x,
                y
            );
        }

        let removed = self.session.engine_mut().clear_markers();
        ensure!(
            removed as u64 == self.metrics.markers,
            "clear removed {}",
            removed
        );
        ensure!(
            self.session.engine().current_markers().is_empty(),
            "markers left after clear"
        );
        Ok(())
    }

    async fn marker_persistence(&mut self) -> Result<(), String> {
        self.load_default().await?;
        let step = self.config.engine.marker_threshold.max(1);
        let y = self.fixture.height() / 2;
        let cells: Vec<GridCell> = (0..5)
            .map(|i| GridCell::new(i * step, y))
            .filter(|c| c.x < self.fixture.width())
            .collect();

        self.session.engine_mut().set_marking(true);
        for &cell in &cells {
            let click = self.click_cell(cell).ok_or("marking click missed")?;
            ensure!(click.marker.is_some(), "marker at ({}, {}) rejected", cell.x, cell.y);
            self.metrics.markers += 1;
        }
        self.session.engine_mut().set_marking(false);
        ensure!(self.session.has_unsaved_markers(), "new markers not dirty");

        let ids: Vec<u64> = self
            .session
            .engine()
            .current_markers()
            .iter()
            .map(|m| m.id)
            .collect();
        let first = *ids.first().ok_or("no markers")?;
        let store = self.session.engine_mut().markers_mut();
        store.set_angle(first, Some(90.0));
        store.relabel(first, "charger");
        store.toggle_selected(first);

        let saved = self
            .session
            .save_markers()
            .await
            .map_err(|e| format!("save failed: {}", e))?;
        ensure!(saved == ids.len(), "saved {} of {}", saved, ids.len());
        ensure!(!self.session.has_unsaved_markers(), "dirty after save");
        let stored = self.backend.stored_markers(&self.map_id);
        ensure!(stored.len() == ids.len(), "robot stored {}", stored.len());

        self.session.engine_mut().clear_markers();
        ensure!(self.session.has_unsaved_markers(), "clear not dirty");
        let loaded = self
            .session
            .load_markers()
            .await
            .map_err(|e| format!("load failed: {}", e))?;
        ensure!(loaded == ids.len(), "loaded {}", loaded);
        ensure!(
            self.session.engine().markers().records(&self.map_id) == stored,
            "reloaded markers differ from the stored ones"
        );

        let reply = self.session.goto_selected().await;
        ensure!(reply.is_ok(), "goto failed: {:?}", reply.err());
        let goal = self.backend.last_goto().ok_or("robot got no goal")?;
        let marker = self
            .session
            .engine()
            .markers()
            .get(first)
            .ok_or("selected marker lost")?;
        let world = marker.world().ok_or("marker world unparseable")?;
        ensure!(
            goal.x == world.x && goal.y == world.y && goal.angle == 90.0,
            "goal ({}, {}, {}) for marker {}",
            goal.x,
            goal.y,
            goal.angle,
            marker.label
        );

        self.backend.set_reject_motion(Some("path blocked".into()));
        ensure!(
            matches!(self.session.dock().await, Err(SessionError::Rejected(_))),
            "rejected dock reported success"
        );
        self.backend.set_reject_motion(None);
        ensure!(self.session.dock().await.is_ok(), "dock failed");
        Ok(())
    }

    async fn pose_tracking(&mut self) -> Result<(), String> {
        self.load_default().await?;
        let geometry = self
            .session
            .engine()
            .current()
            .map(|c| c.geometry)
            .ok_or("no map installed")?;
        let size = geometry.content_size() * geometry.resolution;
        let center = geometry.origin + size / 2.0;
        let radius = size.x.min(size.y) / 4.0;
        self.backend.set_pose_path(PosePath {
            center: (center.x, center.y),
            radius,
            period_secs: 20.0,
        });

        let interval = self.config.engine.pose_interval();
        let duration = Duration::from_secs_f64(self.config.duration_secs);
        let budget = 4 * (duration.as_millis() / interval.as_millis().max(1)) as usize + 64;

        self.session.start_pose_polling();
        let mut steps = 0;
        let mut fault_done = false;
        while self.ctx.now() < duration && steps < budget {
            steps += 1;
            tokio::task::yield_now().await;
            self.tick_pose(center, radius)?;

            if !fault_done && self.ctx.now() >= duration / 2 {
                fault_done = true;
                self.malformed_window(interval * 3, budget, center, radius)
                    .await?;
            }
        }
        self.session.stop_pose_polling();
        ensure!(!self.session.is_polling(), "poller still running");

        ensure!(
            self.metrics.pose_updates > 0,
            "no pose reached the overlay in {:?}",
            self.ctx.now()
        );
        let robot = self
            .session
            .engine()
            .robot_marker()
            .ok_or("no robot overlay")?;
        let pose = self.session.engine().robot_pose().ok_or("no pose")?;
        let expected = geometry.world_to_canvas(Point::new(pose.x, pose.y));
        ensure!(
            (robot.canvas - expected).norm() < 1e-9 && robot.angle == pose.angle,
            "robot drawn at {:?}, pose maps to {:?}",
            robot.canvas,
            expected
        );
        Ok(())
    }

    /// Applies the newest polled pose and checks it lies on the path.
    fn tick_pose(&mut self, center: Point, radius: f64) -> Result<(), String> {
        let before = self.session.engine().robot_pose();
        self.session.on_tick();
        let after = self.session.engine().robot_pose();
        if after != before {
            if let Some(pose) = after {
                let r = (Point::new(pose.x, pose.y) - center).norm();
                ensure!((r - radius).abs() < 1e-6, "pose {:?} off the path", pose);
                self.metrics.pose_updates += 1;
            }
        }
        Ok(())
    }

    /// Serves malformed poses for `window`; the overlay must not move.
    async fn malformed_window(
        &mut self,
        window: Duration,
        budget: usize,
        center: Point,
        radius: f64,
    ) -> Result<(), String> {
        self.backend.set_malformed_pose(true);
        // A pose fetched before the fault is still delivered once.
        self.tick_pose(center, radius)?;
        let frozen = self.session.engine().robot_pose();
        let until = self.ctx.now() + window;
        let mut steps = 0;
        while self.ctx.now() < until && steps < budget {
            steps += 1;
            tokio::task::yield_now().await;
            self.session.on_tick();
            ensure!(
                self.session.engine().robot_pose() == frozen,
                "malformed pose reached the overlay"
            );
        }
        self.backend.set_malformed_pose(false);
        Ok(())
    }

    async fn corrupt_stream(&mut self) -> Result<(), String> {
        let truncated = MapId::new("truncated");
        let corrupt = MapId::new("corrupt");
        self.backend
            .insert_map(truncated.clone(), self.fixture.truncated_hex(0.5));
        let corrupted = self
            .fixture
            .corrupted_hex()
            .ok_or("fixture has no back-reference")?;
        self.backend.insert_map(corrupt.clone(), corrupted);
        self.backend.insert_map(MapId::new("garbage"), "zz".into());
        self.backend.insert_map(MapId::new("short"), "0102030405".into());

        self.select(truncated)
            .await
            .map_err(|e| format!("truncated map rejected: {}", e))?;
        {
            let current = self.session.engine().current().ok_or("no map")?;
            ensure!(
                current.map.status == DecodeStatus::Truncated,
                "status {:?}",
                current.map.status
            );
            ensure!(
                current.map.grid.len() == self.fixture.grid.len(),
                "grid has {} cells",
                current.map.grid.len()
            );
            ensure!(
                current.map.grid.last() == Some(&0),
                "tail of a truncated map must be zero"
            );
            ensure!(
                current.raster.width() == self.fixture.width() as usize,
                "truncated map not rendered"
            );
        }

        self.select(corrupt.clone())
            .await
            .map_err(|e| format!("corrupt map rejected: {}", e))?;
        let status = self
            .session
            .engine()
            .current()
            .map(|c| c.map.status)
            .ok_or("no map")?;
        ensure!(
            matches!(status, DecodeStatus::Corrupt { offset: u16::MAX, .. }),
            "status {:?}",
            status
        );

        let garbage = self.select(MapId::new("garbage")).await;
        ensure!(
            matches!(garbage, Err(SessionError::Map(MapError::InvalidHex(_)))),
            "bad hex gave {:?}",
            garbage
        );
        let short = self.select(MapId::new("short")).await;
        ensure!(
            matches!(
                short,
                Err(SessionError::Map(MapError::HeaderTooShort { len: 5 }))
            ),
            "short payload gave {:?}",
            short
        );
        ensure!(
            self.session.engine().map_id() == Some(&corrupt),
            "failed loads replaced the map on display"
        );
        Ok(())
    }

    async fn reload_mid_drag(&mut self) -> Result<(), String> {
        self.load_default().await?;
        let other = MapFixture::floor_plan(
            self.config.map_width + 8,
            self.config.map_height,
            self.config.resolution,
            self.config.origin(),
            &mut self.ctx.rng(3),
        );
        let other_id = MapId::new("2");
        self.backend.insert_map(other_id.clone(), other.hex());

        let cell = self.random_cell();
        ensure!(self.click_cell(cell).is_some(), "setup click missed");

        let start = self.container() / 2.0;
        let end = start + Point::new(30.0, 20.0);
        let (press, release) = (self.event(start), self.event(end));
        self.session.engine_mut().on_pointer_down(press);
        self.session.engine_mut().on_pointer_move(release);
        let dragged = self.view();

        self.select(other_id.clone())
            .await
            .map_err(|e| format!("reload failed: {}", e))?;
        ensure!(self.view() == dragged, "reload mid-drag changed the view");
        ensure!(
            self.session.engine().map_id() == Some(&other_id),
            "new map not installed"
        );
        ensure!(
            self.session.engine().selected_point().is_none(),
            "selection survived the reload"
        );
        ensure!(
            self.session.engine_mut().on_pointer_up(release).is_none(),
            "drag release became a click"
        );
        self.metrics.drags += 1;

        // Idle reload fits the map again.
        let id = self.map_id.clone();
        self.select(id)
            .await
            .map_err(|e| format!("idle reload failed: {}", e))?;
        let rect = self.session.engine().canvas_rect().ok_or("no canvas")?;
        ensure!(
            (rect.center() - self.container() / 2.0).norm() < 1e-9,
            "idle reload not centred"
        );
        Ok(())
    }

    async fn offline_backend(&mut self) -> Result<(), String> {
        self.load_default().await?;
        let fetches = self.backend.stats().map_fetches;
        let blank = self.select(MapId::new("  ")).await;
        ensure!(
            matches!(blank, Err(SessionError::InvalidMapId(_))),
            "blank id gave {:?}",
            blank
        );
        ensure!(
            self.backend.stats().map_fetches == fetches,
            "blank id hit the robot"
        );

        self.backend.set_offline(true);
        let offline = self.select(MapId::new("1")).await;
        ensure!(
            matches!(offline, Err(SessionError::Env(EnvError::Unreachable(_)))),
            "offline fetch gave {:?}",
            offline
        );
        ensure!(
            self.session.engine().map_id() == Some(&self.map_id),
            "map lost while offline"
        );
        ensure!(
            self.session.poll_pose_once().await.is_none(),
            "pose while offline"
        );
        ensure!(
            self.session.save_markers().await.is_err(),
            "save succeeded while offline"
        );

        self.ctx.advance_time(Duration::from_secs(2));
        self.backend.set_offline(false);
        let pose = self
            .session
            .poll_pose_once()
            .await
            .ok_or("no pose after reconnect")?;
        self.metrics.pose_updates += 1;
        ensure!(
            self.session.engine().robot_pose() == Some(pose),
            "pose not applied"
        );
        ensure!(
            pose == self.backend.current_pose(),
            "pose {:?} differs from the robot's",
            pose
        );
        let missing = self.select(MapId::new("404")).await;
        ensure!(
            matches!(missing, Err(SessionError::Env(EnvError::NotFound(_)))),
            "unknown map gave {:?}",
            missing
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn small_runner(seed: u64) -> ScenarioRunner {
        let config = SimConfig {
            map_width: 48,
            map_height: 32,
            clicks: 12,
            duration_secs: 6.0,
            ..SimConfig::default()
        };
        ScenarioRunner::new(seed).with_config(config)
    }

    #[tokio::test]
    async fn test_all_scenarios_pass() {
        let runner = small_runner(42);
        for scenario in ScenarioId::all() {
            let result = runner.run(scenario).await;
            assert!(
                result.passed,
                "{} failed: {:?}",
                scenario,
                result.failure_reason
            );
        }
    }

    #[tokio::test]
    async fn test_metrics_are_deterministic() {
        let a = small_runner(7).run(ScenarioId::MarkerDedup).await;
        let b = small_runner(7).run(ScenarioId::MarkerDedup).await;
        assert_eq!(a.metrics, b.metrics);
        assert_eq!(a.snapshot, b.snapshot);
    }

    #[tokio::test]
    async fn test_pose_tracking_updates_overlay() {
        let result = small_runner(3).run(ScenarioId::PoseTracking).await;
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.pose_updates > 0);
        assert!(result.final_time_secs >= 6.0);
        assert!(result.snapshot.is_some());
    }

    #[tokio::test]
    async fn test_corrupt_stream_counts_failures() {
        let result = small_runner(1).run(ScenarioId::CorruptStream).await;
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.map_loads, 2);
        assert_eq!(result.metrics.failed_loads, 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn prop_same_seed_replays_identically(seed in any::<u64>(), pick in 0usize..10) {
            let scenario = ScenarioId::all()[pick];
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            let (a, b) = runtime.block_on(async {
                let a = small_runner(seed).run(scenario).await;
                let b = small_runner(seed).run(scenario).await;
                (a, b)
            });

            prop_assert_eq!(a.passed, b.passed);
            prop_assert_eq!(a.failure_reason, b.failure_reason);
            prop_assert_eq!(a.metrics, b.metrics);
            prop_assert_eq!(a.snapshot, b.snapshot);
        }
    }
}
