//! `EngineState`: the single owner of map, view, gestures and markers.
//!
//! The host forwards raw events (`on_pointer_down`, `on_pointer_move`,
//! `on_pointer_up`, `on_wheel`, `on_tick`) and host controls (reset,
//! rotate, marking mode, clear markers). Every mutation goes through the
//! component that owns the state it touches.
//!
//! # Example
//!
//! ```ignore
//! let mut engine = EngineState::new(EngineConfig::default());
//! engine.load_map_hex(MapId::new("1"), &payload.map_data)?;
//!
//! engine.on_pointer_down(PointerEvent::new(400.0, 300.0, now));
//! if let Some(click) = engine.on_pointer_up(PointerEvent::new(401.0, 300.0, now)) {
//!     println!("{}", click.selected.readout()[1]);
//! }
//! ```

use crate::config::EngineConfig;
use crate::error::MapError;
use crate::map_format::{self, DecodedMap};
use crate::map_interaction::{
    self, CursorHint, InteractionController, PointerEvent, Release, SelectedPoint, WheelEvent,
};
use crate::map_markers::{Marker, MarkerCandidate, MarkerId, MarkerStore};
use crate::map_raster::{self, Raster, MARKER, MARKER_SELECTED};
use crate::map_view::{
    MapGeometry, Point, ScreenRect, Size, ViewLimits, ViewTransform, ZoomDirection,
};
use mapview_env::{MapId, RobotPose};
use tracing::{debug, info, warn};

/// The map currently on display.
#[derive(Debug, Clone)]
pub struct LoadedMap {
    pub id: MapId,
    pub map: DecodedMap,
    pub geometry: MapGeometry,
    /// Cell layer with the meter grid, before markers and robot
    pub raster: Raster,
}

/// Outcome of a click on the map.
#[derive(Debug, Clone, PartialEq)]
pub struct Click {
    pub selected: SelectedPoint,
    /// Set when marking mode created a marker
    pub marker: Option<MarkerId>,
}

/// Robot overlay placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobotMarker {
    /// Position in unrotated canvas px
    pub canvas: Point,
    /// Heading in degrees
    pub angle: f64,
}

#[derive(Debug, Clone)]
pub struct EngineState {
    config: EngineConfig,
    limits: ViewLimits,
    container: Size,
    current: Option<LoadedMap>,
    view: ViewTransform,
    interaction: InteractionController,
    markers: MarkerStore,
    marking: bool,
    selected: Option<SelectedPoint>,
    robot_pose: Option<RobotPose>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl EngineState {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            limits: ViewLimits::from(&config),
            container: Size::new(config.container_width, config.container_height),
            interaction: InteractionController::new(config.click_threshold),
            config,
            current: None,
            view: ViewTransform::default(),
            markers: MarkerStore::new(),
            marking: false,
            selected: None,
            robot_pose: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn view(&self) -> &ViewTransform {
        &self.view
    }

    pub fn current(&self) -> Option<&LoadedMap> {
        self.current.as_ref()
    }

    pub fn map_id(&self) -> Option<&MapId> {
        self.current.as_ref().map(|c| &c.id)
    }

    pub fn selected_point(&self) -> Option<&SelectedPoint> {
        self.selected.as_ref()
    }

    /// Host container resized.
    pub fn set_container(&mut self, width: f64, height: f64) {
        self.container = Size::new(width, height);
        self.fit_to_container();
    }

    // ---- map loading ----

    /// Decodes and installs a hex payload.
    ///
    /// On error the previously loaded map stays on display.
    pub fn load_map_hex(&mut self, id: MapId, raw: &str) -> Result<(), MapError> {
        match map_format::decode(raw) {
            Ok(map) => {
                self.install_map(id, map);
                Ok(())
            }
            Err(e) => {
                warn!("Map {} rejected: {}", id, e);
                Err(e)
            }
        }
    }

    /// Installs an already decoded map, replacing the current one.
    ///
    /// A reload in the middle of a drag keeps the transform; otherwise the
    /// new map is fitted to the container.
    pub fn install_map(&mut self, id: MapId, map: DecodedMap) {
        let raster = map_raster::render(&map);
        let geometry = MapGeometry::from(&map);
        info!(
            "Map {} loaded: {}x{} @ {} m/cell ({:?})",
            id,
            geometry.width,
            geometry.height,
            geometry.resolution,
            map.status
        );
        self.current = Some(LoadedMap {
            id,
            map,
            geometry,
            raster,
        });
        self.selected = None;
        if self.interaction.is_dragging() {
            debug!("Map replaced mid-drag; keeping transform");
        } else {
            self.fit_to_container();
        }
    }

    fn content_size(&self) -> Option<Size> {
        self.current.as_ref().map(|c| c.geometry.content_size())
    }

    // ---- view controls ----

    pub fn fit_to_container(&mut self) {
        if let Some(content) = self.content_size() {
            self.view
                .fit_to_container(self.container, content, &self.limits);
        }
    }

    pub fn reset_view(&mut self) {
        match self.content_size() {
            Some(content) => self.view.reset(self.container, content, &self.limits),
            None => self.view = ViewTransform::default(),
        }
    }

    pub fn rotate(&mut self) {
        let content = self.content_size().unwrap_or_else(Size::zeros);
        self.view.rotate(self.container, content);
    }

    pub fn zoom_percent(&self) -> u32 {
        self.view.zoom_percent()
    }

    pub fn canvas_rect(&self) -> Option<ScreenRect> {
        self.content_size().map(|c| self.view.canvas_rect(c))
    }

    // ---- events ----

    pub fn on_pointer_down(&mut self, event: PointerEvent) {
        self.interaction.pointer_down(event.position, &self.view);
    }

    pub fn on_pointer_move(&mut self, event: PointerEvent) -> bool {
        self.interaction.pointer_move(event.position, &mut self.view)
    }

    /// Ends a gesture; returns the click result if it was a click on the map.
    pub fn on_pointer_up(&mut self, event: PointerEvent) -> Option<Click> {
        match self.interaction.pointer_up(event.position) {
            Release::Click(position) => self.click(position, event.timestamp_ms),
            Release::Pan | Release::Ignored => None,
        }
    }

    pub fn on_wheel(&mut self, event: WheelEvent) -> bool {
        let direction = ZoomDirection::from_wheel_delta(event.delta_y);
        self.view.zoom_at(event.position, direction, &self.limits)
    }

    /// Periodic tick; applies the newest polled pose if there is one.
    pub fn on_tick(&mut self, pose: Option<RobotPose>) {
        if let Some(pose) = pose {
            self.robot_pose = Some(pose);
        }
    }

    fn click(&mut self, position: Point, now_ms: u64) -> Option<Click> {
        let current = self.current.as_ref()?;
        let selected = map_interaction::inspect(&current.map, &self.view, position)?;
        debug!(
            "Clicked cell ({}, {}): {}",
            selected.cell.x, selected.cell.y, selected.label
        );

        let mut marker = None;
        if self.marking {
            let world = current.geometry.grid_to_world(selected.cell);
            let candidate = MarkerCandidate {
                cell: selected.cell,
                world,
            };
            let map_id = current.id.clone();
            marker = self.markers.add_if_far(
                candidate,
                &map_id,
                self.config.marker_threshold,
                now_ms,
            );
        }

        self.selected = Some(selected.clone());
        Some(Click { selected, marker })
    }

    // ---- marking ----

    pub fn is_marking(&self) -> bool {
        self.marking
    }

    pub fn set_marking(&mut self, enabled: bool) {
        self.marking = enabled;
    }

    pub fn toggle_marking(&mut self) -> bool {
        self.marking = !self.marking;
        self.marking
    }

    pub fn cursor_hint(&self) -> CursorHint {
        self.interaction.cursor_hint(self.marking)
    }

    // ---- markers ----

    pub fn markers(&self) -> &MarkerStore {
        &self.markers
    }

    pub fn markers_mut(&mut self) -> &mut MarkerStore {
        &mut self.markers
    }

    /// Markers of the map on display.
    pub fn current_markers(&self) -> Vec<&Marker> {
        match self.map_id() {
            Some(id) => self.markers.for_map(id).collect(),
            None => Vec::new(),
        }
    }

    /// "Clear all": removes the markers of the map on display.
    pub fn clear_markers(&mut self) -> usize {
        let Some(id) = self.current.as_ref().map(|c| c.id.clone()) else {
            return 0;
        };
        self.markers.clear_map(&id)
    }

    // ---- robot ----

    pub fn robot_pose(&self) -> Option<RobotPose> {
        self.robot_pose
    }

    pub fn robot_marker(&self) -> Option<RobotMarker> {
        let pose = self.robot_pose?;
        let current = self.current.as_ref()?;
        Some(RobotMarker {
            canvas: current
                .geometry
                .world_to_canvas(Point::new(pose.x, pose.y)),
            angle: pose.angle,
        })
    }

    /// The rendered map with markers and robot stamped on top.
    pub fn render_overlay(&self) -> Option<Raster> {
        let current = self.current.as_ref()?;
        let mut raster = current.raster.clone();
        for marker in self.markers.for_map(&current.id) {
            let color = if marker.selected {
                MARKER_SELECTED
            } else {
                MARKER
            };
            raster.stamp_cross(
                Point::new(marker.cell.x as f64, marker.cell.y as f64),
                color,
            );
        }
        if let Some(robot) = self.robot_marker() {
            raster.stamp_robot(robot.canvas, robot.angle);
        }
        Some(raster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map_format::{encode_hex, MapHeader};
    use crate::map_interaction::RoomLabel;
    use crate::map_view::{GridCell, Rotation};
    use approx::assert_relative_eq;

    const GRID_4X4: [u8; 16] = [0, 0, 0, 0, 252, 252, 0, 0, 1, 1, 0, 0, 0, 0, 0, 0];

    fn engine_with_map() -> EngineState {
        let mut engine = EngineState::default();
        let header = MapHeader::for_grid(4, 4, 1.0, (0.0, 0.0));
        engine
            .load_map_hex(MapId::new("1"), &encode_hex(&header, &GRID_4X4))
            .unwrap();
        engine
    }

    fn click_at(engine: &mut EngineState, p: Point, t: u64) -> Option<Click> {
        engine.on_pointer_down(PointerEvent {
            position: p,
            timestamp_ms: t,
        });
        engine.on_pointer_up(PointerEvent {
            position: p,
            timestamp_ms: t,
        })
    }

    fn screen_of(engine: &EngineState, x: i32, y: i32) -> Point {
        let content = engine.current().unwrap().geometry.content_size();
        engine.view().grid_to_screen(GridCell::new(x, y), content)
    }

    #[test]
    fn test_end_to_end_click_on_wall() {
        let mut engine = engine_with_map();
        // 800x600 container: fitted scale clamps to 5, canvas centred.
        assert_relative_eq!(engine.view().scale, 5.0);
        assert_relative_eq!(engine.view().pan.x, 390.0);
        assert_relative_eq!(engine.view().pan.y, 290.0);

        let p = screen_of(&engine, 0, 1);
        let click = click_at(&mut engine, p, 1).unwrap();
        assert_eq!(click.selected.cell, GridCell::new(0, 1));
        assert_eq!(click.selected.label, RoomLabel::Wall);
        assert_eq!(click.selected.world_x, "0.00");
        assert_eq!(click.selected.world_y, "2.00");
        assert!(click.marker.is_none());
        assert_eq!(engine.selected_point(), Some(&click.selected));
    }

    #[test]
    fn test_click_outside_grid_is_ignored() {
        let mut engine = engine_with_map();
        assert!(click_at(&mut engine, Point::new(5.0, 5.0), 1).is_none());
        assert!(engine.selected_point().is_none());
    }

    #[test]
    fn test_drag_does_not_click() {
        let mut engine = engine_with_map();
        let p = screen_of(&engine, 1, 1);
        let pan_before = engine.view().pan;

        engine.on_pointer_down(PointerEvent { position: p, timestamp_ms: 1 });
        let moved = p + Point::new(30.0, 0.0);
        assert!(engine.on_pointer_move(PointerEvent { position: moved, timestamp_ms: 2 }));
        assert!(engine
            .on_pointer_up(PointerEvent { position: moved, timestamp_ms: 3 })
            .is_none());
        assert_relative_eq!(engine.view().pan.x, pan_before.x + 30.0);
    }

    #[test]
    fn test_marking_mode_adds_deduplicated_markers() {
        let config = EngineConfig {
            container_width: 400.0,
            container_height: 400.0,
            ..Default::default()
        };
        let mut engine = EngineState::new(config);
        let header = MapHeader::for_grid(40, 40, 0.05, (0.0, 0.0));
        engine
            .load_map_hex(MapId::new("9"), &encode_hex(&header, &[0u8; 1600]))
            .unwrap();
        engine.set_marking(true);
        assert_eq!(engine.cursor_hint(), CursorHint::Crosshair);

        let a = screen_of(&engine, 10, 10);
        let near = screen_of(&engine, 13, 12);
        let far = screen_of(&engine, 20, 10);
        assert!(click_at(&mut engine, a, 100).unwrap().marker.is_some());
        assert!(click_at(&mut engine, near, 101).unwrap().marker.is_none());
        assert!(click_at(&mut engine, far, 102).unwrap().marker.is_some());

        let labels: Vec<&str> = engine
            .current_markers()
            .iter()
            .map(|m| m.label.as_str())
            .collect();
        assert_eq!(labels, vec!["1", "2"]);

        assert_eq!(engine.clear_markers(), 2);
        assert!(engine.current_markers().is_empty());
    }

    #[test]
    fn test_invalid_map_keeps_previous() {
        let mut engine = engine_with_map();
        let bad = MapHeader::for_grid(0, 4, 1.0, (0.0, 0.0));
        assert!(engine
            .load_map_hex(MapId::new("2"), &hex::encode(bad.to_bytes()))
            .is_err());
        assert_eq!(engine.map_id(), Some(&MapId::new("1")));
    }

    #[test]
    fn test_reload_mid_drag_keeps_transform() {
        let mut engine = engine_with_map();
        engine.on_pointer_down(PointerEvent::new(100.0, 100.0, 1));
        engine.on_pointer_move(PointerEvent::new(160.0, 130.0, 2));
        let during = *engine.view();

        let header = MapHeader::for_grid(8, 2, 0.5, (0.0, 0.0));
        engine
            .load_map_hex(MapId::new("3"), &encode_hex(&header, &[1u8; 16]))
            .unwrap();
        assert_eq!(*engine.view(), during);
        assert_eq!(engine.cursor_hint(), CursorHint::Grabbing);

        engine.on_pointer_up(PointerEvent::new(160.0, 130.0, 3));
        engine.fit_to_container();
        assert_relative_eq!(engine.view().scale, 5.0);
    }

    #[test]
    fn test_wheel_rotate_reset() {
        let mut engine = engine_with_map();
        let center = Point::new(400.0, 300.0);
        assert!(engine.on_wheel(WheelEvent { position: center, delta_y: 1.0 }));
        assert_eq!(engine.zoom_percent(), 490);

        engine.rotate();
        assert_eq!(engine.view().rotation, Rotation::Deg90);
        assert_eq!(engine.zoom_percent(), 490);
        let rect = engine.canvas_rect().unwrap();
        assert_relative_eq!(rect.center().x, 400.0, epsilon = 1e-9);
        assert_relative_eq!(rect.center().y, 300.0, epsilon = 1e-9);

        engine.reset_view();
        assert_eq!(engine.view().rotation, Rotation::Deg0);
        assert_eq!(engine.zoom_percent(), 500);
    }

    #[test]
    fn test_robot_overlay() {
        let mut engine = engine_with_map();
        assert!(engine.robot_marker().is_none());
        engine.on_tick(Some(RobotPose { x: 1.0, y: 1.0, angle: 45.0 }));
        engine.on_tick(None);

        let robot = engine.robot_marker().unwrap();
        assert_relative_eq!(robot.canvas.x, 1.0);
        assert_relative_eq!(robot.canvas.y, 3.0);
        assert_relative_eq!(robot.angle, 45.0);

        let overlay = engine.render_overlay().unwrap();
        assert_eq!(overlay.pixel(1, 3), Some(map_raster::ROBOT));
    }

    #[test]
    fn test_overlay_marker_colors() {
        let mut engine = engine_with_map();
        engine.set_marking(true);
        let target = screen_of(&engine, 2, 2);
        let click = click_at(&mut engine, target, 5).unwrap();
        let id = click.marker.unwrap();

        let overlay = engine.render_overlay().unwrap();
        assert_eq!(overlay.pixel(2, 2), Some(MARKER));

        engine.markers_mut().toggle_selected(id);
        let overlay = engine.render_overlay().unwrap();
        assert_eq!(overlay.pixel(2, 2), Some(MARKER_SELECTED));
    }
}
