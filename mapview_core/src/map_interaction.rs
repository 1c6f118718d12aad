//! Pointer gesture recognition: drag-to-pan versus click-to-select.
//!
//! ```text
//!          pointer_down                 pointer_up (moved < threshold)
//!   Idle ---------------> Dragging ----------------------------------> Idle + click
//!                          |  ^    pointer_up (moved >= threshold)
//!                          |  |  -----------------------------------> Idle (pan only)
//!                          +--+ pointer_move: pan = pointer - offset
//! ```

use crate::map_format::DecodedMap;
use crate::map_markers::format_meters;
use crate::map_view::{GridCell, MapGeometry, Point, ViewTransform};
use serde::{Deserialize, Serialize};

/// A raw pointer event forwarded by the host, in container px.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub position: Point,
    /// Host clock in ms since the Unix epoch
    pub timestamp_ms: u64,
}

impl PointerEvent {
    pub fn new(x: f64, y: f64, timestamp_ms: u64) -> Self {
        Self {
            position: Point::new(x, y),
            timestamp_ms,
        }
    }
}

/// A wheel tick forwarded by the host.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelEvent {
    pub position: Point,
    pub delta_y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        /// `pointer - pan` at press time
        offset: Point,
        /// Raw press position
        origin: Point,
    },
}

/// What a pointer release amounted to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Release {
    /// No press was in progress
    Ignored,
    /// The pointer travelled; the view was panned
    Pan,
    /// Press and release within the click threshold
    Click(Point),
}

/// Semantic label of a grid value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomLabel {
    InvalidPosition,
    Wall,
    Room(u8),
}

impl RoomLabel {
    pub fn of(value: u8) -> Self {
        match value {
            253 | 254 => Self::InvalidPosition,
            252 => Self::Wall,
            v => Self::Room(v),
        }
    }
}

impl std::fmt::Display for RoomLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPosition => f.write_str("Invalid Position"),
            Self::Wall => f.write_str("Wall"),
            Self::Room(v) => write!(f, "Room {}", v),
        }
    }
}

/// Inspection result of a click on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedPoint {
    pub cell: GridCell,
    pub index: usize,
    pub value: u8,
    pub label: RoomLabel,
    pub world_x: String,
    pub world_y: String,
}

impl SelectedPoint {
    /// The two readout lines shown next to the map.
    pub fn readout(&self) -> [String; 2] {
        [
            format!("Coordinates: ({}, {}) m", self.world_x, self.world_y),
            format!("room_id: {}", self.label),
        ]
    }
}

/// Pointer cursor the host should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorHint {
    Grab,
    Grabbing,
    Crosshair,
}

/// Inspects the grid cell under a screen point.
///
/// `None` for points outside the grid.
pub fn inspect(map: &DecodedMap, view: &ViewTransform, point: Point) -> Option<SelectedPoint> {
    let geometry = MapGeometry::from(map);
    let cell = view.screen_to_grid(point, geometry.content_size())?;
    let index = map.index(cell.x, cell.y)?;
    let value = map.grid[index];
    let world = geometry.grid_to_world(cell);
    Some(SelectedPoint {
        cell,
        index,
        value,
        label: RoomLabel::of(value),
        world_x: format_meters(world.x),
        world_y: format_meters(world.y),
    })
}

/// Two-state drag/click recognizer.
#[derive(Debug, Clone)]
pub struct InteractionController {
    state: DragState,
    click_threshold: f64,
}

impl InteractionController {
    pub fn new(click_threshold: f64) -> Self {
        Self {
            state: DragState::Idle,
            click_threshold,
        }
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    pub fn pointer_down(&mut self, position: Point, view: &ViewTransform) {
        self.state = DragState::Dragging {
            offset: position - view.pan,
            origin: position,
        };
    }

    /// Pans while dragging. Returns whether the view changed.
    pub fn pointer_move(&mut self, position: Point, view: &mut ViewTransform) -> bool {
        match self.state {
            DragState::Dragging { offset, .. } => {
                view.pan = position - offset;
                true
            }
            DragState::Idle => false,
        }
    }

    pub fn pointer_up(&mut self, position: Point) -> Release {
        let DragState::Dragging { origin, .. } = std::mem::take(&mut self.state) else {
            return Release::Ignored;
        };
        let moved = position - origin;
        if moved.x.abs() < self.click_threshold && moved.y.abs() < self.click_threshold {
            Release::Click(position)
        } else {
            tracing::trace!("Drag of {:.1} px, no click", moved.norm());
            Release::Pan
        }
    }

    /// Drops an in-progress drag without a click.
    pub fn cancel(&mut self) {
        self.state = DragState::Idle;
    }

    pub fn cursor_hint(&self, marking: bool) -> CursorHint {
        if self.is_dragging() {
            CursorHint::Grabbing
        } else if marking {
            CursorHint::Crosshair
        } else {
            CursorHint::Grab
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map_format::{decode_bytes, encode_bytes, MapHeader};
    use approx::assert_relative_eq;

    fn view() -> ViewTransform {
        ViewTransform {
            scale: 2.0,
            pan: Point::new(10.0, 20.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_room_labels() {
        assert_eq!(RoomLabel::of(253).to_string(), "Invalid Position");
        assert_eq!(RoomLabel::of(254).to_string(), "Invalid Position");
        assert_eq!(RoomLabel::of(252).to_string(), "Wall");
        assert_eq!(RoomLabel::of(0).to_string(), "Room 0");
        assert_eq!(RoomLabel::of(17).to_string(), "Room 17");
    }

    #[test]
    fn test_drag_pans() {
        let mut ctl = InteractionController::new(5.0);
        let mut view = view();
        ctl.pointer_down(Point::new(50.0, 50.0), &view);
        assert!(ctl.is_dragging());

        assert!(ctl.pointer_move(Point::new(80.0, 45.0), &mut view));
        assert_relative_eq!(view.pan.x, 40.0);
        assert_relative_eq!(view.pan.y, 15.0);
        assert_relative_eq!(view.scale, 2.0);

        assert_eq!(ctl.pointer_up(Point::new(80.0, 45.0)), Release::Pan);
        assert!(!ctl.is_dragging());
    }

    #[test]
    fn test_click_threshold_per_axis() {
        let mut ctl = InteractionController::new(5.0);
        let view = view();

        ctl.pointer_down(Point::new(0.0, 0.0), &view);
        assert_eq!(
            ctl.pointer_up(Point::new(4.9, -4.9)),
            Release::Click(Point::new(4.9, -4.9))
        );

        ctl.pointer_down(Point::new(0.0, 0.0), &view);
        assert_eq!(ctl.pointer_up(Point::new(5.0, 0.0)), Release::Pan);
    }

    #[test]
    fn test_idle_events_ignored() {
        let mut ctl = InteractionController::new(5.0);
        let mut view = view();
        assert!(!ctl.pointer_move(Point::new(1.0, 1.0), &mut view));
        assert_eq!(view.pan, Point::new(10.0, 20.0));
        assert_eq!(ctl.pointer_up(Point::new(1.0, 1.0)), Release::Ignored);
    }

    #[test]
    fn test_cursor_hint() {
        let mut ctl = InteractionController::new(5.0);
        assert_eq!(ctl.cursor_hint(false), CursorHint::Grab);
        assert_eq!(ctl.cursor_hint(true), CursorHint::Crosshair);
        ctl.pointer_down(Point::zeros(), &view());
        assert_eq!(ctl.cursor_hint(true), CursorHint::Grabbing);
        ctl.cancel();
        assert_eq!(ctl.cursor_hint(false), CursorHint::Grab);
    }

    #[test]
    fn test_inspect() {
        let header = MapHeader::for_grid(3, 2, 0.5, (-1.0, 2.0));
        let map = decode_bytes(&encode_bytes(&header, &[1, 2, 3, 252, 253, 5])).unwrap();
        let view = ViewTransform::default();

        let point = inspect(&map, &view, Point::new(1.2, 1.7)).unwrap();
        assert_eq!(point.cell, GridCell::new(1, 1));
        assert_eq!(point.index, 4);
        assert_eq!(point.value, 253);
        assert_eq!(point.label, RoomLabel::InvalidPosition);
        assert_eq!(point.world_x, "-0.50");
        assert_eq!(point.world_y, "2.00");
        assert_eq!(
            point.readout(),
            [
                "Coordinates: (-0.50, 2.00) m".to_string(),
                "room_id: Invalid Position".to_string()
            ]
        );

        assert!(inspect(&map, &view, Point::new(3.5, 0.5)).is_none());
    }
}
