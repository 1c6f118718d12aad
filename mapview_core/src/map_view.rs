//! View transform: pan, zoom and quarter-turn rotation.
//!
//! # Coordinate spaces
//!
//! ```text
//! screen  (container px) --(- pan, / scale)--> rotated content px
//!                         --(rotation)-------> grid cell (x, y)
//!                         --(resolution)-----> world meters
//! ```
//!
//! `pan` is the top-left corner of the rotated, scaled canvas inside the
//! host container. The canvas therefore occupies
//! `[pan, pan + effective_size * scale]` where `effective_size` is the map
//! size with width and height swapped at 90° and 270°.

use crate::config::EngineConfig;
use crate::map_format::DecodedMap;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// A screen-space point or offset in px.
pub type Point = Vector2<f64>;

/// A width/height pair.
pub type Size = Vector2<f64>;

/// Integer cell coordinates in the decoded grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCell {
    pub x: i32,
    pub y: i32,
}

impl GridCell {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in screen px.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenRect {
    pub origin: Point,
    pub size: Size,
}

impl ScreenRect {
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.origin.x
            && point.y >= self.origin.y
            && point.x < self.origin.x + self.size.x
            && point.y < self.origin.y + self.size.y
    }

    pub fn center(&self) -> Point {
        self.origin + self.size / 2.0
    }
}

/// Canvas rotation, clockwise, in quarter turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Self::Deg0 => 0,
            Self::Deg90 => 90,
            Self::Deg180 => 180,
            Self::Deg270 => 270,
        }
    }

    /// Snaps any angle to the nearest lower quarter turn.
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees.rem_euclid(360) / 90 {
            0 => Self::Deg0,
            1 => Self::Deg90,
            2 => Self::Deg180,
            _ => Self::Deg270,
        }
    }

    /// The next quarter turn clockwise.
    pub fn next(self) -> Self {
        Self::from_degrees(self.degrees() as i32 + 90)
    }

    pub fn swaps_axes(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

/// Wheel direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    In,
    Out,
}

impl ZoomDirection {
    /// Scrolling up (negative delta) zooms in.
    pub fn from_wheel_delta(delta_y: f64) -> Self {
        if delta_y < 0.0 {
            Self::In
        } else {
            Self::Out
        }
    }
}

/// Scale bounds and steps used by the transform operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewLimits {
    pub min_scale: f64,
    pub max_scale: f64,
    pub zoom_step: f64,
    pub fit_margin: f64,
}

impl Default for ViewLimits {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for ViewLimits {
    fn from(config: &EngineConfig) -> Self {
        Self {
            min_scale: config.min_scale,
            max_scale: config.max_scale,
            zoom_step: config.zoom_step,
            fit_margin: config.fit_margin,
        }
    }
}

impl ViewLimits {
    fn clamp(&self, scale: f64) -> f64 {
        scale.clamp(self.min_scale, self.max_scale)
    }
}

/// Scale, pan and rotation of one view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewTransform {
    pub scale: f64,
    pub pan: Point,
    pub rotation: Rotation,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            pan: Point::zeros(),
            rotation: Rotation::Deg0,
        }
    }
}

impl ViewTransform {
    /// Content size after rotation.
    pub fn effective_size(&self, content: Size) -> Size {
        if self.rotation.swaps_axes() {
            Size::new(content.y, content.x)
        } else {
            content
        }
    }

    /// Where the rotated, scaled canvas sits on screen.
    pub fn canvas_rect(&self, content: Size) -> ScreenRect {
        ScreenRect {
            origin: self.pan,
            size: self.effective_size(content) * self.scale,
        }
    }

    pub fn zoom_percent(&self) -> u32 {
        (self.scale * 100.0).round() as u32
    }

    /// One wheel tick at `cursor`, keeping the content under it fixed.
    ///
    /// Returns `false` if the scale was already at its bound.
    pub fn zoom_at(&mut self, cursor: Point, direction: ZoomDirection, limits: &ViewLimits) -> bool {
        let delta = match direction {
            ZoomDirection::In => limits.zoom_step,
            ZoomDirection::Out => -limits.zoom_step,
        };
        let old = self.scale;
        let new = limits.clamp(old + delta);
        if new == old {
            return false;
        }

        let k = new / old;
        let c = cursor - self.pan;
        self.pan += c - c * k;
        self.scale = new;
        true
    }

    /// Scales the content to fill `fit_margin` of the container and centers it.
    pub fn fit_to_container(&mut self, container: Size, content: Size, limits: &ViewLimits) {
        let effective = self.effective_size(content);
        if effective.x <= 0.0 || effective.y <= 0.0 {
            return;
        }
        let scale = f64::min(
            limits.fit_margin * container.x / effective.x,
            limits.fit_margin * container.y / effective.y,
        );
        self.scale = limits.clamp(scale);
        self.center_in(container, content);
    }

    /// Back to scale 1, no pan, no rotation, then fit.
    pub fn reset(&mut self, container: Size, content: Size, limits: &ViewLimits) {
        *self = Self::default();
        self.fit_to_container(container, content, limits);
    }

    /// Quarter turn clockwise, re-centred at the current scale.
    pub fn rotate(&mut self, container: Size, content: Size) {
        self.rotation = self.rotation.next();
        self.center_in(container, content);
    }

    fn center_in(&mut self, container: Size, content: Size) {
        self.pan = (container - self.effective_size(content) * self.scale) / 2.0;
    }

    /// Screen point to unscaled offset inside the rotated canvas.
    pub fn screen_to_content(&self, point: Point) -> Point {
        (point - self.pan) / self.scale
    }

    /// Screen point to grid cell, without a bounds check.
    pub fn screen_to_cell(&self, point: Point, content: Size) -> GridCell {
        let rel = self.screen_to_content(point);
        let (w, h) = (content.x, content.y);
        let (x, y) = match self.rotation {
            Rotation::Deg0 => (rel.x, rel.y),
            Rotation::Deg90 => (rel.y, w - rel.x),
            Rotation::Deg180 => (w - rel.x, h - rel.y),
            Rotation::Deg270 => (h - rel.y, rel.x),
        };
        GridCell::new(x.floor() as i32, y.floor() as i32)
    }

    /// Screen point to grid cell, `None` outside the grid.
    pub fn screen_to_grid(&self, point: Point, content: Size) -> Option<GridCell> {
        let cell = self.screen_to_cell(point, content);
        let inside = cell.x >= 0
            && cell.y >= 0
            && (cell.x as f64) < content.x
            && (cell.y as f64) < content.y;
        inside.then_some(cell)
    }

    /// Screen position of a cell's center; inverse of [`Self::screen_to_cell`].
    pub fn grid_to_screen(&self, cell: GridCell, content: Size) -> Point {
        let (w, h) = (content.x, content.y);
        let (x, y) = (cell.x as f64 + 0.5, cell.y as f64 + 0.5);
        let rel = match self.rotation {
            Rotation::Deg0 => Point::new(x, y),
            Rotation::Deg90 => Point::new(w - y, x),
            Rotation::Deg180 => Point::new(w - x, h - y),
            Rotation::Deg270 => Point::new(y, h - x),
        };
        self.pan + rel * self.scale
    }
}

/// Grid/world geometry of a decoded map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapGeometry {
    pub width: usize,
    pub height: usize,
    pub resolution: f64,
    pub origin: Point,
}

impl From<&DecodedMap> for MapGeometry {
    fn from(map: &DecodedMap) -> Self {
        let (ox, oy) = map.origin();
        Self {
            width: map.width(),
            height: map.height(),
            resolution: map.resolution(),
            origin: Point::new(ox, oy),
        }
    }
}

impl MapGeometry {
    /// Unrotated canvas size in px (one px per cell).
    pub fn content_size(&self) -> Size {
        Size::new(self.width as f64, self.height as f64)
    }

    pub fn contains(&self, cell: GridCell) -> bool {
        cell.x >= 0
            && cell.y >= 0
            && (cell.x as usize) < self.width
            && (cell.y as usize) < self.height
    }

    /// World meters of a cell, with the Y flip of the raster.
    pub fn grid_to_world(&self, cell: GridCell) -> Point {
        Point::new(
            self.origin.x + cell.x as f64 * self.resolution,
            self.origin.y + (self.height as f64 - cell.y as f64 - 1.0) * self.resolution,
        )
    }

    /// Inverse of [`Self::grid_to_world`]. Not bounds checked.
    pub fn world_to_grid(&self, world: Point) -> GridCell {
        let gx = ((world.x - self.origin.x) / self.resolution).round();
        let gy = ((world.y - self.origin.y) / self.resolution).round();
        GridCell::new(gx as i32, (self.height as f64 - 1.0 - gy) as i32)
    }

    /// Unrotated canvas px of a world position (robot overlay anchor).
    pub fn world_to_canvas(&self, world: Point) -> Point {
        Point::new(
            (world.x - self.origin.x) / self.resolution,
            self.height as f64 - (world.y - self.origin.y) / self.resolution,
        )
    }
}
