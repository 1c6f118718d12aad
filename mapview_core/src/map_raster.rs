//! Rasterizer: decoded grid to an RGBA pixel buffer.
//!
//! The cell layer is drawn first with rows flipped (grid row 0 is the
//! bottom of the world). The meter grid and the origin mark are then
//! blended over the same buffer.

use crate::map_format::DecodedMap;
use crate::map_palette::Rgb;
use crate::map_view::Point;
use serde::{Deserialize, Serialize};

/// Fill for pixels the grid does not cover.
pub const CANVAS_BACKGROUND: Rgb = Rgb::from_hex(0xF0F0F0);

pub const GRID_LINE: Rgb = Rgb::new(0, 0, 0);
pub const GRID_ALPHA: f64 = 0.2;
pub const ORIGIN_MARK: Rgb = Rgb::new(255, 0, 0);
pub const MARKER: Rgb = Rgb::new(0, 0, 0);
pub const MARKER_SELECTED: Rgb = Rgb::new(0, 0, 255);
pub const ROBOT: Rgb = Rgb::new(0, 0, 0);

const ORIGIN_ARM: i64 = 5;
const ORIGIN_THICKNESS: i64 = 2;
const LABEL_EVERY_METERS: i64 = 5;
const MARKER_ARM: i64 = 3;
const ROBOT_HALF: i64 = 2;
const ROBOT_HEADING_LEN: f64 = 8.0;

/// Which edge a meter label is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelAxis {
    /// Label of a vertical line, anchored at the top edge
    X,
    /// Label of a horizontal line, anchored at the left edge
    Y,
}

/// A `"{n}m"` label for the host to draw as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridLabel {
    pub text: String,
    pub meters: i64,
    pub axis: LabelAxis,
    /// Anchor pixel in the unrotated canvas
    pub x: i64,
    pub y: i64,
}

/// RGBA8 pixel buffer, row-major, top row first.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
    pub labels: Vec<GridLabel>,
}

impl Raster {
    pub fn new(width: usize, height: usize, fill: Rgb) -> Self {
        let pixels = fill.to_rgba().repeat(width * height);
        Self {
            width,
            height,
            pixels,
            labels: Vec::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn as_rgba(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_rgba(self) -> Vec<u8> {
        self.pixels
    }

    fn offset(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return None;
        }
        Some((y as usize * self.width + x as usize) * 4)
    }

    pub fn pixel(&self, x: i64, y: i64) -> Option<Rgb> {
        self.offset(x, y)
            .map(|i| Rgb::new(self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]))
    }

    /// Writes one pixel; out-of-range coordinates are ignored.
    pub fn set_pixel(&mut self, x: i64, y: i64, color: Rgb) {
        if let Some(i) = self.offset(x, y) {
            self.pixels[i..i + 4].copy_from_slice(&color.to_rgba());
        }
    }

    /// Source-over blend of `color` at `alpha` onto one pixel.
    pub fn blend_pixel(&mut self, x: i64, y: i64, color: Rgb, alpha: f64) {
        let Some(i) = self.offset(x, y) else {
            return;
        };
        let mix = |dst: u8, src: u8| -> u8 {
            (dst as f64 * (1.0 - alpha) + src as f64 * alpha).round() as u8
        };
        self.pixels[i] = mix(self.pixels[i], color.r);
        self.pixels[i + 1] = mix(self.pixels[i + 1], color.g);
        self.pixels[i + 2] = mix(self.pixels[i + 2], color.b);
    }

    /// Fills the inclusive rectangle `[x0, x1] x [y0, y1]`, clipped.
    pub fn fill_rect(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgb) {
        for y in y0..=y1 {
            for x in x0..=x1 {
                self.set_pixel(x, y, color);
            }
        }
    }

    /// Draws an `x` shaped marker centred on `center`.
    pub fn stamp_cross(&mut self, center: Point, color: Rgb) {
        let (cx, cy) = (center.x.round() as i64, center.y.round() as i64);
        for d in -MARKER_ARM..=MARKER_ARM {
            self.set_pixel(cx + d, cy + d, color);
            self.set_pixel(cx + d, cy - d, color);
        }
    }

    /// Draws the robot as a small square with a heading tick.
    ///
    /// `angle` is in degrees, clockwise from canvas-up.
    pub fn stamp_robot(&mut self, center: Point, angle: f64) {
        let (cx, cy) = (center.x.round() as i64, center.y.round() as i64);
        self.fill_rect(
            cx - ROBOT_HALF,
            cy - ROBOT_HALF,
            cx + ROBOT_HALF,
            cy + ROBOT_HALF,
            ROBOT,
        );
        let (sin, cos) = angle.to_radians().sin_cos();
        let steps = ROBOT_HEADING_LEN as i64;
        for step in 0..=steps {
            let t = step as f64;
            let x = center.x + sin * t;
            let y = center.y - cos * t;
            self.set_pixel(x.round() as i64, y.round() as i64, ROBOT);
        }
    }
}

/// Cell layer plus meter grid and origin mark.
pub fn render(map: &DecodedMap) -> Raster {
    let mut raster = rasterize_cells(map);
    draw_grid_overlay(&mut raster, map);
    raster
}

/// Cell colors only, rows flipped.
pub fn rasterize_cells(map: &DecodedMap) -> Raster {
    let (width, height) = (map.width(), map.height());
    let mut raster = Raster::new(width, height, CANVAS_BACKGROUND);
    for (index, &value) in map.grid.iter().enumerate().take(width * height) {
        let row = index / width;
        let col = index % width;
        let out_row = height - 1 - row;
        raster.set_pixel(col as i64, out_row as i64, map.color_of(value));
    }
    raster
}

/// Meter lines, labels and the origin plus, over the existing pixels.
pub fn draw_grid_overlay(raster: &mut Raster, map: &DecodedMap) {
    let (width, height) = (map.width() as i64, map.height() as i64);
    let res = map.resolution();
    let (ox, oy) = map.origin();

    let first_x = ox.ceil() as i64;
    let last_x = (ox + width as f64 * res).floor() as i64;
    for meters in first_x..=last_x {
        let x = ((meters as f64 - ox) / res).round() as i64;
        for y in 0..height {
            raster.blend_pixel(x, y, GRID_LINE, GRID_ALPHA);
        }
        if meters % LABEL_EVERY_METERS == 0 {
            raster.labels.push(GridLabel {
                text: format!("{}m", meters),
                meters,
                axis: LabelAxis::X,
                x,
                y: 0,
            });
        }
    }

    let first_y = oy.ceil() as i64;
    let last_y = (oy + height as f64 * res).floor() as i64;
    for meters in first_y..=last_y {
        let y = height
            .saturating_sub(((meters as f64 - oy) / res).round() as i64)
            .saturating_sub(1);
        for x in 0..width {
            raster.blend_pixel(x, y, GRID_LINE, GRID_ALPHA);
        }
        if meters % LABEL_EVERY_METERS == 0 {
            raster.labels.push(GridLabel {
                text: format!("{}m", meters),
                meters,
                axis: LabelAxis::Y,
                x: 0,
                y,
            });
        }
    }

    let origin_px = -ox / res;
    let origin_py = -oy / res;
    if origin_px >= 0.0 && origin_px < width as f64 && origin_py >= 0.0 && origin_py < height as f64
    {
        let cx = origin_px.round() as i64;
        let cy = (height as f64 - origin_py - 1.0).round() as i64;
        let half = ORIGIN_THICKNESS / 2;
        raster.fill_rect(
            cx - ORIGIN_ARM,
            cy - half,
            cx + ORIGIN_ARM,
            cy + half - 1,
            ORIGIN_MARK,
        );
        raster.fill_rect(
            cx - half,
            cy - ORIGIN_ARM,
            cx + half - 1,
            cy + ORIGIN_ARM,
            ORIGIN_MARK,
        );
    }
}
