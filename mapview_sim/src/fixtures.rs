//! Map payloads for the simulated robot.
//!
//! A generated floor plan has a wall border, a cross of interior walls with
//! door gaps, four rooms and a couple of invalid-position patches, which is
//! enough to exercise every color class and room label. Damaged variants
//! reproduce what a flaky link delivers.

use mapview_core::map_format::{self, HEADER_LEN};
use mapview_core::MapHeader;
use rand::Rng;

pub const WALL: u8 = 252;
pub const INVALID: u8 = 253;
pub const UNKNOWN: u8 = 254;

/// Room values of the four quadrants: bottom-left, bottom-right,
/// top-left, top-right.
pub const ROOMS: [u8; 4] = [0x01, 0x05, 0x09, 0x0D];

const DOOR_WIDTH: i32 = 3;
const PATCH_SIZE: i32 = 3;

/// A map as the robot stores it: header plus raw grid.
#[derive(Debug, Clone, PartialEq)]
pub struct MapFixture {
    pub header: MapHeader,
    pub grid: Vec<u8>,
}

impl MapFixture {
    /// The 4x4, 1 m/cell map used for click inspection checks.
    ///
    /// Row 1 starts with two walls and row 2 with two cells of room 1.
    pub fn four_by_four() -> Self {
        Self {
            header: MapHeader::for_grid(4, 4, 1.0, (0.0, 0.0)),
            grid: vec![0, 0, 0, 0, WALL, WALL, 0, 0, 1, 1, 0, 0, 0, 0, 0, 0],
        }
    }

    /// Generates a four-room floor plan. At least 16x16 cells.
    pub fn floor_plan<R: Rng>(
        width: i32,
        height: i32,
        resolution: f32,
        origin: (f32, f32),
        rng: &mut R,
    ) -> Self {
        let (w, h) = (width.max(16), height.max(16));
        let (mid_x, mid_y) = (w / 2, h / 2);

        let lower_door = rng.gen_range(2..mid_y - DOOR_WIDTH - 1);
        let upper_door = rng.gen_range(mid_y + 2..h - DOOR_WIDTH - 2);
        let left_door = rng.gen_range(2..mid_x - DOOR_WIDTH - 1);
        let right_door = rng.gen_range(mid_x + 2..w - DOOR_WIDTH - 2);
        let in_door = |at: i32, start: i32| (start..start + DOOR_WIDTH).contains(&at);

        let mut grid = Vec::with_capacity((w * h) as usize);
        for y in 0..h {
            for x in 0..w {
                let border = x == 0 || y == 0 || x == w - 1 || y == h - 1;
                let vertical = x == mid_x && !in_door(y, lower_door) && !in_door(y, upper_door);
                let horizontal = y == mid_y && !in_door(x, left_door) && !in_door(x, right_door);
                let value = if border || vertical || horizontal {
                    WALL
                } else {
                    let quadrant = (x >= mid_x) as usize + 2 * (y >= mid_y) as usize;
                    ROOMS[quadrant]
                };
                grid.push(value);
            }
        }

        // One patch per half so neither hides the other.
        let halves = [
            (INVALID, 1..mid_x - PATCH_SIZE),
            (UNKNOWN, mid_x + 1..w - PATCH_SIZE - 1),
        ];
        for (value, xs) in halves {
            let px = rng.gen_range(xs);
            let py = rng.gen_range(1..h - PATCH_SIZE - 1);
            for y in py..py + PATCH_SIZE {
                for x in px..px + PATCH_SIZE {
                    grid[(y * w + x) as usize] = value;
                }
            }
        }

        Self {
            header: MapHeader::for_grid(w, h, resolution, origin),
            grid,
        }
    }

    pub fn width(&self) -> i32 {
        self.header.width
    }

    pub fn height(&self) -> i32 {
        self.header.height
    }

    pub fn value_at(&self, x: i32, y: i32) -> Option<u8> {
        if x < 0 || y < 0 || x >= self.width() || y >= self.height() {
            return None;
        }
        self.grid.get((y * self.width() + x) as usize).copied()
    }

    pub fn bytes(&self) -> Vec<u8> {
        map_format::encode_bytes(&self.header, &self.grid)
    }

    /// Payload as served by `GET /maps/{id}`.
    pub fn hex(&self) -> String {
        hex::encode(self.bytes())
    }

    /// Payload whose compressed block is cut to `fraction` of its length.
    pub fn truncated_hex(&self, fraction: f64) -> String {
        let bytes = self.bytes();
        let block_len = bytes.len() - HEADER_LEN;
        let keep = (block_len as f64 * fraction.clamp(0.0, 1.0)).floor() as usize;
        hex::encode(&bytes[..HEADER_LEN + keep])
    }

    /// Payload whose first back-reference points before the output start.
    ///
    /// `None` if the block has no back-reference at all.
    pub fn corrupted_hex(&self) -> Option<String> {
        let mut bytes = self.bytes();
        let at = HEADER_LEN + first_offset_position(&bytes[HEADER_LEN..])?;
        bytes[at..at + 2].copy_from_slice(&u16::MAX.to_le_bytes());
        Some(hex::encode(bytes))
    }
}

/// Position of the first sequence's match offset within a block.
fn first_offset_position(block: &[u8]) -> Option<usize> {
    let token = *block.first()?;
    let mut literals = (token >> 4) as usize;
    let mut pos = 1;
    if literals == 15 {
        loop {
            let byte = *block.get(pos)?;
            pos += 1;
            literals += byte as usize;
            if byte != u8::MAX {
                break;
            }
        }
    }
    pos += literals;
    (pos + 2 <= block.len()).then_some(pos)
}
