//! Map wire format: 30-byte header followed by a compressed grid block.
//!
//! ```text
//! offset  size  field
//!      0     2  id              i16
//!      2     4  decoded_size    i32
//!      6     4  compressed_size i32
//!     10     4  width           i32
//!     14     4  height          i32
//!     18     4  resolution      f32  meters per cell
//!     22     4  origin_x        f32
//!     26     4  origin_y        f32
//!     30     *  payload         compressed grid
//! ```
//!
//! All fields are little-endian. The robot transmits the whole thing as a
//! hex string.

use crate::error::MapError;
use crate::map_codec::{self, DecodeStatus};
use crate::map_palette::{Palette, Rgb};
use serde::{Deserialize, Serialize};

pub const HEADER_LEN: usize = 30;

/// Coarsest accepted cell size, in meters. Keeps the meter grid overlay
/// proportional to the raster it is drawn on.
pub const MAX_RESOLUTION: f32 = 10.0;

/// Largest accepted distance of the map origin from the world origin.
pub const MAX_ORIGIN_METERS: f32 = 1.0e6;

/// Fixed header of a map payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapHeader {
    pub id: i16,
    pub decoded_size: i32,
    pub compressed_size: i32,
    pub width: i32,
    pub height: i32,
    pub resolution: f32,
    pub origin_x: f32,
    pub origin_y: f32,
}

fn read_i16(bytes: &[u8], at: usize) -> i16 {
    i16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_f32(bytes: &[u8], at: usize) -> f32 {
    f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

impl MapHeader {
    /// Header for a grid of `width x height` cells; sizes are filled in by
    /// [`encode_bytes`].
    pub fn for_grid(width: i32, height: i32, resolution: f32, origin: (f32, f32)) -> Self {
        Self {
            id: 0,
            decoded_size: width.saturating_mul(height),
            compressed_size: 0,
            width,
            height,
            resolution,
            origin_x: origin.0,
            origin_y: origin.1,
        }
    }

    /// Reads the header from the first 30 bytes. Does not validate.
    pub fn parse(bytes: &[u8]) -> Result<Self, MapError> {
        if bytes.len() < HEADER_LEN {
            return Err(MapError::HeaderTooShort { len: bytes.len() });
        }
        Ok(Self {
            id: read_i16(bytes, 0),
            decoded_size: read_i32(bytes, 2),
            compressed_size: read_i32(bytes, 6),
            width: read_i32(bytes, 10),
            height: read_i32(bytes, 14),
            resolution: read_f32(bytes, 18),
            origin_x: read_f32(bytes, 22),
            origin_y: read_f32(bytes, 26),
        })
    }

    /// Rejects headers the engine cannot lay out.
    ///
    /// `width * height == decoded_size` is trusted, not checked.
    pub fn validate(&self) -> Result<(), MapError> {
        if self.width <= 0 || self.height <= 0 {
            return Err(MapError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if self.decoded_size < 0 {
            return Err(MapError::InvalidDecodedSize(self.decoded_size));
        }
        if !self.resolution.is_finite()
            || self.resolution <= 0.0
            || self.resolution > MAX_RESOLUTION
        {
            return Err(MapError::InvalidResolution(self.resolution));
        }
        let in_range = |v: f32| v.is_finite() && v.abs() <= MAX_ORIGIN_METERS;
        if !in_range(self.origin_x) || !in_range(self.origin_y) {
            return Err(MapError::InvalidOrigin {
                x: self.origin_x,
                y: self.origin_y,
            });
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..2].copy_from_slice(&self.id.to_le_bytes());
        out[2..6].copy_from_slice(&self.decoded_size.to_le_bytes());
        out[6..10].copy_from_slice(&self.compressed_size.to_le_bytes());
        out[10..14].copy_from_slice(&self.width.to_le_bytes());
        out[14..18].copy_from_slice(&self.height.to_le_bytes());
        out[18..22].copy_from_slice(&self.resolution.to_le_bytes());
        out[22..26].copy_from_slice(&self.origin_x.to_le_bytes());
        out[26..30].copy_from_slice(&self.origin_y.to_le_bytes());
        out
    }
}

/// A decoded map, owned by the engine for the selected map.
///
/// `grid[y * width + x]` with row 0 at the bottom of the world.
#[derive(Debug, Clone)]
pub struct DecodedMap {
    pub header: MapHeader,
    pub grid: Vec<u8>,
    pub palette: Palette,

    /// How the payload decompressed; anything but `Complete` means the
    /// tail of `grid` is zero-filled.
    pub status: DecodeStatus,
}

impl DecodedMap {
    pub fn width(&self) -> usize {
        self.header.width as usize
    }

    pub fn height(&self) -> usize {
        self.header.height as usize
    }

    pub fn resolution(&self) -> f64 {
        self.header.resolution as f64
    }

    pub fn origin(&self) -> (f64, f64) {
        (self.header.origin_x as f64, self.header.origin_y as f64)
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width() && (y as usize) < self.height()
    }

    /// Grid index of cell `(x, y)` if it is inside the map.
    pub fn index(&self, x: i32, y: i32) -> Option<usize> {
        if !self.contains(x, y) {
            return None;
        }
        let index = y as usize * self.width() + x as usize;
        (index < self.grid.len()).then_some(index)
    }

    pub fn value_at(&self, x: i32, y: i32) -> Option<u8> {
        self.index(x, y).map(|i| self.grid[i])
    }

    pub fn color_of(&self, value: u8) -> Rgb {
        self.palette.color_of(value)
    }
}

/// Decodes a hex-encoded map payload. Whitespace is ignored.
pub fn decode(raw: &str) -> Result<DecodedMap, MapError> {
    let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = hex::decode(cleaned)?;
    decode_bytes(&bytes)
}

/// Decodes a binary map payload.
pub fn decode_bytes(bytes: &[u8]) -> Result<DecodedMap, MapError> {
    let header = MapHeader::parse(bytes)?;
    header.validate()?;

    let payload = &bytes[HEADER_LEN..];
    let decoded = map_codec::decompress(payload, header.decoded_size as usize);
    match decoded.status {
        DecodeStatus::Complete => {}
        DecodeStatus::Truncated => tracing::warn!(
            "Map {} truncated: {}/{} bytes decoded",
            header.id,
            decoded.written,
            header.decoded_size
        ),
        DecodeStatus::Corrupt { offset, position } => tracing::warn!(
            "Map {} corrupt: offset {} at output {}, keeping {} bytes",
            header.id,
            offset,
            position,
            decoded.written
        ),
    }

    let palette = Palette::seeded_from(&decoded.bytes);
    Ok(DecodedMap {
        header,
        grid: decoded.bytes,
        palette,
        status: decoded.status,
    })
}

/// Serializes a grid the way the robot does: header then compressed block.
pub fn encode_bytes(header: &MapHeader, grid: &[u8]) -> Vec<u8> {
    let block = map_codec::compress(grid);
    let header = MapHeader {
        decoded_size: grid.len() as i32,
        compressed_size: block.len() as i32,
        ..*header
    };
    let mut out = Vec::with_capacity(HEADER_LEN + block.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(&block);
    out
}

/// Hex form of [`encode_bytes`], as served by `GET /maps/{id}`.
pub fn encode_hex(header: &MapHeader, grid: &[u8]) -> String {
    hex::encode(encode_bytes(header, grid))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn four_by_four() -> (MapHeader, Vec<u8>) {
        let header = MapHeader::for_grid(4, 4, 1.0, (0.0, 0.0));
        let grid = vec![0, 0, 0, 0, 252, 252, 0, 0, 1, 1, 0, 0, 0, 0, 0, 0];
        (header, grid)
    }

    #[test]
    fn test_header_field_offsets() {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..2].copy_from_slice(&7i16.to_le_bytes());
        bytes[2..6].copy_from_slice(&12i32.to_le_bytes());
        bytes[10..14].copy_from_slice(&4i32.to_le_bytes());
        bytes[14..18].copy_from_slice(&3i32.to_le_bytes());
        bytes[18..22].copy_from_slice(&0.05f32.to_le_bytes());
        bytes[22..26].copy_from_slice(&(-1.5f32).to_le_bytes());
        bytes[26..30].copy_from_slice(&2.25f32.to_le_bytes());

        let header = MapHeader::parse(&bytes).unwrap();
        assert_eq!(header.id, 7);
        assert_eq!(header.decoded_size, 12);
        assert_eq!(header.width, 4);
        assert_eq!(header.height, 3);
        assert_eq!(header.resolution, 0.05);
        assert_eq!(header.origin_x, -1.5);
        assert_eq!(header.origin_y, 2.25);
        assert_eq!(header.to_bytes(), bytes);
    }

    #[test]
    fn test_decode_hex_roundtrip() {
        let (header, grid) = four_by_four();
        let raw = encode_hex(&header, &grid);
        let map = decode(&raw).unwrap();

        assert_eq!(map.status, DecodeStatus::Complete);
        assert_eq!(map.grid, grid);
        assert_eq!(map.width(), 4);
        assert_eq!(map.value_at(0, 1), Some(252));
        assert_eq!(map.value_at(4, 0), None);
        assert_eq!(map.value_at(0, -1), None);
    }

    #[test]
    fn test_decode_ignores_whitespace() {
        let (header, grid) = four_by_four();
        let raw = encode_hex(&header, &grid);
        let spaced: String = raw
            .as_bytes()
            .chunks(8)
            .map(|c| format!("{}\n ", String::from_utf8_lossy(c)))
            .collect();
        assert_eq!(decode(&spaced).unwrap().grid, grid);
    }

    #[test]
    fn test_rejects_invalid_headers() {
        assert!(matches!(decode("zz"), Err(MapError::InvalidHex(_))));
        assert_eq!(
            decode_bytes(&[0u8; 10]).unwrap_err(),
            MapError::HeaderTooShort { len: 10 }
        );

        let bad_dims = MapHeader::for_grid(-4, 4, 1.0, (0.0, 0.0));
        assert!(matches!(
            decode_bytes(&bad_dims.to_bytes()),
            Err(MapError::InvalidDimensions { width: -4, .. })
        ));

        let bad_res = MapHeader::for_grid(4, 4, 0.0, (0.0, 0.0));
        assert!(matches!(
            decode_bytes(&bad_res.to_bytes()),
            Err(MapError::InvalidResolution(_))
        ));

        let bad_size = MapHeader {
            decoded_size: -1,
            ..MapHeader::for_grid(4, 4, 1.0, (0.0, 0.0))
        };
        assert!(matches!(
            decode_bytes(&bad_size.to_bytes()),
            Err(MapError::InvalidDecodedSize(-1))
        ));
    }

    #[test]
    fn test_rejects_out_of_range_geometry() {
        let far_origin = MapHeader::for_grid(4, 4, 1.0, (0.0, f32::INFINITY));
        assert!(matches!(
            decode_bytes(&far_origin.to_bytes()),
            Err(MapError::InvalidOrigin { .. })
        ));
        let nan_origin = MapHeader::for_grid(4, 4, 1.0, (f32::NAN, 0.0));
        assert!(matches!(
            decode_bytes(&nan_origin.to_bytes()),
            Err(MapError::InvalidOrigin { .. })
        ));
        let huge_origin = MapHeader::for_grid(4, 4, 1.0, (0.0, 1.0e30));
        assert!(matches!(
            decode_bytes(&huge_origin.to_bytes()),
            Err(MapError::InvalidOrigin { .. })
        ));

        let coarse = MapHeader::for_grid(4, 4, 1.0e30, (0.0, 0.0));
        assert!(matches!(
            decode_bytes(&coarse.to_bytes()),
            Err(MapError::InvalidResolution(_))
        ));

        let edge = MapHeader::for_grid(4, 4, MAX_RESOLUTION, (-MAX_ORIGIN_METERS, 0.0));
        assert!(edge.validate().is_ok());
    }

    #[test]
    fn test_truncated_payload_still_decodes() {
        let header = MapHeader::for_grid(32, 32, 0.05, (0.0, 0.0));
        let grid: Vec<u8> = (0..1024u32).map(|i| (i % 7) as u8).collect();
        let bytes = encode_bytes(&header, &grid);
        let cut = &bytes[..HEADER_LEN + (bytes.len() - HEADER_LEN) / 3];

        let map = decode_bytes(cut).unwrap();
        assert_eq!(map.status, DecodeStatus::Truncated);
        assert_eq!(map.grid.len(), 1024);
    }

    #[test]
    fn test_palette_seeded_from_grid() {
        let header = MapHeader::for_grid(2, 1, 1.0, (0.0, 0.0));
        let map = decode_bytes(&encode_bytes(&header, &[0x45, 0x00])).unwrap();
        assert!(map.palette.entries().any(|(v, _)| v == 0x45));
    }
}
