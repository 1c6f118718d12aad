//! Error types for map decoding and map sessions.

use mapview_env::{EnvError, MapId};
use thiserror::Error;

/// Structural problems with a map payload.
///
/// Decompression irregularities are not errors (see
/// [`DecodeStatus`](crate::map_codec::DecodeStatus)); these variants only
/// cover data the engine cannot lay out at all.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MapError {
    #[error("Invalid hex payload: {0}")]
    InvalidHex(String),

    #[error("Header too short: {len} bytes (need 30)")]
    HeaderTooShort { len: usize },

    #[error("Invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: i32, height: i32 },

    #[error("Invalid decoded size: {0}")]
    InvalidDecodedSize(i32),

    #[error("Invalid resolution: {0}")]
    InvalidResolution(f32),

    #[error("Invalid origin: ({x}, {y})")]
    InvalidOrigin { x: f32, y: f32 },
}

impl From<hex::FromHexError> for MapError {
    fn from(err: hex::FromHexError) -> Self {
        Self::InvalidHex(err.to_string())
    }
}

/// Errors surfaced by [`MapSession`](crate::session::MapSession) operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Map(#[from] MapError),

    #[error("Invalid map id: {0:?}")]
    InvalidMapId(MapId),

    #[error("No map selected")]
    NoMapSelected,

    #[error("No marker selected")]
    NoMarkerSelected,

    #[error("Unknown marker: {0}")]
    UnknownMarker(u64),

    #[error("Marker {0} has unparseable world coordinates")]
    InvalidCoordinate(u64),

    #[error("Robot rejected command: {0}")]
    Rejected(String),
}
