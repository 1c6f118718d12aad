//! MapView Core - occupancy-grid map visualization and interaction engine
//!
//! Turns the robot's compressed occupancy grid into an interactive view:
//! 1. **Decoding**: 30-byte header + LZ-style block, fail-soft on damage
//! 2. **Rendering**: value classification, flipped raster, meter grid
//! 3. **Interaction**: pan/zoom/quarter-turn view, click inspection, markers
//!
//! [`EngineState`] owns all of it; [`MapSession`] drives an engine against
//! a robot backend.

pub mod config;
pub mod engine;
pub mod error;
pub mod map_codec;
pub mod map_format;
pub mod map_interaction;
pub mod map_markers;
pub mod map_palette;
pub mod map_raster;
pub mod map_view;
pub mod session;

// Re-export key types for convenience
pub use config::EngineConfig;
pub use engine::{Click, EngineState, LoadedMap, RobotMarker};
pub use error::{MapError, SessionError};
pub use map_codec::{DecodeStatus, Decompressed};
pub use map_format::{DecodedMap, MapHeader};
pub use map_interaction::{CursorHint, PointerEvent, RoomLabel, SelectedPoint, WheelEvent};
pub use map_markers::{Marker, MarkerId, MarkerStore};
pub use map_palette::{Palette, Rgb};
pub use map_raster::Raster;
pub use map_view::{GridCell, MapGeometry, Point, Rotation, ViewTransform};
pub use session::{MapSession, PosePoller};
