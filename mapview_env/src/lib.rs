//! MapView Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" boundary that lets the MapView engine
//! run against a real robot (tokio + HTTP) or inside the deterministic
//! simulator (virtual clock + in-memory robot).
//!
//! # Core Concept
//!
//! The engine never touches a socket or a clock directly. Everything that
//! suspends or talks to the outside world goes through two traits:
//!
//! - [`ViewContext`]: time (`now()`, `sleep()`) and task spawning
//! - [`RobotBackend`]: map download, pose polling, marker persistence and
//!   motion commands
//!
//! # Example
//!
//! ```ignore
//! use mapview_env::{RobotBackend, ViewContext};
//!
//! async fn pose_loop<Ctx: ViewContext, B: RobotBackend>(ctx: &Ctx, backend: &B) {
//!     loop {
//!         ctx.sleep(Duration::from_millis(1000)).await;
//!         if let Ok(envelope) = backend.fetch_pose().await {
//!             handle_pose(envelope);
//!         }
//!     }
//! }
//! ```

mod backend;
mod context;
mod error;
#[cfg(feature = "http")]
mod http;
mod tokio_impl;
mod types;

pub use backend::RobotBackend;
pub use context::ViewContext;
pub use error::EnvError;
#[cfg(feature = "http")]
pub use http::{HttpBackend, HttpConfig};
pub use tokio_impl::TokioContext;
pub use types::{
    CommandReply, DockCommand, GotoCommand, MapId, MapPayload, MarkerRecord, MarkerSet,
    PoseEnvelope, RobotPose, SaveMarkersRequest,
};
