//! MapView deterministic simulation harness
//!
//! Runs the real [`MapSession`](mapview_core::MapSession) against an
//! in-memory robot so that every gesture, map download and pose poll can
//! be replayed from a single 64-bit seed.
//!
//! # Core Principle
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: virtual clock that only moves when the poller sleeps or a
//!   scenario advances it
//! - **Robot**: [`SimBackend`] serves generated floor plans and a scripted
//!   pose path, with offline/malformed/rejecting faults on demand
//! - **Randomness**: fixtures and gestures draw from ChaCha8 streams of the seed
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     ScenarioRunner                        │
//! │  ┌──────────────────────┐      ┌──────────────────────┐   │
//! │  │ MapSession           │◄────►│ SimBackend           │   │
//! │  │  EngineState         │ REST │  floor plans (hex)   │   │
//! │  │  PosePoller          │      │  PosePath · faults   │   │
//! │  └──────────┬───────────┘      └──────────┬───────────┘   │
//! │             └────────── SimContext ───────┘               │
//! │                  (virtual clock + seeded RNG)             │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use mapview_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let runner = ScenarioRunner::new(42).with_duration(10.0);
//! let result = runner.run(ScenarioId::PoseTracking).await;
//! assert!(result.passed);
//! ```

mod backend;
mod config;
mod context;
mod error;
mod exporter;
mod fixtures;
mod runner;
pub mod scenarios;

pub use backend::{BackendStats, PosePath, SimBackend};
pub use config::SimConfig;
pub use context::SimContext;
pub use error::SimError;
pub use exporter::{write_png, ScenarioReport, SimReport};
pub use fixtures::MapFixture;
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
