//! PlaySync reconciliation core
//!
//! Keeps several independently running remote media players converged on a
//! shared playback position and play/pause state. Endpoints report status
//! asynchronously and unreliably; a fixed-cadence control loop elects a
//! leader per synchronization group, corrects follower drift, and drives
//! recovery for endpoints that stall, buffer, show ads, or drop out and
//! rejoin.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │  Endpoints (remote players)                            │
//! │  ↓ status snapshots            ↑ commands              │
//! │  StateTracker (DashMap)        CommandDispatcher       │
//! │  ↓                             ↑ (allow-list, clamp)   │
//! │  SyncEngine ── tick every 1/hz seconds ──┐             │
//! │  └─ Reconciler (per group)               │             │
//! │     ├─ suspension::classify              │             │
//! │     ├─ leader::select_leader             │             │
//! │     ├─ drift / play-state correction ────┘             │
//! │     └─ recovery::plan_recovery                         │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use playsync_core::{Endpoint, PlayerChannel, PlayerStatus, StatusSnapshot, SyncEngine, SyncSettings};
//! use std::sync::Arc;
//!
//! let engine = SyncEngine::new(SyncSettings::default()).unwrap();
//! engine
//!     .add_endpoint(Endpoint::new("left", Arc::new(PlayerChannel::detached())).with_group(Some("wall")))
//!     .unwrap();
//! engine.ingest("left", &StatusSnapshot::new(12.0, PlayerStatus::Playing));
//!
//! let report = engine.tick();
//! assert_eq!(report.group("wall").unwrap().leader.as_deref(), Some("left"));
//! ```

#![warn(clippy::all)]

pub mod channel;
pub mod config;
pub mod diagnostics;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod leader;
pub mod protocol;
pub mod reconcile;
pub mod recovery;
pub mod registry;
pub mod suspension;
pub mod tracker;

pub use channel::{EndpointChannel, PlayerChannel};
pub use config::{FallbackMode, LeaderEligibility, LeaderPolicy, SettingsPatch, SyncSettings};
pub use diagnostics::{Diagnostics, EndpointDiagnostics, GroupHealth, HealthLevel};
pub use dispatch::{CommandDispatcher, DispatchStats};
pub use engine::{PersistedState, SyncEngine};
pub use error::{Error, Result};
pub use protocol::{Command, CommandKind, OutboundMessage, PlayerStatus, StatusSnapshot};
pub use reconcile::{GroupReport, IssuedCommand, Reconciler, TickReport};
pub use registry::{Endpoint, EndpointEntry, EndpointRegistry, TileMetadata};
pub use suspension::SuspensionReason;
pub use tracker::{StateTracker, TrackedState};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get crate version
pub fn version() -> &'static str {
    VERSION
}
