//! PlaySync Server
//!
//! Hosts a [`playsync_core::SyncEngine`] behind an HTTP control API and a
//! WebSocket transport for player endpoints.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       playsync-server                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────┐        ┌────────────────────────────┐  │
//! │  │  HTTP API (axum) │───────▶│  SyncEngine                │  │
//! │  │  /api/endpoints  │        │  registry · tracker ·      │  │
//! │  │  /api/playback   │        │  reconciler (tick task)    │  │
//! │  │  /api/settings   │        └─────────────┬──────────────┘  │
//! │  └──────────────────┘                      │ commands        │
//! │  ┌──────────────────┐        ┌─────────────▼──────────────┐  │
//! │  │  /ws/endpoints/  │◀──────▶│  ChannelHub (PlayerChannel │  │
//! │  │  :id  (players)  │        │  per endpoint id)          │  │
//! │  └──────────────────┘        └────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod hub;
