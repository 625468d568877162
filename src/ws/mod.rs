//! WebSocket layer: the inspector panel's live channel.
//!
//! The endpoint at `/ws` pushes source changes and variable snapshots to the
//! connected panel and accepts its commands (inspect, select, matrix,
//! delete). Only one panel is live at a time; a new connection replaces the
//! previous one.

pub mod connection;
pub mod handler;
pub mod messages;
