//! # variable-inspector
//!
//! Live variable inspection for Jupyter kernels, served over REST and
//! WebSocket.
//!
//! The service attaches to sessions on a Jupyter Server, installs a small
//! per-language helper in each kernel, and re-inspects the kernel's globals
//! every time someone else executes code there. Snapshots are pushed to the
//! connected panel; variables can be fetched as tables, rendered as widgets,
//! or deleted.
//!
//! ## Architecture
//!
//! ```text
//! Panel (WebSocket)        Clients (HTTP)
//!     │                        │
//!     ├── WS Handler (ws/)     ├── REST Handlers (api/)
//!     │                        │
//!     └──────── InspectorService (service/)
//!                  │
//!                  ├── InspectorManager + InspectorPanel (domain/)
//!                  ├── InspectionHandler / fallback (domain/)
//!                  │
//!                  ├── KernelConnector (kernel/)
//!                  └── Jupyter Server REST + kernel websocket
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod kernel;
pub mod service;
pub mod ws;
