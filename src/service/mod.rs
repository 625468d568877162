//! Service layer: handler lifecycle and inspection orchestration.
//!
//! [`InspectorService`] opens sessions through a
//! [`crate::kernel::SessionOpener`], registers handlers in the
//! [`crate::domain::InspectorManager`], and routes API and panel requests
//! to them.

pub mod inspector_service;

pub use inspector_service::{InspectorService, RenderedOutput};
