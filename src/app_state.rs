//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::InspectorManager;
use crate::service::InspectorService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Inspector service for attach, select and variable operations.
    pub service: Arc<InspectorService>,
    /// Handler registry and current source.
    pub manager: Arc<InspectorManager>,
}
