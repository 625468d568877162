//! Domain layer: script bundles, updates, handlers, and the registry.
//!
//! This module contains the inspector's core model: the per-language
//! script table, the canonical update and matrix types, the per-session
//! inspection handler with its no-op fallback, the handler registry, and
//! the panel that follows the registry's current source.

pub mod fallback;
pub mod handler;
pub mod manager;
pub mod matrix;
pub mod panel;
pub mod scripts;
pub mod update;
pub mod update_bus;

pub use fallback::UnsupportedLanguageHandler;
pub use handler::{HandlerOptions, Inspectable, InspectionHandler};
pub use manager::{InspectorManager, SharedHandler};
pub use matrix::MatrixModel;
pub use panel::{InspectorPanel, PanelEvent};
pub use scripts::{ScriptBundle, get_script, supported_languages};
pub use update::{InspectorTitle, InspectorUpdate, Variable};
pub use update_bus::UpdateBus;
