//! Inspector service: attaches handlers to sessions and routes panel and
//! API operations to them.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::InspectorConfig;
use crate::domain::{
    HandlerOptions, Inspectable, InspectionHandler, InspectorManager, MatrixModel, SharedHandler,
    UnsupportedLanguageHandler, get_script,
};
use crate::error::InspectorError;
use crate::kernel::{KernelConnector, SessionOpener};

/// Broadcast frame kinds kept when rendering a widget request.
const RENDERED_KINDS: [&str; 4] = ["execute_result", "display_data", "stream", "error"];

/// One output produced by a widget request.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedOutput {
    /// Message type (`display_data`, `stream`, …).
    pub output_type: String,
    /// Message content as sent by the kernel.
    pub content: Value,
}

/// Tunables taken from [`InspectorConfig`].
#[derive(Debug, Clone, Copy)]
struct ServiceSettings {
    update_bus_capacity: usize,
    init_retry_delay: Duration,
    matrix_max_rows: usize,
}

/// Orchestration layer for handler lifecycle and inspection requests.
///
/// Owns the [`InspectorManager`] and the [`SessionOpener`] that reaches the
/// host. Attaching is serialised so a session never gets two handlers.
#[derive(Debug, Clone)]
pub struct InspectorService {
    manager: Arc<InspectorManager>,
    opener: Arc<dyn SessionOpener>,
    settings: ServiceSettings,
    attach_lock: Arc<Mutex<()>>,
}

impl InspectorService {
    /// Creates a new `InspectorService`.
    #[must_use]
    pub fn new(
        manager: Arc<InspectorManager>,
        opener: Arc<dyn SessionOpener>,
        config: &InspectorConfig,
    ) -> Self {
        Self {
            manager,
            opener,
            settings: ServiceSettings {
                update_bus_capacity: config.update_bus_capacity,
                init_retry_delay: config.init_retry_delay,
                matrix_max_rows: config.matrix_max_rows,
            },
            attach_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Returns a reference to the inner [`InspectorManager`].
    #[must_use]
    pub fn manager(&self) -> &Arc<InspectorManager> {
        &self.manager
    }

    /// Default row limit of matrix inspections.
    #[must_use]
    pub fn matrix_max_rows(&self) -> usize {
        self.settings.matrix_max_rows
    }

    /// Returns the handler of `path`, creating it on first use.
    ///
    /// The first handler attached also becomes the current source.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::InvalidRequest`] for an empty path,
    /// [`InspectorError::HandlerNotFound`] if the host has no such session,
    /// [`InspectorError::NoActiveKernel`] if the session has no kernel, or a
    /// transport error.
    pub async fn attach(&self, path: &str) -> Result<SharedHandler, InspectorError> {
        if path.trim().is_empty() {
            return Err(InspectorError::InvalidRequest(
                "session path must not be empty".to_string(),
            ));
        }

        let _guard = self.attach_lock.lock().await;
        if let Some(existing) = self.manager.get_handler(path).await {
            return Ok(existing);
        }

        let session = self.opener.open(path).await?;
        let connector = KernelConnector::new(session);
        connector.ready().await?;
        let language = connector.kernel_language().await?;

        let handler: SharedHandler = match get_script(&language) {
            Ok(scripts) => Arc::new(InspectionHandler::new(HandlerOptions {
                connector,
                scripts,
                language: language.clone(),
                update_bus_capacity: self.settings.update_bus_capacity,
                init_retry_delay: self.settings.init_retry_delay,
            })),
            Err(err) => {
                tracing::warn!(session = %path, error = %err, "falling back to no-op handler");
                UnsupportedLanguageHandler::shared(
                    connector,
                    language.clone(),
                    self.settings.update_bus_capacity,
                )
            }
        };

        self.manager.add_handler(Arc::clone(&handler)).await;
        if self.manager.source().is_none() {
            self.manager.set_source(Some(Arc::clone(&handler)))?;
        }

        tracing::info!(session = %path, %language, "handler attached");
        Ok(handler)
    }

    /// Disposes and forgets the handler of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::HandlerNotFound`] if `path` is not attached.
    pub async fn detach(&self, path: &str) -> Result<(), InspectorError> {
        self.manager
            .remove_handler(path)
            .await
            .ok_or_else(|| InspectorError::HandlerNotFound(path.to_string()))?;
        tracing::info!(session = %path, "handler detached");
        Ok(())
    }

    /// Makes `path` the session the panel follows, or clears it with `None`.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::HandlerNotFound`] if `path` is not attached,
    /// or [`InspectorError::HandlerDisposed`] if its handler is disposed.
    pub async fn select(&self, path: Option<&str>) -> Result<Option<SharedHandler>, InspectorError> {
        let handler = match path {
            Some(path) => Some(self.manager.require_handler(path).await?),
            None => None,
        };
        self.manager.set_source(handler.clone())?;
        Ok(handler)
    }

    /// Asks the handler of `path` for a fresh snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::HandlerNotFound`] if `path` is not attached.
    pub async fn inspect(&self, path: &str) -> Result<(), InspectorError> {
        let handler = self.manager.require_handler(path).await?;
        handler.perform_inspection();
        Ok(())
    }

    /// Resolves `path`, defaulting to the current source.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::HandlerNotFound`] if `path` is not attached,
    /// or [`InspectorError::InvalidRequest`] if no path is given and there is
    /// no current source.
    pub async fn resolve(&self, path: Option<&str>) -> Result<SharedHandler, InspectorError> {
        match path {
            Some(path) => self.manager.require_handler(path).await,
            None => self.manager.source().ok_or_else(|| {
                InspectorError::InvalidRequest("no session selected".to_string())
            }),
        }
    }

    /// Fetches variable `name` of `path` as a table.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::InvalidRequest`] for an invalid name, plus
    /// the errors of [`InspectorService::resolve`] and
    /// [`crate::domain::Inspectable::perform_matrix_inspection`].
    pub async fn matrix(
        &self,
        path: Option<&str>,
        name: &str,
        max_rows: Option<usize>,
    ) -> Result<MatrixModel, InspectorError> {
        validate_variable_name(name)?;
        let handler = self.resolve(path).await?;
        let max_rows = max_rows.unwrap_or(self.settings.matrix_max_rows);
        handler.perform_matrix_inspection(name, max_rows).await
    }

    /// Deletes variable `name` in `path`'s kernel.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::InvalidRequest`] for an invalid name, plus
    /// the errors of [`InspectorService::resolve`] and the session errors of
    /// the delete request.
    pub async fn delete_variable(&self, path: Option<&str>, name: &str) -> Result<(), InspectorError> {
        validate_variable_name(name)?;
        let handler = self.resolve(path).await?;
        handler.perform_delete(name).await?;
        tracing::info!(session = %handler.id(), variable = name, "variable deleted");
        Ok(())
    }

    /// Runs the widget query for `name` and collects its outputs until the
    /// kernel replies.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::InvalidRequest`] for an invalid name,
    /// [`InspectorError::HandlerNotFound`] if `path` is not attached, or a
    /// session error.
    pub async fn render_widget(
        &self,
        path: &str,
        name: &str,
    ) -> Result<Vec<RenderedOutput>, InspectorError> {
        validate_variable_name(name)?;
        let handler = self.manager.require_handler(path).await?;
        let future = handler.perform_widget_inspection(name).await?;

        let mut outputs = Vec::new();
        future
            .drive(|msg| {
                if RENDERED_KINDS.contains(&msg.msg_type()) {
                    outputs.push(RenderedOutput {
                        output_type: msg.msg_type().to_string(),
                        content: msg.content.clone(),
                    });
                }
            })
            .await?;
        Ok(outputs)
    }
}

/// Names are spliced into kernel source, so only identifier characters
/// (plus `.` for R) are accepted.
fn validate_variable_name(name: &str) -> Result<(), InspectorError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.');
    if !valid {
        return Err(InspectorError::InvalidRequest(format!(
            "invalid variable name: {name:?}"
        )));
    }
    Ok(())
}
