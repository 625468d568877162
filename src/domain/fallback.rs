//! Stand-in handler for kernels whose language has no script bundle.
//!
//! It keeps the panel contract uniform: inspections yield an empty snapshot
//! titled with a fixed notice instead of an error.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use super::handler::Inspectable;
use super::matrix::MatrixModel;
use super::update::InspectorUpdate;
use super::update_bus::UpdateBus;
use crate::error::InspectorError;
use crate::kernel::{ExecuteFuture, ExecuteRequest, KernelConnector};

/// No-op handler for an unsupported kernel language.
#[derive(Debug)]
pub struct UnsupportedLanguageHandler {
    id: String,
    kernel_name: Option<String>,
    language: String,
    connector: KernelConnector,
    bus: UpdateBus,
    disposed: AtomicBool,
    disposed_tx: watch::Sender<bool>,
}

impl UnsupportedLanguageHandler {
    /// Builds the fallback for `connector`, whose kernel speaks `language`.
    #[must_use]
    pub fn new(connector: KernelConnector, language: impl Into<String>, capacity: usize) -> Self {
        let (disposed_tx, _) = watch::channel(false);
        Self {
            id: connector.id().to_string(),
            kernel_name: connector.kernel_name(),
            language: language.into(),
            connector,
            bus: UpdateBus::new(capacity),
            disposed: AtomicBool::new(false),
            disposed_tx,
        }
    }

    /// Convenience constructor returning a shared trait object.
    #[must_use]
    pub fn shared(
        connector: KernelConnector,
        language: impl Into<String>,
        capacity: usize,
    ) -> Arc<dyn Inspectable> {
        Arc::new(Self::new(connector, language, capacity))
    }

    fn ensure_live(&self) -> Result<(), InspectorError> {
        if self.is_disposed() {
            return Err(InspectorError::HandlerDisposed(self.id.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl Inspectable for UnsupportedLanguageHandler {
    fn id(&self) -> &str {
        &self.id
    }

    fn kernel_name(&self) -> Option<String> {
        self.kernel_name.clone()
    }

    fn language(&self) -> &str {
        &self.language
    }

    fn is_supported(&self) -> bool {
        false
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    async fn ready(&self) -> Result<(), InspectorError> {
        self.ensure_live()
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<InspectorUpdate>> {
        (!self.is_disposed()).then(|| self.bus.follow())
    }

    fn disposed(&self) -> watch::Receiver<bool> {
        self.disposed_tx.subscribe()
    }

    fn perform_inspection(&self) {
        if self.is_disposed() {
            return;
        }
        self.bus
            .publish(InspectorUpdate::unsupported_language(self.kernel_name.clone()));
    }

    async fn perform_matrix_inspection(
        &self,
        _name: &str,
        _max_rows: usize,
    ) -> Result<MatrixModel, InspectorError> {
        Err(InspectorError::MatrixUnsupported)
    }

    async fn perform_widget_inspection(&self, _name: &str) -> Result<ExecuteFuture, InspectorError> {
        self.ensure_live()?;
        self.connector.execute(ExecuteRequest::query("")).await
    }

    async fn perform_delete(&self, _name: &str) -> Result<(), InspectorError> {
        Ok(())
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.disposed_tx.send_replace(true);
        tracing::debug!(session = %self.id, "fallback handler disposed");
    }
}
