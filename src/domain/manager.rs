//! Handler registry and the current source/panel pointers.
//!
//! [`InspectorManager`] is owned by the application state and shared by
//! reference. It maps session ids to handlers (one handler per session),
//! stores which handler the panel currently follows, and which panel is
//! currently connected.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::handler::Inspectable;
use super::panel::InspectorPanel;
use crate::error::InspectorError;

/// Shared pointer to any handler variant.
pub type SharedHandler = Arc<dyn Inspectable>;

/// Registry of inspection handlers, keyed by session id.
#[derive(Debug)]
pub struct InspectorManager {
    handlers: RwLock<HashMap<String, SharedHandler>>,
    source: Arc<watch::Sender<Option<SharedHandler>>>,
    source_watch: Mutex<Option<JoinHandle<()>>>,
    panel: RwLock<Option<Arc<InspectorPanel>>>,
}

impl InspectorManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        let (source, _) = watch::channel(None);
        Self {
            handlers: RwLock::new(HashMap::new()),
            source: Arc::new(source),
            source_watch: Mutex::new(None),
            panel: RwLock::new(None),
        }
    }

    /// Registers `handler` under its session id and returns the handler it
    /// replaced, if any. Callers are expected to check
    /// [`InspectorManager::has_handler`] first.
    pub async fn add_handler(&self, handler: SharedHandler) -> Option<SharedHandler> {
        let id = handler.id().to_string();
        let replaced = self.handlers.write().await.insert(id.clone(), handler);
        if replaced.is_some() {
            tracing::warn!(session = %id, "handler replaced for session");
        }
        replaced
    }

    /// Returns `true` if a handler is registered for `id`.
    pub async fn has_handler(&self, id: &str) -> bool {
        self.handlers.read().await.contains_key(id)
    }

    /// Returns the handler registered for `id`.
    pub async fn get_handler(&self, id: &str) -> Option<SharedHandler> {
        self.handlers.read().await.get(id).map(Arc::clone)
    }

    /// Like [`InspectorManager::get_handler`], for callers that expect the
    /// handler to exist.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::HandlerNotFound`] if `id` is not registered.
    pub async fn require_handler(&self, id: &str) -> Result<SharedHandler, InspectorError> {
        self.get_handler(id)
            .await
            .ok_or_else(|| InspectorError::HandlerNotFound(id.to_string()))
    }

    /// Unregisters and disposes the handler for `id`.
    pub async fn remove_handler(&self, id: &str) -> Option<SharedHandler> {
        let removed = self.handlers.write().await.remove(id)?;
        self.clear_source_if(&removed);
        removed.dispose();
        Some(removed)
    }

    /// All registered handlers, ordered by session id.
    pub async fn handlers(&self) -> Vec<SharedHandler> {
        let mut handlers: Vec<SharedHandler> =
            self.handlers.read().await.values().map(Arc::clone).collect();
        handlers.sort_by(|a, b| a.id().cmp(b.id()));
        handlers
    }

    /// Number of registered handlers.
    pub async fn len(&self) -> usize {
        self.handlers.read().await.len()
    }

    /// Returns `true` if no handler is registered.
    pub async fn is_empty(&self) -> bool {
        self.handlers.read().await.is_empty()
    }

    /// Handler the panel currently follows.
    #[must_use]
    pub fn source(&self) -> Option<SharedHandler> {
        self.source.borrow().clone()
    }

    /// Change notifications for the current source.
    #[must_use]
    pub fn watch_source(&self) -> watch::Receiver<Option<SharedHandler>> {
        self.source.subscribe()
    }

    /// Replaces the current source. The source clears itself once that
    /// handler is disposed.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::HandlerDisposed`] if `source` is already
    /// disposed.
    pub fn set_source(&self, source: Option<SharedHandler>) -> Result<(), InspectorError> {
        if let Some(handler) = &source
            && handler.is_disposed()
        {
            return Err(InspectorError::HandlerDisposed(handler.id().to_string()));
        }

        let watcher = source.as_ref().map(|handler| {
            let mut disposed = handler.disposed();
            let watched = Arc::clone(handler);
            let sender = Arc::clone(&self.source);
            tokio::spawn(async move {
                let _ = disposed.wait_for(|disposed| *disposed).await;
                clear_if_current(&sender, &watched);
            })
        });

        let mut slot = self.source_watch.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = std::mem::replace(&mut *slot, watcher) {
            previous.abort();
        }
        drop(slot);

        match &source {
            Some(handler) => tracing::info!(session = %handler.id(), "inspector source changed"),
            None => tracing::info!("inspector source cleared"),
        }
        self.source.send_replace(source);
        Ok(())
    }

    /// Clears the current source if it is `handler`.
    pub fn clear_source_if(&self, handler: &SharedHandler) -> bool {
        clear_if_current(&self.source, handler)
    }

    /// Currently connected panel.
    pub async fn panel(&self) -> Option<Arc<InspectorPanel>> {
        self.panel.read().await.clone()
    }

    /// Registers `panel` as the current one and returns the panel it
    /// replaced.
    pub async fn set_panel(&self, panel: Arc<InspectorPanel>) -> Option<Arc<InspectorPanel>> {
        self.panel.write().await.replace(panel)
    }

    /// Clears the panel pointer, but only if `id` is still the current
    /// panel.
    pub async fn clear_panel(&self, id: Uuid) -> bool {
        let mut panel = self.panel.write().await;
        if panel.as_ref().is_some_and(|p| p.id() == id) {
            *panel = None;
            return true;
        }
        false
    }
}

impl Default for InspectorManager {
    fn default() -> Self {
        Self::new()
    }
}

fn clear_if_current(
    sender: &watch::Sender<Option<SharedHandler>>,
    handler: &SharedHandler,
) -> bool {
    sender.send_if_modified(|current| {
        let is_current = current
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, handler));
        if is_current {
            tracing::debug!(session = %handler.id(), "source disposed, clearing");
            *current = None;
        }
        is_current
    })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::domain::UnsupportedLanguageHandler;
    use crate::kernel::KernelConnector;
    use crate::kernel::testing::FakeSession;

    fn handler(id: &str) -> SharedHandler {
        let fake = FakeSession::new(id, "cobol");
        UnsupportedLanguageHandler::shared(KernelConnector::new(fake), "cobol", 8)
    }

    #[tokio::test]
    async fn add_then_get_returns_same_handler() {
        let manager = InspectorManager::new();
        let h = handler("nb1");
        assert!(manager.add_handler(Arc::clone(&h)).await.is_none());

        assert!(manager.has_handler("nb1").await);
        let Some(found) = manager.get_handler("nb1").await else {
            panic!("handler expected");
        };
        assert!(Arc::ptr_eq(&found, &h));
        assert!(!manager.has_handler("nb2").await);
        assert!(manager.get_handler("nb2").await.is_none());
    }

    #[tokio::test]
    async fn re_adding_replaces() {
        let manager = InspectorManager::new();
        let first = handler("nb1");
        let second = handler("nb1");
        manager.add_handler(Arc::clone(&first)).await;

        let Some(replaced) = manager.add_handler(Arc::clone(&second)).await else {
            panic!("first handler should be returned");
        };
        assert!(Arc::ptr_eq(&replaced, &first));
        let Some(found) = manager.get_handler("nb1").await else {
            panic!("handler expected");
        };
        assert!(Arc::ptr_eq(&found, &second));
        assert_eq!(manager.len().await, 1);
    }

    #[tokio::test]
    async fn remove_disposes_and_clears_source() {
        let manager = InspectorManager::new();
        let h = handler("nb1");
        manager.add_handler(Arc::clone(&h)).await;
        assert!(manager.set_source(Some(Arc::clone(&h))).is_ok());

        assert!(manager.remove_handler("nb1").await.is_some());
        assert!(h.is_disposed());
        assert!(manager.source().is_none());
        assert!(manager.is_empty().await);
        assert!(manager.remove_handler("nb1").await.is_none());
    }

    #[tokio::test]
    async fn require_handler_reports_missing_id() {
        let manager = InspectorManager::new();
        assert!(matches!(
            manager.require_handler("ghost").await,
            Err(InspectorError::HandlerNotFound(ref id)) if id == "ghost"
        ));
    }

    #[tokio::test]
    async fn disposed_handler_is_rejected_as_source() {
        let manager = InspectorManager::new();
        let h = handler("nb1");
        h.dispose();
        assert!(matches!(
            manager.set_source(Some(h)),
            Err(InspectorError::HandlerDisposed(_))
        ));
        assert!(manager.source().is_none());
    }

    #[tokio::test]
    async fn source_clears_when_disposed() {
        let manager = InspectorManager::new();
        let h = handler("nb1");
        let mut source = manager.watch_source();
        assert!(manager.set_source(Some(Arc::clone(&h))).is_ok());
        assert!(source.borrow_and_update().is_some());

        h.dispose();

        let cleared = tokio::time::timeout(
            Duration::from_secs(1),
            source.wait_for(|current| current.is_none()),
        )
        .await;
        assert!(matches!(cleared, Ok(Ok(_))));
    }

    #[tokio::test]
    async fn stale_watcher_leaves_new_source_alone() {
        let manager = InspectorManager::new();
        let old = handler("nb1");
        let new = handler("nb2");
        assert!(manager.set_source(Some(Arc::clone(&old))).is_ok());
        assert!(manager.set_source(Some(Arc::clone(&new))).is_ok());

        old.dispose();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let Some(current) = manager.source() else {
            panic!("new source should remain");
        };
        assert!(Arc::ptr_eq(&current, &new));
    }

    #[tokio::test]
    async fn clear_panel_only_if_current() {
        let manager = Arc::new(InspectorManager::new());
        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);
        let first = InspectorPanel::spawn(&manager, tx1);
        let second = InspectorPanel::spawn(&manager, tx2);

        assert!(manager.set_panel(Arc::clone(&first)).await.is_none());
        let Some(replaced) = manager.set_panel(Arc::clone(&second)).await else {
            panic!("first panel should be returned");
        };
        assert_eq!(replaced.id(), first.id());

        assert!(!manager.clear_panel(first.id()).await);
        assert!(manager.panel().await.is_some());
        assert!(manager.clear_panel(second.id()).await);
        assert!(manager.panel().await.is_none());
    }
}
