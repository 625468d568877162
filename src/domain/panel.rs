//! Panel-side mediation of the current source.
//!
//! An [`InspectorPanel`] follows [`InspectorManager::watch_source`]. Whenever
//! the source changes it drops the subscription to the previous handler,
//! subscribes to the new one and asks it for a fresh snapshot. Everything it
//! observes is forwarded to the panel's sink as [`PanelEvent`]s.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::InspectorUpdate;
use super::manager::{InspectorManager, SharedHandler};
use super::update_bus::next_snapshot;

/// What a panel receives.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelEvent {
    /// The followed session changed; `None` when there is none.
    SourceChanged(Option<String>),
    /// Fresh snapshot of the followed session.
    Inspected(InspectorUpdate),
}

/// A connected panel.
#[derive(Debug)]
pub struct InspectorPanel {
    id: Uuid,
    disposed: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl InspectorPanel {
    /// Starts following `manager`'s source, forwarding to `sink`.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(manager: &Arc<InspectorManager>, sink: mpsc::Sender<PanelEvent>) -> Arc<Self> {
        let id = Uuid::new_v4();
        let task = tokio::spawn(follow_source(id, Arc::clone(manager), sink));
        Arc::new(Self {
            id,
            disposed: AtomicBool::new(false),
            task: Mutex::new(Some(task)),
        })
    }

    /// Panel identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether [`InspectorPanel::dispose`] has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Stops following the source and closes the sink. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        tracing::debug!(panel = %self.id, "panel disposed");
    }
}

impl Drop for InspectorPanel {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn follow_source(
    panel: Uuid,
    manager: Arc<InspectorManager>,
    sink: mpsc::Sender<PanelEvent>,
) {
    let mut source_rx = manager.watch_source();
    loop {
        let source = source_rx.borrow_and_update().clone();
        let event = PanelEvent::SourceChanged(source.as_ref().map(|s| s.id().to_string()));
        if sink.send(event).await.is_err() {
            return;
        }

        if let Some(source) = source
            && let Some(updates) = source.subscribe()
        {
            tracing::debug!(%panel, session = %source.id(), "panel following source");
            source.perform_inspection();
            if !forward_updates(&manager, &source, updates, &mut source_rx, &sink).await {
                return;
            }
            continue;
        }

        if source_rx.changed().await.is_err() {
            return;
        }
    }
}

/// Forwards `source`'s updates until the source changes. Returns `false`
/// when the panel should stop.
async fn forward_updates(
    manager: &InspectorManager,
    source: &SharedHandler,
    mut updates: broadcast::Receiver<InspectorUpdate>,
    source_rx: &mut watch::Receiver<Option<SharedHandler>>,
    sink: &mpsc::Sender<PanelEvent>,
) -> bool {
    let mut disposed = source.disposed();
    loop {
        tokio::select! {
            changed = source_rx.changed() => return changed.is_ok(),
            () = async { let _ = disposed.wait_for(|disposed| *disposed).await; } => {
                manager.clear_source_if(source);
                return source_rx.changed().await.is_ok();
            }
            update = next_snapshot(&mut updates) => match update {
                Some(update) => {
                    if sink.send(PanelEvent::Inspected(update)).await.is_err() {
                        return false;
                    }
                }
                None => return source_rx.changed().await.is_ok(),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::UnsupportedLanguageHandler;
    use crate::domain::update::UNSUPPORTED_CONTEXT;
    use crate::kernel::KernelConnector;
    use crate::kernel::testing::FakeSession;

    const WAIT: Duration = Duration::from_secs(1);

    fn handler(id: &str) -> SharedHandler {
        let fake = FakeSession::new(id, "cobol");
        UnsupportedLanguageHandler::shared(KernelConnector::new(fake), "cobol", 8)
    }

    async fn next_event(rx: &mut mpsc::Receiver<PanelEvent>) -> PanelEvent {
        let Ok(Some(event)) = tokio::time::timeout(WAIT, rx.recv()).await else {
            panic!("panel event expected");
        };
        event
    }

    #[tokio::test]
    async fn new_source_is_inspected_immediately() {
        let manager = Arc::new(InspectorManager::new());
        let (tx, mut rx) = mpsc::channel(8);
        let _panel = InspectorPanel::spawn(&manager, tx);
        assert_eq!(next_event(&mut rx).await, PanelEvent::SourceChanged(None));

        assert!(manager.set_source(Some(handler("nb1"))).is_ok());
        assert_eq!(
            next_event(&mut rx).await,
            PanelEvent::SourceChanged(Some("nb1".to_string()))
        );
        let PanelEvent::Inspected(update) = next_event(&mut rx).await else {
            panic!("inspection expected");
        };
        assert_eq!(update.title.context_name.as_deref(), Some(UNSUPPORTED_CONTEXT));
    }

    #[tokio::test]
    async fn switching_source_drops_old_subscription() {
        let manager = Arc::new(InspectorManager::new());
        let (tx, mut rx) = mpsc::channel(8);
        let _panel = InspectorPanel::spawn(&manager, tx);
        let _ = next_event(&mut rx).await;

        let first = handler("nb1");
        let second = handler("nb2");
        assert!(manager.set_source(Some(Arc::clone(&first))).is_ok());
        let _ = next_event(&mut rx).await;
        let _ = next_event(&mut rx).await;

        assert!(manager.set_source(Some(Arc::clone(&second))).is_ok());
        assert_eq!(
            next_event(&mut rx).await,
            PanelEvent::SourceChanged(Some("nb2".to_string()))
        );
        let _ = next_event(&mut rx).await;

        first.perform_inspection();
        assert!(tokio::time::timeout(Duration::from_millis(50), rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn disposed_source_is_cleared() {
        let manager = Arc::new(InspectorManager::new());
        let (tx, mut rx) = mpsc::channel(8);
        let _panel = InspectorPanel::spawn(&manager, tx);
        let _ = next_event(&mut rx).await;

        let source = handler("nb1");
        assert!(manager.set_source(Some(Arc::clone(&source))).is_ok());
        let _ = next_event(&mut rx).await;
        let _ = next_event(&mut rx).await;

        source.dispose();
        assert_eq!(next_event(&mut rx).await, PanelEvent::SourceChanged(None));
        assert!(manager.source().is_none());
    }

    #[tokio::test]
    async fn dispose_closes_sink() {
        let manager = Arc::new(InspectorManager::new());
        let (tx, mut rx) = mpsc::channel(8);
        let panel = InspectorPanel::spawn(&manager, tx);
        let _ = next_event(&mut rx).await;

        panel.dispose();
        panel.dispose();
        assert!(panel.is_disposed());
        let Ok(closed) = tokio::time::timeout(WAIT, rx.recv()).await else {
            panic!("sink should close");
        };
        assert!(closed.is_none());
    }
}
