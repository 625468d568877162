//! Session connector: the stable contract the inspection handler depends on,
//! whatever happens to the kernel underneath.

use std::fmt;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::broadcast;

use super::message::{ExecuteRequest, KernelMessage, KernelStatus};
use super::session::{ExecuteFuture, KernelSession};
use crate::error::InspectorError;

/// Emitted once per reset transition (restart, or the kernel or its
/// connection dying). `ready` is a fresh readiness future for the kernel
/// that comes back.
pub struct KernelRestart {
    /// Status that triggered the notification.
    pub status: KernelStatus,
    /// Resolves once the restarted kernel is ready again.
    pub ready: BoxFuture<'static, Result<(), InspectorError>>,
}

impl fmt::Debug for KernelRestart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelRestart")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Stream of [`KernelRestart`] notifications.
#[derive(Debug)]
pub struct RestartWatcher {
    session: Arc<dyn KernelSession>,
    status_rx: broadcast::Receiver<KernelStatus>,
}

impl RestartWatcher {
    /// Waits for the next reset transition. Returns `None` once the
    /// session is gone.
    pub async fn next(&mut self) -> Option<KernelRestart> {
        loop {
            match self.status_rx.recv().await {
                Ok(status) if status.is_reset() => {
                    let session = Arc::clone(&self.session);
                    let ready = async move { session.wait_ready().await }.boxed();
                    return Some(KernelRestart { status, ready });
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "restart watcher lagged behind status stream");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Wraps one [`KernelSession`] for an inspection handler.
#[derive(Debug, Clone)]
pub struct KernelConnector {
    session: Arc<dyn KernelSession>,
}

impl KernelConnector {
    /// Creates a connector over `session`.
    #[must_use]
    pub fn new(session: Arc<dyn KernelSession>) -> Self {
        Self { session }
    }

    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        self.session.id()
    }

    /// Resolves when the session and its kernel are ready.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::NoActiveKernel`] when no kernel is attached.
    pub async fn ready(&self) -> Result<(), InspectorError> {
        self.session.wait_ready().await
    }

    /// Reset counter of the session. Code installed in the kernel at an
    /// earlier generation is gone.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.session.generation()
    }

    /// Kernel language from kernel-info metadata.
    ///
    /// # Errors
    ///
    /// Propagates session failures.
    pub async fn kernel_language(&self) -> Result<String, InspectorError> {
        self.session.kernel_language().await
    }

    /// Human-readable kernel label.
    #[must_use]
    pub fn kernel_name(&self) -> Option<String> {
        self.session.kernel_display_name()
    }

    /// Session-wide broadcast stream.
    #[must_use]
    pub fn iopub(&self) -> broadcast::Receiver<KernelMessage> {
        self.session.subscribe_iopub()
    }

    /// Reset notifications, starting from now.
    #[must_use]
    pub fn restarts(&self) -> RestartWatcher {
        RestartWatcher {
            session: Arc::clone(&self.session),
            status_rx: self.session.subscribe_status(),
        }
    }

    /// Submits `request`, passes every broadcast frame of the request to
    /// `on_message`, and returns the terminal reply.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::NoActiveKernel`] if no kernel is attached,
    /// or [`InspectorError::Transport`] if the request is abandoned.
    pub async fn fetch<F>(
        &self,
        request: ExecuteRequest,
        on_message: F,
    ) -> Result<KernelMessage, InspectorError>
    where
        F: FnMut(&KernelMessage) + Send,
    {
        let future = self.session.request_execute(request).await?;
        future.drive(on_message).await
    }

    /// Submits `request` without waiting and returns the live handle.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::NoActiveKernel`] if no kernel is attached.
    pub async fn execute(&self, request: ExecuteRequest) -> Result<ExecuteFuture, InspectorError> {
        self.session.request_execute(request).await
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::kernel::message::frames;
    use crate::kernel::testing::FakeSession;

    #[tokio::test]
    async fn fetch_forwards_request_frames() {
        let fake = FakeSession::new("nb1", "python");
        let connector = KernelConnector::new(Arc::clone(&fake) as Arc<dyn KernelSession>);

        let kernel = Arc::clone(&fake);
        let script = tokio::spawn(async move {
            let Some(request) = kernel.next_request().await else {
                panic!("request expected");
            };
            request.emit(frames::execute_result(request.msg_id(), "'42'"));
            request.finish();
        });

        let mut seen = Vec::new();
        let reply = connector
            .fetch(ExecuteRequest::query("x"), |msg| {
                seen.push(msg.msg_type().to_string())
            })
            .await;
        assert!(reply.is_ok());
        assert!(seen.contains(&"execute_result".to_string()));
        assert!(script.await.is_ok());
    }

    #[tokio::test]
    async fn fetch_without_kernel_fails() {
        let fake = FakeSession::new("nb1", "python");
        fake.detach_kernel();
        let connector = KernelConnector::new(fake);
        let result = connector.fetch(ExecuteRequest::query("x"), |_| {}).await;
        assert!(matches!(result, Err(InspectorError::NoActiveKernel)));
    }

    #[tokio::test]
    async fn restart_watcher_yields_only_restarts() {
        let fake = FakeSession::new("nb1", "python");
        let connector = KernelConnector::new(Arc::clone(&fake) as Arc<dyn KernelSession>);
        let mut restarts = connector.restarts();

        fake.set_status(KernelStatus::Busy);
        fake.set_status(KernelStatus::Autorestarting);

        let Some(restart) = restarts.next().await else {
            panic!("restart expected");
        };
        assert_eq!(restart.status, KernelStatus::Autorestarting);
        assert!(restart.ready.await.is_ok());
    }

    #[tokio::test]
    async fn lost_kernel_counts_as_restart() {
        let fake = FakeSession::new("nb1", "python");
        let connector = KernelConnector::new(Arc::clone(&fake) as Arc<dyn KernelSession>);
        let mut restarts = connector.restarts();
        assert_eq!(connector.generation(), 0);

        fake.set_status(KernelStatus::Idle);
        fake.set_status(KernelStatus::Dead);

        let Some(restart) = restarts.next().await else {
            panic!("dead kernel should surface as a restart");
        };
        assert_eq!(restart.status, KernelStatus::Dead);
        assert_eq!(connector.generation(), 1);
    }

    #[test]
    fn kernel_name_is_passed_through() {
        let fake = FakeSession::new("nb1", "python");
        let connector = KernelConnector::new(fake);
        assert_eq!(connector.kernel_name().as_deref(), Some("Fake Kernel"));
        assert_eq!(connector.id(), "nb1");
    }
}
