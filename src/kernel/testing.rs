//! In-memory [`KernelSession`] for tests: every submitted request is handed
//! to the test, which scripts the kernel's answer frame by frame.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};

use super::message::{ExecuteRequest, KernelMessage, KernelStatus, frames};
use super::session::{ExecuteFuture, KernelSession, SessionOpener};
use crate::error::InspectorError;

const WAIT: Duration = Duration::from_secs(2);

/// A request captured by [`FakeSession`].
#[derive(Debug)]
pub(crate) struct SubmittedRequest {
    msg_id: String,
    request: ExecuteRequest,
    messages: mpsc::UnboundedSender<KernelMessage>,
    reply: oneshot::Sender<KernelMessage>,
    iopub_tx: broadcast::Sender<KernelMessage>,
}

impl SubmittedRequest {
    pub(crate) fn msg_id(&self) -> &str {
        &self.msg_id
    }

    pub(crate) fn code(&self) -> &str {
        &self.request.code
    }

    pub(crate) fn is_silent(&self) -> bool {
        self.request.silent
    }

    /// Sends a frame to the request and to the session-wide stream.
    pub(crate) fn emit(&self, msg: KernelMessage) {
        let _ = self.iopub_tx.send(msg.clone());
        let _ = self.messages.send(msg);
    }

    /// Completes the request with an `idle` status and an ok reply.
    pub(crate) fn finish(self) {
        self.emit(frames::status(&self.msg_id, KernelStatus::Idle));
        let Self {
            msg_id,
            messages,
            reply,
            ..
        } = self;
        drop(messages);
        let _ = reply.send(frames::execute_reply(&msg_id));
    }

    /// Raises `ename: evalue` and completes with an error reply.
    pub(crate) fn fail(self, ename: &str, evalue: &str) {
        self.emit(frames::error(&self.msg_id, ename, evalue));
        self.emit(frames::status(&self.msg_id, KernelStatus::Idle));
        let Self {
            msg_id,
            messages,
            reply,
            ..
        } = self;
        drop(messages);
        let _ = reply.send(frames::error_reply(&msg_id, ename, evalue));
    }

    /// Answers a query with a single `execute_result` and completes.
    pub(crate) fn respond(self, text: &str) {
        self.emit(frames::execute_result(&self.msg_id, text));
        self.finish();
    }
}

/// Scriptable in-memory kernel session.
#[derive(Debug)]
pub(crate) struct FakeSession {
    id: String,
    language: String,
    attached: AtomicBool,
    generation: AtomicU64,
    ready_tx: watch::Sender<bool>,
    iopub_tx: broadcast::Sender<KernelMessage>,
    status_tx: broadcast::Sender<KernelStatus>,
    requests_tx: mpsc::UnboundedSender<SubmittedRequest>,
    requests_rx: Mutex<mpsc::UnboundedReceiver<SubmittedRequest>>,
}

impl FakeSession {
    pub(crate) fn new(id: &str, language: &str) -> Arc<Self> {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (iopub_tx, _) = broadcast::channel(256);
        let (status_tx, _) = broadcast::channel(64);
        let (ready_tx, _) = watch::channel(true);
        Arc::new(Self {
            id: id.to_string(),
            language: language.to_string(),
            attached: AtomicBool::new(true),
            generation: AtomicU64::new(0),
            ready_tx,
            iopub_tx,
            status_tx,
            requests_tx,
            requests_rx: Mutex::new(requests_rx),
        })
    }

    /// Next submitted request, or `None` if none arrives in time.
    pub(crate) async fn next_request(&self) -> Option<SubmittedRequest> {
        let mut rx = self.requests_rx.lock().await;
        tokio::time::timeout(WAIT, rx.recv()).await.ok().flatten()
    }

    /// A request already submitted, without waiting.
    pub(crate) async fn try_next_request(&self) -> Option<SubmittedRequest> {
        self.requests_rx.lock().await.try_recv().ok()
    }

    pub(crate) fn detach_kernel(&self) {
        self.attached.store(false, Ordering::SeqCst);
    }

    pub(crate) fn attach_kernel(&self) {
        self.attached.store(true, Ordering::SeqCst);
    }

    /// Gates [`KernelSession::wait_ready`].
    pub(crate) fn set_ready(&self, ready: bool) {
        self.ready_tx.send_replace(ready);
    }

    /// Publishes a status transition the way a server does.
    pub(crate) fn set_status(&self, status: KernelStatus) {
        if status.is_reset() {
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
        let _ = self.iopub_tx.send(frames::status("", status));
        let _ = self.status_tx.send(status);
    }

    /// Simulates code submitted by another client.
    pub(crate) fn foreign_execution(&self, code: &str) {
        let parent = uuid::Uuid::new_v4().to_string();
        let _ = self.iopub_tx.send(frames::execute_input(&parent, code));
    }
}

#[async_trait]
impl KernelSession for FakeSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn kernel_display_name(&self) -> Option<String> {
        Some("Fake Kernel".to_string())
    }

    async fn kernel_language(&self) -> Result<String, InspectorError> {
        if !self.attached.load(Ordering::SeqCst) {
            return Err(InspectorError::NoActiveKernel);
        }
        Ok(self.language.clone())
    }

    async fn wait_ready(&self) -> Result<(), InspectorError> {
        if !self.attached.load(Ordering::SeqCst) {
            return Err(InspectorError::NoActiveKernel);
        }
        let mut rx = self.ready_tx.subscribe();
        rx.wait_for(|ready| *ready)
            .await
            .map(|_| ())
            .map_err(|_| InspectorError::NoActiveKernel)
    }

    fn subscribe_iopub(&self) -> broadcast::Receiver<KernelMessage> {
        self.iopub_tx.subscribe()
    }

    fn subscribe_status(&self) -> broadcast::Receiver<KernelStatus> {
        self.status_tx.subscribe()
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    async fn request_execute(
        &self,
        request: ExecuteRequest,
    ) -> Result<ExecuteFuture, InspectorError> {
        if !self.attached.load(Ordering::SeqCst) {
            return Err(InspectorError::NoActiveKernel);
        }
        let msg_id = uuid::Uuid::new_v4().to_string();
        let (messages_tx, messages_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = oneshot::channel();

        if !request.silent {
            let _ = self
                .iopub_tx
                .send(frames::execute_input(&msg_id, &request.code));
        }

        let submitted = SubmittedRequest {
            msg_id: msg_id.clone(),
            request,
            messages: messages_tx,
            reply: reply_tx,
            iopub_tx: self.iopub_tx.clone(),
        };
        self.requests_tx
            .send(submitted)
            .map_err(|_| InspectorError::NoActiveKernel)?;
        Ok(ExecuteFuture::new(msg_id, messages_rx, reply_rx))
    }
}

/// [`SessionOpener`] over a fixed set of fake sessions, keyed by id.
#[derive(Debug, Default)]
pub(crate) struct FakeOpener {
    sessions: Mutex<HashMap<String, Arc<FakeSession>>>,
    opened: AtomicUsize,
}

impl FakeOpener {
    pub(crate) fn with(sessions: &[&Arc<FakeSession>]) -> Arc<Self> {
        let map = sessions
            .iter()
            .map(|session| (session.id.clone(), Arc::clone(session)))
            .collect();
        Arc::new(Self {
            sessions: Mutex::new(map),
            opened: AtomicUsize::new(0),
        })
    }

    /// Number of successful opens so far.
    pub(crate) fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionOpener for FakeOpener {
    async fn open(&self, path: &str) -> Result<Arc<dyn KernelSession>, InspectorError> {
        let session = self
            .sessions
            .lock()
            .await
            .get(path)
            .map(Arc::clone)
            .ok_or_else(|| InspectorError::HandlerNotFound(path.to_string()))?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(session)
    }
}
