//! The session adapter capability.
//!
//! [`KernelSession`] is the one seam between the inspector and whatever host
//! owns the kernel. Each host-API generation gets its own implementation,
//! selected once at startup; everything above this trait is host-agnostic.
//!
//! Broadcast messages are surfaced per request: every submitted request
//! carries a fresh `msg_id`, and the session routes each broadcast frame to
//! the [`ExecuteFuture`] whose id matches the frame's parent header.

use std::fmt;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot};

use super::message::{ExecuteRequest, KernelMessage, KernelStatus};
use crate::error::InspectorError;

/// A live connection to a remote execution session.
#[async_trait]
pub trait KernelSession: Send + Sync + fmt::Debug {
    /// Session identifier, the notebook or console path.
    fn id(&self) -> &str;

    /// Human-readable kernel label. Opaque; may be absent.
    fn kernel_display_name(&self) -> Option<String>;

    /// Language reported by the kernel's `language_info.name`.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::NoActiveKernel`] when no kernel is attached,
    /// or a transport error if the kernel-info exchange fails.
    async fn kernel_language(&self) -> Result<String, InspectorError>;

    /// Resolves once the session and its kernel are initialised.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::NoActiveKernel`] when no kernel is attached
    /// or it did not become ready in time.
    async fn wait_ready(&self) -> Result<(), InspectorError>;

    /// Subscribes to every broadcast frame of the session.
    fn subscribe_iopub(&self) -> broadcast::Receiver<KernelMessage>;

    /// Subscribes to kernel status transitions.
    fn subscribe_status(&self) -> broadcast::Receiver<KernelStatus>;

    /// Number of resets (restart, death, lost connection) seen so far.
    ///
    /// Bumped synchronously when a reset is observed, before pending requests
    /// are abandoned, so callers can tell that kernel state installed earlier
    /// is gone without waiting for the status stream.
    fn generation(&self) -> u64;

    /// Submits an execute request and returns its live handle.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::NoActiveKernel`] when no kernel is attached.
    async fn request_execute(
        &self,
        request: ExecuteRequest,
    ) -> Result<ExecuteFuture, InspectorError>;
}

/// Live handle of one execute request.
///
/// `messages` yields the broadcast frames whose parent is this request and
/// closes once both the terminal reply and the request's `idle` status have
/// been observed; `reply` then holds the terminal `execute_reply`.
#[derive(Debug)]
pub struct ExecuteFuture {
    msg_id: String,
    messages: mpsc::UnboundedReceiver<KernelMessage>,
    reply: oneshot::Receiver<KernelMessage>,
}

impl ExecuteFuture {
    /// Assembles a handle from the session-side channel ends.
    #[must_use]
    pub fn new(
        msg_id: String,
        messages: mpsc::UnboundedReceiver<KernelMessage>,
        reply: oneshot::Receiver<KernelMessage>,
    ) -> Self {
        Self {
            msg_id,
            messages,
            reply,
        }
    }

    /// Correlation tag of the request.
    #[must_use]
    pub fn msg_id(&self) -> &str {
        &self.msg_id
    }

    /// Next broadcast frame belonging to this request, `None` once the
    /// request is complete.
    pub async fn next_message(&mut self) -> Option<KernelMessage> {
        self.messages.recv().await
    }

    /// Waits for the terminal reply, dropping any unread broadcast frames.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::Transport`] if the session abandoned the
    /// request (websocket lost, kernel restarted).
    pub async fn done(self) -> Result<KernelMessage, InspectorError> {
        self.reply
            .await
            .map_err(|_| InspectorError::Transport("request abandoned by the session".to_string()))
    }

    /// Drains the broadcast frames through `on_message`, then waits for the
    /// terminal reply.
    ///
    /// # Errors
    ///
    /// Same as [`ExecuteFuture::done`].
    pub async fn drive<F>(mut self, mut on_message: F) -> Result<KernelMessage, InspectorError>
    where
        F: FnMut(&KernelMessage) + Send,
    {
        while let Some(msg) = self.messages.recv().await {
            on_message(&msg);
        }
        self.done().await
    }
}

/// Opens sessions by path. The seam between the service layer and the host.
#[async_trait]
pub trait SessionOpener: Send + Sync + fmt::Debug {
    /// Connects to the session at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::HandlerNotFound`] if the host has no such
    /// session, [`InspectorError::NoActiveKernel`] if it has no kernel, or a
    /// transport error.
    async fn open(&self, path: &str) -> Result<std::sync::Arc<dyn KernelSession>, InspectorError>;
}
