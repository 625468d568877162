//! [`KernelSession`] over a Jupyter Server kernel websocket.
//!
//! One websocket per kernel (`/api/kernels/{id}/channels`), owned by a
//! supervisor task. While a socket is up the supervisor decodes frames,
//! publishes broadcast frames and status transitions, routes every frame
//! carrying a parent header to the matching pending request in the
//! [`RequestTable`], and writes queued outgoing frames.
//!
//! When the socket drops, the kernel counts as dead: pending requests are
//! abandoned, [`KernelStatus::Dead`] is published and submissions fail with
//! [`InspectorError::NoActiveKernel`]. The supervisor then asks its
//! [`KernelLocator`] where the session's kernel lives now (it may have been
//! replaced) and reconnects with exponential backoff. Subscribers see the
//! usual reset, then [`KernelSession::wait_ready`] succeeds again.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::message::{Channel, ExecuteRequest, KernelMessage, KernelStatus};
use super::session::{ExecuteFuture, KernelSession};
use crate::error::InspectorError;

/// Capacity of the session-wide broadcast and status channels.
const BROADCAST_CAPACITY: usize = 256;

/// Upper bound on a single `kernel_info_request` attempt.
const KERNEL_INFO_ATTEMPT: Duration = Duration::from_secs(5);

/// Pause between `kernel_info_request` attempts while the kernel starts.
const KERNEL_INFO_BACKOFF: Duration = Duration::from_millis(500);

/// First pause before reconnecting a dropped websocket; doubles per failure.
const RECONNECT_BACKOFF: Duration = Duration::from_millis(250);

/// Ceiling of the reconnect backoff.
const RECONNECT_BACKOFF_MAX: Duration = Duration::from_secs(30);

type KernelSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug)]
struct Pending {
    messages: Option<mpsc::UnboundedSender<KernelMessage>>,
    reply_tx: oneshot::Sender<KernelMessage>,
    reply: Option<KernelMessage>,
    idle_seen: bool,
    wait_for_idle: bool,
}

impl Pending {
    fn is_complete(&self) -> bool {
        self.reply.is_some() && (self.idle_seen || !self.wait_for_idle)
    }
}

/// Pending requests keyed by their `msg_id`.
///
/// Execute requests complete once both the shell reply and the `idle`
/// status for that request have arrived; plain requests (kernel info)
/// complete on the reply alone.
#[derive(Debug, Default)]
pub struct RequestTable {
    pending: HashMap<String, Pending>,
}

impl RequestTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an execute request and returns its live handle.
    pub fn register_execute(&mut self, msg_id: &str) -> ExecuteFuture {
        let (messages_tx, messages_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.insert(
            msg_id.to_string(),
            Pending {
                messages: Some(messages_tx),
                reply_tx,
                reply: None,
                idle_seen: false,
                wait_for_idle: true,
            },
        );
        ExecuteFuture::new(msg_id.to_string(), messages_rx, reply_rx)
    }

    /// Registers a request answered by a single shell reply.
    pub fn register_reply(&mut self, msg_id: &str) -> oneshot::Receiver<KernelMessage> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.insert(
            msg_id.to_string(),
            Pending {
                messages: None,
                reply_tx,
                reply: None,
                idle_seen: false,
                wait_for_idle: false,
            },
        );
        reply_rx
    }

    /// Forgets a request whose submission failed.
    pub fn remove(&mut self, msg_id: &str) {
        self.pending.remove(msg_id);
    }

    /// Routes one incoming frame to its pending request, completing the
    /// request when its last expected frame arrives.
    pub fn dispatch(&mut self, msg: &KernelMessage) {
        let Some(parent) = msg.parent_msg_id() else {
            return;
        };
        let Some(pending) = self.pending.get_mut(parent) else {
            return;
        };

        if is_reply(msg) {
            pending.reply = Some(msg.clone());
        } else {
            if msg.execution_state() == Some(KernelStatus::Idle) {
                pending.idle_seen = true;
            }
            if let Some(tx) = &pending.messages {
                let _ = tx.send(msg.clone());
            }
        }

        if pending.is_complete()
            && let Some(done) = self.pending.remove(parent)
        {
            let Pending {
                messages,
                reply_tx,
                reply,
                ..
            } = done;
            drop(messages);
            if let Some(reply) = reply {
                let _ = reply_tx.send(reply);
            }
        }
    }

    /// Drops every pending request; their handles observe an abandoned
    /// request.
    pub fn abandon_all(&mut self) {
        self.pending.clear();
    }

    /// Number of requests still waiting for completion.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if no request is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

fn is_reply(msg: &KernelMessage) -> bool {
    match msg.channel {
        Some(Channel::Shell) | Some(Channel::Control) => true,
        Some(Channel::Iopub) | Some(Channel::Stdin) => false,
        None => msg.msg_type().ends_with("_reply"),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Finds the channels websocket of the kernel currently serving a session.
///
/// Consulted on every reconnect, so a kernel replaced behind the session's
/// back is picked up.
#[async_trait]
pub trait KernelLocator: Send + Sync + fmt::Debug {
    /// Websocket URL of the kernel attached to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::NoActiveKernel`] if the session has no
    /// kernel, [`InspectorError::HandlerNotFound`] if the session is gone, or
    /// a transport error.
    async fn locate_channels(&self, path: &str) -> Result<String, InspectorError>;
}

/// Always reconnects to the URL the session was opened with.
#[derive(Debug)]
struct FixedUrl(String);

#[async_trait]
impl KernelLocator for FixedUrl {
    async fn locate_channels(&self, _path: &str) -> Result<String, InspectorError> {
        Ok(self.0.clone())
    }
}

/// State shared between the session handle and its supervisor task.
#[derive(Debug)]
struct Channels {
    outgoing: Mutex<Option<mpsc::UnboundedSender<KernelMessage>>>,
    table: Mutex<RequestTable>,
    language: Mutex<Option<String>>,
    generation: AtomicU64,
    connected: watch::Sender<bool>,
    iopub_tx: broadcast::Sender<KernelMessage>,
    status_tx: broadcast::Sender<KernelStatus>,
}

impl Channels {
    fn new() -> Self {
        let (iopub_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            outgoing: Mutex::new(None),
            table: Mutex::new(RequestTable::new()),
            language: Mutex::new(None),
            generation: AtomicU64::new(0),
            connected: watch::channel(false).0,
            iopub_tx,
            status_tx,
        }
    }

    /// Forgets everything the old kernel held. The generation moves first so
    /// abandoned requesters already see the new value.
    fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        lock(&self.language).take();
        lock(&self.table).abandon_all();
    }

    fn handle_frame(&self, msg: KernelMessage) {
        lock(&self.table).dispatch(&msg);

        if is_reply(&msg) {
            return;
        }
        if let Some(status) = msg.execution_state() {
            if status.is_reset() {
                tracing::info!(%status, "kernel reset; abandoning pending requests");
                self.reset();
            }
            let _ = self.status_tx.send(status);
        }
        let _ = self.iopub_tx.send(msg);
    }

    fn attach(&self) -> mpsc::UnboundedReceiver<KernelMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.outgoing) = Some(tx);
        self.connected.send_replace(true);
        rx
    }

    fn detach(&self) {
        lock(&self.outgoing).take();
        self.connected.send_replace(false);
        self.reset();
        let _ = self.status_tx.send(KernelStatus::Dead);
    }

    fn send(&self, msg: KernelMessage) -> Result<(), InspectorError> {
        let outgoing = lock(&self.outgoing);
        let Some(tx) = outgoing.as_ref() else {
            return Err(InspectorError::NoActiveKernel);
        };
        tx.send(msg).map_err(|_| InspectorError::NoActiveKernel)
    }

    /// `true` once a socket is up, `false` if `deadline` passes first.
    async fn wait_connected(&self, deadline: Instant) -> bool {
        let mut rx = self.connected.subscribe();
        tokio::time::timeout_at(deadline, async move {
            rx.wait_for(|up| *up).await.is_ok()
        })
        .await
        .unwrap_or(false)
    }

    fn cache_language(&self, reply: &KernelMessage) -> Option<String> {
        let language = reply
            .content
            .get("language_info")
            .and_then(|info| info.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Some(lang) = &language {
            *lock(&self.language) = Some(lang.clone());
        }
        language
    }

    /// Runs one socket until it closes or fails.
    async fn pump(&self, socket: KernelSocket, mut out_rx: mpsc::UnboundedReceiver<KernelMessage>) {
        let (mut ws_tx, mut ws_rx) = socket.split();

        let writer = async {
            while let Some(msg) = out_rx.recv().await {
                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to encode kernel frame");
                        continue;
                    }
                };
                if ws_tx.send(Message::text(json)).await.is_err() {
                    break;
                }
            }
            let _ = ws_tx.close().await;
        };

        let reader = async {
            while let Some(frame) = ws_rx.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<KernelMessage>(text.as_str()) {
                            Ok(msg) => self.handle_frame(msg),
                            Err(e) => tracing::warn!(error = %e, "undecodable kernel frame"),
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "kernel websocket error");
                        break;
                    }
                }
            }
        };

        tokio::select! {
            () = reader => {}
            () = writer => {}
        }
    }
}

/// Where and how to (re)open a session's kernel websocket.
#[derive(Debug)]
struct Endpoint {
    path: String,
    client_session: String,
    token: Option<String>,
    locator: Arc<dyn KernelLocator>,
}

impl Endpoint {
    async fn open(&self, url: &str) -> Result<KernelSocket, InspectorError> {
        let url = format!("{url}?session_id={}", self.client_session);
        let mut request = url.as_str().into_client_request()?;
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("token {token}"))
                .map_err(|e| InspectorError::InvalidRequest(e.to_string()))?;
            request.headers_mut().insert("Authorization", value);
        }
        let (stream, _) = tokio_tungstenite::connect_async(request).await?;
        Ok(stream)
    }

    async fn reopen(&self) -> Result<KernelSocket, InspectorError> {
        let url = self.locator.locate_channels(&self.path).await?;
        let socket = self.open(&url).await?;
        tracing::info!(path = %self.path, %url, "kernel websocket reconnected");
        Ok(socket)
    }
}

/// Owns the websocket for the lifetime of the session: runs it, and when it
/// drops, detaches and keeps reconnecting until a new one is up.
async fn supervise(
    channels: Arc<Channels>,
    endpoint: Endpoint,
    mut socket: KernelSocket,
    mut out_rx: mpsc::UnboundedReceiver<KernelMessage>,
) {
    loop {
        channels.pump(socket, out_rx).await;
        tracing::warn!(path = %endpoint.path, "kernel websocket closed");
        channels.detach();

        let mut delay = RECONNECT_BACKOFF;
        socket = loop {
            tokio::time::sleep(delay).await;
            match endpoint.reopen().await {
                Ok(socket) => break socket,
                Err(e) => {
                    tracing::debug!(path = %endpoint.path, error = %e, ?delay, "reconnect failed");
                    delay = (delay * 2).min(RECONNECT_BACKOFF_MAX);
                }
            }
        };
        out_rx = channels.attach();
    }
}

/// Connection parameters for [`JupyterSession::connect`].
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Session identifier (notebook path).
    pub path: String,
    /// Websocket URL of the kernel channels endpoint.
    pub ws_url: String,
    /// API token sent as `Authorization: token …`.
    pub token: Option<String>,
    /// Kernel label shown to users.
    pub kernel_display_name: Option<String>,
    /// Deadline for [`KernelSession::wait_ready`].
    pub ready_timeout: Duration,
    /// Resolves the kernel again after the websocket drops. `None` retries
    /// `ws_url`.
    pub locator: Option<Arc<dyn KernelLocator>>,
}

/// A Jupyter Server kernel reached over its channels websocket.
#[derive(Debug)]
pub struct JupyterSession {
    path: String,
    client_session: String,
    kernel_display_name: Option<String>,
    ready_timeout: Duration,
    channels: Arc<Channels>,
    supervisor: JoinHandle<()>,
}

impl JupyterSession {
    /// Opens the kernel websocket and starts the supervisor task that keeps
    /// it connected.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::Transport`] if the URL or token is invalid
    /// or the first websocket handshake fails.
    pub async fn connect(options: ConnectOptions) -> Result<Self, InspectorError> {
        let client_session = uuid::Uuid::new_v4().to_string();
        let locator: Arc<dyn KernelLocator> = match options.locator {
            Some(locator) => locator,
            None => Arc::new(FixedUrl(options.ws_url.clone())),
        };
        let endpoint = Endpoint {
            path: options.path.clone(),
            client_session: client_session.clone(),
            token: options.token,
            locator,
        };

        let socket = endpoint.open(&options.ws_url).await?;
        tracing::info!(path = %options.path, url = %options.ws_url, "kernel websocket connected");

        let channels = Arc::new(Channels::new());
        let out_rx = channels.attach();
        let supervisor = tokio::spawn(supervise(Arc::clone(&channels), endpoint, socket, out_rx));

        Ok(Self {
            path: options.path,
            client_session,
            kernel_display_name: options.kernel_display_name,
            ready_timeout: options.ready_timeout,
            channels,
            supervisor,
        })
    }

    async fn kernel_info(&self) -> Result<KernelMessage, InspectorError> {
        let msg = KernelMessage::request(
            "kernel_info_request",
            Channel::Shell,
            &self.client_session,
            Value::Object(serde_json::Map::new()),
        );
        let msg_id = msg.header.msg_id.clone();
        let reply = lock(&self.channels.table).register_reply(&msg_id);
        if let Err(e) = self.channels.send(msg) {
            lock(&self.channels.table).remove(&msg_id);
            return Err(e);
        }

        match tokio::time::timeout(KERNEL_INFO_ATTEMPT, reply).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(InspectorError::Transport(
                "kernel_info_request abandoned".to_string(),
            )),
            Err(_) => {
                lock(&self.channels.table).remove(&msg_id);
                Err(InspectorError::Transport(
                    "kernel_info_request timed out".to_string(),
                ))
            }
        }
    }
}

impl Drop for JupyterSession {
    fn drop(&mut self) {
        self.supervisor.abort();
    }
}

#[async_trait]
impl KernelSession for JupyterSession {
    fn id(&self) -> &str {
        &self.path
    }

    fn kernel_display_name(&self) -> Option<String> {
        self.kernel_display_name.clone()
    }

    async fn kernel_language(&self) -> Result<String, InspectorError> {
        if let Some(lang) = lock(&self.channels.language).clone() {
            return Ok(lang);
        }
        let reply = self.kernel_info().await?;
        self.channels.cache_language(&reply).ok_or_else(|| {
            InspectorError::MalformedReply("kernel_info_reply without language_info".to_string())
        })
    }

    async fn wait_ready(&self) -> Result<(), InspectorError> {
        let deadline = Instant::now() + self.ready_timeout;
        loop {
            if !self.channels.wait_connected(deadline).await {
                return Err(InspectorError::NoActiveKernel);
            }
            match self.kernel_info().await {
                Ok(reply) => {
                    self.channels.cache_language(&reply);
                    return Ok(());
                }
                Err(e) => {
                    tracing::debug!(path = %self.path, error = %e, "kernel not ready yet");
                }
            }
            if Instant::now() >= deadline {
                return Err(InspectorError::NoActiveKernel);
            }
            tokio::time::sleep(KERNEL_INFO_BACKOFF).await;
        }
    }

    fn subscribe_iopub(&self) -> broadcast::Receiver<KernelMessage> {
        self.channels.iopub_tx.subscribe()
    }

    fn subscribe_status(&self) -> broadcast::Receiver<KernelStatus> {
        self.channels.status_tx.subscribe()
    }

    fn generation(&self) -> u64 {
        self.channels.generation.load(Ordering::SeqCst)
    }

    async fn request_execute(
        &self,
        request: ExecuteRequest,
    ) -> Result<ExecuteFuture, InspectorError> {
        let content = serde_json::to_value(&request)
            .map_err(|e| InspectorError::Internal(e.to_string()))?;
        let msg = KernelMessage::request(
            "execute_request",
            Channel::Shell,
            &self.client_session,
            content,
        );
        let msg_id = msg.header.msg_id.clone();
        let future = lock(&self.channels.table).register_execute(&msg_id);
        if let Err(e) = self.channels.send(msg) {
            lock(&self.channels.table).remove(&msg_id);
            return Err(e);
        }
        Ok(future)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use tokio::net::TcpListener;

    use super::*;
    use crate::kernel::message::frames;

    #[tokio::test]
    async fn execute_completes_after_reply_and_idle() {
        let mut table = RequestTable::new();
        let mut future = table.register_execute("r1");

        table.dispatch(&frames::status("r1", KernelStatus::Busy));
        table.dispatch(&frames::execute_result("r1", "'[]'"));
        table.dispatch(&frames::execute_reply("r1"));
        assert_eq!(table.len(), 1, "still waiting for idle");

        table.dispatch(&frames::status("r1", KernelStatus::Idle));
        assert!(table.is_empty());

        let mut kinds = Vec::new();
        while let Some(msg) = future.next_message().await {
            kinds.push(msg.msg_type().to_string());
        }
        assert_eq!(kinds, vec!["status", "execute_result", "status"]);

        let Ok(reply) = future.done().await else {
            panic!("reply expected");
        };
        assert_eq!(reply.msg_type(), "execute_reply");
    }

    #[tokio::test]
    async fn idle_before_reply_also_completes() {
        let mut table = RequestTable::new();
        let future = table.register_execute("r2");
        table.dispatch(&frames::status("r2", KernelStatus::Idle));
        table.dispatch(&frames::execute_reply("r2"));
        assert!(table.is_empty());
        assert!(future.done().await.is_ok());
    }

    #[tokio::test]
    async fn frames_for_other_requests_are_not_routed() {
        let mut table = RequestTable::new();
        let mut mine = table.register_execute("mine");
        table.dispatch(&frames::execute_result("theirs", "'x'"));
        table.dispatch(&frames::execute_reply("mine"));
        table.dispatch(&frames::status("mine", KernelStatus::Idle));

        let Some(first) = mine.next_message().await else {
            panic!("idle status expected");
        };
        assert_eq!(first.msg_type(), "status");
        assert!(mine.next_message().await.is_none());
    }

    #[tokio::test]
    async fn plain_request_completes_on_reply() {
        let mut table = RequestTable::new();
        let reply = table.register_reply("info");
        table.dispatch(&KernelMessage::reply_to(
            "info",
            "kernel_info_reply",
            Channel::Shell,
            serde_json::json!({"language_info": {"name": "python"}}),
        ));
        let Ok(reply) = reply.await else {
            panic!("kernel info reply expected");
        };
        assert_eq!(reply.msg_type(), "kernel_info_reply");
    }

    #[tokio::test]
    async fn abandon_all_fails_pending_handles() {
        let mut table = RequestTable::new();
        let future = table.register_execute("r3");
        table.abandon_all();
        let Err(err) = future.done().await else {
            panic!("abandoned request must fail");
        };
        assert!(err.is_transient());
    }

    #[test]
    fn reply_detection_without_channel() {
        let mut msg = frames::execute_reply("p");
        msg.channel = None;
        assert!(is_reply(&msg));
        let mut status = frames::status("p", KernelStatus::Idle);
        status.channel = None;
        assert!(!is_reply(&status));
    }

    #[derive(Debug)]
    struct CountingLocator {
        url: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl KernelLocator for CountingLocator {
        async fn locate_channels(&self, _path: &str) -> Result<String, InspectorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.url.clone())
        }
    }

    /// Answers kernel-info requests until `answers` have been sent or the
    /// client goes away.
    async fn answer_kernel_info(ws: &mut WebSocketStream<TcpStream>, answers: usize) {
        let mut sent = 0;
        while sent < answers {
            let Some(Ok(frame)) = ws.next().await else {
                return;
            };
            let Message::Text(text) = frame else {
                continue;
            };
            let Ok(request) = serde_json::from_str::<KernelMessage>(text.as_str()) else {
                continue;
            };
            if request.msg_type() != "kernel_info_request" {
                continue;
            }
            let reply = KernelMessage::reply_to(
                &request.header.msg_id,
                "kernel_info_reply",
                Channel::Shell,
                serde_json::json!({"language_info": {"name": "python"}}),
            );
            let Ok(json) = serde_json::to_string(&reply) else {
                return;
            };
            if ws.send(Message::text(json)).await.is_err() {
                return;
            }
            sent += 1;
        }
    }

    #[tokio::test]
    async fn dropped_websocket_reconnects() {
        let Ok(listener) = TcpListener::bind("127.0.0.1:0").await else {
            panic!("listener should bind");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("listener address expected");
        };

        // First connection answers once and hangs up; the second keeps serving.
        let server = tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                return;
            };
            answer_kernel_info(&mut ws, 1).await;
            let _ = ws.close(None).await;
            drop(ws);

            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                return;
            };
            answer_kernel_info(&mut ws, usize::MAX).await;
        });

        let url = format!("ws://{addr}/api/kernels/k1/channels");
        let locator = Arc::new(CountingLocator {
            url: url.clone(),
            calls: AtomicUsize::new(0),
        });
        let Ok(session) = JupyterSession::connect(ConnectOptions {
            path: "nb.ipynb".to_string(),
            ws_url: url,
            token: None,
            kernel_display_name: None,
            ready_timeout: Duration::from_secs(5),
            locator: Some(Arc::clone(&locator) as Arc<dyn KernelLocator>),
        })
        .await
        else {
            panic!("first connection should succeed");
        };
        let mut status = session.subscribe_status();

        assert!(session.wait_ready().await.is_ok());
        assert_eq!(session.generation(), 0);

        let Ok(Ok(lost)) = tokio::time::timeout(Duration::from_secs(5), status.recv()).await else {
            panic!("status expected after the server hung up");
        };
        assert_eq!(lost, KernelStatus::Dead);
        assert_eq!(session.generation(), 1);

        assert!(session.wait_ready().await.is_ok());
        assert_eq!(session.kernel_language().await.ok().as_deref(), Some("python"));
        assert!(locator.calls.load(Ordering::SeqCst) >= 1);

        drop(session);
        server.abort();
    }

    #[tokio::test]
    async fn reset_status_bumps_generation_and_abandons() {
        let channels = Channels::new();
        let _rx = channels.attach();
        let future = lock(&channels.table).register_execute("r4");

        channels.handle_frame(frames::status("other", KernelStatus::Restarting));

        assert_eq!(channels.generation.load(Ordering::SeqCst), 1);
        assert!(future.done().await.is_err());
        assert!(*channels.connected.borrow());
    }
}
