//! Per-session inspection handler.
//!
//! [`InspectionHandler`] drives one kernel session through
//! `Initializing → Listening ⇄ AwaitingReply`, with `Disposed` reachable from
//! any state:
//!
//! - **Initializing**: waits for the connector to be ready, runs the init
//!   script silently and only then subscribes to the session's broadcast
//!   stream. [`Inspectable::ready`] resolves at this point.
//! - **Listening**: every `execute_input` that the handler did not issue
//!   itself triggers one inspection.
//! - **AwaitingReply**: the query command runs as its own request and its
//!   `execute_result`/`display_data` reply is decoded and published.
//!
//! Inspections are serialised by a queue of depth one: one query in flight,
//! at most one pending, further triggers dropped. On a kernel restart the
//! handler publishes a transient empty update, re-runs the init sequence
//! against the restarted kernel and inspects once more.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex as AsyncMutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use super::matrix::{MatrixModel, parse_matrix_reply};
use super::scripts::ScriptBundle;
use super::update::{InspectorUpdate, parse_inspection_reply};
use super::update_bus::UpdateBus;
use crate::error::InspectorError;
use crate::kernel::{ExecuteFuture, ExecuteRequest, KernelConnector, KernelMessage, RestartWatcher};

/// Number of recently issued request ids remembered for self-detection.
const ISSUED_CAPACITY: usize = 32;

/// What a panel can do with an inspection source.
///
/// Implemented by [`InspectionHandler`] and by the no-op
/// [`UnsupportedLanguageHandler`](super::UnsupportedLanguageHandler), so the
/// panel's contract is the same whatever the kernel language.
#[async_trait]
pub trait Inspectable: Send + Sync + fmt::Debug {
    /// Session identifier.
    fn id(&self) -> &str;

    /// Human-readable kernel label.
    fn kernel_name(&self) -> Option<String>;

    /// Kernel language the handler was built for.
    fn language(&self) -> &str;

    /// `false` for the fallback handler.
    fn is_supported(&self) -> bool;

    /// Whether [`Inspectable::dispose`] has been called.
    fn is_disposed(&self) -> bool;

    /// Resolves once the handler can serve inspections.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::HandlerDisposed`] if the handler is disposed
    /// before becoming ready.
    async fn ready(&self) -> Result<(), InspectorError>;

    /// Subscribes to inspection updates. `None` once disposed.
    fn subscribe(&self) -> Option<broadcast::Receiver<InspectorUpdate>>;

    /// Watch flipping to `true` exactly once, on dispose.
    fn disposed(&self) -> watch::Receiver<bool>;

    /// Requests a fresh snapshot. The result arrives through
    /// [`Inspectable::subscribe`].
    fn perform_inspection(&self);

    /// Fetches up to `max_rows` rows of variable `name` as a table.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::KernelError`] if the kernel raised,
    /// [`InspectorError::MalformedReply`] if the reply is not a table,
    /// [`InspectorError::MatrixUnsupported`] from the fallback handler, or a
    /// session error.
    async fn perform_matrix_inspection(
        &self,
        name: &str,
        max_rows: usize,
    ) -> Result<MatrixModel, InspectorError>;

    /// Submits the widget query for `name` and returns the live request for
    /// the caller to render.
    ///
    /// # Errors
    ///
    /// Returns a session error if the request could not be submitted.
    async fn perform_widget_inspection(&self, name: &str) -> Result<ExecuteFuture, InspectorError>;

    /// Deletes variable `name` in the kernel.
    ///
    /// # Errors
    ///
    /// Returns a session error if the request could not be submitted.
    async fn perform_delete(&self, name: &str) -> Result<(), InspectorError>;

    /// Disposes the handler. Idempotent.
    fn dispose(&self);
}

/// Construction parameters of an [`InspectionHandler`].
#[derive(Debug, Clone)]
pub struct HandlerOptions {
    /// Connector of the inspected session.
    pub connector: KernelConnector,
    /// Scripts matching the kernel language.
    pub scripts: &'static ScriptBundle,
    /// Kernel language.
    pub language: String,
    /// Capacity of the update channel.
    pub update_bus_capacity: usize,
    /// Delay before retrying a failed initialisation.
    pub init_retry_delay: Duration,
}

/// Inspection handler of one supported kernel session.
#[derive(Debug)]
pub struct InspectionHandler {
    inner: Arc<Inner>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Debug)]
struct Inner {
    id: String,
    kernel_name: Option<String>,
    language: String,
    connector: KernelConnector,
    scripts: &'static ScriptBundle,
    init_retry_delay: Duration,
    bus: UpdateBus,
    disposed: AtomicBool,
    disposed_tx: watch::Sender<bool>,
    /// Kernel generation the init script was last installed in.
    installed_tx: watch::Sender<Option<u64>>,
    trigger_tx: mpsc::Sender<()>,
    issued: AsyncMutex<VecDeque<String>>,
}

impl InspectionHandler {
    /// Builds the handler and starts its initialisation in the background.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(options: HandlerOptions) -> Self {
        let HandlerOptions {
            connector,
            scripts,
            language,
            update_bus_capacity,
            init_retry_delay,
        } = options;

        let id = connector.id().to_string();
        let kernel_name = connector.kernel_name();
        let restarts = connector.restarts();
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (installed_tx, _) = watch::channel(None);
        let (disposed_tx, _) = watch::channel(false);

        let inner = Arc::new(Inner {
            id,
            kernel_name,
            language,
            connector,
            scripts,
            init_retry_delay,
            bus: UpdateBus::new(update_bus_capacity),
            disposed: AtomicBool::new(false),
            disposed_tx,
            installed_tx,
            trigger_tx,
            issued: AsyncMutex::new(VecDeque::with_capacity(ISSUED_CAPACITY)),
        });

        let lifecycle = tokio::spawn(run_lifecycle(Arc::clone(&inner), restarts));
        let worker = tokio::spawn(run_inspections(Arc::clone(&inner), trigger_rx));

        Self {
            inner,
            tasks: Mutex::new(vec![lifecycle, worker]),
        }
    }

    /// Scripts this handler runs.
    #[must_use]
    pub fn scripts(&self) -> &'static ScriptBundle {
        self.inner.scripts
    }
}

#[async_trait]
impl Inspectable for InspectionHandler {
    fn id(&self) -> &str {
        &self.inner.id
    }

    fn kernel_name(&self) -> Option<String> {
        self.inner.kernel_name.clone()
    }

    fn language(&self) -> &str {
        &self.inner.language
    }

    fn is_supported(&self) -> bool {
        true
    }

    fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    async fn ready(&self) -> Result<(), InspectorError> {
        self.inner.wait_ready().await
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<InspectorUpdate>> {
        (!self.inner.is_disposed()).then(|| self.inner.bus.follow())
    }

    fn disposed(&self) -> watch::Receiver<bool> {
        self.inner.disposed_tx.subscribe()
    }

    fn perform_inspection(&self) {
        self.inner.trigger();
    }

    async fn perform_matrix_inspection(
        &self,
        name: &str,
        max_rows: usize,
    ) -> Result<MatrixModel, InspectorError> {
        let inner = &self.inner;
        inner.wait_ready().await?;

        let code = inner.scripts.matrix_query(name, max_rows);
        let mut future = inner.submit(ExecuteRequest::query(code)).await?;
        while let Some(msg) = future.next_message().await {
            inner.ensure_live()?;
            match msg.msg_type() {
                "execute_result" => {
                    let text = msg.text_plain().ok_or_else(|| {
                        InspectorError::MalformedReply("matrix result has no text/plain".to_string())
                    })?;
                    return parse_matrix_reply(text);
                }
                "error" => return Err(InspectorError::KernelError(msg.error_summary())),
                _ => {}
            }
        }

        let reply = future.done().await?;
        inner.ensure_live()?;
        if reply.is_error_reply() {
            return Err(InspectorError::KernelError(reply.error_summary()));
        }
        Err(InspectorError::MalformedReply(format!(
            "matrix query for {name} produced no result"
        )))
    }

    async fn perform_widget_inspection(&self, name: &str) -> Result<ExecuteFuture, InspectorError> {
        let inner = &self.inner;
        inner.wait_ready().await?;
        let code = inner.scripts.widget_query(name);
        inner.submit(ExecuteRequest::query(code)).await
    }

    async fn perform_delete(&self, name: &str) -> Result<(), InspectorError> {
        let inner = &self.inner;
        inner.wait_ready().await?;
        let code = inner.scripts.delete(name);
        let reply = inner
            .connector
            .fetch(ExecuteRequest::silent(code), |_| {})
            .await?;
        if reply.is_error_reply() {
            tracing::debug!(
                session = %inner.id,
                variable = name,
                error = %reply.error_summary(),
                "delete raised in kernel"
            );
        }
        // Silent requests are not echoed, so nothing else would refresh the panel.
        inner.trigger();
        Ok(())
    }

    fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.disposed_tx.send_replace(true);
        let tasks = std::mem::take(
            &mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for task in tasks {
            task.abort();
        }
        tracing::debug!(session = %self.inner.id, "inspection handler disposed");
    }
}

impl Drop for InspectionHandler {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Inner {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn ensure_live(&self) -> Result<(), InspectorError> {
        if self.is_disposed() {
            return Err(InspectorError::HandlerDisposed(self.id.clone()));
        }
        Ok(())
    }

    /// Resolves once the init script is installed in the kernel's current
    /// generation. A reset bumps the generation before anything else sees
    /// it, so nothing slips through to a kernel that has not been re-initialised.
    async fn wait_ready(&self) -> Result<(), InspectorError> {
        self.ensure_live()?;
        let mut installed_rx = self.installed_tx.subscribe();
        let mut disposed_rx = self.disposed_tx.subscribe();
        tokio::select! {
            ready = async {
                installed_rx
                    .wait_for(|installed| *installed == Some(self.connector.generation()))
                    .await
                    .is_ok()
            } => {
                if !ready {
                    return Err(InspectorError::Internal("readiness channel closed".to_string()));
                }
            }
            () = async { let _ = disposed_rx.wait_for(|disposed| *disposed).await; } => {}
        }
        self.ensure_live()
    }

    fn publish(&self, update: InspectorUpdate) {
        if self.is_disposed() {
            tracing::debug!(session = %self.id, "dropping update of disposed handler");
            return;
        }
        if !self.bus.publish(update) {
            tracing::trace!(session = %self.id, "no panel follows this session");
        }
    }

    fn trigger(&self) {
        if self.is_disposed() {
            return;
        }
        match self.trigger_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Closed(())) => {}
            Err(TrySendError::Full(())) => {
                tracing::trace!(session = %self.id, "inspection already pending");
            }
        }
    }

    /// Submits `request` and records its id as one of ours. The ring stays
    /// locked until the id is recorded, so the request's own echo is never
    /// judged before that.
    async fn submit(&self, request: ExecuteRequest) -> Result<ExecuteFuture, InspectorError> {
        self.ensure_live()?;
        let mut issued = self.issued.lock().await;
        let future = self.connector.execute(request).await?;
        if issued.len() == ISSUED_CAPACITY {
            issued.pop_front();
        }
        issued.push_back(future.msg_id().to_string());
        Ok(future)
    }

    async fn is_own_request(&self, msg_id: &str) -> bool {
        self.issued.lock().await.iter().any(|id| id == msg_id)
    }

    /// An `execute_input` that neither this handler nor another inspector
    /// on the same kernel submitted. Other inspectors are recognised by the
    /// commands they run.
    async fn is_foreign_execution(&self, msg: &KernelMessage) -> bool {
        if msg.msg_type() != "execute_input" {
            return false;
        }
        let Some(code) = msg.code() else {
            return false;
        };
        if code == self.scripts.query_command
            || code == self.scripts.matrix_query_command
            || code.starts_with(self.scripts.widget_query_command)
        {
            return false;
        }
        match msg.parent_msg_id() {
            Some(id) => !self.is_own_request(id).await,
            None => true,
        }
    }

    async fn run_init_script(&self) -> Result<(), InspectorError> {
        let reply = self
            .connector
            .fetch(ExecuteRequest::silent(self.scripts.init_script), |_| {})
            .await?;
        if reply.is_error_reply() {
            tracing::warn!(
                session = %self.id,
                error = %reply.error_summary(),
                "init script raised in kernel"
            );
        }
        Ok(())
    }

    /// Runs the init sequence until it succeeds and returns the kernel
    /// generation it ran in, or `None` if the handler was disposed meanwhile.
    async fn initialize(
        &self,
        mut readiness: BoxFuture<'static, Result<(), InspectorError>>,
    ) -> Option<u64> {
        loop {
            if self.is_disposed() {
                return None;
            }
            let generation = self.connector.generation();
            let result = match readiness.await {
                Ok(()) if !self.is_disposed() => self.run_init_script().await,
                Ok(()) => return None,
                Err(err) => Err(err),
            };
            if self.is_disposed() {
                return None;
            }
            match result {
                Ok(()) => {
                    tracing::info!(session = %self.id, language = %self.language, generation, "inspector initialised");
                    return Some(generation);
                }
                Err(err) => {
                    tracing::warn!(
                        session = %self.id,
                        error = %err,
                        retry_in = ?self.init_retry_delay,
                        "inspector initialisation failed"
                    );
                    tokio::time::sleep(self.init_retry_delay).await;
                    readiness = connector_ready(&self.connector);
                }
            }
        }
    }

    async fn inspect(&self) {
        let request = ExecuteRequest::query(self.scripts.query_command);
        let mut future = match self.submit(request).await {
            Ok(future) => future,
            Err(err) => {
                tracing::warn!(session = %self.id, error = %err, "inspection request failed");
                return;
            }
        };

        while let Some(msg) = future.next_message().await {
            if self.is_disposed() {
                return;
            }
            match msg.msg_type() {
                "execute_result" | "display_data" => {
                    let Some(text) = msg.text_plain() else {
                        continue;
                    };
                    match parse_inspection_reply(text) {
                        Ok(payload) => self.publish(InspectorUpdate::inspected(
                            self.kernel_name.clone(),
                            payload,
                        )),
                        Err(err) => {
                            tracing::warn!(session = %self.id, error = %err, "skipping malformed inspection reply");
                        }
                    }
                }
                "error" => {
                    tracing::debug!(session = %self.id, error = %msg.error_summary(), "inspection query raised");
                }
                _ => {}
            }
        }

        if let Err(err) = future.done().await {
            tracing::debug!(session = %self.id, error = %err, "inspection request ended without reply");
        }
    }
}

fn connector_ready(connector: &KernelConnector) -> BoxFuture<'static, Result<(), InspectorError>> {
    let connector = connector.clone();
    async move { connector.ready().await }.boxed()
}

async fn run_lifecycle(inner: Arc<Inner>, mut restarts: RestartWatcher) {
    let mut readiness = connector_ready(&inner.connector);
    let mut reinspect = false;

    loop {
        let Some(generation) = inner.initialize(readiness).await else {
            return;
        };

        // Subscribed only now so the init script's own traffic is never seen.
        let mut iopub = inner.connector.iopub();
        inner.installed_tx.send_replace(Some(generation));
        if reinspect {
            inner.trigger();
        }

        loop {
            tokio::select! {
                restart = restarts.next() => {
                    let Some(restart) = restart else {
                        tracing::debug!(session = %inner.id, "session closed, stopping handler");
                        return;
                    };
                    if inner.is_disposed() {
                        return;
                    }
                    tracing::info!(session = %inner.id, status = %restart.status, "kernel restarting");
                    inner.installed_tx.send_replace(None);
                    inner.publish(InspectorUpdate::restarting());
                    readiness = restart.ready;
                    reinspect = true;
                    break;
                }
                msg = iopub.recv() => match msg {
                    Ok(msg) => {
                        if inner.is_foreign_execution(&msg).await {
                            inner.trigger();
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(session = %inner.id, lagged = n, "broadcast stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!(session = %inner.id, "broadcast stream closed");
                        return;
                    }
                },
            }
        }
    }
}

async fn run_inspections(inner: Arc<Inner>, mut triggers: mpsc::Receiver<()>) {
    while triggers.recv().await.is_some() {
        if inner.wait_ready().await.is_err() {
            return;
        }
        inner.inspect().await;
    }
}
