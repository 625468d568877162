//! Jupyter Server REST client used to discover sessions and open kernel
//! websockets.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;

use super::jupyter::{ConnectOptions, JupyterSession, KernelLocator};
use super::session::{KernelSession, SessionOpener};
use crate::config::InspectorConfig;
use crate::error::InspectorError;

/// A session as listed by `GET /api/sessions`.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionModel {
    /// Server-side session id.
    pub id: String,
    /// Notebook or console path; the inspector's session identifier.
    pub path: String,
    /// Session name.
    #[serde(default)]
    pub name: String,
    /// `notebook` or `console`.
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Attached kernel, absent while none is running.
    #[serde(default)]
    pub kernel: Option<KernelModel>,
}

/// A running kernel.
#[derive(Debug, Clone, Deserialize)]
pub struct KernelModel {
    /// Kernel id used in the channels URL.
    pub id: String,
    /// Kernelspec name, e.g. `python3`.
    pub name: String,
    /// Last reported execution state.
    #[serde(default)]
    pub execution_state: Option<String>,
}

/// Response of `GET /api/kernelspecs`.
#[derive(Debug, Clone, Deserialize)]
pub struct KernelSpecs {
    /// Name of the default kernelspec.
    #[serde(default)]
    pub default: String,
    /// Installed kernelspecs keyed by name.
    #[serde(default)]
    pub kernelspecs: HashMap<String, KernelSpecEntry>,
}

/// One installed kernelspec.
#[derive(Debug, Clone, Deserialize)]
pub struct KernelSpecEntry {
    /// Kernelspec name.
    pub name: String,
    /// Kernelspec body.
    pub spec: KernelSpec,
}

/// The `kernel.json` body of a kernelspec.
#[derive(Debug, Clone, Deserialize)]
pub struct KernelSpec {
    /// Label shown to users.
    pub display_name: String,
    /// Language declared by the kernelspec.
    #[serde(default)]
    pub language: String,
}

/// Client for one Jupyter Server.
#[derive(Debug, Clone)]
pub struct JupyterServerClient {
    base_url: String,
    token: Option<String>,
    ready_timeout: Duration,
    http: reqwest::Client,
}

impl JupyterServerClient {
    /// Builds a client from the service configuration.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::Transport`] if the HTTP client cannot be
    /// constructed.
    pub fn new(config: &InspectorConfig) -> Result<Self, InspectorError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;
        Ok(Self {
            base_url: config.jupyter_url.clone(),
            token: config.jupyter_token.clone(),
            ready_timeout: config.kernel_ready_timeout,
            http,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
    ) -> Result<T, InspectorError> {
        let mut request = self.http.get(format!("{}{endpoint}", self.base_url));
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("token {token}"));
        }
        let response = request.send().await?.error_for_status()?;
        Ok(response.json::<T>().await?)
    }

    /// Lists the server's sessions.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::Transport`] on HTTP or decoding failure.
    pub async fn list_sessions(&self) -> Result<Vec<SessionModel>, InspectorError> {
        self.get_json("/api/sessions").await
    }

    /// Finds the session serving `path`.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::HandlerNotFound`] if the server has no
    /// session for `path`, or a transport error.
    pub async fn find_session(&self, path: &str) -> Result<SessionModel, InspectorError> {
        self.list_sessions()
            .await?
            .into_iter()
            .find(|s| s.path == path)
            .ok_or_else(|| InspectorError::HandlerNotFound(path.to_string()))
    }

    /// Lists installed kernelspecs.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::Transport`] on HTTP or decoding failure.
    pub async fn kernelspecs(&self) -> Result<KernelSpecs, InspectorError> {
        self.get_json("/api/kernelspecs").await
    }

    /// Opens a kernel websocket for the session serving `path`.
    ///
    /// # Errors
    ///
    /// Returns [`InspectorError::HandlerNotFound`] if no such session exists,
    /// [`InspectorError::NoActiveKernel`] if it has no kernel, or a transport
    /// error.
    pub async fn open_session(&self, path: &str) -> Result<JupyterSession, InspectorError> {
        let session = self.find_session(path).await?;
        let Some(kernel) = session.kernel else {
            return Err(InspectorError::NoActiveKernel);
        };

        let display_name = match self.kernelspecs().await {
            Ok(specs) => specs
                .kernelspecs
                .get(&kernel.name)
                .map(|entry| entry.spec.display_name.clone()),
            Err(e) => {
                tracing::debug!(error = %e, "kernelspec lookup failed; using kernel name");
                None
            }
        }
        .unwrap_or_else(|| kernel.name.clone());

        JupyterSession::connect(ConnectOptions {
            path: session.path,
            ws_url: self.channels_url(&kernel.id),
            token: self.token.clone(),
            kernel_display_name: Some(display_name),
            ready_timeout: self.ready_timeout,
            locator: Some(Arc::new(self.clone())),
        })
        .await
    }

    /// Websocket URL of a kernel's channels endpoint.
    #[must_use]
    pub fn channels_url(&self, kernel_id: &str) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        format!("{ws_base}/api/kernels/{kernel_id}/channels")
    }
}

#[async_trait]
impl KernelLocator for JupyterServerClient {
    async fn locate_channels(&self, path: &str) -> Result<String, InspectorError> {
        let session = self.find_session(path).await?;
        let kernel = session.kernel.ok_or(InspectorError::NoActiveKernel)?;
        Ok(self.channels_url(&kernel.id))
    }
}

#[async_trait]
impl SessionOpener for JupyterServerClient {
    async fn open(&self, path: &str) -> Result<Arc<dyn KernelSession>, InspectorError> {
        let session = self.open_session(path).await?;
        Ok(Arc::new(session))
    }
}
