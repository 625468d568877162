//! Kernel layer: Jupyter wire types, the session adapter capability, its
//! Jupyter Server variant, and the connector the handlers talk to.

pub mod connector;
pub mod jupyter;
pub mod message;
pub mod server;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use connector::{KernelConnector, KernelRestart, RestartWatcher};
pub use jupyter::{JupyterSession, KernelLocator};
pub use message::{ExecuteRequest, KernelMessage, KernelStatus};
pub use server::JupyterServerClient;
pub use session::{ExecuteFuture, KernelSession, SessionOpener};
